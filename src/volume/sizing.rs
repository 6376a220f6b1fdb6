//! Downsample factor selection for fitting a cube into a memory budget.
//!
//! The budget always assumes 4 bytes per element, also for 2-byte mask cubes,
//! so data and mask regions cut from the same box get the same factors.

use crate::core::config::EngineConfig;
use crate::core::types::{I64Vec3, IVec3};

/// Hard per-axis cap on a region's extent (largest 3D texture side)
pub const MAX_TEXTURE_DIM: i32 = 2048;

/// Bytes per element assumed by the memory budget
pub const BUDGET_BYTES_PER_ELEMENT: i64 = 4;

/// Bytes in one budget megabyte
const BYTES_PER_MB: i64 = 1_000_000;

/// Greedy search for per-axis downsample factors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownsampleSizer {
    /// Memory budget in megabytes
    max_cube_size_mb: i64,
    /// Per-axis extent cap
    max_texture_dim: i32,
}

impl Default for DownsampleSizer {
    fn default() -> Self {
        Self::new(EngineConfig::default().max_cube_size_mb, MAX_TEXTURE_DIM)
    }
}

impl DownsampleSizer {
    /// Create a sizer with the given budget and per-axis cap
    pub fn new(max_cube_size_mb: i64, max_texture_dim: i32) -> Self {
        Self {
            max_cube_size_mb,
            max_texture_dim: max_texture_dim.max(1),
        }
    }

    /// Create a sizer from engine config
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_cube_size_mb, config.max_texture_dim)
    }

    /// Per-axis cap
    pub fn max_texture_dim(&self) -> i32 {
        self.max_texture_dim
    }

    /// Largest element count the budget allows (at least 1)
    pub fn max_elements(&self) -> i64 {
        (self.max_cube_size_mb.saturating_mul(BYTES_PER_MB) / BUDGET_BYTES_PER_ELEMENT).max(1)
    }

    /// Factors for a whole cube of extent `dims`
    pub fn compute_factors(&self, dims: I64Vec3) -> IVec3 {
        self.compute_factors_from(dims, IVec3::ONE)
    }

    /// Factors for the inclusive crop box `start..=end` (corners in either order)
    pub fn compute_factors_cropped(&self, start: IVec3, end: IVec3) -> IVec3 {
        let dims = ((end - start).abs() + IVec3::ONE).as_i64vec3();
        self.compute_factors(dims)
    }

    /// Grow `initial` factors until `dims` fits the cap and the budget.
    ///
    /// Factors only increase. Axes exceeding the cap are fixed independently first;
    /// then, while over budget, the axis with the largest downsampled extent grows,
    /// ties going to Z, then Y, then X.
    ///
    /// Both the budget check and the tie-break use rounded-up extents
    /// `ceil(dims / factors)`, the size of the region actually produced. Near bin
    /// boundaries this can pick larger factors than a check on `dims / factors`.
    pub fn compute_factors_from(&self, dims: I64Vec3, initial: IVec3) -> IVec3 {
        let dims = dims.max(I64Vec3::ONE);
        let mut factors = initial.max(IVec3::ONE).as_i64vec3();
        let cap = self.max_texture_dim as i64;

        for axis in 0..3 {
            while downsampled_extent(dims[axis], factors[axis]) > cap {
                factors[axis] += 1;
            }
        }

        let max_elements = self.max_elements();
        loop {
            let ext = I64Vec3::new(
                downsampled_extent(dims.x, factors.x),
                downsampled_extent(dims.y, factors.y),
                downsampled_extent(dims.z, factors.z),
            );
            if ext.x * ext.y * ext.z <= max_elements {
                break;
            }
            if ext.z >= ext.x && ext.z >= ext.y {
                factors.z += 1;
            } else if ext.y > ext.x {
                factors.y += 1;
            } else {
                factors.x += 1;
            }
        }

        factors.as_ivec3()
    }

    /// True if a region of `extent` satisfies both limits
    pub fn fits(&self, extent: IVec3) -> bool {
        let e = extent.as_i64vec3();
        extent.max_element() <= self.max_texture_dim && e.x * e.y * e.z <= self.max_elements()
    }
}

/// Factors for a whole cube under `max_mb` and the default per-axis cap
pub fn compute_factors(max_mb: i64, dims: I64Vec3) -> IVec3 {
    DownsampleSizer::new(max_mb, MAX_TEXTURE_DIM).compute_factors(dims)
}

/// Factors for a crop box under `max_mb` and the default per-axis cap
pub fn compute_factors_cropped(max_mb: i64, start: IVec3, end: IVec3) -> IVec3 {
    DownsampleSizer::new(max_mb, MAX_TEXTURE_DIM).compute_factors_cropped(start, end)
}

/// Region extent for an inclusive crop `start..=end`: `ceil((|end - start| + 1) / factor)`.
///
/// Rounds up so the last partial bin is kept.
pub fn cropped_extent(start: IVec3, end: IVec3, factors: IVec3) -> IVec3 {
    let size = (end - start).abs() + IVec3::ONE;
    let f = factors.max(IVec3::ONE);
    (size + f - IVec3::ONE) / f
}

/// `ceil(dim / factor)`
fn downsampled_extent(dim: i64, factor: i64) -> i64 {
    (dim + factor - 1) / factor
}
