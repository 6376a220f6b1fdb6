//! Conversions between world, local, voxel and data coordinates.
//!
//! - World: scene space, related to local space by the cube's transform.
//! - Local: the cube occupies the unit cube `[-0.5, 0.5]^3`.
//! - Voxel: 1-based integer index into the materialized region.
//! - Data: 1-based integer index into the full-resolution cube.
//!
//! All functions are total. Results may lie outside the array; callers check bounds.

use serde::{Deserialize, Serialize};

use crate::core::types::{IVec3, Mat4, Vec3};

/// Cube axis, also used to pick the fixed axis of a slice
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    #[default]
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index (0 = x)
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// The two axes spanning a slice perpendicular to this one, as (horizontal, vertical)
    pub fn free_axes(self) -> (Axis, Axis) {
        match self {
            Axis::X => (Axis::Y, Axis::Z),
            Axis::Y => (Axis::X, Axis::Z),
            Axis::Z => (Axis::X, Axis::Y),
        }
    }

    /// Build a voxel from slice pixel coordinates and the fixed slice index
    pub fn voxel_from_pixel(self, u: i32, v: i32, slice_index: i32) -> IVec3 {
        let (h, w) = self.free_axes();
        let mut voxel = IVec3::ZERO;
        voxel[h.index()] = u;
        voxel[w.index()] = v;
        voxel[self.index()] = slice_index;
        voxel
    }

    /// Project a voxel onto slice pixel coordinates
    pub fn pixel_from_voxel(self, voxel: IVec3) -> (i32, i32) {
        let (h, v) = self.free_axes();
        (voxel[h.index()], voxel[v.index()])
    }
}

/// World position to cube-local position.
pub fn world_to_local(p: Vec3, transform: &Mat4) -> Vec3 {
    transform.inverse().transform_point3(p)
}

/// Cube-local position to world position.
pub fn local_to_world(p: Vec3, transform: &Mat4) -> Vec3 {
    transform.transform_point3(p)
}

/// Local position to 1-based voxel index: `floor(local * dims + dims / 2) + 1`.
///
/// No clamping; positions outside the unit cube give out-of-range voxels.
pub fn local_to_voxel(p: Vec3, dims: IVec3) -> IVec3 {
    let d = dims.as_vec3();
    (p * d + d / 2.0).floor().as_ivec3() + IVec3::ONE
}

/// Local position of a voxel's center. Inverse of [`local_to_voxel`].
pub fn voxel_to_local(v: IVec3, dims: IVec3) -> Vec3 {
    let d = dims.as_vec3();
    ((v - IVec3::ONE).as_vec3() + 0.5) / d - 0.5
}

/// Region voxel to full-resolution data voxel: `origin + (v - 1) * downsample`.
pub fn voxel_to_data(v: IVec3, origin: IVec3, downsample: IVec3) -> IVec3 {
    origin + (v - IVec3::ONE) * downsample
}

/// Full-resolution data voxel to the region voxel whose bin contains it.
pub fn data_to_voxel(d: IVec3, origin: IVec3, downsample: IVec3) -> IVec3 {
    (d - origin).div_euclid(downsample) + IVec3::ONE
}

/// True if a 1-based voxel lies within `[1, dims]` on every axis.
pub fn in_bounds(v: IVec3, dims: IVec3) -> bool {
    v.cmpge(IVec3::ONE).all() && v.cmple(dims).all()
}
