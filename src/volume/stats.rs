//! Summary statistics over a box of region voxels

use crate::math::VoxelBox;
use super::region::Region;

/// Statistics of the finite samples inside a selection box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionStats {
    /// Voxels inside the box (after clipping to the region)
    pub voxel_count: usize,
    /// Voxels whose value is NaN or infinite
    pub blank_count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f32,
    pub max: f32,
}

impl SelectionStats {
    /// Compute over `selection`, clipped to the region. `None` if they don't overlap.
    pub fn compute(region: &Region, selection: &VoxelBox) -> Option<Self> {
        let clipped = selection.intersection(&region.bounds())?;

        let mut stats = SelectionStats {
            voxel_count: 0,
            blank_count: 0,
            sum: 0.0,
            mean: f64::NAN,
            min: f32::NAN,
            max: f32::NAN,
        };
        let mut finite = 0usize;

        for v in clipped.iter() {
            stats.voxel_count += 1;
            let value = region.value(v);
            if !value.is_finite() {
                stats.blank_count += 1;
                continue;
            }
            finite += 1;
            stats.sum += value as f64;
            stats.min = if stats.min.is_nan() { value } else { stats.min.min(value) };
            stats.max = if stats.max.is_nan() { value } else { stats.max.max(value) };
        }

        if finite > 0 {
            stats.mean = stats.sum / finite as f64;
        }
        Some(stats)
    }
}
