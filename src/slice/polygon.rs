//! Polygon selection on a slice.
//!
//! Pixels are tested at their integer 1-based coordinates against an implicitly
//! closed polygon, using even-odd edge-crossing parity.

use crate::core::error::Error;
use crate::core::types::{IVec2, IVec3, Result, Vec2};
use crate::math::Axis;
use super::grid::Grid2;

/// Even-odd ray-casting test
pub fn point_in_polygon(p: Vec2, polygon: &[Vec2]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Integer bounding box of the polygon clamped to `[1, shape]`, as (min, max).
///
/// `None` for an empty polygon or one entirely off the slice.
pub fn polygon_bounds(polygon: &[Vec2], shape: IVec2) -> Option<(IVec2, IVec2)> {
    let first = *polygon.first()?;
    let (lo, hi) = polygon
        .iter()
        .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)));
    let min = lo.floor().as_ivec2().max(IVec2::ONE);
    let max = hi.ceil().as_ivec2().min(shape);
    (min.cmple(max).all()).then_some((min, max))
}

/// Slice pixels inside the polygon, row by row
pub fn pixels_inside(polygon: &[Vec2], shape: IVec2) -> Vec<(i32, i32)> {
    let Some((min, max)) = polygon_bounds(polygon, shape) else {
        return Vec::new();
    };
    let mut pixels = Vec::new();
    for v in min.y..=max.y {
        for u in min.x..=max.x {
            if point_in_polygon(Vec2::new(u as f32, v as f32), polygon) {
                pixels.push((u, v));
            }
        }
    }
    pixels
}

/// Voxels under the polygon on slice `slice_index` of `axis`.
///
/// Fails with [`Error::SelectionConflict`] if any selected pixel already belongs
/// to a nonzero source other than `target_source_id`; nothing is returned in
/// that case so the caller cannot apply a partial selection.
pub fn select_voxels(
    polygon: &[Vec2],
    slice_shape: IVec2,
    axis: Axis,
    slice_index: i32,
    mask_slice: &Grid2<i16>,
    target_source_id: i16,
) -> Result<Vec<IVec3>> {
    let pixels = pixels_inside(polygon, slice_shape);
    let mut voxels = Vec::with_capacity(pixels.len());
    for (u, v) in pixels {
        let voxel = axis.voxel_from_pixel(u, v, slice_index);
        let owner = mask_slice.get(u, v).unwrap_or(0);
        if owner != 0 && owner != target_source_id {
            log::warn!(
                "Selection overlaps source {} at {}, discarding selection for source {}",
                owner, voxel, target_source_id
            );
            return Err(Error::SelectionConflict { voxel, owner, target: target_source_id });
        }
        voxels.push(voxel);
    }
    Ok(voxels)
}
