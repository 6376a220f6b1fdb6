//! Connected mask regions on a slice and their outlines.

use std::collections::VecDeque;

use crate::core::types::{Rgba, TRANSPARENT};
use super::grid::Grid2;

/// 4-connected neighbor offsets
const NEIGHBORS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// One 4-connected group of masked pixels
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaskRegion {
    /// Border pixels only, in discovery order
    pub pixels: Vec<(i32, i32)>,
    /// Total pixels in the group, interior included
    pub area: usize,
}

/// Group the pixels with value `> 0` into 4-connected regions.
///
/// A pixel is on the border if any 4-neighbor is unmasked or off the slice.
pub fn label_regions(mask_slice: &Grid2<f32>) -> Vec<MaskRegion> {
    let masked = |u: i32, v: i32| mask_slice.get(u, v).is_some_and(|x| x > 0.0);
    let mut visited = Grid2::filled(mask_slice.width(), mask_slice.height(), false);
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for v in 1..=mask_slice.height() {
        for u in 1..=mask_slice.width() {
            if !masked(u, v) || visited.get(u, v) == Some(true) {
                continue;
            }

            let mut region = MaskRegion::default();
            visited.set(u, v, true);
            queue.push_back((u, v));

            while let Some((pu, pv)) = queue.pop_front() {
                region.area += 1;
                let mut border = false;
                for (du, dv) in NEIGHBORS {
                    let (nu, nv) = (pu + du, pv + dv);
                    if !masked(nu, nv) {
                        border = true;
                    } else if visited.get(nu, nv) == Some(false) {
                        visited.set(nu, nv, true);
                        queue.push_back((nu, nv));
                    }
                }
                if border {
                    region.pixels.push((pu, pv));
                }
            }
            regions.push(region);
        }
    }
    regions
}

/// Paint region borders into an RGBA overlay.
///
/// Border pixels whose source ID equals `highlighted` get `highlight_color`,
/// all others `mask_color`. Everything else stays transparent.
pub fn draw_borders(
    regions: &[MaskRegion],
    source_ids: &Grid2<i16>,
    highlighted: i16,
    mask_color: Rgba,
    highlight_color: Rgba,
) -> Grid2<Rgba> {
    let mut overlay = Grid2::filled(source_ids.width(), source_ids.height(), TRANSPARENT);
    for &(u, v) in regions.iter().flat_map(|r| r.pixels.iter()) {
        let id = source_ids.get(u, v).unwrap_or(0);
        let color = if highlighted != 0 && id == highlighted { highlight_color } else { mask_color };
        overlay.set(u, v, color);
    }
    overlay
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_from(rows: &[&[f32]]) -> Grid2<f32> {
        Grid2::from_fn(rows[0].len() as i32, rows.len() as i32, |u, v| rows[(v - 1) as usize][(u - 1) as usize])
    }

    #[test]
    fn test_two_blocks() {
        let grid = grid_from(&[
            &[1.0, 1.0, 0.0, 0.0, 0.0],
            &[1.0, 1.0, 0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0, 2.0, 2.0],
            &[0.0, 0.0, 0.0, 2.0, 2.0],
        ]);
        let regions = label_regions(&grid);
        assert_eq!(regions.len(), 2);
        for region in &regions {
            assert_eq!(region.area, 4);
            // A 2x2 block has no interior
            assert_eq!(region.pixels.len(), 4);
        }
    }

    #[test]
    fn test_interior_not_emitted() {
        let grid = Grid2::filled(3, 3, 1.0f32);
        let regions = label_regions(&grid);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 9);
        assert_eq!(regions[0].pixels.len(), 8);
        assert!(!regions[0].pixels.contains(&(2, 2)));
    }

    #[test]
    fn test_diagonal_is_not_connected() {
        let grid = grid_from(&[&[1.0, 0.0], &[0.0, 1.0]]);
        assert_eq!(label_regions(&grid).len(), 2);
    }

    #[test]
    fn test_nonpositive_and_nan_unmasked() {
        let grid = grid_from(&[&[0.0, -1.0, f32::NAN]]);
        assert!(label_regions(&grid).is_empty());
    }

    #[test]
    fn test_highlight_coloring() {
        let ids = Grid2::from_fn(4, 1, |u, _| if u <= 2 { 3 } else { 7 });
        let regions = label_regions(&ids.map(|x| x as f32));
        let overlay = draw_borders(&regions, &ids, 7, [1, 1, 1, 255], [9, 9, 9, 255]);
        assert_eq!(overlay.get(1, 1), Some([1, 1, 1, 255]));
        assert_eq!(overlay.get(4, 1), Some([9, 9, 9, 255]));
    }
}
