//! Axis-aligned 2D cuts through the region, and the selection tools that work on them.

pub mod color;
pub mod grid;
pub mod labeler;
pub mod polygon;
pub mod view;

pub use color::{ColorMap, ScalingType};
pub use grid::Grid2;
pub use labeler::{label_regions, MaskRegion};
pub use polygon::{point_in_polygon, select_voxels};
pub use view::SliceView;
