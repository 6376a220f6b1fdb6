//! Per-voxel source masks and their edit history.
//!
//! A [`MaskLayer`] holds one source ID per voxel of the materialized region
//! (0 = unmasked). Edits are grouped into [`BrushStroke`]s, the unit of
//! undo/redo, and reach the full-resolution mask array on consolidate.

pub mod stroke;
pub mod dirty;
pub mod layer;

pub use stroke::{BrushStroke, VoxelDelta};
pub use dirty::DirtyTracker;
pub use layer::{BrushMode, MaskLayer};
