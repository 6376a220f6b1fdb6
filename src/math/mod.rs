//! Coordinate spaces and integer voxel boxes

pub mod bounds;
pub mod coords;

pub use bounds::VoxelBox;
pub use coords::Axis;
