//! Cubemask - sizing, slicing and interactive source masking for volumetric data cubes

pub mod core;
pub mod math;
pub mod volume;
pub mod mask;
pub mod slice;
pub mod editor;
