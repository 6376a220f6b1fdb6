//! Full-resolution cubes and the regions materialized from them.
//!
//! The full-resolution array lives behind a [`CubeBackend`]; a [`VolumeBuffer`]
//! owns one handle into it plus the currently materialized [`Region`].

pub mod backend;
pub mod memory;
pub mod sizing;
pub mod region;
pub mod buffer;
pub mod loader;
pub mod stats;

pub use backend::{CubeBackend, CubeHandle};
pub use memory::MemoryBackend;
pub use sizing::{DownsampleSizer, MAX_TEXTURE_DIM};
pub use region::{Region, RegionSamples, TextureFilter};
pub use buffer::VolumeBuffer;
pub use loader::{RegionLoader, RegionRequest};
pub use stats::SelectionStats;
