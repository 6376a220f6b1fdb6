//! Error types for cube and mask operations

use glam::IVec3;
use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// The data-processing backend returned a nonzero status
    #[error("backend call `{op}` failed with status {status}")]
    Backend { op: &'static str, status: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid crop box {start} .. {end} for cube of size {dims}")]
    InvalidCrop { start: IVec3, end: IVec3, dims: IVec3 },

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: IVec3, actual: IVec3 },

    #[error("A brush stroke is already in progress")]
    StrokeInProgress,

    #[error("No brush stroke in progress")]
    NoActiveStroke,

    /// A selection touched a voxel owned by another source
    #[error("Voxel {voxel} belongs to source {owner}, cannot paint source {target}")]
    SelectionConflict { voxel: IVec3, owner: i16, target: i16 },

    #[error("Source ID {0} has not been issued")]
    UnknownSource(i16),

    #[error("Every source ID has been issued")]
    SourceIdsExhausted,

    #[error("Mask painting requires a full-resolution region")]
    NotFullResolution,

    #[error("Slice {index} along {axis:?} is outside 1..={len}")]
    SliceOutOfRange { axis: crate::math::Axis, index: i32, len: i32 },

    #[error("No region has been materialized")]
    NoRegion,

    #[error("No mask is loaded for this cube")]
    MaskNotLoaded,

    #[error("A region request is already in flight")]
    RegionBusy,
}
