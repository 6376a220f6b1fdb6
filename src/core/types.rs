//! Core type aliases and re-exports

pub use glam::{
    Vec2, Vec3,
    Mat4,
    Quat,
    IVec2, IVec3, I64Vec3,
};

/// 8-bit RGBA color, the pixel format of every rendered slice
pub type Rgba = [u8; 4];

/// Fully transparent pixel
pub const TRANSPARENT: Rgba = [0, 0, 0, 0];

/// Standard Result type for the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
