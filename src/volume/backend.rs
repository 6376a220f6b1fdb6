//! Interface to the native data-processing library that owns full-resolution cubes.
//!
//! Implementations report failures as integer status codes; any nonzero status
//! surfaces as [`Error::Backend`] and means no data was written.

use std::path::Path;

use crate::core::error::Error;
use crate::core::types::{I64Vec3, IVec3, Result};
use crate::math::VoxelBox;
use super::region::RegionSamples;

/// Success.
pub const STATUS_OK: i32 = 0;
/// No cube at the requested path.
pub const STATUS_NOT_FOUND: i32 = 1;
/// Handle was never issued or has been freed.
pub const STATUS_BAD_HANDLE: i32 = 2;
/// Voxel or crop box outside the cube.
pub const STATUS_OUT_OF_BOUNDS: i32 = 3;
/// Operation does not apply to this kind of cube (e.g. painting a data cube).
pub const STATUS_WRONG_KIND: i32 = 4;
/// Backend does not implement the operation.
pub const STATUS_UNSUPPORTED: i32 = 5;
/// Shared state was poisoned by a panicking thread.
pub const STATUS_POISONED: i32 = 6;
/// A background worker exited without delivering a result.
pub const STATUS_WORKER_LOST: i32 = -1;

/// Opaque handle to a cube owned by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CubeHandle(pub u64);

/// Convert a native status code into a `Result`.
pub fn check_status(op: &'static str, status: i32) -> Result<()> {
    if status == STATUS_OK {
        Ok(())
    } else {
        Err(Error::Backend { op, status })
    }
}

/// Narrow interface to the full-resolution array library.
///
/// Voxel coordinates are 1-based data coordinates. Mask edits go through
/// `paint_voxel` and only reach the array on `consolidate_mask_entries`.
pub trait CubeBackend: Send + Sync {
    /// Open a cube file, returning its handle and full extent.
    fn open_cube(&self, path: &Path, is_mask: bool) -> Result<(CubeHandle, I64Vec3)>;

    /// Create a zero-filled mask cube of the given extent.
    fn create_mask(&self, dims: I64Vec3) -> Result<CubeHandle> {
        let _ = dims;
        Err(Error::Backend { op: "create_mask", status: STATUS_UNSUPPORTED })
    }

    /// Crop to the inclusive `crop` box and reduce by `factors`.
    ///
    /// Output is x-fastest with extent `ceil(crop.size() / factors)`.
    fn crop_and_downsample(
        &self,
        handle: CubeHandle,
        dims: I64Vec3,
        crop: &VoxelBox,
        factors: IVec3,
        is_mask: bool,
    ) -> Result<RegionSamples>;

    /// Read one full-resolution voxel.
    fn read_voxel(&self, handle: CubeHandle, dims: I64Vec3, voxel: IVec3) -> Result<f32>;

    /// Queue a mask write.
    fn paint_voxel(&self, handle: CubeHandle, voxel: IVec3, source_id: i16) -> Result<()>;

    /// Apply all queued mask writes to the array.
    fn consolidate_mask_entries(&self, handle: CubeHandle) -> Result<()>;

    /// Distinct nonzero source IDs present in a mask cube.
    fn masked_source_ids(&self, handle: CubeHandle) -> Result<Vec<i16>>;

    /// Release a cube. Unknown handles are ignored.
    fn free(&self, handle: CubeHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        assert!(check_status("open_cube", STATUS_OK).is_ok());
        match check_status("open_cube", STATUS_NOT_FOUND) {
            Err(Error::Backend { op, status }) => {
                assert_eq!(op, "open_cube");
                assert_eq!(status, STATUS_NOT_FOUND);
            }
            other => panic!("expected backend error, got {:?}", other),
        }
    }
}
