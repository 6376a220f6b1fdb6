//! Volume buffer: a full-resolution cube handle plus its materialized region.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::Error;
use crate::core::types::{I64Vec3, IVec3, Result};
use crate::math::{coords, VoxelBox};
use super::backend::{CubeBackend, CubeHandle};
use super::loader::{RegionLoader, RegionRequest};
use super::region::{Region, TextureFilter};
use super::sizing::DownsampleSizer;

/// Owns one cube in the backend and the region currently held in memory.
///
/// A failed region request never disturbs the installed region. The backend
/// handle is released on drop.
pub struct VolumeBuffer {
    backend: Arc<dyn CubeBackend>,
    handle: CubeHandle,
    /// Source file, `None` for masks created in memory
    path: Option<PathBuf>,
    dims: I64Vec3,
    is_mask: bool,
    sizer: DownsampleSizer,
    region: Option<Region>,
    /// Bumped every time a region is installed
    generation: u64,
    loader: Option<RegionLoader>,
}

impl VolumeBuffer {
    /// Open a cube file through the backend. No region is materialized yet.
    pub fn open(
        backend: Arc<dyn CubeBackend>,
        path: impl AsRef<Path>,
        is_mask: bool,
        sizer: DownsampleSizer,
    ) -> Result<Self> {
        let path = path.as_ref();
        let (handle, dims) = backend.open_cube(path, is_mask).map_err(|e| {
            log::error!("Failed to open {}: {}", path.display(), e);
            e
        })?;
        log::info!(
            "Opened {} {} ({} x {} x {})",
            if is_mask { "mask" } else { "cube" },
            path.display(),
            dims.x, dims.y, dims.z,
        );
        Ok(Self::from_handle(backend, handle, Some(path.to_path_buf()), dims, is_mask, sizer))
    }

    /// Create an empty mask cube matching `dims`.
    pub fn create_mask(
        backend: Arc<dyn CubeBackend>,
        dims: I64Vec3,
        sizer: DownsampleSizer,
    ) -> Result<Self> {
        let handle = backend.create_mask(dims)?;
        log::info!("Created empty mask ({} x {} x {})", dims.x, dims.y, dims.z);
        Ok(Self::from_handle(backend, handle, None, dims, true, sizer))
    }

    fn from_handle(
        backend: Arc<dyn CubeBackend>,
        handle: CubeHandle,
        path: Option<PathBuf>,
        dims: I64Vec3,
        is_mask: bool,
        sizer: DownsampleSizer,
    ) -> Self {
        Self {
            backend,
            handle,
            path,
            dims,
            is_mask,
            sizer,
            region: None,
            generation: 0,
            loader: None,
        }
    }

    /// Full-resolution extent
    pub fn dims(&self) -> I64Vec3 {
        self.dims
    }

    pub fn is_mask(&self) -> bool {
        self.is_mask
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn handle(&self) -> CubeHandle {
        self.handle
    }

    pub fn backend(&self) -> &Arc<dyn CubeBackend> {
        &self.backend
    }

    pub fn sizer(&self) -> &DownsampleSizer {
        &self.sizer
    }

    /// Currently materialized region
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    /// Increases every time a new region is installed
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whole cube as a voxel box
    pub fn full_bounds(&self) -> VoxelBox {
        VoxelBox::from_extent(self.dims.as_ivec3())
    }

    /// True if the installed region covers voxels 1:1
    pub fn is_full_resolution(&self) -> bool {
        self.region.as_ref().is_some_and(Region::is_full_resolution)
    }

    /// True while a background request is in flight
    pub fn is_loading(&self) -> bool {
        self.loader.is_some()
    }

    /// Crop-and-downsample the whole cube at `downsample` and install the result.
    pub fn generate_full_region(&mut self, filter: TextureFilter, downsample: IVec3) -> Result<()> {
        let bounds = self.full_bounds();
        self.generate_cropped_region(filter, bounds.min, bounds.max, downsample)
    }

    /// Crop to `crop_start..=crop_end` (inclusive, either order), downsample, install.
    ///
    /// Factors below what the sizer requires are raised to fit the budget.
    pub fn generate_cropped_region(
        &mut self,
        filter: TextureFilter,
        crop_start: IVec3,
        crop_end: IVec3,
        downsample: IVec3,
    ) -> Result<()> {
        match self.build_cropped_region(filter, crop_start, crop_end, downsample) {
            Ok(region) => {
                self.install_region(region);
                Ok(())
            }
            Err(e) => {
                log::error!("Region generation failed, keeping previous region: {}", e);
                Err(e)
            }
        }
    }

    /// Materialize `crop` (or the whole cube) at the factors the sizer picks.
    pub fn generate_fitted_region(&mut self, filter: TextureFilter, crop: Option<VoxelBox>) -> Result<()> {
        let crop = crop.unwrap_or_else(|| self.full_bounds());
        self.generate_cropped_region(filter, crop.min, crop.max, IVec3::ONE)
    }

    /// Crop and downsample without installing the result.
    ///
    /// Lets a caller build several regions and install them only once all succeeded.
    pub fn build_cropped_region(
        &self,
        filter: TextureFilter,
        crop_start: IVec3,
        crop_end: IVec3,
        downsample: IVec3,
    ) -> Result<Region> {
        if self.loader.is_some() {
            return Err(Error::RegionBusy);
        }
        let request = self.prepare_request(filter, crop_start, crop_end, downsample)?;
        request.execute(self.backend.as_ref(), self.handle, self.dims, self.is_mask)
    }

    /// [`build_cropped_region`](Self::build_cropped_region) at the factors the sizer picks
    pub fn build_fitted_region(&self, filter: TextureFilter, crop: Option<VoxelBox>) -> Result<Region> {
        let crop = crop.unwrap_or_else(|| self.full_bounds());
        self.build_cropped_region(filter, crop.min, crop.max, IVec3::ONE)
    }

    /// Start a crop/downsample on a worker thread. Install it with [`poll_region`](Self::poll_region).
    pub fn request_region(
        &mut self,
        filter: TextureFilter,
        crop_start: IVec3,
        crop_end: IVec3,
        downsample: IVec3,
    ) -> Result<()> {
        if self.loader.is_some() {
            return Err(Error::RegionBusy);
        }
        let request = self.prepare_request(filter, crop_start, crop_end, downsample)?;
        let loader = RegionLoader::spawn(
            Arc::clone(&self.backend),
            self.handle,
            self.dims,
            self.is_mask,
            request,
        )?;
        self.loader = Some(loader);
        Ok(())
    }

    /// Install a finished background request.
    ///
    /// Returns `None` while nothing has finished, otherwise the request's outcome.
    /// On failure the previous region stays installed.
    pub fn poll_region(&mut self) -> Option<Result<()>> {
        let result = self.loader.as_mut()?.try_take()?;
        self.loader = None;
        Some(match result {
            Ok(region) => {
                self.install_region(region);
                Ok(())
            }
            Err(e) => {
                log::error!("Background region generation failed, keeping previous region: {}", e);
                Err(e)
            }
        })
    }

    /// Block until the in-flight request (if any) finishes and install it.
    pub fn wait_region(&mut self) -> Result<()> {
        match self.loader.take() {
            Some(loader) => match loader.wait() {
                Ok(region) => {
                    self.install_region(region);
                    Ok(())
                }
                Err(e) => {
                    log::error!("Background region generation failed, keeping previous region: {}", e);
                    Err(e)
                }
            },
            None => Ok(()),
        }
    }

    /// Full-resolution voxel value at a 1-based data voxel.
    ///
    /// NaN when out of bounds or when the backend read fails.
    pub fn get_value(&self, voxel: IVec3) -> f32 {
        if !coords::in_bounds(voxel, self.dims.as_ivec3()) {
            return f32::NAN;
        }
        match self.backend.read_voxel(self.handle, self.dims, voxel) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("read_voxel {} failed: {}", voxel, e);
                f32::NAN
            }
        }
    }

    /// Distinct nonzero source IDs in the backend's mask array
    pub fn masked_source_ids(&self) -> Result<Vec<i16>> {
        if !self.is_mask {
            return Err(Error::MaskNotLoaded);
        }
        self.backend.masked_source_ids(self.handle)
    }

    fn prepare_request(
        &self,
        filter: TextureFilter,
        crop_start: IVec3,
        crop_end: IVec3,
        downsample: IVec3,
    ) -> Result<RegionRequest> {
        let crop = VoxelBox::new(crop_start, crop_end);
        let dims = self.dims.as_ivec3();
        if !coords::in_bounds(crop.min, dims) || !coords::in_bounds(crop.max, dims) {
            return Err(Error::InvalidCrop { start: crop_start, end: crop_end, dims });
        }

        let factors = self.sizer.compute_factors_from(crop.size().as_i64vec3(), downsample);
        if factors != downsample.max(IVec3::ONE) {
            log::info!("Raised downsample {} to {} to fit memory budget", downsample, factors);
        }
        Ok(RegionRequest { crop, factors, filter })
    }

    /// Replace the installed region. The region must come from this buffer's cube.
    pub(crate) fn install_region(&mut self, region: Region) {
        log::info!(
            "Installed {}region {} at {} (downsample {}, {:.1} MB)",
            if self.is_mask { "mask " } else { "" },
            region.extent(),
            region.origin(),
            region.downsample(),
            region.byte_size() as f64 / 1_000_000.0,
        );
        // Previous region's buffer is released here
        self.region = Some(region);
        self.generation += 1;
    }
}

impl Drop for VolumeBuffer {
    fn drop(&mut self) {
        // The worker still uses the handle; let it finish before freeing
        if let Some(loader) = self.loader.take() {
            let _ = loader.wait();
        }
        self.backend.free(self.handle);
    }
}

impl std::fmt::Debug for VolumeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeBuffer")
            .field("handle", &self.handle)
            .field("path", &self.path)
            .field("dims", &self.dims)
            .field("is_mask", &self.is_mask)
            .field("region", &self.region.as_ref().map(|r| (r.origin(), r.extent(), r.downsample())))
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::memory::MemoryBackend;

    fn setup(dims: IVec3) -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        let n = (dims.x * dims.y * dims.z) as usize;
        backend.insert_cube("cube.fits", dims, (0..n).map(|i| i as f32).collect()).unwrap();
        backend
    }

    fn open(backend: &Arc<MemoryBackend>, sizer: DownsampleSizer) -> VolumeBuffer {
        VolumeBuffer::open(backend.clone(), "cube.fits", false, sizer).unwrap()
    }

    #[test]
    fn test_full_region() {
        let backend = setup(IVec3::new(10, 8, 6));
        let mut buffer = open(&backend, DownsampleSizer::default());
        assert!(buffer.region().is_none());

        buffer.generate_full_region(TextureFilter::Point, IVec3::ONE).unwrap();
        let region = buffer.region().unwrap();
        assert_eq!(region.extent(), IVec3::new(10, 8, 6));
        assert_eq!(region.origin(), IVec3::ONE);
        assert!(buffer.is_full_resolution());
        assert_eq!(buffer.generation(), 1);
    }

    #[test]
    fn test_cropped_region_extent_rounds_up() {
        let backend = setup(IVec3::splat(12));
        let mut buffer = open(&backend, DownsampleSizer::default());
        buffer
            .generate_cropped_region(TextureFilter::Point, IVec3::new(1, 1, 1), IVec3::new(10, 10, 10), IVec3::splat(3))
            .unwrap();
        assert_eq!(buffer.region().unwrap().extent(), IVec3::splat(4));
        assert_eq!(buffer.region().unwrap().downsample(), IVec3::splat(3));
    }

    #[test]
    fn test_factors_raised_to_fit_budget() {
        let backend = setup(IVec3::new(64, 64, 64));
        // 64^3 = 262_144 elements, budget allows 250_000 -> z grows
        let mut buffer = open(&backend, DownsampleSizer::new(1, 2048));
        buffer.generate_fitted_region(TextureFilter::Point, None).unwrap();
        let region = buffer.region().unwrap();
        assert_eq!(region.downsample(), IVec3::new(1, 1, 2));
        assert!(buffer.sizer().fits(region.extent()));
    }

    #[test]
    fn test_invalid_crop() {
        let backend = setup(IVec3::splat(4));
        let mut buffer = open(&backend, DownsampleSizer::default());
        let err = buffer
            .generate_cropped_region(TextureFilter::Point, IVec3::ZERO, IVec3::splat(4), IVec3::ONE)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCrop { .. }));
    }

    #[test]
    fn test_failure_keeps_previous_region() {
        let backend = setup(IVec3::splat(6));
        let mut buffer = open(&backend, DownsampleSizer::default());
        buffer.generate_full_region(TextureFilter::Point, IVec3::ONE).unwrap();

        backend.fail_on("crop_and_downsample");
        let result = buffer.generate_cropped_region(TextureFilter::Point, IVec3::ONE, IVec3::splat(3), IVec3::ONE);
        assert!(matches!(result, Err(Error::Backend { .. })));
        assert_eq!(buffer.region().unwrap().extent(), IVec3::splat(6));
        assert_eq!(buffer.generation(), 1);
    }

    #[test]
    fn test_build_does_not_install() {
        let backend = setup(IVec3::splat(6));
        let mut buffer = open(&backend, DownsampleSizer::default());
        buffer.generate_full_region(TextureFilter::Point, IVec3::ONE).unwrap();

        let crop = VoxelBox::new(IVec3::splat(2), IVec3::splat(4));
        let region = buffer.build_fitted_region(TextureFilter::Point, Some(crop)).unwrap();
        assert_eq!(region.extent(), IVec3::splat(3));
        assert_eq!(buffer.region().unwrap().extent(), IVec3::splat(6));
        assert_eq!(buffer.generation(), 1);

        buffer.install_region(region);
        assert_eq!(buffer.region().unwrap().origin(), IVec3::splat(2));
        assert_eq!(buffer.generation(), 2);
    }

    #[test]
    fn test_get_value_bounds() {
        let backend = setup(IVec3::new(3, 3, 3));
        let buffer = open(&backend, DownsampleSizer::default());
        assert_eq!(buffer.get_value(IVec3::new(1, 1, 1)), 0.0);
        assert_eq!(buffer.get_value(IVec3::new(3, 3, 3)), 26.0);
        assert!(buffer.get_value(IVec3::new(0, 1, 1)).is_nan());
        assert!(buffer.get_value(IVec3::new(1, 4, 1)).is_nan());
    }

    #[test]
    fn test_background_request() {
        let backend = setup(IVec3::splat(8));
        let mut buffer = open(&backend, DownsampleSizer::default());
        buffer.request_region(TextureFilter::Point, IVec3::ONE, IVec3::splat(8), IVec3::splat(2)).unwrap();
        assert!(buffer.is_loading());
        assert!(matches!(
            buffer.request_region(TextureFilter::Point, IVec3::ONE, IVec3::splat(8), IVec3::ONE),
            Err(Error::RegionBusy)
        ));

        buffer.wait_region().unwrap();
        assert!(!buffer.is_loading());
        assert_eq!(buffer.region().unwrap().extent(), IVec3::splat(4));
    }

    #[test]
    fn test_poll_region() {
        let backend = setup(IVec3::splat(4));
        let mut buffer = open(&backend, DownsampleSizer::default());
        assert!(buffer.poll_region().is_none());

        buffer.request_region(TextureFilter::Point, IVec3::ONE, IVec3::splat(4), IVec3::ONE).unwrap();
        let outcome = loop {
            if let Some(outcome) = buffer.poll_region() {
                break outcome;
            }
            std::thread::yield_now();
        };
        assert!(outcome.is_ok());
        assert_eq!(buffer.generation(), 1);
    }

    #[test]
    fn test_drop_frees_handle() {
        let backend = setup(IVec3::splat(2));
        {
            let _buffer = open(&backend, DownsampleSizer::default());
            assert_eq!(backend.open_count(), 1);
        }
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn test_open_failure() {
        let backend = setup(IVec3::splat(2));
        let result = VolumeBuffer::open(backend.clone(), "missing.fits", false, DownsampleSizer::default());
        assert!(matches!(result, Err(Error::Backend { op: "open_cube", .. })));
    }
}
