//! Background region generation.
//!
//! Crop/downsample of a full-resolution cube can take seconds, so it can run
//! on a worker thread. The result comes back over a channel and the owner
//! polls once per frame; requests are never cancelled once issued.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::core::error::Error;
use crate::core::types::{I64Vec3, IVec3, Result};
use crate::math::VoxelBox;
use super::backend::{CubeBackend, CubeHandle, STATUS_WORKER_LOST};
use super::region::{Region, TextureFilter};
use super::sizing::cropped_extent;

/// Parameters of one crop/downsample call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionRequest {
    /// Inclusive crop box in data voxels
    pub crop: VoxelBox,
    /// Per-axis downsample factors
    pub factors: IVec3,
    pub filter: TextureFilter,
}

impl RegionRequest {
    /// Extent of the resulting region
    pub fn extent(&self) -> IVec3 {
        cropped_extent(self.crop.min, self.crop.max, self.factors)
    }

    /// Run the request synchronously against a backend.
    pub fn execute(
        &self,
        backend: &dyn CubeBackend,
        handle: CubeHandle,
        dims: I64Vec3,
        is_mask: bool,
    ) -> Result<Region> {
        let start = Instant::now();
        let samples = backend.crop_and_downsample(handle, dims, &self.crop, self.factors, is_mask)?;
        let region = Region::new(self.crop.min, self.extent(), self.factors, self.filter, samples)?;
        log::debug!(
            "Materialized {}region {} (factors {}) in {:.1} ms",
            if is_mask { "mask " } else { "" },
            region.extent(),
            self.factors,
            start.elapsed().as_secs_f32() * 1000.0,
        );
        Ok(region)
    }
}

/// A crop/downsample running on a worker thread
pub struct RegionLoader {
    request: RegionRequest,
    receiver: Receiver<Result<Region>>,
    worker: Option<JoinHandle<()>>,
}

impl RegionLoader {
    /// Start `request` on a new worker thread.
    pub fn spawn(
        backend: Arc<dyn CubeBackend>,
        handle: CubeHandle,
        dims: I64Vec3,
        is_mask: bool,
        request: RegionRequest,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("region-loader".to_string())
            .spawn(move || {
                let result = request.execute(backend.as_ref(), handle, dims, is_mask);
                // Receiver may already be gone if the owner was dropped
                let _ = sender.send(result);
            })?;

        Ok(Self {
            request,
            receiver,
            worker: Some(worker),
        })
    }

    pub fn request(&self) -> &RegionRequest {
        &self.request
    }

    /// Non-blocking check for the result. `None` while still running.
    pub fn try_take(&mut self) -> Option<Result<Region>> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.join();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(Err(Error::Backend { op: "crop_and_downsample", status: STATUS_WORKER_LOST }))
            }
        }
    }

    /// Block until the worker finishes.
    pub fn wait(mut self) -> Result<Region> {
        let result = self
            .receiver
            .recv()
            .unwrap_or(Err(Error::Backend { op: "crop_and_downsample", status: STATUS_WORKER_LOST }));
        self.join();
        result
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Region loader thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::memory::MemoryBackend;
    use crate::volume::region::RegionSamples;
    use std::path::Path;

    fn backend_with_cube(dims: IVec3) -> (Arc<MemoryBackend>, CubeHandle, I64Vec3) {
        let backend = Arc::new(MemoryBackend::new());
        let n = (dims.x * dims.y * dims.z) as usize;
        backend.insert_cube("c.fits", dims, (0..n).map(|i| i as f32).collect()).unwrap();
        let (handle, d) = backend.open_cube(Path::new("c.fits"), false).unwrap();
        (backend, handle, d)
    }

    #[test]
    fn test_execute_sync() {
        let (backend, handle, dims) = backend_with_cube(IVec3::new(6, 4, 2));
        let request = RegionRequest {
            crop: VoxelBox::new(IVec3::new(2, 1, 1), IVec3::new(6, 4, 2)),
            factors: IVec3::new(2, 2, 1),
            filter: TextureFilter::Point,
        };
        assert_eq!(request.extent(), IVec3::new(3, 2, 2));

        let region = request.execute(backend.as_ref(), handle, dims, false).unwrap();
        assert_eq!(region.origin(), IVec3::new(2, 1, 1));
        assert_eq!(region.extent(), IVec3::new(3, 2, 2));
        assert_eq!(region.downsample(), IVec3::new(2, 2, 1));
    }

    #[test]
    fn test_spawn_and_wait() {
        let (backend, handle, dims) = backend_with_cube(IVec3::splat(8));
        let request = RegionRequest {
            crop: VoxelBox::from_extent(IVec3::splat(8)),
            factors: IVec3::splat(2),
            filter: TextureFilter::Trilinear,
        };
        let loader = RegionLoader::spawn(backend, handle, dims, false, request).unwrap();
        assert_eq!(loader.request().factors, IVec3::splat(2));

        let region = loader.wait().unwrap();
        assert_eq!(region.extent(), IVec3::splat(4));
        assert!(matches!(region.samples(), RegionSamples::Data(v) if v.len() == 64));
    }

    #[test]
    fn test_try_take_eventually_delivers() {
        let (backend, handle, dims) = backend_with_cube(IVec3::splat(4));
        let request = RegionRequest {
            crop: VoxelBox::from_extent(IVec3::splat(4)),
            factors: IVec3::ONE,
            filter: TextureFilter::Point,
        };
        let mut loader = RegionLoader::spawn(backend, handle, dims, false, request).unwrap();
        let result = loop {
            if let Some(result) = loader.try_take() {
                break result;
            }
            thread::yield_now();
        };
        assert_eq!(result.unwrap().extent(), IVec3::splat(4));
    }

    #[test]
    fn test_failure_is_delivered() {
        let (backend, handle, dims) = backend_with_cube(IVec3::splat(4));
        backend.fail_on("crop_and_downsample");
        let request = RegionRequest {
            crop: VoxelBox::from_extent(IVec3::splat(4)),
            factors: IVec3::ONE,
            filter: TextureFilter::Point,
        };
        let loader = RegionLoader::spawn(backend, handle, dims, false, request).unwrap();
        assert!(matches!(loader.wait(), Err(Error::Backend { op: "crop_and_downsample", .. })));
    }
}
