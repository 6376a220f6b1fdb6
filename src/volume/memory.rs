//! In-memory cube backend.
//!
//! Stands in for the native FITS library: cubes are registered under a path,
//! `open_cube` copies them into an open-handle table, and mask writes are
//! queued until `consolidate_mask_entries`. Useful for tests, demos and
//! small synthetic cubes.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::{I64Vec3, IVec3, Result};
use crate::math::{coords, VoxelBox};
use super::backend::{
    check_status, CubeBackend, CubeHandle, STATUS_BAD_HANDLE, STATUS_NOT_FOUND, STATUS_OK,
    STATUS_OUT_OF_BOUNDS, STATUS_POISONED, STATUS_WRONG_KIND,
};
use super::region::RegionSamples;
use super::sizing::cropped_extent;

#[derive(Clone, Debug)]
enum CubeData {
    Data(Vec<f32>),
    Mask {
        values: Vec<i16>,
        /// Queued writes, applied in order on consolidate
        pending: Vec<(IVec3, i16)>,
    },
}

#[derive(Clone, Debug)]
struct StoredCube {
    dims: IVec3,
    data: CubeData,
}

impl StoredCube {
    fn index_of(&self, v: IVec3) -> Option<usize> {
        if !coords::in_bounds(v, self.dims) {
            return None;
        }
        let p = (v - IVec3::ONE).as_i64vec3();
        let d = self.dims.as_i64vec3();
        Some((p.x + p.y * d.x + p.z * d.x * d.y) as usize)
    }

    fn is_mask(&self) -> bool {
        matches!(self.data, CubeData::Mask { .. })
    }
}

/// Thread-safe in-memory implementation of [`CubeBackend`]
pub struct MemoryBackend {
    /// Registered cubes by path, standing in for files on disk
    files: RwLock<HashMap<PathBuf, StoredCube>>,
    /// Open cubes by handle
    open: RwLock<HashMap<CubeHandle, StoredCube>>,
    next_handle: AtomicU64,
    /// Operations forced to fail, for exercising error paths
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            open: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Register an intensity cube at `path`. `values` is x-fastest.
    pub fn insert_cube(&self, path: impl AsRef<Path>, dims: IVec3, values: Vec<f32>) -> Result<()> {
        check_len(dims, values.len())?;
        self.insert(path.as_ref(), StoredCube { dims, data: CubeData::Data(values) })
    }

    /// Register a mask cube at `path`. `values` is x-fastest.
    pub fn insert_mask(&self, path: impl AsRef<Path>, dims: IVec3, values: Vec<i16>) -> Result<()> {
        check_len(dims, values.len())?;
        self.insert(
            path.as_ref(),
            StoredCube { dims, data: CubeData::Mask { values, pending: Vec::new() } },
        )
    }

    /// Write an open mask back to `path`, as the file-save step would.
    pub fn save_mask(&self, handle: CubeHandle, path: impl AsRef<Path>) -> Result<()> {
        let cube = {
            let open = self.open.read().map_err(|_| poisoned("save_mask"))?;
            let cube = open.get(&handle).ok_or(Error::Backend { op: "save_mask", status: STATUS_BAD_HANDLE })?;
            if !cube.is_mask() {
                return Err(Error::Backend { op: "save_mask", status: STATUS_WRONG_KIND });
            }
            let mut saved = cube.clone();
            if let CubeData::Mask { pending, .. } = &mut saved.data {
                pending.clear();
            }
            saved
        };
        self.insert(path.as_ref(), cube)
    }

    /// Number of currently open handles
    pub fn open_count(&self) -> usize {
        self.open.read().map(|open| open.len()).unwrap_or(0)
    }

    /// Make every later call of `op` fail with a nonzero status.
    pub fn fail_on(&self, op: &'static str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op);
        }
    }

    /// Undo [`fail_on`](Self::fail_on).
    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    fn insert(&self, path: &Path, cube: StoredCube) -> Result<()> {
        let mut files = self.files.write().map_err(|_| poisoned("insert"))?;
        files.insert(path.to_path_buf(), cube);
        Ok(())
    }

    fn injected(&self, op: &'static str) -> Result<()> {
        let failing = self.failing.lock().map_err(|_| poisoned(op))?;
        let status = if failing.contains(op) { STATUS_NOT_FOUND } else { STATUS_OK };
        check_status(op, status)
    }

    fn issue_handle(&self, cube: StoredCube, op: &'static str) -> Result<CubeHandle> {
        let handle = CubeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut open = self.open.write().map_err(|_| poisoned(op))?;
        open.insert(handle, cube);
        Ok(handle)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CubeBackend for MemoryBackend {
    fn open_cube(&self, path: &Path, is_mask: bool) -> Result<(CubeHandle, I64Vec3)> {
        self.injected("open_cube")?;
        let cube = {
            let files = self.files.read().map_err(|_| poisoned("open_cube"))?;
            files
                .get(path)
                .cloned()
                .ok_or(Error::Backend { op: "open_cube", status: STATUS_NOT_FOUND })?
        };
        if cube.is_mask() != is_mask {
            return Err(Error::Backend { op: "open_cube", status: STATUS_WRONG_KIND });
        }
        let dims = cube.dims.as_i64vec3();
        let handle = self.issue_handle(cube, "open_cube")?;
        Ok((handle, dims))
    }

    fn create_mask(&self, dims: I64Vec3) -> Result<CubeHandle> {
        self.injected("create_mask")?;
        let dims = dims.as_ivec3();
        let len = (dims.max(IVec3::ZERO).as_i64vec3().element_product()) as usize;
        let cube = StoredCube {
            dims,
            data: CubeData::Mask { values: vec![0; len], pending: Vec::new() },
        };
        self.issue_handle(cube, "create_mask")
    }

    fn crop_and_downsample(
        &self,
        handle: CubeHandle,
        dims: I64Vec3,
        crop: &VoxelBox,
        factors: IVec3,
        is_mask: bool,
    ) -> Result<RegionSamples> {
        const OP: &str = "crop_and_downsample";
        self.injected(OP)?;
        let open = self.open.read().map_err(|_| poisoned(OP))?;
        let cube = open.get(&handle).ok_or(Error::Backend { op: OP, status: STATUS_BAD_HANDLE })?;

        if cube.dims.as_i64vec3() != dims
            || !coords::in_bounds(crop.min, cube.dims)
            || !coords::in_bounds(crop.max, cube.dims)
        {
            return Err(Error::Backend { op: OP, status: STATUS_OUT_OF_BOUNDS });
        }
        if cube.is_mask() != is_mask {
            return Err(Error::Backend { op: OP, status: STATUS_WRONG_KIND });
        }

        let factors = factors.max(IVec3::ONE);
        let extent = cropped_extent(crop.min, crop.max, factors);
        let plane = (extent.x * extent.y) as usize;
        let len = plane * extent.z as usize;

        // Each output voxel covers the data bin starting at crop.min + (o - 1) * factors
        let bin = |o: IVec3| -> VoxelBox {
            let lo = crop.min + (o - IVec3::ONE) * factors;
            VoxelBox::new(lo, (lo + factors - IVec3::ONE).min(crop.max))
        };
        let out_voxel = |z: i32, i: usize| -> IVec3 {
            let i = i as i32;
            IVec3::new(i % extent.x + 1, i / extent.x + 1, z + 1)
        };

        let samples = match &cube.data {
            CubeData::Data(values) => {
                let mut out = vec![0.0f32; len];
                out.par_chunks_mut(plane).enumerate().for_each(|(z, row)| {
                    for (i, slot) in row.iter_mut().enumerate() {
                        let (sum, count) = bin(out_voxel(z as i32, i))
                            .iter()
                            .filter_map(|d| cube.index_of(d).map(|idx| values[idx]))
                            .filter(|v| v.is_finite())
                            .fold((0.0f64, 0u32), |(s, c), v| (s + v as f64, c + 1));
                        *slot = if count == 0 { f32::NAN } else { (sum / count as f64) as f32 };
                    }
                });
                RegionSamples::Data(out)
            }
            CubeData::Mask { values, .. } => {
                let mut out = vec![0i16; len];
                out.par_chunks_mut(plane).enumerate().for_each(|(z, row)| {
                    for (i, slot) in row.iter_mut().enumerate() {
                        *slot = bin(out_voxel(z as i32, i))
                            .iter()
                            .filter_map(|d| cube.index_of(d).map(|idx| values[idx]))
                            .max()
                            .unwrap_or(0);
                    }
                });
                RegionSamples::Mask(out)
            }
        };
        Ok(samples)
    }

    fn read_voxel(&self, handle: CubeHandle, dims: I64Vec3, voxel: IVec3) -> Result<f32> {
        const OP: &str = "read_voxel";
        self.injected(OP)?;
        let open = self.open.read().map_err(|_| poisoned(OP))?;
        let cube = open.get(&handle).ok_or(Error::Backend { op: OP, status: STATUS_BAD_HANDLE })?;
        if cube.dims.as_i64vec3() != dims {
            return Err(Error::Backend { op: OP, status: STATUS_OUT_OF_BOUNDS });
        }
        let idx = cube
            .index_of(voxel)
            .ok_or(Error::Backend { op: OP, status: STATUS_OUT_OF_BOUNDS })?;
        Ok(match &cube.data {
            CubeData::Data(values) => values[idx],
            CubeData::Mask { values, .. } => values[idx] as f32,
        })
    }

    fn paint_voxel(&self, handle: CubeHandle, voxel: IVec3, source_id: i16) -> Result<()> {
        const OP: &str = "paint_voxel";
        self.injected(OP)?;
        let mut open = self.open.write().map_err(|_| poisoned(OP))?;
        let cube = open.get_mut(&handle).ok_or(Error::Backend { op: OP, status: STATUS_BAD_HANDLE })?;
        if cube.index_of(voxel).is_none() {
            return Err(Error::Backend { op: OP, status: STATUS_OUT_OF_BOUNDS });
        }
        match &mut cube.data {
            CubeData::Mask { pending, .. } => {
                pending.push((voxel, source_id));
                Ok(())
            }
            CubeData::Data(_) => Err(Error::Backend { op: OP, status: STATUS_WRONG_KIND }),
        }
    }

    fn consolidate_mask_entries(&self, handle: CubeHandle) -> Result<()> {
        const OP: &str = "consolidate_mask_entries";
        self.injected(OP)?;
        let mut open = self.open.write().map_err(|_| poisoned(OP))?;
        let cube = open.get_mut(&handle).ok_or(Error::Backend { op: OP, status: STATUS_BAD_HANDLE })?;
        let indices: Vec<Option<usize>> = match &cube.data {
            CubeData::Mask { pending, .. } => pending.iter().map(|(v, _)| cube.index_of(*v)).collect(),
            CubeData::Data(_) => return Err(Error::Backend { op: OP, status: STATUS_WRONG_KIND }),
        };
        if let CubeData::Mask { values, pending } = &mut cube.data {
            for ((_, id), idx) in pending.drain(..).zip(indices) {
                if let Some(idx) = idx {
                    values[idx] = id;
                }
            }
        }
        Ok(())
    }

    fn masked_source_ids(&self, handle: CubeHandle) -> Result<Vec<i16>> {
        const OP: &str = "masked_source_ids";
        self.injected(OP)?;
        let open = self.open.read().map_err(|_| poisoned(OP))?;
        let cube = open.get(&handle).ok_or(Error::Backend { op: OP, status: STATUS_BAD_HANDLE })?;
        match &cube.data {
            CubeData::Mask { values, .. } => {
                let ids: HashSet<i16> = values.par_iter().copied().filter(|&id| id != 0).collect();
                let mut ids: Vec<i16> = ids.into_iter().collect();
                ids.sort_unstable();
                Ok(ids)
            }
            CubeData::Data(_) => Err(Error::Backend { op: OP, status: STATUS_WRONG_KIND }),
        }
    }

    fn free(&self, handle: CubeHandle) {
        if let Ok(mut open) = self.open.write() {
            open.remove(&handle);
        }
    }
}

fn check_len(dims: IVec3, len: usize) -> Result<()> {
    let expected = dims.max(IVec3::ZERO).as_i64vec3().element_product();
    if dims.min_element() < 1 || expected != len as i64 {
        return Err(Error::ShapeMismatch {
            expected: dims,
            actual: IVec3::new(len as i32, 1, 1),
        });
    }
    Ok(())
}

fn poisoned(op: &'static str) -> Error {
    Error::Backend { op, status: STATUS_POISONED }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_cube(dims: IVec3) -> Vec<f32> {
        (0..dims.x * dims.y * dims.z).map(|i| i as f32).collect()
    }

    fn open(backend: &MemoryBackend, path: &str, is_mask: bool) -> (CubeHandle, I64Vec3) {
        backend.open_cube(Path::new(path), is_mask).unwrap()
    }

    #[test]
    fn test_open_and_free() {
        let backend = MemoryBackend::new();
        backend.insert_cube("cube.fits", IVec3::new(2, 3, 4), ramp_cube(IVec3::new(2, 3, 4))).unwrap();

        let (handle, dims) = open(&backend, "cube.fits", false);
        assert_eq!(dims, I64Vec3::new(2, 3, 4));
        assert_eq!(backend.open_count(), 1);

        backend.free(handle);
        assert_eq!(backend.open_count(), 0);
        // Freeing twice is harmless
        backend.free(handle);
    }

    #[test]
    fn test_open_missing_reports_status() {
        let backend = MemoryBackend::new();
        let err = backend.open_cube(Path::new("nope.fits"), false).unwrap_err();
        assert!(matches!(err, Error::Backend { op: "open_cube", status: STATUS_NOT_FOUND }));
    }

    #[test]
    fn test_insert_checks_length() {
        let backend = MemoryBackend::new();
        assert!(backend.insert_cube("bad.fits", IVec3::new(2, 2, 2), vec![0.0; 5]).is_err());
    }

    #[test]
    fn test_crop_and_downsample_averages_bins() {
        let backend = MemoryBackend::new();
        let dims = IVec3::new(4, 2, 1);
        backend.insert_cube("c.fits", dims, vec![1.0, 3.0, 5.0, f32::NAN, 2.0, 4.0, 6.0, 8.0]).unwrap();
        let (h, d) = open(&backend, "c.fits", false);

        let crop = VoxelBox::from_extent(dims);
        let samples = backend.crop_and_downsample(h, d, &crop, IVec3::new(2, 2, 1), false).unwrap();
        // Bins: {1,3,2,4} and {5,NaN,6,8}
        match samples {
            RegionSamples::Data(v) => {
                assert_eq!(v.len(), 2);
                assert_eq!(v[0], 2.5);
                assert!((v[1] - 19.0 / 3.0).abs() < 1e-6);
            }
            other => panic!("expected data samples, got {:?}", other),
        }
    }

    #[test]
    fn test_crop_keeps_partial_bin() {
        let backend = MemoryBackend::new();
        let dims = IVec3::new(10, 1, 1);
        backend.insert_cube("c.fits", dims, ramp_cube(dims)).unwrap();
        let (h, d) = open(&backend, "c.fits", false);

        let crop = VoxelBox::new(IVec3::new(1, 1, 1), IVec3::new(10, 1, 1));
        let samples = backend.crop_and_downsample(h, d, &crop, IVec3::new(3, 1, 1), false).unwrap();
        assert_eq!(samples, RegionSamples::Data(vec![1.0, 4.0, 7.0, 9.0]));
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let backend = MemoryBackend::new();
        let dims = IVec3::splat(4);
        backend.insert_cube("c.fits", dims, ramp_cube(dims)).unwrap();
        let (h, d) = open(&backend, "c.fits", false);

        let crop = VoxelBox::new(IVec3::ONE, IVec3::splat(5));
        let err = backend.crop_and_downsample(h, d, &crop, IVec3::ONE, false).unwrap_err();
        assert!(matches!(err, Error::Backend { status: STATUS_OUT_OF_BOUNDS, .. }));
    }

    #[test]
    fn test_mask_downsample_takes_max() {
        let backend = MemoryBackend::new();
        let dims = IVec3::new(4, 1, 1);
        backend.insert_mask("m.fits", dims, vec![0, 3, 0, 0]).unwrap();
        let (h, d) = open(&backend, "m.fits", true);

        let crop = VoxelBox::from_extent(dims);
        let samples = backend.crop_and_downsample(h, d, &crop, IVec3::new(2, 1, 1), true).unwrap();
        assert_eq!(samples, RegionSamples::Mask(vec![3, 0]));
    }

    #[test]
    fn test_paint_is_deferred_until_consolidate() {
        let backend = MemoryBackend::new();
        let dims = IVec3::splat(3);
        let (h, d) = (backend.create_mask(dims.as_i64vec3()).unwrap(), dims.as_i64vec3());

        backend.paint_voxel(h, IVec3::new(2, 2, 2), 7).unwrap();
        assert_eq!(backend.read_voxel(h, d, IVec3::new(2, 2, 2)).unwrap(), 0.0);
        assert!(backend.masked_source_ids(h).unwrap().is_empty());

        backend.consolidate_mask_entries(h).unwrap();
        assert_eq!(backend.read_voxel(h, d, IVec3::new(2, 2, 2)).unwrap(), 7.0);
        assert_eq!(backend.masked_source_ids(h).unwrap(), vec![7]);
    }

    #[test]
    fn test_paint_rejects_data_cube() {
        let backend = MemoryBackend::new();
        let dims = IVec3::splat(2);
        backend.insert_cube("c.fits", dims, ramp_cube(dims)).unwrap();
        let (h, _) = open(&backend, "c.fits", false);
        let err = backend.paint_voxel(h, IVec3::ONE, 1).unwrap_err();
        assert!(matches!(err, Error::Backend { status: STATUS_WRONG_KIND, .. }));
    }

    #[test]
    fn test_injected_failure() {
        let backend = MemoryBackend::new();
        let dims = IVec3::splat(2);
        backend.insert_cube("c.fits", dims, ramp_cube(dims)).unwrap();
        backend.fail_on("open_cube");
        assert!(backend.open_cube(Path::new("c.fits"), false).is_err());
        backend.clear_failures();
        assert!(backend.open_cube(Path::new("c.fits"), false).is_ok());
    }

    #[test]
    fn test_save_mask_roundtrip() {
        let backend = MemoryBackend::new();
        let dims = IVec3::splat(2);
        let h = backend.create_mask(dims.as_i64vec3()).unwrap();
        backend.paint_voxel(h, IVec3::ONE, 4).unwrap();
        backend.consolidate_mask_entries(h).unwrap();
        backend.save_mask(h, "saved.fits").unwrap();

        let (h2, d2) = open(&backend, "saved.fits", true);
        assert_eq!(backend.read_voxel(h2, d2, IVec3::ONE).unwrap(), 4.0);
    }
}
