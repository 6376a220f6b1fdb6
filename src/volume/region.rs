//! Materialized (cropped and/or downsampled) view of a cube

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{IVec3, Result};
use crate::math::coords;
use crate::math::VoxelBox;

/// Sampling filter the renderer should use for a region's texture
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFilter {
    #[default]
    Point,
    Bilinear,
    Trilinear,
}

/// Owned sample buffer, x varying fastest
#[derive(Clone, Debug, PartialEq)]
pub enum RegionSamples {
    /// Intensity cube, NaN marks blank voxels
    Data(Vec<f32>),
    /// Mask cube of source IDs, 0 = unmasked
    Mask(Vec<i16>),
}

impl RegionSamples {
    pub fn len(&self) -> usize {
        match self {
            RegionSamples::Data(v) => v.len(),
            RegionSamples::Mask(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per element actually stored
    pub fn element_size(&self) -> usize {
        match self {
            RegionSamples::Data(_) => std::mem::size_of::<f32>(),
            RegionSamples::Mask(_) => std::mem::size_of::<i16>(),
        }
    }

    pub fn is_mask(&self) -> bool {
        matches!(self, RegionSamples::Mask(_))
    }

    /// Raw bytes for texture upload
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RegionSamples::Data(v) => bytemuck::cast_slice(v),
            RegionSamples::Mask(v) => bytemuck::cast_slice(v),
        }
    }

    /// Sample at a flat index as `f32`
    pub fn get(&self, index: usize) -> Option<f32> {
        match self {
            RegionSamples::Data(v) => v.get(index).copied(),
            RegionSamples::Mask(v) => v.get(index).map(|&id| id as f32),
        }
    }
}

/// A region of a cube held in memory for display and editing.
///
/// `origin` is the 1-based data voxel that region voxel (1, 1, 1) samples.
#[derive(Clone, Debug)]
pub struct Region {
    origin: IVec3,
    extent: IVec3,
    downsample: IVec3,
    filter: TextureFilter,
    samples: RegionSamples,
    /// Finite (min, max), cached at construction
    value_range: Option<(f32, f32)>,
}

impl Region {
    /// Wrap a sample buffer; fails if its length does not match `extent`.
    pub fn new(
        origin: IVec3,
        extent: IVec3,
        downsample: IVec3,
        filter: TextureFilter,
        samples: RegionSamples,
    ) -> Result<Self> {
        let expected = extent.as_i64vec3();
        let expected_len = expected.x * expected.y * expected.z;
        if extent.min_element() < 1 || samples.len() as i64 != expected_len {
            return Err(Error::ShapeMismatch {
                expected: extent,
                actual: IVec3::new(samples.len() as i32, 1, 1),
            });
        }

        let value_range = compute_range(&samples);
        Ok(Self {
            origin,
            extent,
            downsample: downsample.max(IVec3::ONE),
            filter,
            samples,
            value_range,
        })
    }

    pub fn origin(&self) -> IVec3 {
        self.origin
    }

    pub fn extent(&self) -> IVec3 {
        self.extent
    }

    pub fn downsample(&self) -> IVec3 {
        self.downsample
    }

    pub fn filter(&self) -> TextureFilter {
        self.filter
    }

    pub fn samples(&self) -> &RegionSamples {
        &self.samples
    }

    /// Consume the region, returning its buffer
    pub fn into_samples(self) -> RegionSamples {
        self.samples
    }

    pub fn is_mask(&self) -> bool {
        self.samples.is_mask()
    }

    pub fn is_full_resolution(&self) -> bool {
        self.downsample == IVec3::ONE
    }

    /// Bytes held by the sample buffer
    pub fn byte_size(&self) -> usize {
        self.samples.len() * self.samples.element_size()
    }

    /// Region voxel bounds `[1, extent]`
    pub fn bounds(&self) -> VoxelBox {
        VoxelBox::from_extent(self.extent)
    }

    /// Data voxels sampled by this region (first voxel of each bin)
    pub fn data_bounds(&self) -> VoxelBox {
        VoxelBox::new(self.origin, self.voxel_to_data(self.extent))
    }

    /// Finite (min, max) over all samples, `None` if every sample is NaN
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.value_range
    }

    /// Flat index of a 1-based region voxel, `None` when out of bounds
    pub fn index_of(&self, v: IVec3) -> Option<usize> {
        if !coords::in_bounds(v, self.extent) {
            return None;
        }
        let p = (v - IVec3::ONE).as_i64vec3();
        let e = self.extent.as_i64vec3();
        Some((p.x + p.y * e.x + p.z * e.x * e.y) as usize)
    }

    /// Sample at a region voxel, NaN when out of bounds
    pub fn value(&self, v: IVec3) -> f32 {
        self.index_of(v)
            .and_then(|i| self.samples.get(i))
            .unwrap_or(f32::NAN)
    }

    /// Region voxel to full-resolution data voxel
    pub fn voxel_to_data(&self, v: IVec3) -> IVec3 {
        coords::voxel_to_data(v, self.origin, self.downsample)
    }

    /// Full-resolution data voxel to region voxel
    pub fn data_to_voxel(&self, d: IVec3) -> IVec3 {
        coords::data_to_voxel(d, self.origin, self.downsample)
    }
}

fn compute_range(samples: &RegionSamples) -> Option<(f32, f32)> {
    let fold = |acc: Option<(f32, f32)>, v: f32| -> Option<(f32, f32)> {
        if !v.is_finite() {
            return acc;
        }
        Some(match acc {
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
            None => (v, v),
        })
    };
    let merge = |a: Option<(f32, f32)>, b: Option<(f32, f32)>| match (a, b) {
        (Some((l1, h1)), Some((l2, h2))) => Some((l1.min(l2), h1.max(h2))),
        (a, None) => a,
        (None, b) => b,
    };

    match samples {
        RegionSamples::Data(v) => v
            .par_iter()
            .fold(|| None, |acc, &x| fold(acc, x))
            .reduce(|| None, merge),
        RegionSamples::Mask(v) => v
            .par_iter()
            .fold(|| None, |acc, &x| fold(acc, x as f32))
            .reduce(|| None, merge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(extent: IVec3) -> Region {
        let n = (extent.x * extent.y * extent.z) as usize;
        let samples = RegionSamples::Data((0..n).map(|i| i as f32).collect());
        Region::new(IVec3::ONE, extent, IVec3::ONE, TextureFilter::Point, samples).unwrap()
    }

    #[test]
    fn test_shape_checked() {
        let result = Region::new(
            IVec3::ONE,
            IVec3::new(2, 2, 2),
            IVec3::ONE,
            TextureFilter::Point,
            RegionSamples::Data(vec![0.0; 7]),
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_indexing_x_fastest() {
        let region = ramp(IVec3::new(3, 4, 5));
        assert_eq!(region.value(IVec3::new(1, 1, 1)), 0.0);
        assert_eq!(region.value(IVec3::new(2, 1, 1)), 1.0);
        assert_eq!(region.value(IVec3::new(1, 2, 1)), 3.0);
        assert_eq!(region.value(IVec3::new(1, 1, 2)), 12.0);
        assert!(region.value(IVec3::new(4, 1, 1)).is_nan());
        assert!(region.value(IVec3::ZERO).is_nan());
    }

    #[test]
    fn test_value_range_ignores_nan() {
        let samples = RegionSamples::Data(vec![f32::NAN, 2.0, -1.0, f32::NAN]);
        let region = Region::new(
            IVec3::ONE, IVec3::new(4, 1, 1), IVec3::ONE, TextureFilter::Point, samples,
        ).unwrap();
        assert_eq!(region.value_range(), Some((-1.0, 2.0)));

        let blank = Region::new(
            IVec3::ONE, IVec3::ONE, IVec3::ONE, TextureFilter::Point,
            RegionSamples::Data(vec![f32::NAN]),
        ).unwrap();
        assert_eq!(blank.value_range(), None);
    }

    #[test]
    fn test_data_mapping() {
        let region = Region::new(
            IVec3::new(11, 1, 5),
            IVec3::new(2, 2, 2),
            IVec3::new(3, 1, 2),
            TextureFilter::Bilinear,
            RegionSamples::Mask(vec![0; 8]),
        ).unwrap();
        assert!(region.is_mask());
        assert!(!region.is_full_resolution());
        assert_eq!(region.byte_size(), 16);
        assert_eq!(region.samples().as_bytes().len(), 16);
        assert_eq!(region.voxel_to_data(IVec3::new(2, 2, 2)), IVec3::new(14, 2, 7));
        assert_eq!(region.data_to_voxel(IVec3::new(15, 2, 8)), IVec3::new(2, 2, 2));
        assert_eq!(region.data_bounds(), VoxelBox::new(IVec3::new(11, 1, 5), IVec3::new(14, 2, 7)));
    }
}
