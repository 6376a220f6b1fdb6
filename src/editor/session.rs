//! Editor session: the single owner of the active data set.
//!
//! Holds the data cube, its optional mask cube, and the mask layer painted on
//! top of the current region. Every paint or undo operation is committed to the
//! mask cube before it returns.

use std::path::Path;
use std::sync::Arc;

use crate::core::config::EngineConfig;
use crate::core::error::Error;
use crate::core::types::{IVec2, IVec3, Result, Vec2};
use crate::mask::{BrushMode, MaskLayer};
use crate::math::{Axis, VoxelBox};
use crate::slice::polygon::{pixels_inside, select_voxels};
use crate::slice::view::SliceView;
use crate::volume::backend::CubeBackend;
use crate::volume::buffer::VolumeBuffer;
use crate::volume::region::Region;
use crate::volume::sizing::DownsampleSizer;
use crate::volume::stats::SelectionStats;

pub struct EditorSession {
    config: EngineConfig,
    backend: Arc<dyn CubeBackend>,
    data: VolumeBuffer,
    mask: Option<VolumeBuffer>,
    /// Created on first entry into paint mode
    layer: Option<MaskLayer>,
    /// Data voxels currently materialized
    crop: VoxelBox,
    axis: Axis,
    slice_index: i32,
    active_source: i16,
}

impl EditorSession {
    /// Open a data cube (and optionally its mask) and materialize the whole cube.
    pub fn open(
        backend: Arc<dyn CubeBackend>,
        data_path: impl AsRef<Path>,
        mask_path: Option<&Path>,
        config: EngineConfig,
    ) -> Result<Self> {
        let sizer = DownsampleSizer::from_config(&config);
        let mut data = VolumeBuffer::open(Arc::clone(&backend), data_path, false, sizer)?;
        data.generate_fitted_region(config.texture_filter, None)?;
        let crop = data.full_bounds();

        let mut session = Self {
            config,
            backend,
            data,
            mask: None,
            layer: None,
            crop,
            axis: Axis::Z,
            slice_index: 1,
            active_source: 0,
        };
        session.slice_index = session.slice_len().div_euclid(2).max(1);

        if let Some(path) = mask_path {
            session.load_mask(path)?;
        }
        Ok(session)
    }

    /// Open a mask cube for the loaded data, replacing any current mask.
    ///
    /// Unconsolidated edits and undo history of the previous mask are discarded.
    pub fn load_mask(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let sizer = DownsampleSizer::from_config(&self.config);
        let mut mask = VolumeBuffer::open(Arc::clone(&self.backend), path, true, sizer)?;
        if mask.dims() != self.data.dims() {
            return Err(Error::ShapeMismatch {
                expected: self.data.dims().as_ivec3(),
                actual: mask.dims().as_ivec3(),
            });
        }
        let region = self.data.region().ok_or(Error::NoRegion)?;
        let mask_region = self.build_mask_region(&mask, region, self.crop)?;
        mask.install_region(mask_region);
        if self.layer.take().is_some_and(|l| l.has_pending()) {
            log::warn!("Discarding unsaved mask edits on reload");
        }
        self.mask = Some(mask);
        Ok(())
    }

    /// Materialize a sub-box of the cube, at the finest resolution the budget allows.
    ///
    /// Pending mask writes are committed first. The mask layer is rebuilt for
    /// the new region and its undo history is cleared. Nothing is replaced
    /// unless the data region, mask region and layer were all built.
    pub fn crop_to(&mut self, crop: VoxelBox) -> Result<()> {
        if self.layer.as_ref().is_some_and(MaskLayer::is_stroke_active) {
            return Err(Error::StrokeInProgress);
        }
        self.commit()?;

        let (data_region, mask_region, layer) = self.stage_crop(crop).map_err(|e| {
            log::error!("Crop to {} .. {} failed, keeping current region: {}", crop.min, crop.max, e);
            e
        })?;
        self.data.install_region(data_region);
        if let (Some(mask), Some(region)) = (self.mask.as_mut(), mask_region) {
            mask.install_region(region);
        }
        if let Some(layer) = layer {
            self.install_layer(layer);
        }
        self.crop = crop;

        let len = self.slice_len();
        self.slice_index = self.slice_index.clamp(1, len.max(1));
        log::info!("Cropped to {} .. {}", crop.min, crop.max);
        Ok(())
    }

    /// Go back to the whole cube.
    pub fn reset_crop(&mut self) -> Result<()> {
        let full = self.data.full_bounds();
        self.crop_to(full)
    }

    /// Make the mask layer available, creating an empty mask cube if needed.
    ///
    /// Painting needs a full-resolution region; crop first if the cube is too large.
    pub fn enter_paint_mode(&mut self) -> Result<&mut MaskLayer> {
        if !self.data.is_full_resolution() {
            return Err(Error::NotFullResolution);
        }
        if self.mask.is_none() {
            let sizer = DownsampleSizer::from_config(&self.config);
            let mut mask = VolumeBuffer::create_mask(Arc::clone(&self.backend), self.data.dims(), sizer)?;
            let region = self.data.region().ok_or(Error::NoRegion)?;
            let mask_region = self.build_mask_region(&mask, region, self.crop)?;
            mask.install_region(mask_region);
            self.mask = Some(mask);
        }
        if self.layer.is_none() {
            let mask = self.mask.as_ref().ok_or(Error::MaskNotLoaded)?;
            let region = mask.region().ok_or(Error::NoRegion)?;
            let layer = build_layer(mask, region)?;
            self.install_layer(layer);
        }
        self.layer.as_mut().ok_or(Error::MaskNotLoaded)
    }

    pub fn is_paint_mode(&self) -> bool {
        self.layer.is_some()
    }

    // --- Slice selection ---

    /// Choose the displayed slice (1-based, in region voxels).
    pub fn set_slice(&mut self, axis: Axis, index: i32) -> Result<()> {
        let region = self.data.region().ok_or(Error::NoRegion)?;
        let len = region.extent()[axis.index()];
        if index < 1 || index > len {
            return Err(Error::SliceOutOfRange { axis, index, len });
        }
        self.axis = axis;
        self.slice_index = index;
        Ok(())
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn slice_index(&self) -> i32 {
        self.slice_index
    }

    /// Render the current slice
    pub fn slice_view(&self) -> Result<SliceView> {
        SliceView::extract(&self.data, self.layer.as_ref(), self.axis, self.slice_index, &self.config)
    }

    // --- Sources ---

    /// Issue a new source ID, make it active and highlight it.
    pub fn new_source(&mut self) -> Result<i16> {
        let layer = self.layer.as_mut().ok_or(Error::MaskNotLoaded)?;
        let id = layer.next_source_id().ok_or(Error::SourceIdsExhausted)?;
        layer.set_highlighted_source(id);
        self.active_source = id;
        log::info!("New source {}", id);
        Ok(id)
    }

    /// Select the source later paint calls use.
    pub fn set_active_source(&mut self, source_id: i16) -> Result<()> {
        let layer = self.layer.as_mut().ok_or(Error::MaskNotLoaded)?;
        if !layer.is_issued(source_id) {
            return Err(Error::UnknownSource(source_id));
        }
        layer.set_highlighted_source(source_id);
        self.active_source = source_id;
        Ok(())
    }

    pub fn active_source(&self) -> i16 {
        self.active_source
    }

    // --- Painting ---

    /// Fill the polygon on the current slice with the active source.
    ///
    /// The whole selection is rejected if it overlaps another source.
    /// Returns how many voxels changed.
    pub fn paint_polygon(&mut self, polygon: &[Vec2]) -> Result<usize> {
        let (axis, index, target) = (self.axis, self.slice_index, self.active_source);
        let layer = self.layer.as_ref().ok_or(Error::MaskNotLoaded)?;
        if target == 0 {
            return Err(Error::UnknownSource(0));
        }
        let mask_slice = layer
            .slice(axis, index)
            .ok_or(Error::SliceOutOfRange { axis, index, len: layer.extent()[axis.index()] })?;
        let shape = IVec2::new(mask_slice.width(), mask_slice.height());
        let voxels = select_voxels(polygon, shape, axis, index, &mask_slice, target)?;
        self.apply_stroke(|layer| layer.paint_voxels(&voxels, target))
    }

    /// Clear the active source's voxels inside the polygon on the current slice.
    pub fn erase_polygon(&mut self, polygon: &[Vec2]) -> Result<usize> {
        let (axis, index, target) = (self.axis, self.slice_index, self.active_source);
        let layer = self.layer.as_ref().ok_or(Error::MaskNotLoaded)?;
        let Some(mask_slice) = layer.slice(axis, index) else {
            return Ok(0);
        };
        let shape = IVec2::new(mask_slice.width(), mask_slice.height());
        let voxels: Vec<IVec3> = pixels_inside(polygon, shape)
            .into_iter()
            .filter(|&(u, v)| target != 0 && mask_slice.get(u, v) == Some(target))
            .map(|(u, v)| axis.voxel_from_pixel(u, v, index))
            .collect();
        self.apply_stroke(|layer| layer.paint_voxels(&voxels, 0))
    }

    /// Paint a cubic brush of the active source at a region voxel.
    pub fn paint_brush(&mut self, center: IVec3, size: i32) -> Result<usize> {
        let target = self.active_source;
        if target == 0 {
            return Err(Error::UnknownSource(0));
        }
        self.apply_stroke(|layer| layer.paint_brush(center, size, BrushMode::Paint(target)))
    }

    /// Erase the active source with a cubic brush.
    pub fn erase_brush(&mut self, center: IVec3, size: i32) -> Result<usize> {
        let target = self.active_source;
        self.apply_stroke(|layer| layer.paint_brush(center, size, BrushMode::Erase(target)))
    }

    pub fn undo(&mut self) -> Result<bool> {
        let layer = self.layer.as_mut().ok_or(Error::MaskNotLoaded)?;
        let undone = layer.undo()?;
        if undone {
            self.commit()?;
        }
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let layer = self.layer.as_mut().ok_or(Error::MaskNotLoaded)?;
        let redone = layer.redo()?;
        if redone {
            self.commit()?;
        }
        Ok(redone)
    }

    /// Send any pending mask writes to the mask cube.
    pub fn commit(&mut self) -> Result<usize> {
        match (self.layer.as_mut(), self.mask.as_ref()) {
            (Some(layer), Some(mask)) => layer.consolidate(mask),
            _ => Ok(0),
        }
    }

    // --- Queries ---

    /// Full-resolution value under a data voxel, NaN outside the cube
    pub fn value_at(&self, data_voxel: IVec3) -> f32 {
        self.data.get_value(data_voxel)
    }

    /// Statistics over a box of region voxels
    pub fn selection_stats(&self, selection: &VoxelBox) -> Option<SelectionStats> {
        SelectionStats::compute(self.data.region()?, selection)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data(&self) -> &VolumeBuffer {
        &self.data
    }

    pub fn mask(&self) -> Option<&VolumeBuffer> {
        self.mask.as_ref()
    }

    pub fn layer(&self) -> Option<&MaskLayer> {
        self.layer.as_ref()
    }

    /// Data voxels of the current crop
    pub fn crop(&self) -> VoxelBox {
        self.crop
    }

    // --- Internals ---

    fn slice_len(&self) -> i32 {
        self.data.region().map_or(1, |r| r.extent()[self.axis.index()])
    }

    /// Build everything a crop replaces, without touching the session.
    fn stage_crop(&self, crop: VoxelBox) -> Result<(Region, Option<Region>, Option<MaskLayer>)> {
        let data_region = self.data.build_fitted_region(self.config.texture_filter, Some(crop))?;
        let Some(mask) = self.mask.as_ref() else {
            return Ok((data_region, None, None));
        };
        let mask_region = self.build_mask_region(mask, &data_region, crop)?;
        let layer = match self.layer {
            Some(_) => Some(build_layer(mask, &mask_region)?),
            None => None,
        };
        Ok((data_region, Some(mask_region), layer))
    }

    /// Mask region matching `data_region` voxel for voxel.
    fn build_mask_region(&self, mask: &VolumeBuffer, data_region: &Region, crop: VoxelBox) -> Result<Region> {
        let region =
            mask.build_cropped_region(self.config.texture_filter, crop.min, crop.max, data_region.downsample())?;
        if region.extent() != data_region.extent() || region.downsample() != data_region.downsample() {
            return Err(Error::ShapeMismatch { expected: data_region.extent(), actual: region.extent() });
        }
        Ok(region)
    }

    fn install_layer(&mut self, mut layer: MaskLayer) {
        let active = self.active_source;
        if layer.is_issued(active) {
            layer.set_highlighted_source(active);
        } else {
            self.active_source = 0;
        }
        log::debug!("Mask layer ready: sources {:?}", layer.source_ids());
        self.layer = Some(layer);
    }

    /// Run `paint` inside a stroke, then commit. A failed paint cancels the stroke.
    fn apply_stroke(&mut self, paint: impl FnOnce(&mut MaskLayer) -> Result<usize>) -> Result<usize> {
        let layer = self.layer.as_mut().ok_or(Error::MaskNotLoaded)?;
        layer.begin_stroke()?;
        let changed = match paint(layer) {
            Ok(changed) => changed,
            Err(e) => {
                layer.cancel_stroke()?;
                return Err(e);
            }
        };
        layer.finish_stroke()?;
        self.commit()?;
        Ok(changed)
    }
}

fn build_layer(mask: &VolumeBuffer, region: &Region) -> Result<MaskLayer> {
    let known = mask.masked_source_ids()?;
    MaskLayer::from_region(region, &known)
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("data", &self.data)
            .field("mask", &self.mask)
            .field("crop", &self.crop)
            .field("axis", &self.axis)
            .field("slice_index", &self.slice_index)
            .field("active_source", &self.active_source)
            .finish()
    }
}
