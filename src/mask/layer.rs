//! Mask layer: per-voxel source IDs with stroke-based undo/redo.
//!
//! State machine: `Idle -> StrokeActive -> Idle` via [`MaskLayer::finish_stroke`]
//! or [`MaskLayer::cancel_stroke`]. Undo and redo are only accepted while idle.
//! Every write is also queued for the full-resolution mask array and sent
//! there by [`MaskLayer::consolidate`].

use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::types::{IVec3, Result};
use crate::math::{coords, Axis, VoxelBox};
use crate::slice::grid::Grid2;
use crate::volume::buffer::VolumeBuffer;
use crate::volume::region::{Region, RegionSamples};
use super::dirty::DirtyTracker;
use super::stroke::{BrushStroke, VoxelDelta};

/// What a brush does to the voxels under it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrushMode {
    /// Assign voxels to this source; voxels owned by other sources are skipped
    Paint(i16),
    /// Clear voxels owned by this source; other voxels are left alone
    Erase(i16),
}

/// Source-ID array matching a materialized region, plus edit history
#[derive(Debug)]
pub struct MaskLayer {
    extent: IVec3,
    /// Data voxel sampled by region voxel (1, 1, 1)
    origin: IVec3,
    downsample: IVec3,
    /// x-fastest, 0 = unmasked
    source_ids: Vec<i16>,
    /// Next ID handed out by `next_source_id`; every stored ID is below it.
    /// Wider than `i16` so it can sit one past `i16::MAX` once the ID space is used up.
    new_source_id: i32,
    highlighted_source: i16,
    active: Option<BrushStroke>,
    undo_stack: Vec<BrushStroke>,
    redo_stack: Vec<BrushStroke>,
    /// Writes not yet sent to the mask array, in order
    pending: Vec<(IVec3, i16)>,
    dirty: DirtyTracker,
}

impl MaskLayer {
    /// Empty full-resolution layer of the given extent
    pub fn new(extent: IVec3) -> Self {
        let e = extent.max(IVec3::ONE);
        let len = (e.x as usize) * (e.y as usize) * (e.z as usize);
        Self::from_parts(e, IVec3::ONE, IVec3::ONE, vec![0; len], 0)
    }

    /// Build from a materialized mask region.
    ///
    /// `known_ids` are IDs present elsewhere in the full cube (outside the crop),
    /// so freshly issued IDs never collide with them.
    pub fn from_region(region: &Region, known_ids: &[i16]) -> Result<Self> {
        let ids = match region.samples() {
            RegionSamples::Mask(ids) => ids.clone(),
            RegionSamples::Data(_) => return Err(Error::MaskNotLoaded),
        };
        let known_max = known_ids.iter().copied().max().unwrap_or(0);
        Ok(Self::from_parts(
            region.extent(),
            region.origin(),
            region.downsample(),
            ids,
            known_max,
        ))
    }

    fn from_parts(extent: IVec3, origin: IVec3, downsample: IVec3, source_ids: Vec<i16>, known_max: i16) -> Self {
        let max_id = source_ids.iter().copied().max().unwrap_or(0).max(known_max).max(0);
        Self {
            extent,
            origin,
            downsample,
            source_ids,
            new_source_id: i32::from(max_id) + 1,
            highlighted_source: 0,
            active: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            pending: Vec::new(),
            dirty: DirtyTracker::new(),
        }
    }

    pub fn extent(&self) -> IVec3 {
        self.extent
    }

    pub fn origin(&self) -> IVec3 {
        self.origin
    }

    pub fn downsample(&self) -> IVec3 {
        self.downsample
    }

    /// True if this layer covers exactly the voxels of `region`
    pub fn matches_region(&self, region: &Region) -> bool {
        self.extent == region.extent()
            && self.origin == region.origin()
            && self.downsample == region.downsample()
    }

    pub fn is_full_resolution(&self) -> bool {
        self.downsample == IVec3::ONE
    }

    /// Source ID at a region voxel, `None` out of bounds
    pub fn value(&self, v: IVec3) -> Option<i16> {
        self.index_of(v).map(|i| self.source_ids[i])
    }

    /// 2D cut through the layer, `None` if `index` is outside the region
    pub fn slice(&self, axis: Axis, index: i32) -> Option<Grid2<i16>> {
        if index < 1 || index > self.extent[axis.index()] {
            return None;
        }
        let (h, v) = axis.free_axes();
        let width = self.extent[h.index()];
        let height = self.extent[v.index()];
        Some(Grid2::from_fn(width, height, |u, w| {
            let voxel = axis.voxel_from_pixel(u, w, index);
            self.value(voxel).unwrap_or(0)
        }))
    }

    // --- Source bookkeeping ---

    /// Issue a fresh source ID, `None` once every positive `i16` has been issued
    pub fn next_source_id(&mut self) -> Option<i16> {
        let id = self.peek_source_id();
        match id {
            Some(_) => self.new_source_id += 1,
            None => log::warn!("Source ID space exhausted"),
        }
        id
    }

    /// The ID `next_source_id` would return
    pub fn peek_source_id(&self) -> Option<i16> {
        i16::try_from(self.new_source_id).ok()
    }

    /// True if `source_id` is a nonzero ID this layer may paint with
    pub fn is_issued(&self, source_id: i16) -> bool {
        source_id > 0 && i32::from(source_id) < self.new_source_id
    }

    /// Sorted nonzero IDs present in the layer
    pub fn source_ids(&self) -> Vec<i16> {
        let mut ids: Vec<i16> = self.source_ids.iter().copied().filter(|&id| id != 0).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Number of voxels owned by `source_id`
    pub fn voxel_count(&self, source_id: i16) -> usize {
        self.source_ids.iter().filter(|&&id| id == source_id).count()
    }

    pub fn highlighted_source(&self) -> i16 {
        self.highlighted_source
    }

    pub fn set_highlighted_source(&mut self, source_id: i16) {
        self.highlighted_source = source_id;
    }

    // --- Stroke state machine ---

    /// True between `begin_stroke` and `finish_stroke`/`cancel_stroke`
    pub fn is_stroke_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start recording a stroke.
    pub fn begin_stroke(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::StrokeInProgress);
        }
        if !self.is_full_resolution() {
            return Err(Error::NotFullResolution);
        }
        self.active = Some(BrushStroke::new());
        Ok(())
    }

    /// Set one voxel's source ID within the active stroke.
    ///
    /// `source_id == 0` erases. Returns `Ok(false)` when nothing changed: the
    /// voxel already holds `source_id`, or it is outside the region.
    pub fn paint_voxel(&mut self, v: IVec3, source_id: i16) -> Result<bool> {
        if self.active.is_none() {
            return Err(Error::NoActiveStroke);
        }
        self.check_source(source_id)?;
        let Some(index) = self.index_of(v) else {
            return Ok(false);
        };

        let previous = self.source_ids[index];
        if previous == source_id {
            return Ok(false);
        }
        if let Some(stroke) = self.active.as_mut() {
            stroke.record(VoxelDelta { voxel: v, previous, new: source_id });
        }
        self.write(index, v, source_id);
        Ok(true)
    }

    /// Paint a list of voxels, returning how many changed.
    pub fn paint_voxels(&mut self, voxels: &[IVec3], source_id: i16) -> Result<usize> {
        let mut changed = 0;
        for &v in voxels {
            if self.paint_voxel(v, source_id)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Apply a cubic brush of `size` voxels per side centered on `center`.
    ///
    /// The brush is clipped to the region. Returns how many voxels changed.
    pub fn paint_brush(&mut self, center: IVec3, size: i32, mode: BrushMode) -> Result<usize> {
        let size = size.max(1);
        let min = center - IVec3::splat((size - 1) / 2);
        let brush = VoxelBox::new(min, min + IVec3::splat(size - 1));
        let Some(area) = brush.intersection(&VoxelBox::from_extent(self.extent)) else {
            return Ok(0);
        };

        let targets: Vec<(IVec3, i16)> = area
            .iter()
            .filter_map(|v| {
                let current = self.value(v)?;
                match mode {
                    BrushMode::Paint(id) if current == 0 || current == id => Some((v, id)),
                    BrushMode::Erase(id) if current == id && id != 0 => Some((v, 0)),
                    _ => None,
                }
            })
            .collect();

        let mut changed = 0;
        for (v, id) in targets {
            if self.paint_voxel(v, id)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// End the active stroke. Non-empty strokes go on the undo stack and clear redo.
    ///
    /// Returns whether a stroke was recorded.
    pub fn finish_stroke(&mut self) -> Result<bool> {
        let stroke = self.active.take().ok_or(Error::NoActiveStroke)?;
        if stroke.is_empty() {
            return Ok(false);
        }
        log::debug!("Stroke finished: {} voxels", stroke.len());
        self.undo_stack.push(stroke);
        self.redo_stack.clear();
        Ok(true)
    }

    /// Discard the active stroke, reverting its writes.
    pub fn cancel_stroke(&mut self) -> Result<()> {
        let stroke = self.active.take().ok_or(Error::NoActiveStroke)?;
        self.apply_writes(stroke.reverse_writes());
        log::debug!("Stroke cancelled: {} voxels reverted", stroke.len());
        Ok(())
    }

    /// Revert the most recent stroke. `Ok(false)` if there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        if self.active.is_some() {
            return Err(Error::StrokeInProgress);
        }
        let Some(stroke) = self.undo_stack.pop() else {
            return Ok(false);
        };
        self.apply_writes(stroke.reverse_writes());
        self.redo_stack.push(stroke);
        Ok(true)
    }

    /// Re-apply the most recently undone stroke. `Ok(false)` if there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        if self.active.is_some() {
            return Err(Error::StrokeInProgress);
        }
        let Some(stroke) = self.redo_stack.pop() else {
            return Ok(false);
        };
        self.apply_writes(stroke.forward_writes());
        self.undo_stack.push(stroke);
        Ok(true)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Drop all undo/redo history.
    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    // --- Persistence ---

    /// True if some writes have not reached the mask array yet
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Send queued writes to the full-resolution mask array and consolidate it.
    ///
    /// On failure the queue is kept so the call can be retried. Returns the
    /// number of voxels written.
    pub fn consolidate(&mut self, mask: &VolumeBuffer) -> Result<usize> {
        if !mask.is_mask() {
            return Err(Error::MaskNotLoaded);
        }
        if self.pending.is_empty() {
            return Ok(0);
        }

        // Latest write per voxel wins
        let mut latest: HashMap<IVec3, i16> = HashMap::with_capacity(self.pending.len());
        for &(v, id) in &self.pending {
            latest.insert(v, id);
        }

        let backend = mask.backend();
        let handle = mask.handle();
        let result = latest
            .iter()
            .try_for_each(|(&v, &id)| {
                let data = coords::voxel_to_data(v, self.origin, self.downsample);
                backend.paint_voxel(handle, data, id)
            })
            .and_then(|()| backend.consolidate_mask_entries(handle));

        match result {
            Ok(()) => {
                self.pending.clear();
                log::debug!("Consolidated {} mask voxels", latest.len());
                Ok(latest.len())
            }
            Err(e) => {
                log::warn!("Mask consolidation failed, {} writes kept: {}", self.pending.len(), e);
                Err(e)
            }
        }
    }

    // --- Change tracking ---

    /// Increases on every voxel write
    pub fn generation(&self) -> u64 {
        self.dirty.generation()
    }

    /// Box of voxels changed since the last call
    pub fn take_dirty_bounds(&mut self) -> Option<VoxelBox> {
        self.dirty.take_dirty()
    }

    /// Check if a slice has changes not yet taken
    pub fn is_slice_dirty(&self, axis: Axis, index: i32) -> bool {
        self.dirty.is_slice_dirty(axis, index)
    }

    // --- Internals ---

    fn index_of(&self, v: IVec3) -> Option<usize> {
        if !coords::in_bounds(v, self.extent) {
            return None;
        }
        let p = (v - IVec3::ONE).as_i64vec3();
        let e = self.extent.as_i64vec3();
        Some((p.x + p.y * e.x + p.z * e.x * e.y) as usize)
    }

    fn check_source(&self, source_id: i16) -> Result<()> {
        if source_id != 0 && !self.is_issued(source_id) {
            return Err(Error::UnknownSource(source_id));
        }
        Ok(())
    }

    fn write(&mut self, index: usize, v: IVec3, source_id: i16) {
        self.source_ids[index] = source_id;
        self.pending.push((v, source_id));
        self.dirty.mark_voxel(v);
    }

    fn apply_writes(&mut self, writes: impl Iterator<Item = (IVec3, i16)>) {
        for (v, id) in writes {
            if let Some(index) = self.index_of(v) {
                self.write(index, v, id);
            }
        }
    }
}
