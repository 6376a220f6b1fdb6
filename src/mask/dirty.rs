//! Mutation tracking so views can tell when they are stale.

use crate::core::types::IVec3;
use crate::math::{Axis, VoxelBox};

/// Tracks which voxels changed since the last `take` and counts mutations.
///
/// The generation counter never decreases; a view that remembers the
/// generation it was built from is stale once the counter moves on.
#[derive(Debug, Default)]
pub struct DirtyTracker {
    /// Voxels changed since the last take
    dirty: Option<VoxelBox>,
    /// Incremented on every mutation
    generation: u64,
}

impl DirtyTracker {
    /// Create a tracker with nothing dirty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one voxel as changed.
    pub fn mark_voxel(&mut self, v: IVec3) {
        self.mark_box(&VoxelBox::point(v));
    }

    /// Mark a box of voxels as changed.
    pub fn mark_box(&mut self, region: &VoxelBox) {
        self.dirty = Some(match self.dirty {
            Some(dirty) => dirty.merged(region),
            None => *region,
        });
        self.generation = self.generation.wrapping_add(1);
    }

    /// Take the changed box and clear it.
    pub fn take_dirty(&mut self) -> Option<VoxelBox> {
        self.dirty.take()
    }

    /// Check if a slice intersects the changed box.
    pub fn is_slice_dirty(&self, axis: Axis, index: i32) -> bool {
        self.dirty.is_some_and(|dirty| {
            let a = axis.index();
            dirty.min[a] <= index && index <= dirty.max[a]
        })
    }

    pub fn has_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Current generation counter
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_take() {
        let mut tracker = DirtyTracker::new();
        assert!(!tracker.has_dirty());
        assert_eq!(tracker.generation(), 0);

        tracker.mark_voxel(IVec3::new(3, 3, 5));
        tracker.mark_voxel(IVec3::new(1, 4, 5));
        assert_eq!(tracker.generation(), 2);
        assert!(tracker.is_slice_dirty(Axis::Z, 5));
        assert!(!tracker.is_slice_dirty(Axis::Z, 4));
        assert!(tracker.is_slice_dirty(Axis::X, 2));

        let dirty = tracker.take_dirty().unwrap();
        assert_eq!(dirty, VoxelBox::new(IVec3::new(1, 3, 5), IVec3::new(3, 4, 5)));
        assert!(!tracker.has_dirty());
        // Generation survives a take
        assert_eq!(tracker.generation(), 2);
    }
}
