//! Brush stroke representation

use crate::core::types::IVec3;
use crate::math::VoxelBox;

/// One voxel's change of source ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoxelDelta {
    /// Region voxel (1-based)
    pub voxel: IVec3,
    pub previous: i16,
    pub new: i16,
}

/// The voxel changes made between beginning and finishing a stroke
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BrushStroke {
    deltas: Vec<VoxelDelta>,
    bounds: Option<VoxelBox>,
}

impl BrushStroke {
    /// Create an empty stroke
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change
    pub fn record(&mut self, delta: VoxelDelta) {
        match &mut self.bounds {
            Some(bounds) => bounds.expand(delta.voxel),
            None => self.bounds = Some(VoxelBox::point(delta.voxel)),
        }
        self.deltas.push(delta);
    }

    /// Changes in the order they were made
    pub fn deltas(&self) -> &[VoxelDelta] {
        &self.deltas
    }

    /// Writes that undo this stroke, in the order they must be applied
    pub fn reverse_writes(&self) -> impl Iterator<Item = (IVec3, i16)> + '_ {
        self.deltas.iter().rev().map(|d| (d.voxel, d.previous))
    }

    /// Writes that redo this stroke
    pub fn forward_writes(&self) -> impl Iterator<Item = (IVec3, i16)> + '_ {
        self.deltas.iter().map(|d| (d.voxel, d.new))
    }

    /// Box around every voxel touched
    pub fn bounds(&self) -> Option<VoxelBox> {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tracks_bounds() {
        let mut stroke = BrushStroke::new();
        assert!(stroke.is_empty());
        assert_eq!(stroke.bounds(), None);

        stroke.record(VoxelDelta { voxel: IVec3::new(2, 5, 1), previous: 0, new: 3 });
        stroke.record(VoxelDelta { voxel: IVec3::new(4, 1, 1), previous: 0, new: 3 });

        assert_eq!(stroke.len(), 2);
        assert_eq!(stroke.bounds(), Some(VoxelBox::new(IVec3::new(2, 1, 1), IVec3::new(4, 5, 1))));
    }

    #[test]
    fn test_reverse_writes_restore_original() {
        let v = IVec3::new(1, 1, 1);
        let mut stroke = BrushStroke::new();
        // Same voxel changed twice inside one stroke
        stroke.record(VoxelDelta { voxel: v, previous: 0, new: 2 });
        stroke.record(VoxelDelta { voxel: v, previous: 2, new: 0 });

        let reverse: Vec<_> = stroke.reverse_writes().collect();
        assert_eq!(reverse, vec![(v, 2), (v, 0)]);
        let forward: Vec<_> = stroke.forward_writes().collect();
        assert_eq!(forward, vec![(v, 2), (v, 0)]);
    }
}
