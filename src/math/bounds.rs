//! Inclusive integer voxel boxes

use crate::core::types::IVec3;

/// Axis-aligned voxel box with inclusive `min` and `max` corners
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoxelBox {
    pub min: IVec3,
    pub max: IVec3,
}

impl VoxelBox {
    /// Create a box from any two opposite corners
    pub fn new(a: IVec3, b: IVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Box covering a whole 1-based array of the given extent
    pub fn from_extent(extent: IVec3) -> Self {
        Self {
            min: IVec3::ONE,
            max: extent,
        }
    }

    /// Box containing a single voxel
    pub fn point(v: IVec3) -> Self {
        Self { min: v, max: v }
    }

    /// Number of voxels along each axis
    pub fn size(&self) -> IVec3 {
        self.max - self.min + IVec3::ONE
    }

    /// Total voxel count
    pub fn volume(&self) -> i64 {
        let s = self.size().as_i64vec3();
        s.x * s.y * s.z
    }

    /// Check if voxel is inside the box
    pub fn contains(&self, v: IVec3) -> bool {
        v.x >= self.min.x && v.x <= self.max.x &&
        v.y >= self.min.y && v.y <= self.max.y &&
        v.z >= self.min.z && v.z <= self.max.z
    }

    /// Check if two boxes share at least one voxel
    pub fn intersects(&self, other: &VoxelBox) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Overlap of two boxes, `None` when disjoint
    pub fn intersection(&self, other: &VoxelBox) -> Option<VoxelBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(VoxelBox {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    /// Grow to include a voxel
    pub fn expand(&mut self, v: IVec3) {
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    /// Smallest box containing both
    pub fn merged(&self, other: &VoxelBox) -> VoxelBox {
        VoxelBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Iterate voxels with x varying fastest
    pub fn iter(&self) -> impl Iterator<Item = IVec3> + '_ {
        (self.min.z..=self.max.z).flat_map(move |z| {
            (self.min.y..=self.max.y).flat_map(move |y| {
                (self.min.x..=self.max.x).map(move |x| IVec3::new(x, y, z))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let b = VoxelBox::new(IVec3::new(5, 1, 3), IVec3::new(2, 4, 3));
        assert_eq!(b.min, IVec3::new(2, 1, 3));
        assert_eq!(b.max, IVec3::new(5, 4, 3));
        assert_eq!(b.size(), IVec3::new(4, 4, 1));
        assert_eq!(b.volume(), 16);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let b = VoxelBox::from_extent(IVec3::new(10, 10, 10));
        assert!(b.contains(IVec3::ONE));
        assert!(b.contains(IVec3::splat(10)));
        assert!(!b.contains(IVec3::ZERO));
        assert!(!b.contains(IVec3::new(11, 1, 1)));
    }

    #[test]
    fn test_intersection() {
        let a = VoxelBox::new(IVec3::ONE, IVec3::splat(4));
        let b = VoxelBox::new(IVec3::splat(3), IVec3::splat(8));
        let c = VoxelBox::new(IVec3::splat(5), IVec3::splat(6));
        assert_eq!(a.intersection(&b), Some(VoxelBox::new(IVec3::splat(3), IVec3::splat(4))));
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn test_iter_order() {
        let b = VoxelBox::new(IVec3::ONE, IVec3::new(2, 2, 1));
        let voxels: Vec<IVec3> = b.iter().collect();
        assert_eq!(voxels, vec![
            IVec3::new(1, 1, 1),
            IVec3::new(2, 1, 1),
            IVec3::new(1, 2, 1),
            IVec3::new(2, 2, 1),
        ]);
    }
}
