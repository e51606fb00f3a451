// SPDX-License-Identifier: GPL-3.0-only

//! Axis-aligned bounding box

use glam::{Affine3A, Vec3};

/// Axis-aligned bounding box in world or voxel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Smallest box containing every point in `corners`
    pub fn from_corners(corners: &[Vec3]) -> Self {
        let mut iter = corners.iter().copied();
        let Some(first) = iter.next() else {
            return Self::new(Vec3::ZERO, Vec3::ZERO);
        };
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self { min, max }
    }

    /// The 8 corners, x varying fastest
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing the transformed corners
    pub fn transformed(&self, transform: &Affine3A) -> Self {
        let corners = self.corners().map(|c| transform.transform_point3(c));
        Self::from_corners(&corners)
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_roundtrip() {
        let bb = BoundingBox::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(BoundingBox::from_corners(&bb.corners()), bb);
    }

    #[test]
    fn test_new_orders_min_max() {
        let bb = BoundingBox::new(Vec3::new(4.0, 0.0, 6.0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(bb.min, Vec3::new(1.0, 0.0, 3.0));
        assert_eq!(bb.max, Vec3::new(4.0, 2.0, 6.0));
    }

    #[test]
    fn test_transformed_by_scale_and_translation() {
        let bb = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let transform = Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0))
            * Affine3A::from_scale(Vec3::new(2.0, 3.0, 4.0));
        let out = bb.transformed(&transform);
        assert_eq!(out.min, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(out.max, Vec3::new(12.0, 3.0, 4.0));
    }

    #[test]
    fn test_rotation_keeps_box_axis_aligned() {
        let bb = BoundingBox::new(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let out = bb.transformed(&Affine3A::from_rotation_z(std::f32::consts::FRAC_PI_2));
        assert!((out.extent() - Vec3::new(1.0, 2.0, 1.0)).abs().max_element() < 1e-5);
    }
}
