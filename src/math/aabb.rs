//! Axis-aligned bounding box

use crate::core::types::Vec3;

/// Axis-aligned bounding box defined by min and max corners
///
/// A freshly [`reset`](Aabb::reset) box uses an inverted min/max
/// sentinel so that the first [`add_box`](Aabb::add_box) replaces it;
/// aggregate boxes on octree nodes rely on this.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    pub fn from_center_half_extent(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Empty sentinel box that any point or box will replace on add
    pub fn reset() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    /// True if this box is still the reset sentinel (never added to)
    pub fn is_reset(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get half-extents
    pub fn half_extent(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Radius of the bounding sphere around this box
    pub fn radius(&self) -> f32 {
        self.half_extent().length()
    }

    /// Squared radius of the bounding sphere around this box
    pub fn radius_sq(&self) -> f32 {
        self.half_extent().length_squared()
    }

    /// Check if point is inside AABB
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }

    /// Check if `other` lies entirely inside this AABB
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Check if two AABBs intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Grow this box to include another box
    pub fn add_box(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Grow this box to include a point
    pub fn add_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Return merged AABB containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Squared distance from a point to this box (0 when inside)
    pub fn distance_sq(&self, p: Vec3) -> f32 {
        let d = (self.min - p).max(p - self.max).max(Vec3::ZERO);
        d.length_squared()
    }

    /// Get child octant AABB for octree subdivision
    /// index: 0-7 with bit 2 = x, bit 1 = y, bit 0 = z
    pub fn child_octant(&self, index: u8) -> Aabb {
        let center = self.center();
        let half = self.half_extent() * 0.5;

        let offset = Vec3::new(
            if index & 4 != 0 { half.x } else { -half.x },
            if index & 2 != 0 { half.y } else { -half.y },
            if index & 1 != 0 { half.z } else { -half.z },
        );

        Aabb::from_center_half_extent(center + offset, half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.center(), Vec3::splat(0.5));
        assert_eq!(aabb.size(), Vec3::ONE);
    }

    #[test]
    fn test_reset_sentinel() {
        let mut aabb = Aabb::reset();
        assert!(aabb.is_reset());

        aabb.add_box(&Aabb::new(Vec3::ZERO, Vec3::ONE));
        assert!(!aabb.is_reset());
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::ONE);
    }

    #[test]
    fn test_contains_point() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains_point(Vec3::splat(0.5)));
        assert!(!aabb.contains_point(Vec3::splat(2.0)));
    }

    #[test]
    fn test_contains_aabb() {
        let outer = Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0));
        let inner = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let straddling = Aabb::new(Vec3::splat(1.0), Vec3::splat(3.0));
        assert!(outer.contains_aabb(&inner));
        assert!(!outer.contains_aabb(&straddling));
        assert!(!inner.contains_aabb(&outer));
    }

    #[test]
    fn test_intersects() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(1.5));
        let c = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_distance_sq() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.distance_sq(Vec3::splat(0.5)), 0.0);
        assert_eq!(aabb.distance_sq(Vec3::new(2.0, 0.5, 0.5)), 1.0);
        assert_eq!(aabb.distance_sq(Vec3::new(-1.0, -1.0, 0.5)), 2.0);
    }

    #[test]
    fn test_child_octant() {
        let parent = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let low = parent.child_octant(0); // -x, -y, -z
        assert_eq!(low.min, Vec3::ZERO);
        assert_eq!(low.max, Vec3::ONE);

        let high = parent.child_octant(7); // +x, +y, +z
        assert_eq!(high.min, Vec3::ONE);
        assert_eq!(high.max, Vec3::splat(2.0));
    }
}
