//! Oriented bounding box
//!
//! Used by the light visibility tests: cubemap probes and area lights
//! are bounded by a rotated box rather than a world-aligned one.

use crate::core::types::{Mat3, Vec3};
use super::aabb::Aabb;
use super::frustum::Frustum;

/// Oriented bounding box: a local-space AABB plus a rotation
#[derive(Clone, Copy, Debug)]
pub struct Obb {
    /// Rotation from local space to world space
    pub orientation: Mat3,
    /// Local-space extents around the origin
    pub local: Aabb,
}

impl Obb {
    /// Build an OBB from a local AABB and an orientation matrix
    pub fn from_aabb(orientation: Mat3, local: Aabb) -> Self {
        Self { orientation, local }
    }

    /// Compute the 8 world-space corners for a given world position
    pub fn corners(&self, position: Vec3) -> [Vec3; 8] {
        let mut out = [Vec3::ZERO; 8];
        for (i, corner) in out.iter_mut().enumerate() {
            let local = Vec3::new(
                if i & 4 != 0 { self.local.max.x } else { self.local.min.x },
                if i & 2 != 0 { self.local.max.y } else { self.local.min.y },
                if i & 1 != 0 { self.local.max.z } else { self.local.min.z },
            );
            *corner = position + self.orientation * local;
        }
        out
    }

    /// Conservative frustum test: visible unless all corners are
    /// behind one frustum plane.
    pub fn is_visible(&self, position: Vec3, frustum: &Frustum) -> bool {
        let corners = self.corners(position);
        for plane in &frustum.planes {
            if corners.iter().all(|&c| plane.distance_to_point(c) < 0.0) {
                return false;
            }
        }
        true
    }

    /// True if a world-space point falls inside the box
    pub fn contains_point(&self, position: Vec3, point: Vec3) -> bool {
        // Transpose of a rotation is its inverse
        let local = self.orientation.transpose() * (point - position);
        self.local.contains_point(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Mat4;

    fn forward_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 1.0, 0.1, 100.0);
        Frustum::from_view_projection(&(proj * Mat4::IDENTITY))
    }

    #[test]
    fn test_obb_visible_in_front() {
        let obb = Obb::from_aabb(
            Mat3::IDENTITY,
            Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
        );
        assert!(obb.is_visible(Vec3::new(0.0, 0.0, -10.0), &forward_frustum()));
    }

    #[test]
    fn test_obb_culled_behind() {
        let obb = Obb::from_aabb(
            Mat3::IDENTITY,
            Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
        );
        assert!(!obb.is_visible(Vec3::new(0.0, 0.0, 10.0), &forward_frustum()));
    }

    #[test]
    fn test_rotated_obb_still_visible() {
        let rot = Mat3::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let obb = Obb::from_aabb(rot, Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0)));
        assert!(obb.is_visible(Vec3::new(0.0, 0.0, -10.0), &forward_frustum()));
    }

    #[test]
    fn test_contains_point_rotated() {
        let rot = Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let obb = Obb::from_aabb(
            rot,
            Aabb::new(Vec3::new(-2.0, -1.0, -1.0), Vec3::new(2.0, 1.0, 1.0)),
        );
        // After a 90 degree roll the long axis points along Y
        assert!(obb.contains_point(Vec3::ZERO, Vec3::new(0.0, 1.8, 0.0)));
        assert!(!obb.contains_point(Vec3::ZERO, Vec3::new(1.8, 0.0, 0.0)));
    }
}
