//! Culling camera

use crate::core::types::{Mat4, Vec3};
use crate::math::Frustum;

/// Camera state the visibility pass needs: frustum, position and the
/// zoom factor that makes view-distance cutoffs zoom-independent.
#[derive(Clone, Copy, Debug)]
pub struct CullCamera {
    pub frustum: Frustum,
    pub position: Vec3,
    /// Scales distances before view-distance comparison; > 1 when
    /// zoomed in, so distant objects survive the cutoff
    pub zoom_factor: f32,
}

impl CullCamera {
    pub fn from_view_projection(view_projection: &Mat4, position: Vec3) -> Self {
        Self {
            frustum: Frustum::from_view_projection(view_projection),
            position,
            zoom_factor: 1.0,
        }
    }

    pub fn with_zoom(mut self, zoom_factor: f32) -> Self {
        self.zoom_factor = zoom_factor;
        self
    }
}
