//! Rendering backend boundary
//!
//! The scene core never talks to a GPU. Visibility answers flow out
//! through [`SubmitSink`] and occlusion answers flow in through
//! [`OcclusionQuery`]; both are implemented by the integrator.

use crate::math::Aabb;
use crate::scene::arena::EntityId;
use crate::visibility::sorter::SortKey;

/// Per-node occlusion history, owned by the octree node and handed to
/// the backend on each node-level query.
#[derive(Clone, Copy, Debug, Default)]
pub struct OcclusionState {
    pub last_visible_frame: u64,
    pub last_occluded_frame: u64,
}

/// Occlusion answers from the backend's coverage/depth data
pub trait OcclusionQuery {
    /// Node-level query with history. Called once per node per frame.
    fn is_node_occluded(&self, bounds: &Aabb, distance: f32, state: &mut OcclusionState) -> bool;

    /// Stateless per-object query. Returns true when the box is
    /// (conservatively) visible.
    fn test_box_visible(&self, bounds: &Aabb, distance: f32) -> bool;
}

/// Backend that never reports occlusion; frustum and distance culling
/// still apply.
pub struct NoOcclusion;

impl OcclusionQuery for NoOcclusion {
    fn is_node_occluded(&self, _bounds: &Aabb, _distance: f32, _state: &mut OcclusionState) -> bool {
        false
    }

    fn test_box_visible(&self, _bounds: &Aabb, _distance: f32) -> bool {
        true
    }
}

/// Draw submission hooks, one per object category.
///
/// Submissions arrive in queue order; `key` carries the stable sort
/// order assigned at classification time. A submission the backend
/// cannot satisfy (missing technique, material or resource) should be
/// skipped with a logged warning, never escalated into a failure of
/// the pass.
pub trait SubmitSink {
    fn submit_vegetation(
        &mut self,
        entity: EntityId,
        bounds: &Aabb,
        distance: f32,
        per_object_occlusion: bool,
        key: SortKey,
    );

    fn submit_mesh(&mut self, entity: EntityId, bounds: &Aabb, distance: f32, key: SortKey);

    fn submit_decal_road(&mut self, entity: EntityId, bounds: &Aabb, distance: f32, key: SortKey);

    fn submit_common(&mut self, entity: EntityId, bounds: &Aabb, distance: f32, key: SortKey);
}
