//! Tunable scene index configuration
//!
//! All coefficients that shape subdivision, view-distance cutoffs and
//! occlusion granularity live here. The algorithms depend on the roles
//! of these values, not on the exact numbers; the defaults match a
//! large outdoor scene with ~8m minimum cells.

use serde::{Deserialize, Serialize};

/// Configuration for a [`SceneIndex`](crate::scene::SceneIndex)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Minimum node diameter; nodes at or below this size never subdivide
    pub node_min_size: f32,
    /// An object descends into a child only while its radius is below
    /// `node_radius * object_to_node_size_ratio`
    pub object_to_node_size_ratio: f32,
    /// Objects whose view distance reaches `node_radius * view_dist_ratio_vegetation`
    /// stay at the current node instead of descending
    pub view_dist_ratio_vegetation: f32,
    /// View distance ratio for generic meshes
    pub view_dist_ratio: f32,
    /// View distance ratio for non-directional lights
    pub view_dist_ratio_lights: f32,
    /// Lower clamp for computed view distances
    pub view_dist_min: f32,
    /// Bounding-radius clamp used by the generic mesh view-distance formula,
    /// so huge objects do not get unbounded view distances
    pub view_dist_comp_max_size: f32,
    /// Objects below this view distance never register as shadow casters
    pub min_shadow_caster_view_dist: f32,
    /// Shadow casting distance = view distance * this ratio
    pub shadows_cast_view_dist_ratio: f32,
    /// Nodes whose squared half-extent length exceeds this value squared
    /// run per-object occlusion queries; smaller nodes trust the
    /// node-level occlusion result
    pub per_object_occlusion_max_node_size: f32,
    /// Minimum identical vegetation instances in one node before they
    /// are batched into a single static-instancing draw unit
    pub static_instancing_min_instances: usize,
    /// Warn when an inserted bounding box extends beyond this magnitude
    pub huge_box_warning_size: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            node_min_size: 8.0,
            object_to_node_size_ratio: 1.0 / 8.0,
            view_dist_ratio_vegetation: 30.0,
            view_dist_ratio: 60.0,
            view_dist_ratio_lights: 50.0,
            view_dist_min: 0.0,
            view_dist_comp_max_size: 64.0,
            min_shadow_caster_view_dist: 8.0,
            shadows_cast_view_dist_ratio: 0.8,
            per_object_occlusion_max_node_size: 16.0,
            static_instancing_min_instances: 10,
            huge_box_warning_size: 1.0e10,
        }
    }
}
