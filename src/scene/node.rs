//! Octree node record
//!
//! A node owns a cube-ish region, one entity bucket per list kind, up
//! to 8 lazily created children, and aggregate state (combined objects
//! box, max view distance, shadow/occluder flags) that stays
//! consistent from leaf to root across insertions.

use crate::core::types::Vec3;
use crate::math::Aabb;
use crate::scene::arena::{BucketList, EntityId};
use crate::scene::entity::{EntityKind, RenderFlags, LIST_COUNT};
use crate::visibility::backend::OcclusionState;

/// Handle to a node slot in the scene index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Shadow caster registered on a node by the compile step
#[derive(Clone, Debug)]
pub struct CasterInfo {
    pub entity: EntityId,
    pub kind: EntityKind,
    pub max_cast_dist: f32,
    pub world_box: Aabb,
    /// Bounding sphere; overridden by the instancing composite box for
    /// batched vegetation so the whole batch casts together
    pub sphere_center: Vec3,
    pub sphere_radius: f32,
}

/// One static-instancing batch: identical vegetation drawn as a unit
#[derive(Clone, Debug)]
pub struct InstanceBatch {
    /// Instance that carries the batch at draw time
    pub representative: EntityId,
    pub instances: Vec<EntityId>,
    pub composite_box: Aabb,
}

#[derive(Debug)]
pub struct OctreeNode {
    pub(crate) center: Vec3,
    /// Half-extent per axis
    pub(crate) axis_radius: Vec3,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: [Option<NodeId>; 8],
    pub(crate) buckets: [BucketList; LIST_COUNT],

    /// Union of every contained and descendant object box; reset
    /// sentinel while nothing was ever inserted below this node
    pub(crate) objects_box: Aabb,
    pub(crate) max_view_dist: f32,
    /// OR of contained occluder/shadow flags, monotone under insertion
    pub(crate) render_flags: RenderFlags,
    pub(crate) has_lights: bool,
    pub(crate) has_roads: bool,

    /// Per-object derived state is current
    pub(crate) compiled: bool,
    pub(crate) casters: Vec<CasterInfo>,
    /// Vegetation instances renderable this session; empty = rebuild
    pub(crate) vegetation_cache: Vec<EntityId>,
    pub(crate) instancing: Vec<InstanceBatch>,
    pub(crate) instancing_dirty: bool,

    // per-frame traversal caches
    pub(crate) occluded_frame_id: u64,
    pub(crate) last_vis_frame_id: u64,
    pub(crate) occlusion_state: OcclusionState,
}

impl OctreeNode {
    pub(crate) fn new(bounds: Aabb, parent: Option<NodeId>) -> Self {
        Self {
            center: bounds.center(),
            axis_radius: bounds.half_extent(),
            parent,
            children: [None; 8],
            buckets: [BucketList::default(); LIST_COUNT],
            objects_box: Aabb::reset(),
            max_view_dist: 0.0,
            render_flags: RenderFlags::NONE,
            has_lights: false,
            has_roads: false,
            compiled: false,
            casters: Vec::new(),
            vegetation_cache: Vec::new(),
            instancing: Vec::new(),
            instancing_dirty: true,
            occluded_frame_id: u64::MAX,
            last_vis_frame_id: u64::MAX,
            occlusion_state: OcclusionState::default(),
        }
    }

    /// Spatial cell covered by this node
    pub fn node_box(&self) -> Aabb {
        Aabb::from_center_half_extent(self.center, self.axis_radius)
    }

    /// Union of contained object boxes
    pub fn objects_box(&self) -> Aabb {
        self.objects_box
    }

    pub fn max_view_dist(&self) -> f32 {
        self.max_view_dist
    }

    pub fn render_flags(&self) -> RenderFlags {
        self.render_flags
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[Option<NodeId>; 8] {
        &self.children
    }

    pub fn casters(&self) -> &[CasterInfo] {
        &self.casters
    }

    /// Squared half-extent length; the per-object occlusion
    /// eligibility threshold compares against this
    pub fn radius_sq(&self) -> f32 {
        self.axis_radius.length_squared()
    }

    pub fn radius(&self) -> f32 {
        self.axis_radius.length()
    }

    /// Cell of child octant `i` (bit 2 = x, bit 1 = y, bit 0 = z)
    pub fn child_box(&self, i: usize) -> Aabb {
        let x = ((i >> 2) & 1) as f32;
        let y = ((i >> 1) & 1) as f32;
        let z = (i & 1) as f32;
        let min = self.center - self.axis_radius
            + Vec3::new(
                x * self.axis_radius.x,
                y * self.axis_radius.y,
                z * self.axis_radius.z,
            );
        Aabb::new(min, min + self.axis_radius)
    }

    /// Octant index for an object center relative to this node's center
    pub fn octant_index(&self, object_center: Vec3) -> usize {
        (((object_center.x > self.center.x) as usize) << 2)
            | (((object_center.y > self.center.y) as usize) << 1)
            | ((object_center.z > self.center.z) as usize)
    }

    pub fn has_objects(&self) -> bool {
        self.buckets.iter().any(|b| !b.is_empty())
    }

    pub fn has_children(&self) -> bool {
        self.children.iter().any(|c| c.is_some())
    }

    /// A node is reclaimable when it is a non-root with neither objects
    /// nor children
    pub fn is_empty(&self) -> bool {
        self.parent.is_some() && !self.has_children() && !self.has_objects()
    }

    pub(crate) fn bucket_mut(&mut self, list: usize) -> &mut BucketList {
        &mut self.buckets[list]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_box_octants() {
        let node = OctreeNode::new(Aabb::new(Vec3::ZERO, Vec3::splat(8.0)), None);

        let low = node.child_box(0);
        assert_eq!(low.min, Vec3::ZERO);
        assert_eq!(low.max, Vec3::splat(4.0));

        // bit 2 = +x
        let x_high = node.child_box(4);
        assert_eq!(x_high.min, Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(x_high.max, Vec3::new(8.0, 4.0, 4.0));

        let all_high = node.child_box(7);
        assert_eq!(all_high.min, Vec3::splat(4.0));
        assert_eq!(all_high.max, Vec3::splat(8.0));
    }

    #[test]
    fn test_octant_index_is_sign_function() {
        let node = OctreeNode::new(
            Aabb::from_center_half_extent(Vec3::splat(10.0), Vec3::splat(5.0)),
            None,
        );

        assert_eq!(node.octant_index(Vec3::new(12.0, 8.0, 8.0)), 0b100);
        assert_eq!(node.octant_index(Vec3::new(8.0, 12.0, 12.0)), 0b011);
        assert_eq!(node.octant_index(Vec3::splat(12.0)), 0b111);
        assert_eq!(node.octant_index(Vec3::splat(8.0)), 0b000);

        // Octant choice is deterministic in the input signs
        for _ in 0..3 {
            assert_eq!(node.octant_index(Vec3::new(12.0, 8.0, 12.0)), 0b101);
        }

        // child_box is consistent with octant_index
        let p = Vec3::new(12.0, 8.0, 12.0);
        let idx = node.octant_index(p);
        assert!(node.child_box(idx).contains_point(p));
    }

    #[test]
    fn test_empty_detection() {
        let root = OctreeNode::new(Aabb::new(Vec3::ZERO, Vec3::splat(8.0)), None);
        // Roots are never reclaimable
        assert!(!root.is_empty());

        let child = OctreeNode::new(Aabb::new(Vec3::ZERO, Vec3::splat(4.0)), Some(NodeId(0)));
        assert!(child.is_empty());
    }
}
