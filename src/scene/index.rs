//! Octree scene index
//!
//! Insertion walks from the root toward the smallest cell the object
//! fits, updating aggregate state on every node along the way so
//! ancestors stay consistent even mid-insertion. Removal unlinks in
//! place and defers node destruction to a batched reclamation pass.

use log::warn;

use crate::core::config::SceneConfig;
use crate::core::types::Vec3;
use crate::math::Aabb;
use crate::scene::arena::{EntityArena, EntityId};
use crate::scene::entity::{
    Attachment, EntityKind, EntityPayload, InternalFlags, LightShape, MaterialTable, RenderFlags,
    SceneEntity, LIST_COUNT,
};
use crate::scene::node::{CasterInfo, InstanceBatch, NodeId, OctreeNode};

/// Render flags that disqualify an object from the shadow caster lists
const CASTER_SKIP_FLAGS: RenderFlags = RenderFlags(
    RenderFlags::HIDDEN.0
        | RenderFlags::COLLISION_PROXY.0
        | RenderFlags::RAYCAST_PROXY.0
        | RenderFlags::STATIC_INSTANCING.0,
);

/// Aggregate flags propagated from objects onto nodes
const NODE_AGGREGATE_FLAGS: RenderFlags = RenderFlags(
    RenderFlags::GOOD_OCCLUDER.0 | RenderFlags::CASTS_SHADOWS.0 | RenderFlags::HAS_CAST_SHADOWS.0,
);

/// Object count filter for [`SceneIndex::object_count`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountFilter {
    All,
    ShadowCasters,
}

/// Octree spatial index over renderable entities, rooted at one sector
pub struct SceneIndex {
    cfg: SceneConfig,
    nodes: Vec<Option<OctreeNode>>,
    free_nodes: Vec<u32>,
    root: NodeId,
    entities: EntityArena,
    materials: MaterialTable,
    /// Nodes that became empty; destroyed in batches, never eagerly
    empty_nodes: Vec<NodeId>,
    bulk_loading: bool,
}

impl SceneIndex {
    /// Create an index covering one spatial sector
    pub fn new(sector_box: Aabb, cfg: SceneConfig) -> Self {
        let root_node = OctreeNode::new(sector_box, None);
        Self {
            cfg,
            nodes: vec![Some(root_node)],
            free_nodes: Vec::new(),
            root: NodeId(0),
            entities: EntityArena::new(),
            materials: MaterialTable::new(),
            empty_nodes: Vec::new(),
            bulk_loading: false,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.cfg
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialTable {
        &mut self.materials
    }

    pub fn entity(&self, id: EntityId) -> Option<&SceneEntity> {
        self.entities.get(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut SceneEntity> {
        self.entities.get_mut(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn entities(&self) -> &EntityArena {
        &self.entities
    }

    pub(crate) fn node(&self, id: NodeId) -> &OctreeNode {
        self.nodes[id.0 as usize].as_ref().expect("stale node id")
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut OctreeNode {
        self.nodes[id.0 as usize].as_mut().expect("stale node id")
    }

    pub fn try_node(&self, id: NodeId) -> Option<&OctreeNode> {
        self.nodes.get(id.0 as usize)?.as_ref()
    }

    /// Nodes currently enrolled for reclamation
    pub fn reclaim_queue(&self) -> &[NodeId] {
        &self.empty_nodes
    }

    // --- Bulk load state ---

    /// Defer per-object compile work and node reclamation while a level
    /// is streaming in
    pub fn begin_bulk_load(&mut self) {
        self.bulk_loading = true;
    }

    pub fn end_bulk_load(&mut self) {
        self.bulk_loading = false;
    }

    pub fn is_bulk_loading(&self) -> bool {
        self.bulk_loading
    }

    // --- Insertion ---

    /// Insert an entity into the smallest node it fits, linked at the
    /// back of its type bucket. Insertion always succeeds.
    pub fn insert(&mut self, entity: SceneEntity) -> EntityId {
        self.insert_impl(entity, false)
    }

    /// Insert with front-of-bucket linking (shadow priority)
    pub fn insert_front(&mut self, entity: SceneEntity) -> EntityId {
        self.insert_impl(entity, true)
    }

    fn insert_impl(&mut self, mut entity: SceneEntity, push_front: bool) -> EntityId {
        let obj_box = entity.payload.world_box();
        let obj_radius_sq = obj_box.radius_sq();
        let obj_center = obj_box.center();

        entity.ws_max_view_dist = entity.compute_max_view_dist(&self.cfg);
        let ws_max_view_dist = entity.ws_max_view_dist;

        let kind = entity.kind();
        let aggregate_flags = entity.render_flags & NODE_AGGREGATE_FLAGS;
        let is_light = kind == EntityKind::Light;
        let is_road = kind == EntityKind::Road;

        if cfg!(debug_assertions)
            && (obj_box.min.length() > self.cfg.huge_box_warning_size
                || obj_box.max.length() > self.cfg.huge_box_warning_size)
        {
            warn!(
                "huge object box inserted: kind {:?}, box {:?} -> {:?}",
                kind, obj_box.min, obj_box.max
            );
        }

        let id = self.entities.insert(entity);

        let node_min_size = self.cfg.node_min_size;
        let size_ratio = self.cfg.object_to_node_size_ratio;
        let view_dist_ratio = self.cfg.view_dist_ratio_vegetation;

        let mut current = self.root;
        loop {
            let descend = {
                let node = self.node_mut(current);

                node.objects_box.add_box(&obj_box);
                node.max_view_dist = node.max_view_dist.max(ws_max_view_dist);
                node.render_flags.insert(aggregate_flags);
                node.has_lights |= is_light;
                node.has_roads |= is_road;

                if node.axis_radius.x * 2.0 > node_min_size {
                    let node_radius = node.radius();
                    let rated = node_radius * size_ratio;
                    // descend only while the object is both small enough for
                    // a child cell and short-range enough not to need
                    // coarse-node visibility (a sun-like light stays at the
                    // root)
                    if obj_radius_sq < rated * rated
                        && ws_max_view_dist < node_radius * view_dist_ratio
                    {
                        Some(node.octant_index(obj_center))
                    } else {
                        None
                    }
                } else {
                    None
                }
            };

            match descend {
                Some(octant) => current = self.ensure_child(current, octant),
                None => break,
            }
        }

        let list = kind.list_kind() as usize;
        {
            let (nodes, entities) = (&mut self.nodes, &mut self.entities);
            let node = nodes[current.0 as usize].as_mut().expect("stale node id");
            if push_front {
                entities.link_front(node.bucket_mut(list), id);
            } else {
                entities.link_back(node.bucket_mut(list), id);
            }
        }
        self.entities.get_mut(id).unwrap().owning_node = Some(current);

        if self.bulk_loading {
            // defer the compile work; a node holding only lights keeps
            // its compiled state
            let node = self.node_mut(current);
            node.compiled = node.compiled && is_light;
        } else {
            self.update_entity(id);
        }

        let node = self.node_mut(current);
        node.vegetation_cache.clear();
        if kind == EntityKind::Vegetation {
            node.instancing_dirty = true;
        }

        id
    }

    pub(crate) fn ensure_child(&mut self, parent: NodeId, octant: usize) -> NodeId {
        if let Some(child) = self.node(parent).children[octant] {
            return child;
        }
        let bounds = self.node(parent).child_box(octant);
        let child = self.alloc_node(OctreeNode::new(bounds, Some(parent)));
        self.node_mut(parent).children[octant] = Some(child);
        child
    }

    fn alloc_node(&mut self, node: OctreeNode) -> NodeId {
        if let Some(idx) = self.free_nodes.pop() {
            self.nodes[idx as usize] = Some(node);
            NodeId(idx)
        } else {
            self.nodes.push(Some(node));
            NodeId(self.nodes.len() as u32 - 1)
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.nodes[id.0 as usize] = None;
        self.free_nodes.push(id.0);
    }

    // --- Removal & reclamation ---

    /// Unlink an entity from whichever node owns it and return it.
    ///
    /// The owning node is looked up from the entity, so the caller does
    /// not need to know where it lives. A node left with neither
    /// objects nor children is enrolled for batched reclamation; it is
    /// never destroyed synchronously here.
    pub fn remove(&mut self, id: EntityId) -> Option<SceneEntity> {
        let (kind, owning) = {
            let e = self.entities.get(id)?;
            (e.kind(), e.owning_node)
        };

        if let Some(node_id) = owning {
            let list = kind.list_kind() as usize;
            {
                let (nodes, entities) = (&mut self.nodes, &mut self.entities);
                let node = nodes[node_id.0 as usize].as_mut().expect("stale node id");
                entities.unlink(node.bucket_mut(list), id);
                node.casters.retain(|c| c.entity != id);
                if kind == EntityKind::Vegetation {
                    node.vegetation_cache.retain(|&v| v != id);
                    node.instancing.retain(|b| b.representative != id);
                    node.instancing_dirty = true;
                }
            }

            // premature pruning during bulk load would thrash nodes the
            // loader is about to refill
            if !self.bulk_loading
                && self.node(node_id).is_empty()
                && !self.empty_nodes.contains(&node_id)
            {
                self.empty_nodes.push(node_id);
            }
        }

        let mut entity = self.entities.remove(id)?;
        entity.owning_node = None;
        Some(entity)
    }

    /// Destroy enrolled nodes that are still empty. Parents emptied by
    /// the pass are enrolled and processed in the same call.
    /// Returns the number of reclaimed nodes.
    pub fn reclaim_empty_nodes(&mut self) -> usize {
        let mut reclaimed = 0;
        while let Some(node_id) = self.empty_nodes.pop() {
            let Some(node) = self.nodes.get(node_id.0 as usize).and_then(|n| n.as_ref()) else {
                continue;
            };
            if !node.is_empty() {
                continue;
            }
            let parent = node.parent.expect("empty node must have a parent");

            for slot in self.node_mut(parent).children.iter_mut() {
                if *slot == Some(node_id) {
                    *slot = None;
                }
            }
            self.free_node(node_id);
            reclaimed += 1;

            if self.node(parent).is_empty() && !self.empty_nodes.contains(&parent) {
                self.empty_nodes.push(parent);
            }
        }
        reclaimed
    }

    // --- Per-object derived state ---

    /// Recompute one entity's derived state and propagate aggregates
    /// upward, stopping at the first ancestor that already has
    /// equal-or-greater values.
    pub fn update_entity(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        if entity.render_flags.contains(RenderFlags::HIDDEN) {
            return;
        }
        let Some(node_id) = entity.owning_node else {
            return;
        };

        let kind = entity.kind();
        let flags = entity.render_flags;
        let world_box = entity.payload.world_box();
        let ws_max_view_dist = entity.compute_max_view_dist(&self.cfg);
        let internal = Self::derive_internal_flags(&self.materials, entity);

        {
            let e = self.entities.get_mut(id).unwrap();
            e.ws_max_view_dist = ws_max_view_dist;
            e.internal_flags = internal;
        }

        let registers_caster = flags.contains(RenderFlags::CASTS_SHADOWS)
            && !flags.intersects(CASTER_SKIP_FLAGS)
            && !flags.contains(RenderFlags::PER_OBJECT_SHADOW)
            && ws_max_view_dist > self.cfg.min_shadow_caster_view_dist
            && kind != EntityKind::Light;

        if registers_caster {
            let info = self.make_caster_info(id, kind, world_box, ws_max_view_dist, node_id);
            let node = self.node_mut(node_id);
            node.casters.retain(|c| c.entity != id);
            node.casters.push(info);
        }

        // short-circuiting fixed-point climb
        let mut current = Some(node_id);
        while let Some(nid) = current {
            let node = self.node_mut(nid);
            let mut advanced = false;
            if node.max_view_dist < ws_max_view_dist {
                node.max_view_dist = ws_max_view_dist;
                advanced = true;
            }
            if registers_caster && !node.render_flags.contains(RenderFlags::CASTS_SHADOWS) {
                node.render_flags
                    .insert(RenderFlags::CASTS_SHADOWS | RenderFlags::HAS_CAST_SHADOWS);
                advanced = true;
            }
            if !advanced {
                break;
            }
            current = node.parent;
        }
    }

    fn make_caster_info(
        &self,
        id: EntityId,
        kind: EntityKind,
        world_box: Aabb,
        ws_max_view_dist: f32,
        node_id: NodeId,
    ) -> CasterInfo {
        let mut info = CasterInfo {
            entity: id,
            kind,
            max_cast_dist: ws_max_view_dist * self.cfg.shadows_cast_view_dist_ratio,
            world_box,
            sphere_center: world_box.center(),
            sphere_radius: world_box.radius(),
        };
        // a batched vegetation representative casts for the whole batch
        if kind == EntityKind::Vegetation {
            if let Some(batch) = self
                .node(node_id)
                .instancing
                .iter()
                .find(|b| b.representative == id)
            {
                info.sphere_center = batch.composite_box.center();
                info.sphere_radius = batch.composite_box.radius();
                info.world_box = batch.composite_box;
            }
        }
        info
    }

    /// Material-derived forward/cubemap requirement flags.
    ///
    /// Skinned content recurses through its attachment tree, returning
    /// early once both flags are set.
    fn derive_internal_flags(materials: &MaterialTable, entity: &SceneEntity) -> InternalFlags {
        let mut out = InternalFlags::default();
        match entity.kind() {
            EntityKind::Light
            | EntityKind::Decal
            | EntityKind::Road
            | EntityKind::FogVolume
            | EntityKind::DistanceCloud => return out,
            _ => {}
        }

        let veg_alpha = matches!(
            entity.payload,
            EntityPayload::Vegetation {
                group_alpha_blend: true,
                ..
            }
        );
        if veg_alpha {
            out.insert(InternalFlags::REQUIRES_FORWARD_RENDERING);
        }

        if let Some(material) = entity.material.and_then(|m| materials.get(m)) {
            if material.forward_rendering {
                out.insert(InternalFlags::REQUIRES_FORWARD_RENDERING);
            }
            if material.nearest_cubemap {
                out.insert(InternalFlags::REQUIRES_NEAREST_CUBEMAP);
            }
        }

        if let EntityPayload::Mesh {
            skinned: true,
            attachments,
            ..
        } = &entity.payload
        {
            if !out.contains(InternalFlags::ALL) {
                Self::compile_attachments(materials, attachments, &mut out);
            }
        }
        out
    }

    fn compile_attachments(
        materials: &MaterialTable,
        attachments: &[Attachment],
        flags: &mut InternalFlags,
    ) {
        for attachment in attachments {
            if let Some(material) = attachment.material.and_then(|m| materials.get(m)) {
                if material.forward_rendering {
                    flags.insert(InternalFlags::REQUIRES_FORWARD_RENDERING);
                }
                if material.nearest_cubemap {
                    flags.insert(InternalFlags::REQUIRES_NEAREST_CUBEMAP);
                }
            }
            if flags.contains(InternalFlags::ALL) {
                return;
            }
            Self::compile_attachments(materials, &attachment.children, flags);
            if flags.contains(InternalFlags::ALL) {
                return;
            }
        }
    }

    /// Recompute all per-object derived state on one node: caster list,
    /// static instancing, internal flags and view distances.
    pub fn compile_node(&mut self, node_id: NodeId) {
        if self.node(node_id).instancing_dirty {
            self.update_static_instancing(node_id);
        }

        {
            let node = self.node_mut(node_id);
            node.casters.clear();
            node.vegetation_cache.clear();
        }

        let mut ids = Vec::new();
        for list in 0..LIST_COUNT {
            self.entities
                .collect_list(&self.node(node_id).buckets[list], &mut ids);
        }

        let mut max_view_dist: f32 = 0.0;
        let mut any_caster = false;

        for &id in &ids {
            let entity = self.entities.get(id).expect("linked entity missing");
            if entity.render_flags.contains(RenderFlags::HIDDEN) {
                continue;
            }

            let kind = entity.kind();
            let flags = entity.render_flags;
            let world_box = entity.payload.world_box();
            let ws_max_view_dist = entity.compute_max_view_dist(&self.cfg);
            let internal = Self::derive_internal_flags(&self.materials, entity);
            {
                let e = self.entities.get_mut(id).unwrap();
                e.ws_max_view_dist = ws_max_view_dist;
                e.internal_flags = internal;
            }

            if flags.contains(RenderFlags::CASTS_SHADOWS)
                && !flags.intersects(CASTER_SKIP_FLAGS)
                && !flags.contains(RenderFlags::PER_OBJECT_SHADOW)
                && ws_max_view_dist > self.cfg.min_shadow_caster_view_dist
                && kind != EntityKind::Light
            {
                let info = self.make_caster_info(id, kind, world_box, ws_max_view_dist, node_id);
                self.node_mut(node_id).casters.push(info);
                any_caster = true;
            }

            max_view_dist = max_view_dist.max(ws_max_view_dist);
        }

        if any_caster {
            let mut current = Some(node_id);
            while let Some(nid) = current {
                let node = self.node_mut(nid);
                if node.render_flags.contains(RenderFlags::CASTS_SHADOWS) {
                    break;
                }
                node.render_flags
                    .insert(RenderFlags::CASTS_SHADOWS | RenderFlags::HAS_CAST_SHADOWS);
                current = node.parent;
            }
        }

        if max_view_dist > self.node(node_id).max_view_dist {
            let mut current = Some(node_id);
            while let Some(nid) = current {
                let node = self.node_mut(nid);
                node.max_view_dist = node.max_view_dist.max(max_view_dist);
                current = node.parent;
            }
        }

        self.node_mut(node_id).compiled = true;
    }

    /// Group this node's vegetation by (group, material) and batch
    /// groups that meet the instancing threshold. Every instance past
    /// the first in a batch is flagged `STATIC_INSTANCING` and drops
    /// out of individual rendering and shadow casting.
    fn update_static_instancing(&mut self, node_id: NodeId) {
        let mut ids = Vec::new();
        self.entities.collect_list(
            &self.node(node_id).buckets[EntityKind::Vegetation.list_kind() as usize],
            &mut ids,
        );

        // clear previous batching
        for &id in &ids {
            self.entities
                .get_mut(id)
                .unwrap()
                .render_flags
                .remove(RenderFlags::STATIC_INSTANCING);
        }

        let mut groups: Vec<((u32, Option<u32>), Vec<EntityId>)> = Vec::new();
        for &id in &ids {
            let entity = self.entities.get(id).unwrap();
            if entity.render_flags.contains(RenderFlags::HIDDEN) {
                continue;
            }
            if let EntityPayload::Vegetation { group_id, .. } = entity.payload {
                let key = (group_id, entity.material.map(|m| m.0));
                match groups.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, members)) => members.push(id),
                    None => groups.push((key, vec![id])),
                }
            }
        }

        let mut batches = Vec::new();
        for (_, members) in groups {
            if members.len() <= self.cfg.static_instancing_min_instances {
                continue;
            }
            let mut composite = Aabb::reset();
            for &member in &members {
                let entity = self.entities.get(member).unwrap();
                composite.add_box(&entity.payload.world_box());
            }
            for &member in members.iter().skip(1) {
                self.entities
                    .get_mut(member)
                    .unwrap()
                    .render_flags
                    .insert(RenderFlags::STATIC_INSTANCING);
            }
            batches.push(InstanceBatch {
                representative: members[0],
                instances: members,
                composite_box: composite,
            });
        }

        let node = self.node_mut(node_id);
        node.instancing = batches;
        node.instancing_dirty = false;
        node.vegetation_cache.clear();
    }

    /// Rebuild the per-node vegetation render cache if it is empty
    pub(crate) fn ensure_vegetation_cache(&mut self, node_id: NodeId) {
        if !self.node(node_id).vegetation_cache.is_empty() {
            return;
        }
        let mut ids = Vec::new();
        self.entities.collect_list(
            &self.node(node_id).buckets[EntityKind::Vegetation.list_kind() as usize],
            &mut ids,
        );
        let mut cache = Vec::new();
        for id in ids {
            let entity = self.entities.get(id).unwrap();
            if entity
                .render_flags
                .intersects(RenderFlags::HIDDEN | RenderFlags::STATIC_INSTANCING)
            {
                continue;
            }
            cache.push(id);
        }
        self.node_mut(node_id).vegetation_cache = cache;
    }

    /// Invalidate compiled state on the node owning `id`
    pub fn mark_entity_uncompiled(&mut self, id: EntityId) {
        if let Some(node_id) = self.entities.get(id).and_then(|e| e.owning_node) {
            self.node_mut(node_id).compiled = false;
        }
    }

    /// Invalidate compiled state on every node
    pub fn mark_all_uncompiled(&mut self) {
        self.mark_uncompiled_rec(self.root);
    }

    fn mark_uncompiled_rec(&mut self, node_id: NodeId) {
        self.node_mut(node_id).compiled = false;
        for i in 0..8 {
            if let Some(child) = self.node(node_id).children[i] {
                self.mark_uncompiled_rec(child);
            }
        }
    }

    // --- Queries ---

    /// Collect entities of one kind, optionally overlap-filtered
    pub fn objects_by_type(&self, kind: EntityKind, bounds: Option<&Aabb>, out: &mut Vec<EntityId>) {
        self.objects_by_type_rec(self.root, kind, bounds, out);
    }

    fn objects_by_type_rec(
        &self,
        node_id: NodeId,
        kind: EntityKind,
        bounds: Option<&Aabb>,
        out: &mut Vec<EntityId>,
    ) {
        let node = self.node(node_id);
        if kind == EntityKind::Light && !node.has_lights {
            return;
        }
        if kind == EntityKind::Road && !node.has_roads {
            return;
        }
        if let Some(b) = bounds {
            if node.objects_box.is_reset() || !b.intersects(&node.objects_box) {
                return;
            }
        }

        let list = &node.buckets[kind.list_kind() as usize];
        let mut cur = list.head;
        while let Some(id) = cur {
            let entity = self.entities.get(id).expect("linked entity missing");
            if entity.kind() == kind {
                let matched = match bounds {
                    Some(b) => b.intersects(&entity.payload.world_box()),
                    None => true,
                };
                if matched {
                    out.push(id);
                }
            }
            cur = entity.next;
        }

        for i in 0..8 {
            if let Some(child) = node.children[i] {
                self.objects_by_type_rec(child, kind, bounds, out);
            }
        }
    }

    /// Collect entities carrying every flag in `mask`
    pub fn objects_by_flags(&self, mask: RenderFlags, out: &mut Vec<EntityId>) {
        self.objects_by_flags_rec(self.root, mask, out);
    }

    fn objects_by_flags_rec(&self, node_id: NodeId, mask: RenderFlags, out: &mut Vec<EntityId>) {
        let node = self.node(node_id);
        for list in &node.buckets {
            let mut cur = list.head;
            while let Some(id) = cur {
                let entity = self.entities.get(id).expect("linked entity missing");
                if entity.render_flags.contains(mask) {
                    out.push(id);
                }
                cur = entity.next;
            }
        }
        for i in 0..8 {
            if let Some(child) = node.children[i] {
                self.objects_by_flags_rec(child, mask, out);
            }
        }
    }

    /// Collect all entities, optionally overlap-filtered
    pub fn objects_in_box(&self, bounds: Option<&Aabb>, out: &mut Vec<EntityId>) {
        self.objects_in_box_rec(self.root, bounds, out);
    }

    fn objects_in_box_rec(&self, node_id: NodeId, bounds: Option<&Aabb>, out: &mut Vec<EntityId>) {
        let node = self.node(node_id);
        if let Some(b) = bounds {
            if node.objects_box.is_reset() || !b.intersects(&node.objects_box) {
                return;
            }
        }
        for list in &node.buckets {
            let mut cur = list.head;
            while let Some(id) = cur {
                let entity = self.entities.get(id).expect("linked entity missing");
                let matched = match bounds {
                    Some(b) => b.intersects(&entity.payload.world_box()),
                    None => true,
                };
                if matched {
                    out.push(id);
                }
                cur = entity.next;
            }
        }
        for i in 0..8 {
            if let Some(child) = node.children[i] {
                self.objects_in_box_rec(child, bounds, out);
            }
        }
    }

    /// True if any entity of `kind` overlaps `bounds`
    pub fn is_type_in_box(&self, kind: EntityKind, bounds: &Aabb) -> bool {
        self.is_type_in_box_rec(self.root, kind, bounds)
    }

    fn is_type_in_box_rec(&self, node_id: NodeId, kind: EntityKind, bounds: &Aabb) -> bool {
        let node = self.node(node_id);
        if node.objects_box.is_reset() || !bounds.intersects(&node.objects_box) {
            return false;
        }
        if kind == EntityKind::Road && !node.has_roads {
            return false;
        }
        if kind == EntityKind::Light && !node.has_lights {
            return false;
        }

        let list = &node.buckets[kind.list_kind() as usize];
        let mut cur = list.head;
        while let Some(id) = cur {
            let entity = self.entities.get(id).expect("linked entity missing");
            if entity.kind() == kind && bounds.intersects(&entity.payload.world_box()) {
                return true;
            }
            cur = entity.next;
        }

        (0..8).any(|i| {
            node.children[i]
                .map(|child| self.is_type_in_box_rec(child, kind, bounds))
                .unwrap_or(false)
        })
    }

    /// Count registered entities, optionally restricted to shadow casters
    pub fn object_count(&self, filter: CountFilter) -> usize {
        let mut count = 0;
        for (_, entity) in self.entities.iter() {
            if entity.owning_node.is_none() {
                continue;
            }
            match filter {
                CountFilter::All => count += 1,
                CountFilter::ShadowCasters => {
                    if entity.render_flags.contains(RenderFlags::CASTS_SHADOWS) {
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// Deepest node whose cell fully contains `bounds`
    pub fn find_node_containing_box(&self, bounds: &Aabb) -> Option<NodeId> {
        self.find_node_rec(self.root, bounds)
    }

    fn find_node_rec(&self, node_id: NodeId, bounds: &Aabb) -> Option<NodeId> {
        let node = self.node(node_id);
        if !node.node_box().contains_aabb(bounds) {
            return None;
        }
        for i in 0..8 {
            if let Some(child) = node.children[i] {
                if let Some(found) = self.find_node_rec(child, bounds) {
                    return Some(found);
                }
            }
        }
        Some(node_id)
    }

    /// Highest-priority environment probe whose oriented box contains
    /// the center of `bounds`. Disabled probes (zero attenuation) are
    /// skipped so a stale probe never wins over a live one.
    pub fn nearest_cube_probe(&self, bounds: &Aabb) -> Option<EntityId> {
        let mut best: Option<(EntityId, i32)> = None;
        self.nearest_cube_probe_rec(self.root, bounds, &mut best);
        best.map(|(id, _)| id)
    }

    fn nearest_cube_probe_rec(
        &self,
        node_id: NodeId,
        bounds: &Aabb,
        best: &mut Option<(EntityId, i32)>,
    ) {
        let node = self.node(node_id);
        if !node.has_lights {
            return;
        }
        if node.objects_box.is_reset() || !bounds.intersects(&node.objects_box) {
            return;
        }

        let center = bounds.center();
        let list = &node.buckets[EntityKind::Light.list_kind() as usize];
        let mut cur = list.head;
        while let Some(id) = cur {
            let entity = self.entities.get(id).expect("linked entity missing");
            if let EntityPayload::Light {
                origin,
                shape: LightShape::DeferredCubemap { probe_extents },
                sort_priority,
                probe_attenuation,
                ..
            } = &entity.payload
            {
                if *probe_attenuation > 0.0 && bounds.intersects(&entity.payload.world_box()) {
                    let obb = crate::math::Obb::from_aabb(
                        entity.payload.orientation(),
                        Aabb::from_center_half_extent(Vec3::ZERO, *probe_extents),
                    );
                    if obb.contains_point(*origin, center)
                        && best.map(|(_, p)| *sort_priority > p).unwrap_or(true)
                    {
                        *best = Some((id, *sort_priority));
                    }
                }
            }
            cur = entity.next;
        }

        for i in 0..8 {
            if let Some(child) = node.children[i] {
                self.nearest_cube_probe_rec(child, bounds, best);
            }
        }
    }

    /// Union of all shadow caster boxes, optionally overlap-filtered
    pub fn shadow_casters_box(&mut self, bounds: Option<&Aabb>) -> Aabb {
        self.shadow_casters_box_rec(self.root, bounds)
    }

    fn shadow_casters_box_rec(&mut self, node_id: NodeId, bounds: Option<&Aabb>) -> Aabb {
        if !self.node(node_id).compiled {
            self.compile_node(node_id);
        }

        let mut result = Aabb::reset();
        let node = self.node(node_id);
        let overlaps = match bounds {
            Some(b) => !node.objects_box.is_reset() && b.intersects(&node.objects_box),
            None => true,
        };
        if !overlaps {
            return result;
        }

        for caster in &node.casters {
            let keep = match bounds {
                Some(b) => b.intersects(&caster.world_box),
                None => true,
            };
            if keep {
                result.add_box(&caster.world_box);
            }
        }

        let children = node.children.to_owned();
        for child in children.into_iter().flatten() {
            let child_box = self.shadow_casters_box_rec(child, bounds);
            if !child_box.is_reset() {
                result.add_box(&child_box);
            }
        }
        result
    }

    // --- Post-load fixup ---

    /// Drop empty subtrees and rebuild aggregate boxes and view
    /// distances bottom-up. Used after a persistence load.
    pub fn cleanup_tree(&mut self) {
        self.cleanup_rec(self.root);
    }

    fn cleanup_rec(&mut self, node_id: NodeId) -> bool {
        let mut child_content = false;
        for i in 0..8 {
            if let Some(child) = self.node(node_id).children[i] {
                if self.cleanup_rec(child) {
                    child_content = true;
                } else {
                    self.node_mut(node_id).children[i] = None;
                    self.free_node(child);
                }
            }
        }

        let mut ids = Vec::new();
        for list in 0..LIST_COUNT {
            self.entities
                .collect_list(&self.node(node_id).buckets[list], &mut ids);
        }

        let mut objects_box = Aabb::reset();
        let mut max_view_dist: f32 = 0.0;
        for &id in &ids {
            let ws = {
                let entity = self.entities.get(id).expect("linked entity missing");
                objects_box.add_box(&entity.payload.world_box());
                entity.compute_max_view_dist(&self.cfg)
            };
            self.entities.get_mut(id).unwrap().ws_max_view_dist = ws;
            max_view_dist = max_view_dist.max(ws);
        }

        for i in 0..8 {
            if let Some(child) = self.node(node_id).children[i] {
                let child_node = self.node(child);
                max_view_dist = max_view_dist.max(child_node.max_view_dist);
                if !child_node.objects_box.is_reset() {
                    let b = child_node.objects_box;
                    objects_box.add_box(&b);
                }
            }
        }

        let node = self.node_mut(node_id);
        node.objects_box = objects_box;
        node.max_view_dist = max_view_dist;

        child_content || self.node(node_id).has_objects()
    }
}
