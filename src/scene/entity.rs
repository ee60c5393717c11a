//! Renderable entity model
//!
//! Entities are a closed set of render-node kinds. The common state
//! (flags, layer, view-distance tuning) lives in [`SceneEntity`]; the
//! per-kind data and formulas (bounding box, position, max view
//! distance) live in [`EntityPayload`].

use crate::core::config::SceneConfig;
use crate::core::types::{Mat3, Mat4, Quat, Vec3};
use crate::math::Aabb;
use crate::scene::arena::EntityId;
use crate::scene::node::NodeId;

/// Handle into a [`MaterialTable`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// Material surface properties the scene index cares about
#[derive(Clone, Debug, Default)]
pub struct Material {
    pub name: String,
    /// Material cannot go through the deferred path (e.g. alpha blended)
    pub forward_rendering: bool,
    /// Material samples the nearest environment cubemap
    pub nearest_cubemap: bool,
}

/// Registry of materials referenced by entities
#[derive(Debug, Default)]
pub struct MaterialTable {
    materials: Vec<Material>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(material);
        id
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

/// Render flag bit-set carried by every entity
///
/// The low bits mirror what the persistence format stores; the spec
/// bits (see [`RenderFlags::min_spec`]) gate loading on lower-end
/// configurations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderFlags(pub u32);

impl RenderFlags {
    pub const HIDDEN: RenderFlags = RenderFlags(1 << 0);
    pub const GOOD_OCCLUDER: RenderFlags = RenderFlags(1 << 1);
    pub const CASTS_SHADOWS: RenderFlags = RenderFlags(1 << 2);
    /// Aggregate echo: some object below casts shadows
    pub const HAS_CAST_SHADOWS: RenderFlags = RenderFlags(1 << 3);
    pub const STATIC_INSTANCING: RenderFlags = RenderFlags(1 << 4);
    /// Spawned at runtime, never serialized
    pub const PROCEDURAL: RenderFlags = RenderFlags(1 << 5);
    pub const COLLISION_PROXY: RenderFlags = RenderFlags(1 << 6);
    pub const RAYCAST_PROXY: RenderFlags = RenderFlags(1 << 7);
    pub const OUTDOOR_ONLY: RenderFlags = RenderFlags(1 << 8);
    /// Uses the dedicated per-object shadow path, not the caster lists
    pub const PER_OBJECT_SHADOW: RenderFlags = RenderFlags(1 << 9);

    const MIN_SPEC_SHIFT: u32 = 10;
    const MIN_SPEC_MASK: u32 = 0b11 << Self::MIN_SPEC_SHIFT;

    pub const NONE: RenderFlags = RenderFlags(0);

    pub fn contains(&self, other: RenderFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: RenderFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: RenderFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: RenderFlags) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: RenderFlags, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Minimum hardware spec level this object requires (0 = any)
    pub fn min_spec(&self) -> u8 {
        ((self.0 & Self::MIN_SPEC_MASK) >> Self::MIN_SPEC_SHIFT) as u8
    }

    pub fn with_min_spec(mut self, spec: u8) -> Self {
        self.0 = (self.0 & !Self::MIN_SPEC_MASK)
            | (((spec as u32) << Self::MIN_SPEC_SHIFT) & Self::MIN_SPEC_MASK);
        self
    }
}

impl std::ops::BitOr for RenderFlags {
    type Output = RenderFlags;
    fn bitor(self, rhs: RenderFlags) -> RenderFlags {
        RenderFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for RenderFlags {
    type Output = RenderFlags;
    fn bitand(self, rhs: RenderFlags) -> RenderFlags {
        RenderFlags(self.0 & rhs.0)
    }
}

/// Derived state bits, recomputed by the compile step, never persisted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InternalFlags(pub u8);

impl InternalFlags {
    pub const REQUIRES_FORWARD_RENDERING: InternalFlags = InternalFlags(1 << 0);
    pub const REQUIRES_NEAREST_CUBEMAP: InternalFlags = InternalFlags(1 << 1);
    pub const ALL: InternalFlags = InternalFlags(0b11);

    pub fn contains(&self, other: InternalFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: InternalFlags) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Closed set of renderable node kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Mesh,
    Vegetation,
    Light,
    Decal,
    Road,
    WaterVolume,
    FogVolume,
    DistanceCloud,
    Rope,
    MergedMesh,
}

impl EntityKind {
    /// Which per-node bucket this kind is linked into
    pub fn list_kind(&self) -> ListKind {
        match self {
            EntityKind::Vegetation => ListKind::Vegetation,
            EntityKind::Mesh => ListKind::Meshes,
            EntityKind::Decal | EntityKind::Road => ListKind::DecalsAndRoads,
            _ => ListKind::Common,
        }
    }
}

/// Per-node object list buckets
///
/// Decals and roads share a list; lights and every remaining kind land
/// in the common list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListKind {
    Vegetation = 0,
    Meshes = 1,
    DecalsAndRoads = 2,
    Common = 3,
}

/// Number of per-node buckets
pub const LIST_COUNT: usize = 4;

/// Attachment subtree of a skinned mesh, walked by the compile step
/// to propagate forward/cubemap material requirements.
#[derive(Clone, Debug, Default)]
pub struct Attachment {
    pub material: Option<MaterialId>,
    pub children: Vec<Attachment>,
}

/// Light bounding shape, selecting the light-specific visibility test
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightShape {
    /// Sun-like light: visible from everywhere
    Directional,
    /// Punctual light bounded by its base radius sphere
    Point,
    /// Environment probe bounded by an oriented box of the probe extents
    DeferredCubemap { probe_extents: Vec3 },
    /// Area light bounded by an oriented box built from width/height
    Area { width: f32, height: f32 },
}

/// Per-kind entity data and formulas
#[derive(Clone, Debug)]
pub enum EntityPayload {
    Mesh {
        world_box: Aabb,
        /// Local-to-world transform, persisted with the mesh record
        transform: Mat4,
        /// Set for skinned/character content; enables attachment recursion
        skinned: bool,
        attachments: Vec<Attachment>,
    },
    Vegetation {
        position: Vec3,
        scale: f32,
        /// Radius of the vegetation group archetype
        group_radius: f32,
        group_id: u32,
        /// Group uses alpha blending, forcing the forward path
        group_alpha_blend: bool,
    },
    Light {
        origin: Vec3,
        orientation: Quat,
        base_radius: f32,
        shape: LightShape,
        /// Restricted to its own area; never leaks into indoor geometry
        this_area_only: bool,
        /// Registered outdoors (not bound to an indoor area)
        outdoor: bool,
        sort_priority: i32,
        probe_attenuation: f32,
    },
    Decal {
        position: Vec3,
        radius: f32,
    },
    Road {
        world_box: Aabb,
        vertices: Vec<Vec3>,
    },
    WaterVolume {
        world_box: Aabb,
        contour: Vec<Vec3>,
        fog_density: f32,
        fog_color: Vec3,
        caustic_intensity: f32,
    },
    FogVolume {
        world_box: Aabb,
    },
    DistanceCloud {
        position: Vec3,
        size_x: f32,
        size_z: f32,
    },
    Rope {
        world_box: Aabb,
    },
    MergedMesh {
        world_box: Aabb,
        instance_count: u32,
    },
}

impl EntityPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Mesh { .. } => EntityKind::Mesh,
            EntityPayload::Vegetation { .. } => EntityKind::Vegetation,
            EntityPayload::Light { .. } => EntityKind::Light,
            EntityPayload::Decal { .. } => EntityKind::Decal,
            EntityPayload::Road { .. } => EntityKind::Road,
            EntityPayload::WaterVolume { .. } => EntityKind::WaterVolume,
            EntityPayload::FogVolume { .. } => EntityKind::FogVolume,
            EntityPayload::DistanceCloud { .. } => EntityKind::DistanceCloud,
            EntityPayload::Rope { .. } => EntityKind::Rope,
            EntityPayload::MergedMesh { .. } => EntityKind::MergedMesh,
        }
    }

    /// World-space bounding box, recomputed from the per-kind data.
    ///
    /// Cheap for every kind; volume and point-shaped kinds derive it
    /// from their own parameters rather than a cached value.
    pub fn world_box(&self) -> Aabb {
        match self {
            EntityPayload::Mesh { world_box, .. }
            | EntityPayload::Road { world_box, .. }
            | EntityPayload::WaterVolume { world_box, .. }
            | EntityPayload::FogVolume { world_box }
            | EntityPayload::Rope { world_box }
            | EntityPayload::MergedMesh { world_box, .. } => *world_box,
            EntityPayload::Vegetation {
                position,
                scale,
                group_radius,
                ..
            } => {
                let r = group_radius * scale;
                Aabb::from_center_half_extent(*position, Vec3::splat(r.max(0.01)))
            }
            EntityPayload::Light {
                origin, base_radius, ..
            } => Aabb::from_center_half_extent(*origin, Vec3::splat(base_radius.max(0.01))),
            EntityPayload::Decal { position, radius } => {
                Aabb::from_center_half_extent(*position, Vec3::splat(radius.max(0.01)))
            }
            EntityPayload::DistanceCloud {
                position,
                size_x,
                size_z,
            } => Aabb::from_center_half_extent(
                *position,
                Vec3::new(*size_x, 1.0, *size_z),
            ),
        }
    }

    pub fn position(&self) -> Vec3 {
        match self {
            EntityPayload::Vegetation { position, .. }
            | EntityPayload::Decal { position, .. }
            | EntityPayload::DistanceCloud { position, .. } => *position,
            EntityPayload::Light { origin, .. } => *origin,
            _ => self.world_box().center(),
        }
    }

    /// Light orientation as a rotation matrix (identity for non-lights)
    pub fn orientation(&self) -> Mat3 {
        match self {
            EntityPayload::Light { orientation, .. } => Mat3::from_quat(*orientation),
            _ => Mat3::IDENTITY,
        }
    }
}

/// View distance for sun-like directional lights
const DIRECTIONAL_LIGHT_VIEW_DIST: f32 = 100_000.0;

/// A renderable entity registered in the scene index
///
/// `owning_node` and the `prev`/`next` links are intrusive index state:
/// an entity is linked into at most one node's bucket at a time.
#[derive(Clone, Debug)]
pub struct SceneEntity {
    pub payload: EntityPayload,
    pub render_flags: RenderFlags,
    pub layer_id: u16,
    /// Integrator-tunable view distance scale
    pub view_dist_mult: f32,
    pub lod_ratio: f32,
    pub shadow_lod_bias: i8,
    pub material: Option<MaterialId>,

    /// Effective world-space max view distance, refreshed by compile
    pub(crate) ws_max_view_dist: f32,
    pub(crate) internal_flags: InternalFlags,
    pub(crate) owning_node: Option<NodeId>,
    pub(crate) prev: Option<EntityId>,
    pub(crate) next: Option<EntityId>,
}

impl SceneEntity {
    pub fn new(payload: EntityPayload) -> Self {
        Self {
            payload,
            render_flags: RenderFlags::NONE,
            layer_id: 0,
            view_dist_mult: 1.0,
            lod_ratio: 1.0,
            shadow_lod_bias: 0,
            material: None,
            ws_max_view_dist: 0.0,
            internal_flags: InternalFlags::default(),
            owning_node: None,
            prev: None,
            next: None,
        }
    }

    pub fn with_flags(mut self, flags: RenderFlags) -> Self {
        self.render_flags = flags;
        self
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = Some(material);
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    /// Node currently owning this entity, if registered
    pub fn owning_node(&self) -> Option<NodeId> {
        self.owning_node
    }

    /// Effective world-space max view distance
    pub fn max_view_dist(&self) -> f32 {
        self.ws_max_view_dist
    }

    pub fn internal_flags(&self) -> InternalFlags {
        self.internal_flags
    }

    /// Type-specific view distance formula.
    ///
    /// Vegetation scales by group radius, meshes by clamped bounding
    /// radius, lights by base radius (directional lights are pinned to
    /// a large constant so they survive every distance cutoff).
    pub fn compute_max_view_dist(&self, cfg: &SceneConfig) -> f32 {
        let dist = match &self.payload {
            EntityPayload::Vegetation {
                scale, group_radius, ..
            } => group_radius * scale * cfg.view_dist_ratio_vegetation * self.view_dist_mult,
            EntityPayload::Light {
                shape, base_radius, ..
            } => match shape {
                LightShape::Directional => DIRECTIONAL_LIGHT_VIEW_DIST,
                _ => base_radius * cfg.view_dist_ratio_lights * self.view_dist_mult,
            },
            payload => {
                let radius = payload.world_box().radius().min(cfg.view_dist_comp_max_size);
                radius * cfg.view_dist_ratio * self.view_dist_mult
            }
        };
        dist.max(cfg.view_dist_min)
    }
}
