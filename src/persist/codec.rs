//! Aligned tagged-record stream codec
//!
//! `save_index` walks every bucket of every node and emits, per
//! serializable entity, a `(u32 tag, fixed record, variable tail)`
//! run, padded to 4 bytes with a sentinel so the reader can assert
//! alignment. Node chunks carry a child mask; children follow their
//! parent in index order. There is no table of contents and no record
//! length prefix beyond what the fixed structs embed.

use bytemuck::Pod;
use log::warn;

use crate::core::error::Error;
use crate::core::types::{Mat4, Result, Vec3};
use crate::math::Aabb;
use crate::scene::entity::{
    EntityKind, EntityPayload, MaterialId, RenderFlags, SceneEntity,
};
use crate::scene::index::SceneIndex;
use crate::scene::node::NodeId;

use super::records::{
    CommonRecord, DecalRecord, DistanceCloudRecord, MeshRecord, RoadRecord, VegetationRecord,
    WaterVolumeRecord, TAG_DECAL, TAG_DISTANCE_CLOUD, TAG_MESH, TAG_ROAD, TAG_VEGETATION,
    TAG_WATER_VOLUME,
};

pub const CHUNK_VERSION: u32 = 1;

/// Pad byte; the reader asserts it to catch desynced streams
const PAD_SENTINEL: u8 = 0xCD;

/// Per-node chunk header
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, bytemuck::Zeroable)]
pub struct NodeChunk {
    pub version: u32,
    pub box_min: [f32; 3],
    pub box_max: [f32; 3],
    pub child_mask: u32,
    pub objects_block_size: u32,
}

/// Append-only aligned byte sink
#[derive(Debug, Default)]
pub struct ChunkWriter {
    buf: Vec<u8>,
}

impl ChunkWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.buf.extend_from_slice(bytemuck::bytes_of(value));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_vertices(&mut self, vertices: &[Vec3]) {
        for v in vertices {
            self.write_pod(&v.to_array());
        }
    }

    /// Pad to the next 4-byte boundary with the sentinel
    pub fn align4(&mut self) {
        while self.buf.len() % 4 != 0 {
            self.buf.push(PAD_SENTINEL);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequential reader over a byte range
#[derive(Debug)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_pod<T: Pod>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        if self.remaining() < size {
            return Err(Error::Corrupt(format!(
                "truncated stream: need {size} bytes, {} left",
                self.remaining()
            )));
        }
        let value = bytemuck::pod_read_unaligned(&self.data[self.pos..self.pos + size]);
        self.pos += size;
        Ok(value)
    }

    pub fn read_vertices(&mut self, count: usize) -> Result<Vec<Vec3>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let v: [f32; 3] = self.read_pod()?;
            out.push(Vec3::from_array(v));
        }
        Ok(out)
    }

    /// Consume padding up to the next 4-byte boundary, asserting the
    /// sentinel; a mismatch means the stream lost alignment.
    pub fn align4(&mut self) -> Result<()> {
        while self.pos % 4 != 0 {
            if self.is_empty() {
                return Err(Error::Corrupt("truncated stream in padding".into()));
            }
            let byte = self.data[self.pos];
            if byte != PAD_SENTINEL {
                return Err(Error::Corrupt(format!(
                    "bad pad byte {byte:#04x} at offset {}",
                    self.pos
                )));
            }
            self.pos += 1;
        }
        Ok(())
    }

    /// Split off the next `len` bytes as an independent reader
    pub fn sub_reader(&mut self, len: usize) -> Result<ChunkReader<'a>> {
        if self.remaining() < len {
            return Err(Error::Corrupt(format!(
                "truncated stream: need {len}-byte block, {} left",
                self.remaining()
            )));
        }
        let sub = ChunkReader::new(&self.data[self.pos..self.pos + len]);
        self.pos += len;
        Ok(sub)
    }
}

/// Load-side filters
#[derive(Clone, Copy, Debug)]
pub struct LoadParams<'a> {
    /// Records demanding a higher spec than this are consumed but
    /// produce no entity
    pub spec_level: u8,
    pub layers: Option<&'a LayerVisibility>,
}

impl Default for LoadParams<'_> {
    fn default() -> Self {
        Self {
            spec_level: 3,
            layers: None,
        }
    }
}

/// Layer visibility translation table supplied by the caller
#[derive(Clone, Debug, Default)]
pub struct LayerVisibility {
    pub visible: Vec<bool>,
    pub remap: Vec<u16>,
}

impl LayerVisibility {
    pub fn is_visible(&self, layer: u16) -> bool {
        self.visible.get(layer as usize).copied().unwrap_or(false)
    }

    pub fn remap(&self, layer: u16) -> u16 {
        self.remap.get(layer as usize).copied().unwrap_or(layer)
    }
}

fn is_serializable(entity: &SceneEntity) -> bool {
    if entity.render_flags.contains(RenderFlags::PROCEDURAL) {
        return false;
    }
    matches!(
        entity.kind(),
        EntityKind::Mesh
            | EntityKind::Vegetation
            | EntityKind::Decal
            | EntityKind::Road
            | EntityKind::WaterVolume
            | EntityKind::DistanceCloud
    )
}

fn common_record(entity: &SceneEntity) -> CommonRecord {
    let world_box = entity.payload.world_box();
    CommonRecord {
        box_min: world_box.min.to_array(),
        box_max: world_box.max.to_array(),
        render_flags: entity.render_flags.0,
        view_dist_mult: entity.view_dist_mult,
        lod_ratio: entity.lod_ratio,
        shadow_lod_bias: entity.shadow_lod_bias as i32,
        layer_id: entity.layer_id as u32,
        material: entity.material.map(|m| m.0 as i32).unwrap_or(-1),
    }
}

fn write_entity(w: &mut ChunkWriter, entity: &SceneEntity) {
    let common = common_record(entity);
    match &entity.payload {
        EntityPayload::Mesh { transform, .. } => {
            w.write_pod(&TAG_MESH);
            w.write_pod(&MeshRecord {
                common,
                transform: transform.to_cols_array(),
            });
        }
        EntityPayload::Vegetation {
            position,
            scale,
            group_radius,
            group_id,
            group_alpha_blend,
        } => {
            w.write_pod(&TAG_VEGETATION);
            w.write_pod(&VegetationRecord {
                common,
                position: position.to_array(),
                scale: *scale,
                group_id: *group_id,
                group_radius: *group_radius,
                group_alpha_blend: *group_alpha_blend as u32,
            });
        }
        EntityPayload::Decal { position, radius } => {
            w.write_pod(&TAG_DECAL);
            w.write_pod(&DecalRecord {
                common,
                position: position.to_array(),
                radius: *radius,
            });
        }
        EntityPayload::Road { vertices, .. } => {
            w.write_pod(&TAG_ROAD);
            w.write_pod(&RoadRecord {
                common,
                vertex_count: vertices.len() as u32,
            });
            w.write_vertices(vertices);
            w.align4();
        }
        EntityPayload::WaterVolume {
            contour,
            fog_density,
            fog_color,
            caustic_intensity,
            ..
        } => {
            w.write_pod(&TAG_WATER_VOLUME);
            w.write_pod(&WaterVolumeRecord {
                common,
                fog_density: *fog_density,
                fog_color: fog_color.to_array(),
                caustic_intensity: *caustic_intensity,
                contour_count: contour.len() as u32,
            });
            w.write_vertices(contour);
            w.align4();
        }
        EntityPayload::DistanceCloud {
            position,
            size_x,
            size_z,
        } => {
            w.write_pod(&TAG_DISTANCE_CLOUD);
            w.write_pod(&DistanceCloudRecord {
                common,
                position: position.to_array(),
                size_x: *size_x,
                size_z: *size_z,
            });
        }
        // runtime-registered kinds never persist
        _ => {}
    }
}

/// Serialize the whole index to a byte stream
pub fn save_index(scene: &SceneIndex) -> Vec<u8> {
    let mut out = Vec::new();
    save_node_rec(scene, scene.root(), &mut out);
    out
}

fn save_node_rec(scene: &SceneIndex, node_id: NodeId, out: &mut Vec<u8>) {
    let node = scene.node(node_id);

    let mut objects = ChunkWriter::new();
    for bucket in &node.buckets {
        let mut cur = bucket.head;
        while let Some(id) = cur {
            let entity = scene.entity(id).expect("linked entity missing");
            cur = entity.next;
            if is_serializable(entity) {
                write_entity(&mut objects, entity);
            }
        }
    }

    let node_box = node.node_box();
    let mut child_mask = 0u32;
    for (i, child) in node.children().iter().enumerate() {
        if child.is_some() {
            child_mask |= 1 << i;
        }
    }

    let chunk = NodeChunk {
        version: CHUNK_VERSION,
        box_min: node_box.min.to_array(),
        box_max: node_box.max.to_array(),
        child_mask,
        objects_block_size: objects.len() as u32,
    };
    out.extend_from_slice(bytemuck::bytes_of(&chunk));
    out.extend_from_slice(objects.as_slice());

    for child in node.children().iter().flatten() {
        save_node_rec(scene, *child, out);
    }
}

/// Read a byte range produced by [`save_index`] into `scene`,
/// re-registering each surviving entity. Returns the number of node
/// chunks consumed.
///
/// Filtered records (spec level, hidden layers, unresolved decal or
/// cloud materials) are fully consumed so the stream stays in sync,
/// but produce no entity.
pub fn load_index(scene: &mut SceneIndex, data: &[u8], params: &LoadParams) -> Result<usize> {
    let mut reader = ChunkReader::new(data);
    scene.begin_bulk_load();
    let root = scene.root();
    let loaded = load_node_rec(scene, root, &mut reader, params);
    scene.end_bulk_load();
    let nodes = loaded?;
    scene.cleanup_tree();
    Ok(nodes)
}

fn load_node_rec(
    scene: &mut SceneIndex,
    node_id: NodeId,
    reader: &mut ChunkReader,
    params: &LoadParams,
) -> Result<usize> {
    let chunk: NodeChunk = reader.read_pod()?;
    if chunk.version != CHUNK_VERSION {
        return Err(Error::ChunkVersion(chunk.version));
    }

    let mut objects = reader.sub_reader(chunk.objects_block_size as usize)?;
    while !objects.is_empty() {
        load_record(scene, &mut objects, params)?;
    }

    let mut nodes = 1;
    for i in 0..8 {
        if chunk.child_mask & (1 << i) != 0 {
            let child = scene.ensure_child(node_id, i);
            nodes += load_node_rec(scene, child, reader, params)?;
        }
    }
    Ok(nodes)
}

fn load_record(scene: &mut SceneIndex, r: &mut ChunkReader, params: &LoadParams) -> Result<()> {
    let tag: u32 = r.read_pod()?;
    match tag {
        TAG_MESH => {
            let rec: MeshRecord = r.read_pod()?;
            let payload = EntityPayload::Mesh {
                world_box: Aabb::new(
                    Vec3::from_array(rec.common.box_min),
                    Vec3::from_array(rec.common.box_max),
                ),
                transform: Mat4::from_cols_array(&rec.transform),
                skinned: false,
                attachments: Vec::new(),
            };
            register(scene, payload, &rec.common, params);
        }
        TAG_VEGETATION => {
            let rec: VegetationRecord = r.read_pod()?;
            let payload = EntityPayload::Vegetation {
                position: Vec3::from_array(rec.position),
                scale: rec.scale,
                group_radius: rec.group_radius,
                group_id: rec.group_id,
                group_alpha_blend: rec.group_alpha_blend != 0,
            };
            register(scene, payload, &rec.common, params);
        }
        TAG_DECAL => {
            let rec: DecalRecord = r.read_pod()?;
            let payload = EntityPayload::Decal {
                position: Vec3::from_array(rec.position),
                radius: rec.radius,
            };
            register(scene, payload, &rec.common, params);
        }
        TAG_ROAD => {
            let rec: RoadRecord = r.read_pod()?;
            let vertices = r.read_vertices(rec.vertex_count as usize)?;
            r.align4()?;
            let payload = EntityPayload::Road {
                world_box: Aabb::new(
                    Vec3::from_array(rec.common.box_min),
                    Vec3::from_array(rec.common.box_max),
                ),
                vertices,
            };
            register(scene, payload, &rec.common, params);
        }
        TAG_WATER_VOLUME => {
            let rec: WaterVolumeRecord = r.read_pod()?;
            let contour = r.read_vertices(rec.contour_count as usize)?;
            r.align4()?;
            let payload = EntityPayload::WaterVolume {
                world_box: Aabb::new(
                    Vec3::from_array(rec.common.box_min),
                    Vec3::from_array(rec.common.box_max),
                ),
                contour,
                fog_density: rec.fog_density,
                fog_color: Vec3::from_array(rec.fog_color),
                caustic_intensity: rec.caustic_intensity,
            };
            register(scene, payload, &rec.common, params);
        }
        TAG_DISTANCE_CLOUD => {
            let rec: DistanceCloudRecord = r.read_pod()?;
            let payload = EntityPayload::DistanceCloud {
                position: Vec3::from_array(rec.position),
                size_x: rec.size_x,
                size_z: rec.size_z,
            };
            register(scene, payload, &rec.common, params);
        }
        other => {
            // skipping needs type-specific tail knowledge; an unknown
            // tag means the stream cannot be resynced
            return Err(Error::Corrupt(format!("unknown record tag {other}")));
        }
    }
    Ok(())
}

/// Apply load filters and register the entity. The record bytes are
/// already consumed, so dropping here never desyncs the stream.
fn register(
    scene: &mut SceneIndex,
    payload: EntityPayload,
    common: &CommonRecord,
    params: &LoadParams,
) {
    let kind = payload.kind();
    let flags = RenderFlags(common.render_flags);

    let spec = flags.min_spec();
    if spec != 0 && spec > params.spec_level {
        return;
    }

    let mut layer = common.layer_id as u16;
    if let Some(layers) = params.layers {
        if !layers.is_visible(layer) {
            return;
        }
        layer = layers.remap(layer);
    }

    let material = if common.material >= 0 {
        let id = MaterialId(common.material as u32);
        if scene.materials().get(id).is_some() {
            Some(id)
        } else if matches!(kind, EntityKind::Decal | EntityKind::DistanceCloud) {
            // absent beats wrong for projected content
            warn!(
                "unresolved material index {} for {kind:?}; dropping object",
                common.material
            );
            return;
        } else {
            warn!(
                "unresolved material index {} for {kind:?}; using fallback",
                common.material
            );
            None
        }
    } else {
        None
    };

    let mut entity = SceneEntity::new(payload);
    entity.render_flags = flags;
    entity.layer_id = layer;
    entity.view_dist_mult = common.view_dist_mult;
    entity.lod_ratio = common.lod_ratio;
    entity.shadow_lod_bias = common.shadow_lod_bias as i8;
    entity.material = material;
    scene.insert(entity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SceneConfig;
    use crate::core::types::Quat;
    use crate::scene::entity::{LightShape, Material};

    fn empty_scene() -> SceneIndex {
        SceneIndex::new(
            Aabb::new(Vec3::ZERO, Vec3::splat(1024.0)),
            SceneConfig::default(),
        )
    }

    fn full_scene() -> SceneIndex {
        let mut scene = empty_scene();
        let mat = scene.materials_mut().register(Material {
            name: "rock".into(),
            forward_rendering: false,
            nearest_cubemap: false,
        });

        scene.insert(
            SceneEntity::new(EntityPayload::Mesh {
                world_box: Aabb::from_center_half_extent(Vec3::splat(100.0), Vec3::splat(3.0)),
                transform: Mat4::from_translation(Vec3::splat(100.0)),
                skinned: false,
                attachments: Vec::new(),
            })
            .with_flags(RenderFlags::CASTS_SHADOWS)
            .with_material(mat),
        );
        scene.insert(SceneEntity::new(EntityPayload::Vegetation {
            position: Vec3::new(200.0, 10.0, 200.0),
            scale: 1.5,
            group_radius: 2.0,
            group_id: 4,
            group_alpha_blend: true,
        }));
        scene.insert(SceneEntity::new(EntityPayload::Decal {
            position: Vec3::new(50.0, 0.0, 50.0),
            radius: 1.5,
        }));
        scene.insert(SceneEntity::new(EntityPayload::Road {
            world_box: Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(300.0, 1.0, 8.0)),
            vertices: vec![
                Vec3::new(0.0, 0.5, 4.0),
                Vec3::new(150.0, 0.5, 4.0),
                Vec3::new(300.0, 0.5, 4.0),
            ],
        }));
        scene.insert(SceneEntity::new(EntityPayload::WaterVolume {
            world_box: Aabb::new(Vec3::new(400.0, 0.0, 400.0), Vec3::new(500.0, 10.0, 500.0)),
            contour: vec![
                Vec3::new(400.0, 10.0, 400.0),
                Vec3::new(500.0, 10.0, 400.0),
                Vec3::new(500.0, 10.0, 500.0),
                Vec3::new(400.0, 10.0, 500.0),
            ],
            fog_density: 0.2,
            fog_color: Vec3::new(0.1, 0.3, 0.4),
            caustic_intensity: 0.7,
        }));
        scene.insert(SceneEntity::new(EntityPayload::DistanceCloud {
            position: Vec3::new(512.0, 300.0, 512.0),
            size_x: 80.0,
            size_z: 60.0,
        }));
        scene
    }

    fn count_kind(scene: &SceneIndex, kind: EntityKind) -> usize {
        let mut out = Vec::new();
        scene.objects_by_type(kind, None, &mut out);
        out.len()
    }

    #[test]
    fn test_roundtrip_preserves_entities() {
        let source = full_scene();
        let bytes = save_index(&source);

        let mut loaded = empty_scene();
        loaded.materials_mut().register(Material {
            name: "rock".into(),
            forward_rendering: false,
            nearest_cubemap: false,
        });
        let nodes = load_index(&mut loaded, &bytes, &LoadParams::default()).unwrap();
        assert!(nodes >= 1);

        for kind in [
            EntityKind::Mesh,
            EntityKind::Vegetation,
            EntityKind::Decal,
            EntityKind::Road,
            EntityKind::WaterVolume,
            EntityKind::DistanceCloud,
        ] {
            assert_eq!(
                count_kind(&loaded, kind),
                count_kind(&source, kind),
                "kind {kind:?} count must survive the round trip"
            );
        }

        // field-level comparison for the variable-tail kinds
        let mut roads = Vec::new();
        loaded.objects_by_type(EntityKind::Road, None, &mut roads);
        let road = loaded.entity(roads[0]).unwrap();
        match &road.payload {
            EntityPayload::Road { vertices, .. } => {
                assert_eq!(vertices.len(), 3);
                assert_eq!(vertices[1], Vec3::new(150.0, 0.5, 4.0));
            }
            _ => panic!("expected a road"),
        }

        let mut waters = Vec::new();
        loaded.objects_by_type(EntityKind::WaterVolume, None, &mut waters);
        match &loaded.entity(waters[0]).unwrap().payload {
            EntityPayload::WaterVolume {
                contour,
                fog_density,
                caustic_intensity,
                ..
            } => {
                assert_eq!(contour.len(), 4);
                assert_eq!(*fog_density, 0.2);
                assert_eq!(*caustic_intensity, 0.7);
            }
            _ => panic!("expected a water volume"),
        }

        let mut meshes = Vec::new();
        loaded.objects_by_type(EntityKind::Mesh, None, &mut meshes);
        let mesh = loaded.entity(meshes[0]).unwrap();
        assert!(mesh.render_flags.contains(RenderFlags::CASTS_SHADOWS));
        match &mesh.payload {
            EntityPayload::Mesh { transform, .. } => {
                assert_eq!(*transform, Mat4::from_translation(Vec3::splat(100.0)));
            }
            _ => panic!("expected a mesh"),
        }
    }

    #[test]
    fn test_runtime_kinds_are_not_serialized() {
        let mut scene = full_scene();
        scene.insert(SceneEntity::new(EntityPayload::Light {
            origin: Vec3::splat(100.0),
            orientation: Quat::IDENTITY,
            base_radius: 10.0,
            shape: LightShape::Point,
            this_area_only: false,
            outdoor: true,
            sort_priority: 0,
            probe_attenuation: 0.0,
        }));
        scene.insert(
            SceneEntity::new(EntityPayload::Vegetation {
                position: Vec3::new(20.0, 0.0, 20.0),
                scale: 1.0,
                group_radius: 1.0,
                group_id: 9,
                group_alpha_blend: false,
            })
            .with_flags(RenderFlags::PROCEDURAL),
        );

        let bytes = save_index(&scene);
        let mut loaded = empty_scene();
        load_index(&mut loaded, &bytes, &LoadParams::default()).unwrap();

        assert_eq!(count_kind(&loaded, EntityKind::Light), 0);
        // only the non-procedural vegetation survives
        assert_eq!(count_kind(&loaded, EntityKind::Vegetation), 1);
    }

    #[test]
    fn test_min_spec_filter_keeps_stream_in_sync() {
        let mut scene = empty_scene();
        // high-spec road first: its variable tail must be consumed even
        // when the record is filtered out
        scene.insert(
            SceneEntity::new(EntityPayload::Road {
                world_box: Aabb::new(Vec3::ZERO, Vec3::new(100.0, 1.0, 8.0)),
                vertices: vec![Vec3::ZERO, Vec3::new(100.0, 0.0, 4.0)],
            })
            .with_flags(RenderFlags::NONE.with_min_spec(3)),
        );
        scene.insert(SceneEntity::new(EntityPayload::Decal {
            position: Vec3::new(50.0, 0.0, 50.0),
            radius: 1.0,
        }));

        let bytes = save_index(&scene);
        let mut loaded = empty_scene();
        let params = LoadParams {
            spec_level: 1,
            layers: None,
        };
        load_index(&mut loaded, &bytes, &params).unwrap();

        assert_eq!(count_kind(&loaded, EntityKind::Road), 0);
        assert_eq!(count_kind(&loaded, EntityKind::Decal), 1);
    }

    #[test]
    fn test_layer_visibility_filters_and_remaps() {
        let mut scene = empty_scene();
        let mut hidden = SceneEntity::new(EntityPayload::Decal {
            position: Vec3::new(10.0, 0.0, 10.0),
            radius: 1.0,
        });
        hidden.layer_id = 2;
        scene.insert(hidden);

        let mut visible = SceneEntity::new(EntityPayload::Decal {
            position: Vec3::new(20.0, 0.0, 20.0),
            radius: 1.0,
        });
        visible.layer_id = 1;
        scene.insert(visible);

        let bytes = save_index(&scene);

        let layers = LayerVisibility {
            visible: vec![true, true, false],
            remap: vec![0, 7, 2],
        };
        let mut loaded = empty_scene();
        let params = LoadParams {
            spec_level: 3,
            layers: Some(&layers),
        };
        load_index(&mut loaded, &bytes, &params).unwrap();

        let mut decals = Vec::new();
        loaded.objects_by_type(EntityKind::Decal, None, &mut decals);
        assert_eq!(decals.len(), 1);
        assert_eq!(loaded.entity(decals[0]).unwrap().layer_id, 7);
    }

    #[test]
    fn test_unresolved_decal_material_drops_object() {
        let mut scene = empty_scene();
        let mat = scene.materials_mut().register(Material::default());
        scene.insert(
            SceneEntity::new(EntityPayload::Decal {
                position: Vec3::new(10.0, 0.0, 10.0),
                radius: 1.0,
            })
            .with_material(mat),
        );
        scene.insert(
            SceneEntity::new(EntityPayload::Mesh {
                world_box: Aabb::from_center_half_extent(Vec3::splat(50.0), Vec3::splat(2.0)),
                transform: Mat4::IDENTITY,
                skinned: false,
                attachments: Vec::new(),
            })
            .with_material(mat),
        );

        let bytes = save_index(&scene);

        // load into a scene whose material table cannot resolve index 0
        let mut loaded = empty_scene();
        load_index(&mut loaded, &bytes, &LoadParams::default()).unwrap();

        // the decal is released, the mesh keeps a fallback material
        assert_eq!(count_kind(&loaded, EntityKind::Decal), 0);
        let mut meshes = Vec::new();
        loaded.objects_by_type(EntityKind::Mesh, None, &mut meshes);
        assert_eq!(meshes.len(), 1);
        assert_eq!(loaded.entity(meshes[0]).unwrap().material, None);
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let scene = full_scene();
        let bytes = save_index(&scene);

        let mut loaded = empty_scene();
        let err = load_index(&mut loaded, &bytes[..bytes.len() - 7], &LoadParams::default());
        assert!(matches!(err, Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_bad_version_rejected() {
        let chunk = NodeChunk {
            version: 99,
            ..Default::default()
        };
        let bytes = bytemuck::bytes_of(&chunk).to_vec();
        let mut loaded = empty_scene();
        let err = load_index(&mut loaded, &bytes, &LoadParams::default());
        assert!(matches!(err, Err(Error::ChunkVersion(99))));
    }

    #[test]
    fn test_writer_alignment_sentinel() {
        let mut w = ChunkWriter::new();
        w.write_bytes(&[1, 2, 3, 4, 5]);
        w.align4();
        assert_eq!(w.len(), 8);
        assert_eq!(&w.as_slice()[5..], &[PAD_SENTINEL; 3]);

        let mut r = ChunkReader::new(w.as_slice());
        let _: [u8; 5] = r.read_pod().unwrap();
        r.align4().unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_reader_rejects_bad_padding() {
        let data = [1u8, 0, 0];
        let mut r = ChunkReader::new(&data);
        let _: u8 = r.read_pod().unwrap();
        assert!(r.align4().is_err());
    }

    #[test]
    fn test_roundtrip_after_cleanup_queries_match() {
        // load rebuilds aggregates; a spatial query must behave like on
        // the source index
        let source = full_scene();
        let bytes = save_index(&source);

        let mut loaded = empty_scene();
        loaded.materials_mut().register(Material::default());
        load_index(&mut loaded, &bytes, &LoadParams::default()).unwrap();

        let query = Aabb::from_center_half_extent(Vec3::splat(100.0), Vec3::splat(5.0));
        let mut a = Vec::new();
        source.objects_by_type(EntityKind::Mesh, Some(&query), &mut a);
        let mut b = Vec::new();
        loaded.objects_by_type(EntityKind::Mesh, Some(&query), &mut b);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
