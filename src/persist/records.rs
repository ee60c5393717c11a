//! Fixed-layout entity records
//!
//! One record shape per serializable type tag. Every field is 4 bytes
//! wide so the structs have no padding and cast cleanly to bytes.
//! Records that carry a variable tail (road and water-volume vertex
//! arrays) embed the element count in the fixed part; skipping such a
//! record requires reading that count.

use bytemuck::{Pod, Zeroable};

/// Record type tags, leading each record as a `u32`
pub const TAG_MESH: u32 = 1;
pub const TAG_VEGETATION: u32 = 2;
pub const TAG_DECAL: u32 = 3;
pub const TAG_ROAD: u32 = 4;
pub const TAG_WATER_VOLUME: u32 = 5;
pub const TAG_DISTANCE_CLOUD: u32 = 6;

/// Fields shared by every record shape
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CommonRecord {
    pub box_min: [f32; 3],
    pub box_max: [f32; 3],
    pub render_flags: u32,
    pub view_dist_mult: f32,
    pub lod_ratio: f32,
    pub shadow_lod_bias: i32,
    pub layer_id: u32,
    /// Index into the caller's material table; -1 = none
    pub material: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshRecord {
    pub common: CommonRecord,
    /// Column-major local-to-world matrix
    pub transform: [f32; 16],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VegetationRecord {
    pub common: CommonRecord,
    pub position: [f32; 3],
    pub scale: f32,
    pub group_id: u32,
    pub group_radius: f32,
    /// Nonzero when the group alpha-blends
    pub group_alpha_blend: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DecalRecord {
    pub common: CommonRecord,
    pub position: [f32; 3],
    pub radius: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RoadRecord {
    pub common: CommonRecord,
    /// Number of `[f32; 3]` vertices in the variable tail
    pub vertex_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct WaterVolumeRecord {
    pub common: CommonRecord,
    pub fog_density: f32,
    pub fog_color: [f32; 3],
    pub caustic_intensity: f32,
    /// Number of `[f32; 3]` contour vertices in the variable tail
    pub contour_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DistanceCloudRecord {
    pub common: CommonRecord,
    pub position: [f32; 3],
    pub size_x: f32,
    pub size_z: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_are_4_byte_multiples() {
        assert_eq!(std::mem::size_of::<CommonRecord>() % 4, 0);
        assert_eq!(std::mem::size_of::<MeshRecord>() % 4, 0);
        assert_eq!(std::mem::size_of::<VegetationRecord>() % 4, 0);
        assert_eq!(std::mem::size_of::<DecalRecord>() % 4, 0);
        assert_eq!(std::mem::size_of::<RoadRecord>() % 4, 0);
        assert_eq!(std::mem::size_of::<WaterVolumeRecord>() % 4, 0);
        assert_eq!(std::mem::size_of::<DistanceCloudRecord>() % 4, 0);
    }

    #[test]
    fn test_records_have_no_padding() {
        // sizes are exactly the sum of their 4-byte fields
        assert_eq!(std::mem::size_of::<CommonRecord>(), 13 * 4);
        assert_eq!(std::mem::size_of::<MeshRecord>(), 13 * 4 + 64);
        assert_eq!(std::mem::size_of::<VegetationRecord>(), 13 * 4 + 28);
        assert_eq!(std::mem::size_of::<RoadRecord>(), 13 * 4 + 4);
    }
}
