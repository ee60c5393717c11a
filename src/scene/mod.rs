//! Scene index: octree of renderable entities
//!
//! The index places every renderable entity into the smallest octree
//! cell it fits, maintains aggregate bounds and flags from leaf to
//! root, and answers type-filtered spatial queries. The per-frame
//! visibility traversal lives in [`crate::visibility`].

pub mod arena;
pub mod entity;
pub mod index;
pub mod node;

pub use arena::{BucketList, EntityArena, EntityId};
pub use entity::{
    Attachment, EntityKind, EntityPayload, InternalFlags, LightShape, ListKind, Material,
    MaterialId, MaterialTable, RenderFlags, SceneEntity,
};
pub use index::{CountFilter, SceneIndex};
pub use node::{CasterInfo, InstanceBatch, NodeId, OctreeNode};
