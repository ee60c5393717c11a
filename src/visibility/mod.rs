//! Per-frame visibility classification
//!
//! A stateless traversal over a [`SceneIndex`](crate::scene::SceneIndex),
//! parameterized by camera and render mask. Objects are classified as
//! visible and submitted (directly, or through the cull queues in
//! [`crate::jobs`]), occluded, or skipped for this frame.

pub mod backend;
pub mod camera;
pub mod pass;
pub mod sorter;

pub use backend::{NoOcclusion, OcclusionQuery, OcclusionState, SubmitSink};
pub use camera::CullCamera;
pub use pass::{
    collect_shadow_casters, run, OcclusionOutput, OutputKind, PassInfo, RenderMask,
    ShadowCasterParams,
};
pub use sorter::{RendSorter, SortKey};
