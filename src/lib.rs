//! Veldt - spatial scene index and visibility culling core
//!
//! An octree over renderable entities answering, every frame, "which
//! entities are potentially visible, and in what order should work on
//! them be dispatched?" Includes the concurrent cull-queue protocol
//! and the chunked binary persistence format for the scene graph.

pub mod core;
pub mod jobs;
pub mod math;
pub mod persist;
pub mod scene;
pub mod visibility;
