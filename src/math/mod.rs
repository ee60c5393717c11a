//! Mathematical utilities and data structures

pub mod aabb;
pub mod frustum;
pub mod obb;

pub use aabb::Aabb;
pub use frustum::{Containment, Frustum, Plane};
pub use obb::Obb;
