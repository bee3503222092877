//! Spatial primitives shared by the tree and the brushes.
//!
//! - [`Bounds`] - Axis-aligned boxes with ray and sphere tests
//! - [`Frustum`] - Four-plane culling of node bounds
//! - [`ray`] - Ray/triangle hits and nearest-to-ray queries

mod bounds;
mod frustum;
pub mod ray;

pub use bounds::Bounds;
pub use frustum::{Frustum, FrustumTest};
