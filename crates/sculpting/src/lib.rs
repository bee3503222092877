//! Chisel sculpting engine.
//!
//! This crate provides the spatial acceleration and brush machinery behind
//! sculpt strokes:
//! - A bounding volume hierarchy over meshes, subdivision grids or
//!   dynamic-topology meshes, with ray casts and frustum culling
//! - A parallel brush kernel that evaluates leaves independently and writes
//!   each vertex back exactly once
//! - Dynamic topology: edge splitting and collapsing under the brush
//! - Stroke orchestration from pointer samples to spaced dabs
//!
//! # Architecture
//!
//! Geometry lives in a [`Surface`]; the [`SpatialTree`] built over it only
//! stores indices. A stroke selects leaves with a tree search, runs the
//! brush over them and tags them so bounds and normals are refreshed before
//! the next traversal.
//!
//! ## Key Components
//!
//! - **Tree**: Node layout, construction, queries and dirty-state updates
//! - **Brush**: Factor and translation helpers plus the brushes built on them
//! - **Tessellation**: Edge queues, splits and collapses for dynamic topology
//! - **Stroke**: Dab spacing and the per-dab update sequence
//! - **Gpu**: Draw-cache notifications published after each pass

pub mod brush;
pub mod dyntopo;
pub mod error;
pub mod gpu;
pub mod spatial;
pub mod stroke;
pub mod surface;
pub mod tessellation;
pub mod tree;

pub use brush::{apply_brush, gather_brush_nodes, BrushContext, BrushKind, BrushSettings, BrushStats, Dab};
pub use dyntopo::{DynFaceId, DynMesh, DynVertId};
pub use error::TreeError;
pub use gpu::{DirtyNodes, DrawCacheSink, DrawNotification};
pub use spatial::{Bounds, Frustum, FrustumTest};
pub use stroke::{StrokeEngine, StrokeInput, StrokeStats};
pub use surface::{DeformLayer, GridsSurface, MeshSurface, Surface};
pub use tessellation::{update_topology, TopologyMode, TopologyRegion, TopologyStats};
pub use tree::{NodeFlags, NodePayload, SpatialNode, SpatialTree, TreeKind};
