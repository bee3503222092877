//! Chisel subdivision data - coarse meshes, subdivision grids and multires
//! displacement
//!
//! This crate provides the surface data the sculpting engine works on:
//! - [`mesh::Mesh`] - Coarse polygon mesh with hide/mask/material attributes
//! - [`ccg::SubdivCcg`] - Dense per-corner subdivision grids with stitching
//! - [`evaluator`] - Limit-surface evaluation seam used to bake the grids
//! - [`multires`] - Per-corner displacement grids and level reconciliation
//! - [`bits::BitVector`] - Packed bit sets for hide and dirty flags

pub mod bits;
pub mod ccg;
pub mod error;
pub mod evaluator;
pub mod mesh;
pub mod multires;

pub use bits::BitVector;
pub use ccg::{
    CcgKey, SubdivCcg, SubdivCcgCoord, SubdivCcgFace, SubdivCcgNeighbors, SubdivToCcgSettings,
};
pub use error::{MeshError, SubdivError};
pub use evaluator::{BilinearEvaluator, MaskEvaluator, SubdivEvaluator, VertexMaskEvaluator};
pub use mesh::{FaceId, Mesh, VertexId};
pub use multires::{
    DisplacementMode, DisplacementReconciler, GridDisplacementStore, MDisps, MultiresLevels,
};
