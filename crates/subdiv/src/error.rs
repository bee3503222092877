//! Error types for mesh construction and multires operations.

use thiserror::Error;

/// Errors that can occur while building or editing a coarse mesh
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Mesh has no position attribute")]
    NoPositions,
    #[error("Mesh has no indices")]
    NoIndices,
    #[error("Invalid mesh topology: {0}")]
    InvalidTopology(String),
    #[error("Face {face} has {corners} corners, at least 3 are required")]
    DegenerateFace { face: usize, corners: usize },
    #[error("Face {face} references vertex {vert} but the mesh has {verts_num} vertices")]
    VertexOutOfRange {
        face: usize,
        vert: u32,
        verts_num: usize,
    },
    #[error("Attribute '{name}' has {len} values, expected {expected}")]
    AttributeLength {
        name: &'static str,
        len: usize,
        expected: usize,
    },
}

/// Errors raised by grid construction and displacement resampling
#[derive(Debug, Error)]
pub enum SubdivError {
    #[error("Invalid subdivision level {level} (supported range {min}..={max})")]
    InvalidLevel { level: u32, min: u32, max: u32 },
    #[error("Displacement level {found} does not match grid level {expected}")]
    LevelMismatch { expected: u32, found: u32 },
    #[error("Store has {found} corners but the mesh has {expected}")]
    CornerCountMismatch { expected: usize, found: usize },
    #[error("Buffer holds {found} elements, expected {expected}")]
    SizeMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Mesh(#[from] MeshError),
}
