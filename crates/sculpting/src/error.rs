//! Error types for tree construction and brush application.

use thiserror::Error;

use crate::tree::TreeKind;

/// Errors raised when a tree is used with incompatible data
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Tree was built for {tree:?} but the surface is {surface:?}")]
    BackendMismatch { tree: TreeKind, surface: TreeKind },
    #[error("Tree expects {expected} primitives but the surface has {found}")]
    PrimitiveCountMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Subdiv(#[from] subdiv::SubdivError),
}
