//! Error types for document model operations

use crate::{NodeKind, StableId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocModelError {
    #[error("Reference not found: {0}")]
    ReferenceNotFound(StableId),

    #[error("Invalid position {pos} (content size {size})")]
    InvalidPosition { pos: usize, size: usize },

    #[error("Invalid range {from}..{to}")]
    InvalidRange { from: usize, to: usize },

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("Duplicate reference id: {0}")]
    DuplicateReference(StableId),

    #[error("Node kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch { expected: NodeKind, found: NodeKind },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DocModelError>;
