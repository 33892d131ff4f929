//! Error types for storage and synchronization

use thiserror::Error;

/// Errors reported by an external collaborator (database, blob store)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The requester does not own the target
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    /// Check if this error means the target is already gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, CollaboratorError::NotFound(_))
    }
}

pub type CollabResult<T> = std::result::Result<T, CollaboratorError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document model error: {0}")]
    DocModel(#[from] doc_model::DocModelError),

    #[error("Edit error: {0}")]
    Edit(#[from] edit_engine::EditError),

    #[error("Render error: {0}")]
    Render(#[from] render_model::RenderError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The background sync task is gone
    #[error("Sync worker stopped")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, StoreError>;
