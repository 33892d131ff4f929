//! Error types for editing operations

use doc_model::StableId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Reference not found: {0}")]
    ReferenceNotFound(StableId),

    #[error("Annotation not found: {0}")]
    AnnotationNotFound(StableId),

    #[error("Transaction was built against a superseded document (revision {revision})")]
    StaleTransaction { revision: u64 },

    #[error("Empty range {from}..{to}")]
    EmptyRange { from: usize, to: usize },

    #[error("Document model error: {0}")]
    DocModel(#[from] doc_model::DocModelError),
}

pub type Result<T> = std::result::Result<T, EditError>;
