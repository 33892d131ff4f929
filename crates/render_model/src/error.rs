//! Error types for rendering

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("HTML parse failed: {0}")]
    Parse(String),

    #[error("Cannot wrap range: {0}")]
    Wrap(String),

    #[error("Formula error: {0}")]
    Formula(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;
