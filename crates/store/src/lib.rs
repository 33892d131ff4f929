//! Store - collaborator interfaces, reconciliation, and editing sessions
//!
//! This crate connects an editing engine to the external persistence
//! collaborators: record types, the async collaborator traits and an
//! in-memory backend, the reconciliation pass that keeps annotation and
//! reference records aligned with the document, the debounced editing
//! session, draft versions, and session configuration.

mod collaborator;
mod config;
mod error;
mod gc;
mod memory;
mod records;
mod session;
mod versions;

pub use collaborator::*;
pub use config::*;
pub use error::*;
pub use gc::*;
pub use memory::*;
pub use records::*;
pub use session::*;
