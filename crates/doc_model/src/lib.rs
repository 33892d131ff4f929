//! Document Model - Core document tree structure and types
//!
//! This crate provides the rich-text document model the annotation and
//! reference engine is built on: a tree of blocks, inline atomic reference
//! nodes and marked text runs, addressed by absolute integer positions.
//! Every edit is expressed as a list of [`Step`]s; each applied step yields a
//! [`StepMap`] so positions captured before an edit can be remapped.

mod error;
mod flat;
mod mapping;
mod mark;
mod node;
mod document;
mod selection;
mod stable_id;
mod step;
mod transaction;

pub use error::*;
pub use mapping::*;
pub use mark::*;
pub use node::*;
pub use document::*;
pub use selection::*;
pub use stable_id::*;
pub use step::*;
pub use transaction::*;
