//! Edit Engine - Commands, reference registry, deletion tracking and annotations
//!
//! Every change to the document goes through a [`Command`], which builds a
//! [`doc_model::Transaction`] from the current editor state. The
//! [`EditingEngine`] applies it, remaps the selection and confirms any
//! pending atomic-node deletions against the resulting document.

mod annotations;
mod command;
mod deletion;
mod error;
mod executor;
mod references;

pub use annotations::*;
pub use command::*;
pub use deletion::*;
pub use error::*;
pub use executor::*;
pub use references::*;
