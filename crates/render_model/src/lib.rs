//! Render Model - Document to view conversion
//!
//! This crate produces everything the view layer shows on top of the
//! document: sequential reference numbers, live HTML export, formula output
//! and author highlight colors. It also rebuilds annotation highlights from
//! a flat HTML snapshot and annotation records when no live document is
//! available, for read-only and export rendering.

mod color;
mod dom;
mod error;
mod formula;
mod html;
mod numbering;
mod reconstruct;

pub use color::*;
pub use dom::*;
pub use error::*;
pub use formula::*;
pub use html::*;
pub use numbering::*;
pub use reconstruct::*;
