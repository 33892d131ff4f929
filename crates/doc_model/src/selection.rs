//! Selection model - caret and range selection over absolute positions

use crate::{Assoc, Mapping};
use serde::{Deserialize, Serialize};

/// A selection in the document
///
/// A selection has an anchor (where the selection started) and a head
/// (where the caret is). When anchor == head, the selection is collapsed
/// (just a caret).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    /// Where the selection started
    pub anchor: usize,
    /// Where the selection ends (caret position)
    pub head: usize,
}

impl Selection {
    /// Create a new selection
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// Create a collapsed selection (caret only)
    pub fn caret(pos: usize) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }

    /// Check if this selection is collapsed (just a caret)
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    /// Check if the selection goes forward (anchor before head)
    pub fn is_forward(&self) -> bool {
        self.anchor <= self.head
    }

    /// Get the start of the selection (regardless of direction)
    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    /// Get the end of the selection (regardless of direction)
    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    /// Move the head, extending the selection
    pub fn extend_to(&self, head: usize) -> Self {
        Self {
            anchor: self.anchor,
            head,
        }
    }

    /// Collapse the selection to the head
    pub fn collapse_to_head(&self) -> Self {
        Self::caret(self.head)
    }

    /// Map the selection through the changes of an edit.
    ///
    /// The start sticks after content inserted at it and the end sticks
    /// before, so a range never grows to swallow text typed at its edges.
    pub fn map(&self, mapping: &Mapping) -> Self {
        if self.is_collapsed() {
            return Self::caret(mapping.map(self.head, Assoc::After));
        }
        let from = mapping.map(self.from(), Assoc::After);
        let to = mapping.map(self.to(), Assoc::Before).max(from);
        if self.is_forward() {
            Self::new(from, to)
        } else {
            Self::new(to, from)
        }
    }
}
