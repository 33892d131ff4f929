//! Keyboard deletion and two-phase detection of removed reference nodes
//!
//! A key event alone cannot prove a node was removed, since the edit may be
//! canceled or only partly applied downstream. The ids the key would remove
//! are stashed as pending; once a transaction has been applied the pending ids
//! are checked against the new document and only those actually gone are
//! confirmed.

use crate::{Command, CommandResult, EditError, Result};
use doc_model::{Document, Selection, StableId, Transaction, Unit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use unicode_segmentation::UnicodeSegmentation;

/// A deletion key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteKey {
    /// Delete backwards from the caret
    Backspace,
    /// Delete forwards from the caret
    Delete,
}

/// Deletion detection state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeletionState {
    /// Nothing pending
    #[default]
    Idle,
    /// Ids that the last key event is expected to remove
    Pending(BTreeSet<StableId>),
}

/// Ids confirmed as removed from the document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Confirmed(pub Vec<StableId>);

impl Confirmed {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> &[StableId] {
        &self.0
    }
}

/// Tracks pending reference-node deletions across a key event
#[derive(Debug, Clone, Default)]
pub struct DeletionTracker {
    state: DeletionState,
}

impl DeletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state
    pub fn state(&self) -> &DeletionState {
        &self.state
    }

    /// Record the reference ids a key press at the selection would remove
    pub fn on_key(&mut self, key: DeleteKey, doc: &Document, selection: &Selection) {
        let ids = match key_range(key, doc, selection) {
            Some((from, to)) => doc.reference_ids_between(from, to),
            None => Vec::new(),
        };
        self.stash(ids);
    }

    /// Add ids to the pending set
    pub fn stash(&mut self, ids: impl IntoIterator<Item = StableId>) {
        let mut ids = ids.into_iter().peekable();
        if ids.peek().is_none() {
            return;
        }
        if let DeletionState::Pending(pending) = &mut self.state {
            pending.extend(ids);
        } else {
            self.state = DeletionState::Pending(ids.collect());
        }
    }

    /// Compare pending ids against the document after a transaction.
    ///
    /// Ids no longer present are confirmed; ids still present are dropped.
    /// The tracker returns to idle either way.
    pub fn confirm(&mut self, doc: &Document) -> Confirmed {
        let DeletionState::Pending(pending) = std::mem::take(&mut self.state) else {
            return Confirmed::default();
        };
        let live: BTreeSet<StableId> = doc.reference_ids().into_iter().collect();
        let (gone, kept): (Vec<StableId>, Vec<StableId>) =
            pending.into_iter().partition(|id| !live.contains(id));
        if !kept.is_empty() {
            tracing::debug!(count = kept.len(), "pending deletions still present, dropped");
        }
        Confirmed(gone)
    }

    /// Drop any pending ids without confirming them
    pub fn reset(&mut self) {
        self.state = DeletionState::Idle;
    }
}

/// The range a deletion key removes at the selection.
///
/// A range selection removes the range. A collapsed caret removes the
/// adjacent grapheme cluster or reference node, or joins with the adjacent
/// block when the caret sits at a block edge. Returns `None` when the key
/// would do nothing.
pub fn key_range(key: DeleteKey, doc: &Document, selection: &Selection) -> Option<(usize, usize)> {
    let size = doc.content_size();
    let (from, to) = (selection.from().min(size), selection.to().min(size));
    if from < to {
        return Some((from, to));
    }
    let pos = from;

    match key {
        DeleteKey::Backspace => match doc.unit_at(pos.checked_sub(1)?)? {
            Unit::Char(_) => {
                let before = doc.inline_text_before(pos);
                let width = before.graphemes(true).next_back()?.chars().count();
                Some((pos - width, pos))
            }
            Unit::Atom(_) => Some((pos - 1, pos)),
            Unit::Open(_) if pos >= 2 && doc.unit_at(pos - 2) == Some(Unit::Close) => {
                Some((pos - 2, pos))
            }
            Unit::Open(_) | Unit::Close => None,
        },
        DeleteKey::Delete => match doc.unit_at(pos)? {
            Unit::Char(_) => {
                let after = doc.inline_text_after(pos);
                let width = after.graphemes(true).next()?.chars().count();
                Some((pos, pos + width))
            }
            Unit::Atom(_) => Some((pos, pos + 1)),
            Unit::Close if matches!(doc.unit_at(pos + 1), Some(Unit::Open(_))) => {
                Some((pos, pos + 2))
            }
            Unit::Close | Unit::Open(_) => None,
        },
    }
}

/// Delete content for a key press
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteKeyCommand {
    pub key: DeleteKey,
}

impl Command for DeleteKeyCommand {
    fn apply(&self, doc: &Document, selection: &Selection) -> Result<CommandResult> {
        let (from, to) = key_range(self.key, doc, selection).ok_or_else(|| {
            let pos = selection.head;
            EditError::EmptyRange { from: pos, to: pos }
        })?;
        let mut tr = Transaction::new(doc);
        tr.delete(from, to)?;
        let caret = tr.map(from, doc_model::Assoc::Before);
        Ok(CommandResult::with_selection(tr, Selection::caret(caret)))
    }

    fn display_name(&self) -> &str {
        match self.key {
            DeleteKey::Backspace => "Backspace",
            DeleteKey::Delete => "Delete",
        }
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{AtomAttrs, AtomNode, CitationAttrs, Node};

    fn citation(id: StableId) -> Node {
        Node::Atom(AtomNode::with_reference_id(
            id,
            AtomAttrs::Citation(CitationAttrs::default()),
        ))
    }

    #[test]
    fn test_backspace_removes_whole_grapheme() {
        let doc = Document::from_blocks(vec![Node::paragraph(vec![Node::text("ae\u{301}")])]);
        assert_eq!(
            key_range(DeleteKey::Backspace, &doc, &Selection::caret(4)),
            Some((2, 4))
        );
        assert_eq!(
            key_range(DeleteKey::Delete, &doc, &Selection::caret(2)),
            Some((2, 4))
        );
    }

    #[test]
    fn test_keys_at_block_edges() {
        let doc = Document::from_blocks(vec![
            Node::paragraph(vec![Node::text("ab")]),
            Node::paragraph(vec![Node::text("cd")]),
        ]);
        assert_eq!(key_range(DeleteKey::Backspace, &doc, &Selection::caret(5)), Some((3, 5)));
        assert_eq!(key_range(DeleteKey::Delete, &doc, &Selection::caret(3)), Some((3, 5)));
        assert_eq!(key_range(DeleteKey::Backspace, &doc, &Selection::caret(1)), None);
    }

    #[test]
    fn test_backspace_after_atom_stashes_it() {
        let id = StableId::mint();
        let doc = Document::from_blocks(vec![Node::paragraph(vec![
            Node::text("a"),
            citation(id),
            Node::text("b"),
        ])]);

        let mut tracker = DeletionTracker::new();
        tracker.on_key(DeleteKey::Backspace, &doc, &Selection::caret(3));
        assert_eq!(tracker.state(), &DeletionState::Pending(BTreeSet::from([id])));

        let mut tracker = DeletionTracker::new();
        tracker.on_key(DeleteKey::Backspace, &doc, &Selection::caret(2));
        assert_eq!(tracker.state(), &DeletionState::Idle);
    }

    #[test]
    fn test_confirm_only_reports_removed_ids() {
        let removed = StableId::mint();
        let kept = StableId::mint();
        let before = Document::from_blocks(vec![Node::paragraph(vec![
            citation(removed),
            citation(kept),
        ])]);
        let after = Document::from_blocks(vec![Node::paragraph(vec![citation(kept)])]);

        let mut tracker = DeletionTracker::new();
        tracker.on_key(DeleteKey::Delete, &before, &Selection::new(1, 3));
        let confirmed = tracker.confirm(&after);

        assert_eq!(confirmed, Confirmed(vec![removed]));
        assert_eq!(tracker.state(), &DeletionState::Idle);
        assert!(tracker.confirm(&after).is_empty());
    }

    #[test]
    fn test_canceled_key_confirms_nothing() {
        let id = StableId::mint();
        let doc = Document::from_blocks(vec![Node::paragraph(vec![citation(id)])]);

        let mut tracker = DeletionTracker::new();
        tracker.on_key(DeleteKey::Delete, &doc, &Selection::caret(1));
        assert!(tracker.confirm(&doc).is_empty());
    }
}
