//! Command execution engine

use crate::{Command, Confirmed, DeleteKey, DeleteKeyCommand, DeletionTracker, EditError, Result};
use doc_model::{Document, Mapping, Selection, StableId, Transaction};

/// The outcome of an executed command
#[derive(Debug, Clone)]
pub struct Applied {
    /// Maps positions in the previous document to the new one
    pub mapping: Mapping,
    /// Whether the document content changed
    pub doc_changed: bool,
}

/// The editing engine owns the document and selection of one editing
/// session and executes commands against them
pub struct EditingEngine {
    /// Current document
    doc: Document,
    /// Current selection
    selection: Selection,
    /// Pending reference deletions
    pub(crate) deletions: DeletionTracker,
    /// Confirmed deletions not yet collected by the caller
    confirmed: Vec<StableId>,
    /// Incremented on every content change
    revision: u64,
}

impl EditingEngine {
    /// Create a new editing engine with an empty document
    pub fn new() -> Self {
        Self::with_document(Document::new())
    }

    /// Create an editing engine with a specific document
    pub fn with_document(doc: Document) -> Self {
        Self {
            doc,
            selection: Selection::caret(1),
            deletions: DeletionTracker::new(),
            confirmed: Vec::new(),
            revision: 0,
        }
    }

    /// Get the current document
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// Get the current selection
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Set the selection, clamped to the document
    pub fn set_selection(&mut self, selection: Selection) {
        let size = self.doc.content_size();
        self.selection = Selection::new(selection.anchor.min(size), selection.head.min(size));
    }

    /// Get the content revision
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Get the deletion tracker
    pub fn deletions(&self) -> &DeletionTracker {
        &self.deletions
    }

    /// Execute a command
    pub fn execute(&mut self, command: &dyn Command) -> Result<Applied> {
        let result = match command.apply(&self.doc, &self.selection) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(command = command.display_name(), error = %e, "command not applied");
                self.deletions.reset();
                return Err(e);
            }
        };
        let explicit = result.selection;
        let applied = self.apply_transaction(result.transaction)?;
        if let Some(selection) = explicit {
            self.set_selection(selection);
        }
        Ok(applied)
    }

    /// Apply a transaction built against the current document.
    ///
    /// The selection is mapped through the transaction and any pending
    /// deletions are confirmed against the new document. A transaction whose
    /// starting document is not the current one is rejected.
    pub fn apply_transaction(&mut self, tr: Transaction) -> Result<Applied> {
        if tr.before() != &self.doc {
            tracing::debug!(revision = self.revision, "rejecting stale transaction");
            self.deletions.reset();
            return Err(EditError::StaleTransaction {
                revision: self.revision,
            });
        }
        let doc_changed = tr.doc_changed();
        let (doc, mapping) = tr.into_parts();
        if doc_changed {
            self.doc = doc;
            self.revision += 1;
        }
        self.selection = self.selection.map(&mapping);

        let confirmed = self.deletions.confirm(&self.doc);
        if !confirmed.is_empty() {
            tracing::debug!(count = confirmed.ids().len(), "reference deletions confirmed");
            self.confirmed.extend(confirmed.0);
        }

        Ok(Applied {
            mapping,
            doc_changed,
        })
    }

    /// Replace the whole document, as when loading another version
    pub fn replace_document(&mut self, doc: Document) {
        self.doc = doc;
        self.selection = Selection::caret(1);
        self.deletions.reset();
        self.confirmed.clear();
        self.revision += 1;
    }

    /// Stash the reference ids a key press would remove, before the key's
    /// edit runs
    pub fn begin_delete_key(&mut self, key: DeleteKey) {
        self.deletions.on_key(key, &self.doc, &self.selection);
    }

    /// Handle a deletion key: stash, delete, confirm
    pub fn handle_delete_key(&mut self, key: DeleteKey) -> Result<Applied> {
        self.begin_delete_key(key);
        self.execute(&DeleteKeyCommand { key })
    }

    /// Take the reference ids confirmed as removed since the last call
    pub fn take_confirmed_deletions(&mut self) -> Vec<StableId> {
        std::mem::take(&mut self.confirmed)
    }

    /// Confirm pending deletions without a transaction, e.g. after a host
    /// cancels the key's edit
    pub fn settle_deletions(&mut self) -> Confirmed {
        let confirmed = self.deletions.confirm(&self.doc);
        self.confirmed.extend(confirmed.0.iter().copied());
        confirmed
    }
}

impl Default for EditingEngine {
    fn default() -> Self {
        Self::new()
    }
}
