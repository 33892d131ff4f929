//! Reference node registry - citations, images and formulas addressed by
//! stable id rather than position
//!
//! Positions are resolved from the id against the current document on every
//! call. A missing id means the node is already gone: the registry reports
//! `false` and leaves the document untouched.

use crate::command::clamp_range;
use crate::{Command, CommandResult, EditError, EditingEngine, Result};
use doc_model::{AtomAttrs, AtomNode, Document, Node, Selection, StableId, Transaction};
use serde::{Deserialize, Serialize};

/// Insert an atomic reference node at the selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertReference {
    /// Id minted for the new node
    pub reference_id: StableId,
    pub attrs: AtomAttrs,
}

impl InsertReference {
    /// Create an insert command with a freshly minted id
    pub fn new(attrs: AtomAttrs) -> Self {
        Self {
            reference_id: StableId::mint(),
            attrs,
        }
    }
}

impl Command for InsertReference {
    fn apply(&self, doc: &Document, selection: &Selection) -> Result<CommandResult> {
        let (from, to) = clamp_range(doc, selection.from(), selection.to());
        let mut tr = Transaction::new(doc);
        tr.delete(from, to)?;

        let pos = tr.map(from, doc_model::Assoc::Before);
        if !tr.doc().resolve(pos)?.parent.is_textblock() {
            return Err(EditError::InvalidCommand(format!(
                "cannot place an inline reference at {pos}"
            )));
        }
        let node = AtomNode::with_reference_id(self.reference_id, self.attrs.clone());
        tr.insert_node(pos, Node::Atom(node))?;

        Ok(CommandResult::with_selection(tr, Selection::caret(pos + 1)))
    }

    fn display_name(&self) -> &str {
        match self.attrs {
            AtomAttrs::Citation(_) => "Insert Citation",
            AtomAttrs::Image(_) => "Insert Image",
            AtomAttrs::Formula(_) => "Insert Formula",
        }
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

/// Replace the attributes of a reference node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReference {
    pub reference_id: StableId,
    pub attrs: AtomAttrs,
}

impl Command for UpdateReference {
    fn apply(&self, doc: &Document, _selection: &Selection) -> Result<CommandResult> {
        let pos = doc
            .find_node_by_id(self.reference_id)
            .ok_or(EditError::ReferenceNotFound(self.reference_id))?;
        let mut tr = Transaction::new(doc);
        tr.set_atom_attrs(pos, self.attrs.clone())?;
        Ok(CommandResult::mapped(tr))
    }

    fn display_name(&self) -> &str {
        "Update Reference"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

/// Remove a reference node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteReference {
    pub reference_id: StableId,
}

impl Command for DeleteReference {
    fn apply(&self, doc: &Document, _selection: &Selection) -> Result<CommandResult> {
        let pos = doc
            .find_node_by_id(self.reference_id)
            .ok_or(EditError::ReferenceNotFound(self.reference_id))?;
        let mut tr = Transaction::new(doc);
        tr.delete(pos, pos + 1)?;
        Ok(CommandResult::mapped(tr))
    }

    fn display_name(&self) -> &str {
        "Delete Reference"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

impl EditingEngine {
    /// Insert a reference node at the selection and return its new id
    pub fn insert_reference(&mut self, attrs: AtomAttrs) -> Result<StableId> {
        let command = InsertReference::new(attrs);
        self.execute(&command)?;
        Ok(command.reference_id)
    }

    /// Replace the attributes of the node with the given id.
    ///
    /// Returns `false` if no such node exists.
    pub fn update_reference(&mut self, reference_id: StableId, attrs: AtomAttrs) -> Result<bool> {
        let command = UpdateReference {
            reference_id,
            attrs,
        };
        match self.execute(&command) {
            Ok(_) => Ok(true),
            Err(EditError::ReferenceNotFound(id)) => {
                tracing::debug!(%id, "update skipped, reference no longer in document");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the node with the given id.
    ///
    /// The removal is confirmed like a key deletion, so the id is reported by
    /// [`EditingEngine::take_confirmed_deletions`]. Returns `false` if no such
    /// node exists.
    pub fn delete_reference(&mut self, reference_id: StableId) -> Result<bool> {
        self.deletions.stash([reference_id]);
        match self.execute(&DeleteReference { reference_id }) {
            Ok(_) => Ok(true),
            Err(EditError::ReferenceNotFound(id)) => {
                tracing::debug!(%id, "delete skipped, reference no longer in document");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
