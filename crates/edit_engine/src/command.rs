//! Command system for document editing

use crate::{EditError, Result};
use doc_model::{Document, Mark, MarkMatch, Selection, Transaction};
use serde::{Deserialize, Serialize};

/// Result of applying a command
#[derive(Debug)]
pub struct CommandResult {
    /// The transaction holding the command's steps
    pub transaction: Transaction,
    /// The selection after the command, in coordinates of the new document.
    ///
    /// `None` keeps the previous selection mapped through the transaction.
    pub selection: Option<Selection>,
}

impl CommandResult {
    /// A result that keeps the mapped selection
    pub fn mapped(transaction: Transaction) -> Self {
        Self {
            transaction,
            selection: None,
        }
    }

    /// A result that places the selection explicitly
    pub fn with_selection(transaction: Transaction, selection: Selection) -> Self {
        Self {
            transaction,
            selection: Some(selection),
        }
    }
}

/// Trait for all editing commands
pub trait Command: std::fmt::Debug + Send + Sync {
    /// Build the command's transaction against a document
    fn apply(&self, doc: &Document, selection: &Selection) -> Result<CommandResult>;

    /// Get a display name for this command
    fn display_name(&self) -> &str;

    /// Clone this command into a box
    fn clone_box(&self) -> Box<dyn Command>;
}

/// Clamp a range to the document and order its ends
pub(crate) fn clamp_range(doc: &Document, from: usize, to: usize) -> (usize, usize) {
    let size = doc.content_size();
    let (from, to) = (from.min(size), to.min(size));
    (from.min(to), from.max(to))
}

/// Insert text at the selection, replacing selected content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertText {
    pub text: String,
}

impl InsertText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Command for InsertText {
    fn apply(&self, doc: &Document, selection: &Selection) -> Result<CommandResult> {
        let (from, to) = clamp_range(doc, selection.from(), selection.to());
        let mut tr = Transaction::new(doc);
        tr.replace_with_text(from, to, &self.text)?;

        let caret = tr.map(to, doc_model::Assoc::After);
        Ok(CommandResult::with_selection(tr, Selection::caret(caret)))
    }

    fn display_name(&self) -> &str {
        "Insert Text"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

/// Delete a range of content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRange {
    pub from: usize,
    pub to: usize,
}

impl DeleteRange {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }
}

impl Command for DeleteRange {
    fn apply(&self, doc: &Document, _selection: &Selection) -> Result<CommandResult> {
        let (from, to) = clamp_range(doc, self.from, self.to);
        if from == to {
            return Err(EditError::EmptyRange { from, to });
        }
        let mut tr = Transaction::new(doc);
        tr.delete(from, to)?;
        let caret = tr.map(from, doc_model::Assoc::Before);
        Ok(CommandResult::with_selection(tr, Selection::caret(caret)))
    }

    fn display_name(&self) -> &str {
        "Delete"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

/// Apply or remove a formatting mark over the selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetFormatting {
    pub mark: Mark,
    pub enabled: bool,
}

impl SetFormatting {
    pub fn apply_mark(mark: Mark) -> Self {
        Self { mark, enabled: true }
    }

    pub fn remove_mark(mark: Mark) -> Self {
        Self {
            mark,
            enabled: false,
        }
    }
}

impl Command for SetFormatting {
    fn apply(&self, doc: &Document, selection: &Selection) -> Result<CommandResult> {
        if self.mark.annotation_id().is_some() {
            return Err(EditError::InvalidCommand(
                "annotation marks are managed by the annotation commands".to_string(),
            ));
        }
        let (from, to) = clamp_range(doc, selection.from(), selection.to());
        if from == to {
            return Err(EditError::EmptyRange { from, to });
        }
        let mut tr = Transaction::new(doc);
        if self.enabled {
            tr.add_mark(from, to, self.mark.clone())?;
        } else {
            tr.remove_mark(from, to, MarkMatch::Kind { kind: self.mark.kind() })?;
        }
        Ok(CommandResult::mapped(tr))
    }

    fn display_name(&self) -> &str {
        if self.enabled {
            "Apply Formatting"
        } else {
            "Remove Formatting"
        }
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::Node;

    fn doc(text: &str) -> Document {
        Document::from_blocks(vec![Node::paragraph(vec![Node::text(text)])])
    }

    #[test]
    fn test_insert_text_replaces_selection() {
        let doc = doc("Hello world");
        let result = InsertText::new("there")
            .apply(&doc, &Selection::new(7, 12))
            .unwrap();
        assert_eq!(result.transaction.doc().plain_text(), "Hello there");
        assert_eq!(result.selection, Some(Selection::caret(12)));
    }

    #[test]
    fn test_insert_text_at_caret() {
        let doc = doc("ac");
        let result = InsertText::new("b").apply(&doc, &Selection::caret(2)).unwrap();
        assert_eq!(result.transaction.doc().plain_text(), "abc");
        assert_eq!(result.selection, Some(Selection::caret(3)));
    }

    #[test]
    fn test_delete_range_rejects_empty() {
        let doc = doc("abc");
        assert!(matches!(
            DeleteRange::new(2, 2).apply(&doc, &Selection::default()),
            Err(EditError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_formatting_rejects_annotation_marks() {
        let doc = doc("abc");
        let mark = Mark::Annotation(doc_model::AnnotationMark::new("u1", true, chrono::Utc::now()));
        assert!(SetFormatting::apply_mark(mark)
            .apply(&doc, &Selection::new(1, 3))
            .is_err());
    }

    #[test]
    fn test_command_serializes() {
        let json = serde_json::to_value(InsertText::new("x")).unwrap();
        assert_eq!(json["text"], "x");
    }
}
