//! Atomic edit steps
//!
//! A step is the smallest unit of change. Applying a step never mutates the
//! input document; it returns the new document and the position maps
//! describing the change.

use crate::flat::{self, Token};
use crate::{
    add_to_set, remove_from_set, AtomAttrs, DocModelError, Document, Mark, MarkMatch, Node,
    Result, StableId, StepMap,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An atomic edit step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stepType", rename_all = "camelCase")]
pub enum Step {
    /// Insert nodes at a position
    Insert { pos: usize, content: Vec<Node> },
    /// Delete the range `[from, to)`
    Delete { from: usize, to: usize },
    /// Add a mark to every character in `[from, to)`
    AddMark { from: usize, to: usize, mark: Mark },
    /// Remove matching marks from every character in `[from, to)`
    RemoveMark {
        from: usize,
        to: usize,
        #[serde(rename = "matcher")]
        mark: MarkMatch,
    },
    /// Replace the attributes of the atomic node at a position
    SetAttrs { pos: usize, attrs: AtomAttrs },
}

/// The result of applying a step
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The new document
    pub doc: Document,
    /// The replaced range, in coordinates of the input document
    pub map: StepMap,
    /// Structural repairs made while normalizing, in coordinates after `map`
    pub repairs: StepMap,
}

impl Step {
    /// Get a display name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Step::Insert { .. } => "insert",
            Step::Delete { .. } => "delete",
            Step::AddMark { .. } => "addMark",
            Step::RemoveMark { .. } => "removeMark",
            Step::SetAttrs { .. } => "setAttrs",
        }
    }

    /// Apply the step to a document
    pub fn apply(&self, doc: &Document) -> Result<StepResult> {
        let mut tokens = doc.tokens();
        let map = match self {
            Step::Insert { pos, content } => {
                check_position(*pos, tokens.len())?;
                check_insert(doc, *pos, content)?;
                let inserted = flat::flatten(content);
                let size = inserted.len();
                tokens.splice(*pos..*pos, inserted);
                StepMap::single(*pos, 0, size)
            }
            Step::Delete { from, to } => {
                check_range(*from, *to, tokens.len())?;
                tokens.drain(*from..*to);
                StepMap::single(*from, to - from, 0)
            }
            Step::AddMark { from, to, mark } => {
                check_range(*from, *to, tokens.len())?;
                for token in &mut tokens[*from..*to] {
                    if let Token::Char(_, marks) = token {
                        add_to_set(marks, mark.clone());
                    }
                }
                StepMap::empty()
            }
            Step::RemoveMark { from, to, mark } => {
                check_range(*from, *to, tokens.len())?;
                for token in &mut tokens[*from..*to] {
                    if let Token::Char(_, marks) = token {
                        remove_from_set(marks, mark);
                    }
                }
                StepMap::empty()
            }
            Step::SetAttrs { pos, attrs } => {
                check_position(*pos, tokens.len())?;
                match tokens.get_mut(*pos) {
                    Some(Token::Atom(atom)) => {
                        if atom.kind() != attrs.kind() {
                            return Err(DocModelError::KindMismatch {
                                expected: atom.kind(),
                                found: attrs.kind(),
                            });
                        }
                        atom.attrs = attrs.clone();
                    }
                    _ => {
                        return Err(DocModelError::InvalidStep(format!(
                            "no atomic node at position {pos}"
                        )))
                    }
                }
                StepMap::empty()
            }
        };

        let (doc, repairs) = Document::from_tokens(tokens);
        Ok(StepResult { doc, map, repairs })
    }
}

fn check_position(pos: usize, size: usize) -> Result<()> {
    if pos > size {
        return Err(DocModelError::InvalidPosition { pos, size });
    }
    Ok(())
}

fn check_range(from: usize, to: usize, size: usize) -> Result<()> {
    if from > to || to > size {
        return Err(DocModelError::InvalidRange { from, to });
    }
    Ok(())
}

/// Inline content goes into textblocks, blocks go between blocks, and an
/// inserted atom may not reuse a reference id already in the document
fn check_insert(doc: &Document, pos: usize, content: &[Node]) -> Result<()> {
    let inline = content.iter().filter(|n| n.is_inline()).count();
    if inline != 0 && inline != content.len() {
        return Err(DocModelError::InvalidStep(
            "cannot insert inline and block content together".to_string(),
        ));
    }
    let parent = doc.resolve(pos)?.parent;
    if inline > 0 && !parent.is_textblock() {
        return Err(DocModelError::InvalidStep(format!(
            "inline content outside a textblock at {pos}"
        )));
    }
    if inline == 0 && !content.is_empty() && parent.is_textblock() {
        return Err(DocModelError::InvalidStep(format!(
            "block content inside a textblock at {pos}"
        )));
    }

    let mut seen: HashSet<StableId> = doc.reference_ids().into_iter().collect();
    let mut result = Ok(());
    for node in content {
        visit_atoms(node, &mut |id| {
            if result.is_ok() && !seen.insert(id) {
                result = Err(DocModelError::DuplicateReference(id));
            }
        });
    }
    result
}

fn visit_atoms(node: &Node, f: &mut dyn FnMut(StableId)) {
    match node {
        Node::Atom(atom) => f(atom.reference_id()),
        Node::Block(block) => block.content.iter().for_each(|c| visit_atoms(c, f)),
        Node::Text(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AtomNode, CitationAttrs, FormulaAttrs, ImageAttrs};

    fn doc(text: &str) -> Document {
        Document::from_blocks(vec![Node::paragraph(vec![Node::text(text)])])
    }

    #[test]
    fn test_insert_text() {
        let step = Step::Insert {
            pos: 3,
            content: vec![Node::text("XY")],
        };
        let result = step.apply(&doc("abcd")).unwrap();
        assert_eq!(result.doc.plain_text(), "abXYcd");
        assert_eq!(result.map, StepMap::single(3, 0, 2));
        assert!(result.repairs.is_empty());
    }

    #[test]
    fn test_insert_inline_between_blocks_is_rejected() {
        let step = Step::Insert {
            pos: 0,
            content: vec![Node::text("x")],
        };
        assert!(matches!(
            step.apply(&doc("ab")),
            Err(DocModelError::InvalidStep(_))
        ));
    }

    #[test]
    fn test_insert_block_at_top_level() {
        let step = Step::Insert {
            pos: 4,
            content: vec![Node::paragraph(vec![Node::text("cd")])],
        };
        let result = step.apply(&doc("ab")).unwrap();
        assert_eq!(result.doc.plain_text(), "ab\ncd");
    }

    #[test]
    fn test_duplicate_reference_is_rejected() {
        let atom = AtomNode::new(AtomAttrs::Citation(CitationAttrs::default()));
        let start = Document::from_blocks(vec![Node::paragraph(vec![Node::Atom(atom.clone())])]);
        let step = Step::Insert {
            pos: 1,
            content: vec![Node::Atom(atom.clone())],
        };
        assert!(matches!(
            step.apply(&start),
            Err(DocModelError::DuplicateReference(id)) if id == atom.reference_id()
        ));
    }

    #[test]
    fn test_delete_across_blocks_joins() {
        let start = Document::from_blocks(vec![
            Node::paragraph(vec![Node::text("ab")]),
            Node::paragraph(vec![Node::text("cd")]),
        ]);
        let result = Step::Delete { from: 2, to: 6 }.apply(&start).unwrap();
        assert_eq!(result.doc.plain_text(), "ad");
        assert_eq!(result.map, StepMap::single(2, 4, 0));
    }

    #[test]
    fn test_delete_out_of_range() {
        assert!(Step::Delete { from: 3, to: 50 }.apply(&doc("ab")).is_err());
        assert!(Step::Delete { from: 3, to: 1 }.apply(&doc("ab")).is_err());
    }

    #[test]
    fn test_add_and_remove_mark() {
        let result = Step::AddMark {
            from: 2,
            to: 4,
            mark: Mark::Bold,
        }
        .apply(&doc("abcd"))
        .unwrap();
        let runs = result.doc.text_runs();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[1].1.text, "bc");
        assert_eq!(runs[1].1.marks, vec![Mark::Bold]);

        let cleared = Step::RemoveMark {
            from: 1,
            to: 5,
            mark: MarkMatch::Kind {
                kind: crate::MarkKind::Bold,
            },
        }
        .apply(&result.doc)
        .unwrap();
        assert_eq!(cleared.doc, doc("abcd"));
    }

    #[test]
    fn test_set_attrs_keeps_reference_id() {
        let atom = AtomNode::new(AtomAttrs::Formula(FormulaAttrs::default()));
        let id = atom.reference_id();
        let start = Document::from_blocks(vec![Node::paragraph(vec![Node::Atom(atom)])]);

        let attrs = AtomAttrs::Formula(FormulaAttrs {
            source: "x^2".into(),
            display: false,
        });
        let result = Step::SetAttrs {
            pos: 1,
            attrs: attrs.clone(),
        }
        .apply(&start)
        .unwrap();
        let updated = result.doc.atom_at(1).unwrap();
        assert_eq!(updated.reference_id(), id);
        assert_eq!(updated.attrs, attrs);

        let wrong_kind = Step::SetAttrs {
            pos: 1,
            attrs: AtomAttrs::Image(ImageAttrs::default()),
        };
        assert!(matches!(
            wrong_kind.apply(&start),
            Err(DocModelError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_step_json_shape() {
        let json = serde_json::to_value(Step::Delete { from: 1, to: 2 }).unwrap();
        assert_eq!(json["stepType"], "delete");
    }
}
