//! Transactions - ordered lists of steps with their combined mapping

use crate::{
    AtomAttrs, Assoc, Document, Mapping, Mark, MarkMatch, Node, Result, Step,
};

/// A transaction accumulates steps against a starting document.
///
/// Each step is applied as it is added, so later steps address positions in
/// the document produced by the earlier ones. The [`Mapping`] maps positions
/// in the starting document to positions in the current one.
#[derive(Debug, Clone)]
pub struct Transaction {
    before: Document,
    doc: Document,
    steps: Vec<Step>,
    mapping: Mapping,
}

impl Transaction {
    /// Start a transaction against a document
    pub fn new(doc: &Document) -> Self {
        Self {
            before: doc.clone(),
            doc: doc.clone(),
            steps: Vec::new(),
            mapping: Mapping::new(),
        }
    }

    /// Apply a step and record it
    pub fn step(&mut self, step: Step) -> Result<&mut Self> {
        let result = step.apply(&self.doc)?;
        self.mapping.push(result.map);
        self.mapping.push(result.repairs);
        self.doc = result.doc;
        self.steps.push(step);
        Ok(self)
    }

    /// Insert text, inheriting the marks active at the position
    pub fn insert_text(&mut self, pos: usize, text: &str) -> Result<&mut Self> {
        let marks = self.doc.marks_at(pos);
        self.insert_text_with_marks(pos, text, marks)
    }

    /// Insert text carrying an explicit mark set
    pub fn insert_text_with_marks(
        &mut self,
        pos: usize,
        text: &str,
        marks: Vec<Mark>,
    ) -> Result<&mut Self> {
        if text.is_empty() {
            return Ok(self);
        }
        self.step(Step::Insert {
            pos,
            content: vec![Node::marked_text(text, marks)],
        })
    }

    /// Insert a single node
    pub fn insert_node(&mut self, pos: usize, node: Node) -> Result<&mut Self> {
        self.insert_nodes(pos, vec![node])
    }

    /// Insert several nodes
    pub fn insert_nodes(&mut self, pos: usize, content: Vec<Node>) -> Result<&mut Self> {
        if content.is_empty() {
            return Ok(self);
        }
        self.step(Step::Insert { pos, content })
    }

    /// Delete the range `[from, to)`
    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self> {
        if from == to {
            return Ok(self);
        }
        self.step(Step::Delete { from, to })
    }

    /// Replace a range with text inheriting the marks at its start
    pub fn replace_with_text(&mut self, from: usize, to: usize, text: &str) -> Result<&mut Self> {
        let marks = self.doc.marks_at(from);
        self.delete(from, to)?;
        self.insert_text_with_marks(from, text, marks)
    }

    /// Add a mark to a range
    pub fn add_mark(&mut self, from: usize, to: usize, mark: Mark) -> Result<&mut Self> {
        if from == to {
            return Ok(self);
        }
        self.step(Step::AddMark { from, to, mark })
    }

    /// Remove matching marks from a range
    pub fn remove_mark(&mut self, from: usize, to: usize, mark: MarkMatch) -> Result<&mut Self> {
        if from == to {
            return Ok(self);
        }
        self.step(Step::RemoveMark { from, to, mark })
    }

    /// Replace the attributes of the atomic node at a position
    pub fn set_atom_attrs(&mut self, pos: usize, attrs: AtomAttrs) -> Result<&mut Self> {
        self.step(Step::SetAttrs { pos, attrs })
    }

    /// Map a position from the starting document into the current one
    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.mapping.map(pos, assoc)
    }

    /// Get the current document
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// Get the starting document
    pub fn before(&self) -> &Document {
        &self.before
    }

    /// Get the applied steps
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Get the combined mapping
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Check if the transaction changed the document
    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty() && self.doc != self.before
    }

    /// Consume the transaction, returning the new document and the mapping
    pub fn into_parts(self) -> (Document, Mapping) {
        (self.doc, self.mapping)
    }
}

/// Apply an ordered list of steps to a document
pub fn apply_edit(doc: &Document, steps: &[Step]) -> Result<(Document, Mapping)> {
    let mut tr = Transaction::new(doc);
    for step in steps {
        tr.step(step.clone())?;
    }
    Ok(tr.into_parts())
}
