//! Sequential reference numbering
//!
//! Citations, figures and equations are numbered `1..n` per kind in document
//! order. Numbers are view decorations only; the document is never edited to
//! hold them, so reordering references renumbers them without a model edit.

use doc_model::{Document, NodeKind, StableId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A display number attached to a reference node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDecoration {
    pub reference_id: StableId,
    /// Position of the node in the document the decoration was computed for
    pub pos: usize,
    pub kind: NodeKind,
    pub number: usize,
}

impl NumberDecoration {
    /// The visible label
    pub fn label(&self) -> String {
        match self.kind {
            NodeKind::Image => format!("Figure {}", self.number),
            NodeKind::Formula => format!("({})", self.number),
            _ => format!("[{}]", self.number),
        }
    }
}

/// Number every reference node of a document in document order
pub fn number_references(doc: &Document) -> Vec<NumberDecoration> {
    let mut counters: HashMap<NodeKind, usize> = HashMap::new();
    doc.reference_nodes()
        .into_iter()
        .map(|(pos, atom)| {
            let counter = counters.entry(atom.kind()).or_default();
            *counter += 1;
            NumberDecoration {
                reference_id: atom.reference_id(),
                pos,
                kind: atom.kind(),
                number: *counter,
            }
        })
        .collect()
}

/// Keeps reference numbers current as the document changes.
///
/// [`notify`](Self::notify) is called on every document change and only
/// schedules a walk; the walk runs on the next
/// [`flush_frame`](Self::flush_frame). A document equal to the last one seen
/// schedules nothing.
#[derive(Debug, Default)]
pub struct SequentialRenderer {
    last: Option<Document>,
    frame_pending: bool,
    decorations: Vec<NumberDecoration>,
    by_id: HashMap<StableId, usize>,
    walks: usize,
}

impl SequentialRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the current document. Returns whether a frame was scheduled.
    pub fn notify(&mut self, doc: &Document) -> bool {
        if self.last.as_ref() == Some(doc) {
            tracing::trace!("document unchanged, numbering skipped");
            return false;
        }
        self.last = Some(doc.clone());
        self.frame_pending = true;
        true
    }

    /// Whether a walk is scheduled for the next frame
    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }

    /// Run the scheduled walk, if any. Returns whether decorations changed.
    pub fn flush_frame(&mut self) -> bool {
        if !std::mem::take(&mut self.frame_pending) {
            return false;
        }
        let Some(doc) = &self.last else {
            return false;
        };
        let decorations = number_references(doc);
        self.walks += 1;
        if decorations == self.decorations {
            return false;
        }
        self.by_id = decorations
            .iter()
            .enumerate()
            .map(|(i, d)| (d.reference_id, i))
            .collect();
        self.decorations = decorations;
        true
    }

    /// Current decorations in document order
    pub fn decorations(&self) -> &[NumberDecoration] {
        &self.decorations
    }

    /// The decoration of a reference node
    pub fn decoration(&self, reference_id: StableId) -> Option<&NumberDecoration> {
        self.by_id.get(&reference_id).map(|i| &self.decorations[*i])
    }

    /// The display number of a reference node
    pub fn number_of(&self, reference_id: StableId) -> Option<usize> {
        self.decoration(reference_id).map(|d| d.number)
    }

    /// How many walks have run
    pub fn walks(&self) -> usize {
        self.walks
    }
}
