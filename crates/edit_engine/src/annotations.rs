//! Annotation mark engine
//!
//! Annotation highlights are marks carrying the identity of an out-of-band
//! comment thread. An annotation id appears on at most one mark per run, and
//! all runs carrying an id share the same metadata. [`check_consistency`]
//! finds violations and [`repair_consistency`] collapses them.

use crate::command::clamp_range;
use crate::{Command, CommandResult, EditError, EditingEngine, Result};
use chrono::{DateTime, Utc};
use doc_model::{AnnotationMark, Document, Mark, MarkMatch, Selection, StableId, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Mark a range with an annotation, replacing any existing mark with the same id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAnnotation {
    pub from: usize,
    pub to: usize,
    pub meta: AnnotationMark,
}

impl Command for SetAnnotation {
    fn apply(&self, doc: &Document, _selection: &Selection) -> Result<CommandResult> {
        let (from, to) = clamp_range(doc, self.from, self.to);
        if from == to {
            return Err(EditError::EmptyRange { from, to });
        }
        if doc.text_between(from, to).is_empty() {
            return Err(EditError::InvalidCommand(format!(
                "range {from}..{to} holds no text to annotate"
            )));
        }

        let id = self.meta.annotation_id;
        let mut tr = Transaction::new(doc);
        tr.remove_mark(0, doc.content_size(), MarkMatch::Annotation { id })?;
        tr.add_mark(from, to, Mark::Annotation(self.meta.clone()))?;
        Ok(CommandResult::mapped(tr))
    }

    fn display_name(&self) -> &str {
        "Add Annotation"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

/// Remove every mark carrying an annotation id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearAnnotation {
    pub annotation_id: StableId,
}

impl Command for ClearAnnotation {
    fn apply(&self, doc: &Document, _selection: &Selection) -> Result<CommandResult> {
        let id = self.annotation_id;
        if !doc.annotation_ids().contains(&id) {
            return Err(EditError::AnnotationNotFound(id));
        }
        let mut tr = Transaction::new(doc);
        tr.remove_mark(0, doc.content_size(), MarkMatch::Annotation { id })?;
        Ok(CommandResult::mapped(tr))
    }

    fn display_name(&self) -> &str {
        "Remove Annotation"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

/// Remove every annotation mark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearAllAnnotations;

impl Command for ClearAllAnnotations {
    fn apply(&self, doc: &Document, _selection: &Selection) -> Result<CommandResult> {
        let mut tr = Transaction::new(doc);
        tr.remove_mark(0, doc.content_size(), MarkMatch::AllAnnotations)?;
        Ok(CommandResult::mapped(tr))
    }

    fn display_name(&self) -> &str {
        "Remove All Annotations"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

/// A freshly applied annotation, ready to be recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationDraft {
    pub mark: AnnotationMark,
    /// Start text offset
    pub start: usize,
    /// End text offset (exclusive)
    pub end: usize,
    /// The annotated text
    pub text: String,
}

/// The same annotation id more than once on one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMark {
    /// Position of the run
    pub pos: usize,
    pub annotation_id: StableId,
    pub count: usize,
}

/// Findings of a consistency check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub duplicates: Vec<DuplicateMark>,
    /// Ids whose runs disagree on metadata
    pub conflicts: Vec<StableId>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty() && self.conflicts.is_empty()
    }

    /// Every id needing repair
    pub fn affected_ids(&self) -> BTreeSet<StableId> {
        self.duplicates
            .iter()
            .map(|d| d.annotation_id)
            .chain(self.conflicts.iter().copied())
            .collect()
    }
}

/// Enumerate all text runs and report annotation ids that repeat on a run or
/// carry differing metadata across runs
pub fn check_consistency(doc: &Document) -> ConsistencyReport {
    let mut report = ConsistencyReport::default();
    let mut metadata: BTreeMap<StableId, &AnnotationMark> = BTreeMap::new();
    let mut conflicts = BTreeSet::new();

    for (pos, run) in doc.text_runs() {
        let mut counts: BTreeMap<StableId, usize> = BTreeMap::new();
        for annotation in run.marks.iter().filter_map(Mark::as_annotation) {
            let id = annotation.annotation_id;
            *counts.entry(id).or_default() += 1;
            match metadata.get(&id) {
                Some(first) if *first != annotation => {
                    conflicts.insert(id);
                }
                Some(_) => {}
                None => {
                    metadata.insert(id, annotation);
                }
            }
        }
        report.duplicates.extend(
            counts
                .into_iter()
                .filter(|(_, count)| *count > 1)
                .map(|(annotation_id, count)| DuplicateMark {
                    pos,
                    annotation_id,
                    count,
                }),
        );
    }

    report.conflicts = conflicts.into_iter().collect();
    report
}

/// Build a transaction collapsing every reported id to a single mark with
/// the metadata of its first occurrence. Returns `None` for a clean report.
pub fn repair_consistency(doc: &Document, report: &ConsistencyReport) -> Result<Option<Transaction>> {
    if report.is_clean() {
        return Ok(None);
    }

    let spans = doc.annotation_spans();
    let mut tr = Transaction::new(doc);
    for id in report.affected_ids() {
        let Some(canonical) = doc.annotation_meta(id).cloned() else {
            continue;
        };
        tr.remove_mark(0, doc.content_size(), MarkMatch::Annotation { id })?;
        for span in spans.iter().filter(|s| s.annotation_id == id) {
            let range = doc_model::TextRange::new(span.start, span.end);
            if let Some((from, to)) = doc.text_range_to_positions(range) {
                tr.add_mark(from, to, Mark::Annotation(canonical.clone()))?;
            }
        }
    }
    Ok(Some(tr))
}

impl EditingEngine {
    /// Mark a range with an annotation
    pub fn set_annotation(&mut self, from: usize, to: usize, meta: AnnotationMark) -> Result<()> {
        self.execute(&SetAnnotation { from, to, meta })?;
        Ok(())
    }

    /// Remove an annotation's marks. Returns `false` if it was not present.
    pub fn clear_annotation(&mut self, annotation_id: StableId) -> Result<bool> {
        match self.execute(&ClearAnnotation { annotation_id }) {
            Ok(_) => Ok(true),
            Err(EditError::AnnotationNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove every annotation mark
    pub fn clear_all_annotations(&mut self) -> Result<()> {
        self.execute(&ClearAllAnnotations)?;
        Ok(())
    }

    /// Annotate the current selection under a freshly minted id
    pub fn annotate_selection(
        &mut self,
        author_id: &str,
        is_author: bool,
        created_at: DateTime<Utc>,
        tag: Option<String>,
    ) -> Result<AnnotationDraft> {
        let selection = self.selection();
        let mut mark = AnnotationMark::new(author_id, is_author, created_at);
        mark.tag = tag;
        let id = mark.annotation_id;

        self.set_annotation(selection.from(), selection.to(), mark.clone())?;

        let doc = self.doc();
        let range = doc
            .annotation_ranges()
            .get(&id)
            .copied()
            .ok_or(EditError::AnnotationNotFound(id))?;
        let text = doc
            .find_annotation(id)
            .map(|(from, to)| doc.text_between(from, to))
            .unwrap_or_default();

        Ok(AnnotationDraft {
            mark,
            start: range.start,
            end: range.end,
            text,
        })
    }

    /// Check annotation consistency, log findings and apply the repair
    pub fn enforce_consistency(&mut self) -> Result<ConsistencyReport> {
        let report = check_consistency(self.doc());
        for duplicate in &report.duplicates {
            tracing::warn!(
                id = %duplicate.annotation_id,
                pos = duplicate.pos,
                count = duplicate.count,
                "duplicate annotation mark on run"
            );
        }
        for id in &report.conflicts {
            tracing::warn!(%id, "annotation runs disagree on metadata");
        }
        if let Some(tr) = repair_consistency(self.doc(), &report)? {
            self.apply_transaction(tr)?;
        }
        Ok(report)
    }
}
