//! Reconciliation and garbage collection
//!
//! The document is the source of truth and the side tables are an index of
//! it. A pass compares the ids live in a document snapshot against the ids
//! the backend knows for the draft: records without a live counterpart are
//! deleted, live entities without a record are recorded. A failed call is
//! recorded in the summary and left for the next pass; nothing is rolled
//! back, so repeated passes converge.

use crate::{AnnotationRecord, Backend, CollaboratorError, DraftId, ReferenceRecord, SessionConfig};
use doc_model::{Document, StableId};
use render_model::{to_html, HtmlOptions};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The document state a sync pass works on
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub draft_id: DraftId,
    /// Content revision of the editing engine
    pub revision: u64,
    pub doc: Document,
}

/// What a sync pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcSummary {
    pub revision: u64,
    pub annotations_deleted: usize,
    pub annotations_created: usize,
    /// Records whose anchor was rewritten to follow the document
    pub annotations_updated: usize,
    pub references_deleted: usize,
    pub references_created: usize,
    pub binaries_deleted: usize,
    /// Whether the document content was written
    pub persisted: bool,
    /// Failed calls, in order
    pub errors: Vec<String>,
}

impl GcSummary {
    fn new(revision: u64) -> Self {
        Self {
            revision,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether any record was deleted
    pub fn removed_any(&self) -> bool {
        self.annotations_deleted + self.references_deleted > 0
    }

    /// Whether the pass changed anything in the backend
    pub fn changed_any(&self) -> bool {
        self.removed_any()
            || self.annotations_created
                + self.annotations_updated
                + self.references_created
                + self.binaries_deleted
                > 0
            || self.persisted
    }

    fn error(&mut self, context: &str, error: &CollaboratorError) {
        tracing::warn!(context, %error, "sync call failed");
        self.errors.push(format!("{context}: {error}"));
    }

    /// Join the errors into one message
    pub fn error_message(&self) -> Option<String> {
        (!self.errors.is_empty()).then(|| self.errors.join("; "))
    }
}

/// Serialized forms of a document, as persisted
pub fn render_snapshot(doc: &Document, plain_text: bool) -> crate::Result<(String, String, Option<String>)> {
    let html = to_html(doc, &HtmlOptions::persisted());
    let json = doc.to_json()?;
    let text = plain_text.then(|| doc.plain_text());
    Ok((html, json, text))
}

/// Runs sync passes against a backend on behalf of one requester
pub struct Reconciler<B> {
    backend: Arc<B>,
    requester_id: String,
    gc_enabled: bool,
    persist_plain_text: bool,
}

impl<B: Backend> Reconciler<B> {
    pub fn new(backend: Arc<B>, requester_id: impl Into<String>, config: &SessionConfig) -> Self {
        Self {
            backend,
            requester_id: requester_id.into(),
            gc_enabled: config.gc_enabled,
            persist_plain_text: config.persist_plain_text,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn requester_id(&self) -> &str {
        &self.requester_id
    }

    /// Run a full pass over a snapshot.
    ///
    /// The content is written when `content_changed` is set or when the pass
    /// deleted records.
    pub async fn reconcile(&self, snapshot: &Snapshot, content_changed: bool) -> GcSummary {
        let mut summary = GcSummary::new(snapshot.revision);
        if self.gc_enabled {
            self.collect_annotations(snapshot, &mut summary).await;
            self.collect_references(snapshot, &mut summary).await;
        }
        if content_changed || summary.removed_any() {
            self.persist(snapshot, &mut summary).await;
        }
        if summary.changed_any() {
            tracing::info!(
                draft = %snapshot.draft_id,
                revision = snapshot.revision,
                annotations_deleted = summary.annotations_deleted,
                annotations_created = summary.annotations_created,
                annotations_updated = summary.annotations_updated,
                references_deleted = summary.references_deleted,
                references_created = summary.references_created,
                binaries_deleted = summary.binaries_deleted,
                persisted = summary.persisted,
                "sync pass"
            );
        }
        summary
    }

    /// Write the document content
    pub async fn persist(&self, snapshot: &Snapshot, summary: &mut GcSummary) {
        let (html, json, text) = match render_snapshot(&snapshot.doc, self.persist_plain_text) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize document");
                summary.errors.push(format!("serialize: {e}"));
                return;
            }
        };
        match self
            .backend
            .persist_document(snapshot.draft_id, html, json, text, &self.requester_id)
            .await
        {
            Ok(()) => summary.persisted = true,
            Err(e) => summary.error("persist document", &e),
        }
    }

    async fn collect_annotations(&self, snapshot: &Snapshot, summary: &mut GcSummary) {
        let draft_id = snapshot.draft_id;
        let live = snapshot.doc.annotation_ids();
        let persisted: BTreeMap<StableId, AnnotationRecord> =
            match self.backend.list_annotation_records(draft_id).await {
                Ok(records) => records.into_iter().map(|r| (r.id, r)).collect(),
                Err(e) => return summary.error("list annotation records", &e),
            };

        let orphaned: Vec<StableId> = persisted.keys().filter(|id| !live.contains(id)).copied().collect();
        if !orphaned.is_empty() {
            match self
                .backend
                .delete_annotation_records(draft_id, &orphaned, &self.requester_id)
                .await
            {
                Ok(count) => summary.annotations_deleted += count,
                Err(e) => summary.error("delete annotation records", &e),
            }
        }

        let mut moved = Vec::new();
        for id in &live {
            let Some(record) = AnnotationRecord::from_document(draft_id, &snapshot.doc, *id) else {
                continue;
            };
            match persisted.get(id) {
                Some(stored) if stored.same_anchor(&record) => {}
                Some(stored) => {
                    tracing::debug!(%id, from = stored.start, to = record.start, "annotation anchor moved");
                    moved.push(record);
                }
                None => {
                    tracing::debug!(%id, "recording annotation without a record");
                    match self.backend.create_annotation_record(record).await {
                        Ok(_) => summary.annotations_created += 1,
                        Err(e) => summary.error("create annotation record", &e),
                    }
                }
            }
        }
        if !moved.is_empty() {
            match self
                .backend
                .update_annotation_records(draft_id, moved, &self.requester_id)
                .await
            {
                Ok(count) => summary.annotations_updated += count,
                Err(e) => summary.error("update annotation records", &e),
            }
        }
    }

    async fn collect_references(&self, snapshot: &Snapshot, summary: &mut GcSummary) {
        let draft_id = snapshot.draft_id;
        let live: BTreeSet<StableId> = snapshot.doc.reference_ids().into_iter().collect();
        let records = match self.backend.list_reference_records(draft_id).await {
            Ok(records) => records,
            Err(e) => return summary.error("list reference records", &e),
        };
        let persisted: BTreeSet<StableId> = records.iter().map(|r| r.id).collect();

        for record in records.iter().filter(|r| !live.contains(&r.id)) {
            self.remove_reference(record, summary).await;
        }

        for id in live.difference(&persisted) {
            let Some(record) = ReferenceRecord::from_document(draft_id, &snapshot.doc, *id) else {
                continue;
            };
            match self.backend.create_reference_record(record).await {
                Ok(()) => summary.references_created += 1,
                Err(e) => summary.error("create reference record", &e),
            }
        }
    }

    /// Remove the records of references confirmed deleted from a draft,
    /// along with their binaries. Ids without a record are skipped.
    pub async fn cleanup_references(&self, draft_id: DraftId, ids: &[StableId], revision: u64) -> GcSummary {
        let mut summary = GcSummary::new(revision);
        let records = match self.backend.list_reference_records(draft_id).await {
            Ok(records) => records,
            Err(e) => {
                summary.error("list reference records", &e);
                return summary;
            }
        };
        for id in ids {
            match records.iter().find(|r| r.id == *id) {
                Some(record) => self.remove_reference(record, &mut summary).await,
                None => tracing::debug!(%id, "no record for deleted reference"),
            }
        }
        summary
    }

    async fn remove_reference(&self, record: &ReferenceRecord, summary: &mut GcSummary) {
        match self
            .backend
            .delete_reference_record(record.draft_id, record.id, &self.requester_id)
            .await
        {
            Ok(()) => summary.references_deleted += 1,
            Err(e) if e.is_not_found() => {
                tracing::debug!(id = %record.id, "reference record already gone");
                return;
            }
            // The record stays, so the binary is kept for the next pass
            Err(e) => return summary.error("delete reference record", &e),
        }
        if let Some(url) = &record.binary_url {
            match self.backend.delete_binary(url).await {
                Ok(()) => summary.binaries_deleted += 1,
                Err(e) if e.is_not_found() => tracing::debug!(%url, "binary already gone"),
                Err(e) => summary.error("delete binary", &e),
            }
        }
    }
}
