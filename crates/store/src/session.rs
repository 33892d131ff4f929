//! Editing session with debounced background sync
//!
//! Edits apply to the local engine immediately and never wait on the
//! network. Every content change publishes a snapshot on a watch channel; a
//! background worker waits until no new snapshot arrived for the debounce
//! window, then runs a sync pass over the latest one. Record creation for new
//! annotations and references and cleanup of confirmed reference deletions
//! are queued to the same worker and handled ahead of any pending pass, so
//! all backend traffic of a session is sequential.

use crate::{
    AnnotationRecord, Backend, DraftId, DraftVersion, GcSummary, Reconciler, ReferenceRecord,
    Result, SessionConfig, Snapshot, StoreError,
};
use chrono::{DateTime, Utc};
use doc_model::{AtomAttrs, Document, ImageAttrs, Selection, StableId};
use edit_engine::{
    Applied, AnnotationDraft, Command, DeleteKey, EditingEngine, InsertReference, InsertText,
};
use render_model::SequentialRenderer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Current sync status of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub draft_id: DraftId,
    /// Content revision of the local document
    pub revision: u64,
    /// Whether the local document is newer than the persisted one
    pub dirty: bool,
    /// Whether a sync call is in flight
    pub syncing: bool,
    pub last_persisted_revision: Option<u64>,
    /// Error of the last failed sync call, cleared by the next clean pass
    pub last_error: Option<String>,
    pub last_sync: Option<GcSummary>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub(crate) struct SyncState {
    syncing: bool,
    persisted: Option<(DraftId, u64)>,
    last_error: Option<String>,
    last_sync: Option<GcSummary>,
    last_sync_at: Option<DateTime<Utc>>,
}

impl SyncState {
    fn persisted_revision(&self, draft_id: DraftId) -> Option<u64> {
        self.persisted.filter(|(d, _)| *d == draft_id).map(|(_, r)| r)
    }

    /// Record a persisted revision. An older revision arriving late is
    /// discarded.
    pub(crate) fn mark_persisted(&mut self, draft_id: DraftId, revision: u64) {
        match self.persisted_revision(draft_id) {
            Some(current) if current >= revision => {
                tracing::debug!(revision, current, "discarding superseded persist result");
            }
            _ => self.persisted = Some((draft_id, revision)),
        }
    }

    /// Reset after loading a version whose content is already persisted
    pub(crate) fn reset_persisted(&mut self, draft_id: DraftId, revision: u64) {
        self.persisted = Some((draft_id, revision));
    }
}

enum SyncRequest {
    /// A new annotation: record it, then persist the document carrying its mark
    Annotate {
        record: AnnotationRecord,
        snapshot: Arc<Snapshot>,
    },
    /// A new or updated reference node, and the binary it no longer uses
    RecordReference {
        record: ReferenceRecord,
        replaced_binary: Option<String>,
    },
    /// References confirmed deleted from the document
    Cleanup {
        draft_id: DraftId,
        ids: Vec<StableId>,
        revision: u64,
    },
    /// Run a pass now and report it
    Flush {
        snapshot: Arc<Snapshot>,
        reply: oneshot::Sender<GcSummary>,
    },
}

struct SyncWorker<B> {
    reconciler: Reconciler<B>,
    requests: mpsc::UnboundedReceiver<SyncRequest>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    state: Arc<RwLock<SyncState>>,
    debounce: Duration,
}

impl<B: Backend> SyncWorker<B> {
    async fn run(mut self) {
        let mut deadline: Option<Instant> = None;
        loop {
            let debounce = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                request = self.requests.recv() => {
                    let Some(request) = request else { break };
                    if self.handle(request).await {
                        deadline = None;
                    }
                }
                changed = self.snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    deadline = Some(Instant::now() + self.debounce);
                }
                () = debounce => {
                    deadline = None;
                    let snapshot = self.snapshots.borrow_and_update().clone();
                    self.sync(&snapshot).await;
                }
            }
        }
        tracing::debug!("sync worker stopped");
    }

    /// Handle a queued request. Returns true if the latest snapshot is
    /// settled and no debounced pass is needed.
    async fn handle(&mut self, request: SyncRequest) -> bool {
        match request {
            SyncRequest::Annotate { record, snapshot } => {
                let id = record.id;
                let mut summary = GcSummary {
                    revision: snapshot.revision,
                    ..GcSummary::default()
                };
                match self.reconciler.backend().create_annotation_record(record).await {
                    Ok(_) => summary.annotations_created += 1,
                    Err(e) => {
                        tracing::warn!(%id, error = %e, "failed to record annotation");
                        summary.errors.push(format!("create annotation record: {e}"));
                    }
                }
                self.reconciler.persist(&snapshot, &mut summary).await;
                self.finish(snapshot.draft_id, summary, false).await;
                false
            }
            SyncRequest::RecordReference {
                record,
                replaced_binary,
            } => {
                let id = record.id;
                if let Err(e) = self.reconciler.backend().create_reference_record(record).await {
                    // The stored record still points at the old binary, so it stays
                    tracing::warn!(%id, error = %e, "failed to record reference");
                    self.state.write().await.last_error = Some(format!("create reference record: {e}"));
                    return false;
                }
                if let Some(url) = replaced_binary {
                    match self.reconciler.backend().delete_binary(&url).await {
                        Ok(()) => tracing::debug!(%id, %url, "removed replaced binary"),
                        Err(e) if e.is_not_found() => tracing::debug!(%url, "replaced binary already gone"),
                        Err(e) => {
                            tracing::warn!(%url, error = %e, "failed to remove replaced binary");
                            self.state.write().await.last_error = Some(format!("delete binary: {e}"));
                        }
                    }
                }
                false
            }
            SyncRequest::Cleanup {
                draft_id,
                ids,
                revision,
            } => {
                let summary = self.reconciler.cleanup_references(draft_id, &ids, revision).await;
                self.finish(draft_id, summary, false).await;
                false
            }
            SyncRequest::Flush { snapshot, reply } => {
                let summary = self.sync(&snapshot).await;
                if reply.send(summary).is_err() {
                    tracing::debug!("flush caller went away");
                }
                let latest = self.snapshots.borrow().clone();
                if latest.draft_id == snapshot.draft_id && latest.revision <= snapshot.revision {
                    self.snapshots.borrow_and_update();
                    return true;
                }
                false
            }
        }
    }

    async fn sync(&mut self, snapshot: &Snapshot) -> GcSummary {
        let content_changed = {
            let mut state = self.state.write().await;
            state.syncing = true;
            state
                .persisted_revision(snapshot.draft_id)
                .map_or(true, |r| r < snapshot.revision)
        };
        let summary = self.reconciler.reconcile(snapshot, content_changed).await;
        self.finish(snapshot.draft_id, summary.clone(), true).await;
        summary
    }

    async fn finish(&mut self, draft_id: DraftId, summary: GcSummary, full_pass: bool) {
        let mut state = self.state.write().await;
        state.syncing = false;
        if summary.persisted {
            state.mark_persisted(draft_id, summary.revision);
        }
        match summary.error_message() {
            Some(message) => state.last_error = Some(message),
            None if full_pass => state.last_error = None,
            None => {}
        }
        state.last_sync_at = Some(Utc::now());
        state.last_sync = Some(summary);
    }
}

/// One user's editing session on one draft
pub struct EditingSession<B: Backend> {
    engine: EditingEngine,
    pub(crate) draft_id: DraftId,
    requester_id: String,
    is_owner: bool,
    config: SessionConfig,
    pub(crate) backend: Arc<B>,
    renderer: SequentialRenderer,
    snapshots: watch::Sender<Arc<Snapshot>>,
    requests: mpsc::UnboundedSender<SyncRequest>,
    pub(crate) state: Arc<RwLock<SyncState>>,
    worker: Option<JoinHandle<()>>,
    published_revision: u64,
    edits_since_check: u32,
}

impl<B: Backend> EditingSession<B> {
    /// Open a draft and start its sync worker. Must be called inside a
    /// Tokio runtime.
    pub async fn open(
        backend: Arc<B>,
        draft_id: DraftId,
        requester_id: impl Into<String>,
        config: SessionConfig,
    ) -> Result<Self> {
        let requester_id = requester_id.into();
        let version = backend.load_draft(draft_id).await?;
        let engine = EditingEngine::with_document(version.document()?);
        let revision = engine.revision();

        let snapshot = Arc::new(Snapshot {
            draft_id,
            revision,
            doc: engine.doc().clone(),
        });
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(SyncState {
            persisted: Some((draft_id, revision)),
            ..SyncState::default()
        }));

        let worker = SyncWorker {
            reconciler: Reconciler::new(backend.clone(), requester_id.clone(), &config),
            requests: request_rx,
            snapshots: snapshot_rx,
            state: state.clone(),
            debounce: config.debounce(),
        };
        let handle = tokio::spawn(worker.run());
        tracing::info!(draft = %draft_id, version = version.version_number, "session opened");

        let mut session = Self {
            engine,
            draft_id,
            is_owner: version.owner_id == requester_id,
            requester_id,
            config,
            backend,
            renderer: SequentialRenderer::new(),
            snapshots: snapshot_tx,
            requests: request_tx,
            state,
            worker: Some(handle),
            published_revision: revision,
            edits_since_check: 0,
        };
        session.renderer.notify(session.engine.doc());
        if session.config.consistency_check_interval > 0 {
            session.check_consistency()?;
            if session.engine.revision() != revision {
                session.publish();
            }
        }
        Ok(session)
    }

    pub fn engine(&self) -> &EditingEngine {
        &self.engine
    }

    pub fn doc(&self) -> &Document {
        self.engine.doc()
    }

    pub fn selection(&self) -> Selection {
        self.engine.selection()
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.engine.set_selection(selection);
    }

    pub fn draft_id(&self) -> DraftId {
        self.draft_id
    }

    pub fn requester_id(&self) -> &str {
        &self.requester_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The current state as a snapshot
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            draft_id: self.draft_id,
            revision: self.engine.revision(),
            doc: self.engine.doc().clone(),
        }
    }

    fn send(&self, request: SyncRequest) -> Result<()> {
        self.requests.send(request).map_err(|_| StoreError::WorkerStopped)
    }

    pub(crate) fn publish(&mut self) {
        self.published_revision = self.engine.revision();
        self.snapshots.send_replace(Arc::new(self.snapshot()));
        self.renderer.notify(self.engine.doc());
    }

    /// Make a loaded version the session's document. Returns the revision
    /// matching the stored content, before any repair.
    pub(crate) fn load_version(&mut self, version: &DraftVersion, doc: Document) -> Result<u64> {
        self.engine.replace_document(doc);
        self.draft_id = version.draft_id;
        self.is_owner = version.owner_id == self.requester_id;
        let loaded = self.engine.revision();
        if self.config.consistency_check_interval > 0 {
            self.check_consistency()?;
        }
        self.edits_since_check = 0;
        Ok(loaded)
    }

    fn check_consistency(&mut self) -> Result<()> {
        let report = self.engine.enforce_consistency()?;
        if !report.is_clean() {
            tracing::info!(ids = report.affected_ids().len(), "repaired annotation marks");
        }
        self.edits_since_check = 0;
        Ok(())
    }

    /// Route confirmed deletions to cleanup and publish a changed document
    fn after_edit(&mut self) -> Result<()> {
        let confirmed = self.engine.take_confirmed_deletions();
        if !confirmed.is_empty() {
            self.send(SyncRequest::Cleanup {
                draft_id: self.draft_id,
                ids: confirmed,
                revision: self.engine.revision(),
            })?;
        }
        if self.engine.revision() == self.published_revision {
            return Ok(());
        }
        self.edits_since_check += 1;
        let interval = self.config.consistency_check_interval;
        if interval > 0 && self.edits_since_check >= interval {
            self.check_consistency()?;
        }
        self.publish();
        Ok(())
    }

    /// Execute an editing command
    pub fn execute(&mut self, command: &dyn Command) -> Result<Applied> {
        let applied = self.engine.execute(command);
        // Confirmed deletions are routed even when the command failed
        self.after_edit()?;
        Ok(applied?)
    }

    /// Type text over the selection
    pub fn insert_text(&mut self, text: &str) -> Result<Applied> {
        self.execute(&InsertText::new(text))
    }

    /// Handle a Backspace or Delete key press
    pub fn delete_key(&mut self, key: DeleteKey) -> Result<Applied> {
        let applied = self.engine.handle_delete_key(key);
        self.after_edit()?;
        Ok(applied?)
    }

    /// Annotate the selection as the session's requester. The mark is
    /// applied first; recording it and persisting the document follow in the
    /// background.
    pub fn annotate(&mut self, tag: Option<String>) -> Result<AnnotationDraft> {
        let draft = self
            .engine
            .annotate_selection(&self.requester_id, self.is_owner, Utc::now(), tag)?;
        self.after_edit()?;
        self.send(SyncRequest::Annotate {
            record: AnnotationRecord::from_draft(self.draft_id, &draft),
            snapshot: Arc::new(self.snapshot()),
        })?;
        Ok(draft)
    }

    /// Remove an annotation's marks. Its record goes with the next pass.
    pub fn clear_annotation(&mut self, annotation_id: StableId) -> Result<bool> {
        let cleared = self.engine.clear_annotation(annotation_id)?;
        self.after_edit()?;
        Ok(cleared)
    }

    pub fn clear_all_annotations(&mut self) -> Result<()> {
        self.engine.clear_all_annotations()?;
        self.after_edit()
    }

    /// Insert a citation, image or formula at the selection
    pub fn insert_reference(&mut self, attrs: AtomAttrs) -> Result<StableId> {
        self.insert_reference_with_id(InsertReference::new(attrs))
    }

    fn insert_reference_with_id(&mut self, command: InsertReference) -> Result<StableId> {
        self.execute(&command)?;
        self.send(SyncRequest::RecordReference {
            record: ReferenceRecord::new(command.reference_id, self.draft_id, command.attrs),
            replaced_binary: None,
        })?;
        Ok(command.reference_id)
    }

    /// Upload an image and insert it at the selection. The upload is removed
    /// again if the node cannot be inserted.
    pub async fn insert_image(&mut self, bytes: Vec<u8>, mut image: ImageAttrs) -> Result<StableId> {
        let id = StableId::mint();
        let url = self
            .backend
            .upload_binary(&self.requester_id, self.draft_id, id, bytes)
            .await?;
        image.src = Some(url.clone());

        let command = InsertReference {
            reference_id: id,
            attrs: AtomAttrs::Image(image),
        };
        match self.insert_reference_with_id(command) {
            Ok(id) => Ok(id),
            Err(e) => {
                if let Err(cleanup) = self.backend.delete_binary(&url).await {
                    tracing::warn!(%url, error = %cleanup, "failed to remove orphaned upload");
                }
                Err(e)
            }
        }
    }

    /// Replace a reference's attributes. Returns `false` if the node is gone.
    ///
    /// An image binary the node no longer points at is deleted once the
    /// updated record is stored, unless another node still shows it.
    pub fn update_reference(&mut self, reference_id: StableId, attrs: AtomAttrs) -> Result<bool> {
        let previous = self.binary_url_of(reference_id);
        let updated = self.engine.update_reference(reference_id, attrs.clone())?;
        self.after_edit()?;
        if updated {
            let record = ReferenceRecord::new(reference_id, self.draft_id, attrs);
            let replaced_binary = previous
                .filter(|url| record.binary_url.as_ref() != Some(url))
                .filter(|url| !self.binary_in_use(url));
            self.send(SyncRequest::RecordReference {
                record,
                replaced_binary,
            })?;
        }
        Ok(updated)
    }

    fn binary_url_of(&self, reference_id: StableId) -> Option<String> {
        let doc = self.engine.doc();
        match &doc.atom_at(doc.find_node_by_id(reference_id)?)?.attrs {
            AtomAttrs::Image(image) => image.src.clone(),
            AtomAttrs::Citation(_) | AtomAttrs::Formula(_) => None,
        }
    }

    fn binary_in_use(&self, url: &str) -> bool {
        self.engine.doc().reference_nodes().iter().any(|(_, atom)| {
            matches!(&atom.attrs, AtomAttrs::Image(image) if image.src.as_deref() == Some(url))
        })
    }

    /// Delete a reference node by id. Its record and binary are cleaned up
    /// once the removal is confirmed. Returns `false` if the node is gone.
    pub fn delete_reference(&mut self, reference_id: StableId) -> Result<bool> {
        let deleted = self.engine.delete_reference(reference_id);
        self.after_edit()?;
        Ok(deleted?)
    }

    /// Run the numbering walk if the document changed since the last frame
    pub fn render_frame(&mut self) -> bool {
        self.renderer.flush_frame()
    }

    pub fn renderer(&self) -> &SequentialRenderer {
        &self.renderer
    }

    /// Run a sync pass over the current state now and wait for it
    pub async fn flush(&mut self) -> Result<GcSummary> {
        let (reply, response) = oneshot::channel();
        self.send(SyncRequest::Flush {
            snapshot: Arc::new(self.snapshot()),
            reply,
        })?;
        response.await.map_err(|_| StoreError::WorkerStopped)
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.state.read().await;
        let revision = self.engine.revision();
        let persisted = state.persisted_revision(self.draft_id);
        SessionStatus {
            draft_id: self.draft_id,
            revision,
            dirty: persisted.map_or(true, |r| r < revision),
            syncing: state.syncing,
            last_persisted_revision: persisted,
            last_error: state.last_error.clone(),
            last_sync: state.last_sync.clone(),
            last_sync_at: state.last_sync_at,
        }
    }

    /// Flush and stop the sync worker
    pub async fn close(mut self) -> Result<GcSummary> {
        let summary = self.flush().await?;
        let worker = self.worker.take();
        drop(self);
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "sync worker panicked");
            }
        }
        Ok(summary)
    }
}
