//! In-memory implementation of every collaborator
//!
//! Used by tests and local tooling. Counts calls per operation, records
//! deleted binaries, and can be told to fail an operation to exercise the
//! error paths of the sync pipeline.

use crate::{
    AnnotationRecord, AnnotationStore, BinaryStore, CollabResult, CollaboratorError, DocumentPersistence,
    DraftId, DraftVersion, ReferenceRecord, ReferenceStore, VersionSummary,
};
use doc_model::StableId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A collaborator operation, for counters and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PersistDocument,
    LoadDraft,
    ForkDraft,
    ListVersions,
    CreateAnnotation,
    DeleteAnnotations,
    UpdateAnnotations,
    ListAnnotations,
    CreateReference,
    DeleteReference,
    ListReferences,
    UploadBinary,
    DeleteBinary,
}

#[derive(Default)]
struct Inner {
    drafts: HashMap<DraftId, DraftVersion>,
    annotations: BTreeMap<(DraftId, StableId), AnnotationRecord>,
    references: BTreeMap<(DraftId, StableId), ReferenceRecord>,
    binaries: HashMap<String, Vec<u8>>,
    deleted_binaries: Vec<String>,
    calls: HashMap<Operation, usize>,
    failing: HashSet<Operation>,
    next_binary: u64,
}

impl Inner {
    fn begin(&mut self, op: Operation) -> CollabResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.failing.contains(&op) {
            return Err(CollaboratorError::Unavailable(format!("{op:?} failed")));
        }
        Ok(())
    }

    fn draft(&self, draft_id: DraftId) -> CollabResult<&DraftVersion> {
        self.drafts
            .get(&draft_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("draft {draft_id}")))
    }

    fn authorize(&self, draft_id: DraftId, requester_id: &str) -> CollabResult<()> {
        let draft = self.draft(draft_id)?;
        if draft.owner_id != requester_id {
            return Err(CollaboratorError::Unauthorized(format!(
                "{requester_id} does not own draft {draft_id}"
            )));
        }
        Ok(())
    }

    /// The draft owner may change any annotation record of the draft, an
    /// author only their own
    fn authorize_annotations(&self, draft_id: DraftId, ids: &[StableId], requester_id: &str) -> CollabResult<()> {
        if self.draft(draft_id)?.owner_id == requester_id {
            return Ok(());
        }
        let foreign = ids.iter().find(|id| {
            self.annotations
                .get(&(draft_id, **id))
                .is_some_and(|record| record.author_id != requester_id)
        });
        match foreign {
            Some(id) => Err(CollaboratorError::Unauthorized(format!(
                "{requester_id} neither owns draft {draft_id} nor authored annotation {id}"
            ))),
            None => Ok(()),
        }
    }
}

/// In-memory backend
#[derive(Default)]
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty first version owned by `owner_id`
    pub fn create_draft(&self, owner_id: &str) -> DraftId {
        self.insert_draft(DraftVersion::first(owner_id))
    }

    /// Store a draft row as is
    pub fn insert_draft(&self, draft: DraftVersion) -> DraftId {
        let id = draft.draft_id;
        self.lock().drafts.insert(id, draft);
        id
    }

    /// Get a copy of a draft row
    pub fn draft(&self, draft_id: DraftId) -> Option<DraftVersion> {
        self.lock().drafts.get(&draft_id).cloned()
    }

    /// Make every call of an operation fail until [`InMemoryBackend::restore`]
    pub fn fail(&self, op: Operation) {
        self.lock().failing.insert(op);
    }

    pub fn restore(&self, op: Operation) {
        self.lock().failing.remove(&op);
    }

    /// Number of calls made to an operation, failed ones included
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn annotation_ids(&self, draft_id: DraftId) -> Vec<StableId> {
        self.lock()
            .annotations
            .keys()
            .filter(|(draft, _)| *draft == draft_id)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn annotation(&self, draft_id: DraftId, id: StableId) -> Option<AnnotationRecord> {
        self.lock().annotations.get(&(draft_id, id)).cloned()
    }

    pub fn reference_ids(&self, draft_id: DraftId) -> Vec<StableId> {
        self.lock()
            .references
            .keys()
            .filter(|(draft, _)| *draft == draft_id)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn has_binary(&self, url: &str) -> bool {
        self.lock().binaries.contains_key(url)
    }

    /// URLs passed to successful binary deletions, in call order
    pub fn deleted_binaries(&self) -> Vec<String> {
        self.lock().deleted_binaries.clone()
    }
}

impl DocumentPersistence for InMemoryBackend {
    async fn persist_document(
        &self,
        draft_id: DraftId,
        html: String,
        json: String,
        plain_text: Option<String>,
        requester_id: &str,
    ) -> CollabResult<()> {
        let mut inner = self.lock();
        inner.begin(Operation::PersistDocument)?;
        inner.authorize(draft_id, requester_id)?;
        if let Some(draft) = inner.drafts.get_mut(&draft_id) {
            draft.html_content = html;
            draft.json_content = json;
            if let Some(text) = plain_text {
                draft.plain_text = text;
            }
        }
        Ok(())
    }

    async fn load_draft(&self, draft_id: DraftId) -> CollabResult<DraftVersion> {
        let mut inner = self.lock();
        inner.begin(Operation::LoadDraft)?;
        inner.draft(draft_id).cloned()
    }

    async fn fork_draft(&self, from: DraftId, requester_id: &str) -> CollabResult<DraftVersion> {
        let mut inner = self.lock();
        inner.begin(Operation::ForkDraft)?;
        inner.authorize(from, requester_id)?;

        let source = inner.draft(from)?.clone();
        let latest = inner
            .drafts
            .values()
            .filter(|d| d.document_id == source.document_id)
            .map(|d| d.version_number)
            .max()
            .unwrap_or(source.version_number);
        let fork = DraftVersion {
            draft_id: DraftId::new(),
            version_number: latest + 1,
            published_at: None,
            ..source
        };
        let to = fork.draft_id;

        let annotations: Vec<_> = inner
            .annotations
            .values()
            .filter(|r| r.draft_id == from)
            .map(|r| r.for_draft(to))
            .collect();
        for record in annotations {
            inner.annotations.insert((to, record.id), record);
        }
        let references: Vec<_> = inner
            .references
            .values()
            .filter(|r| r.draft_id == from)
            .map(|r| r.for_draft(to))
            .collect();
        for record in references {
            inner.references.insert((to, record.id), record);
        }

        inner.drafts.insert(to, fork.clone());
        Ok(fork)
    }

    async fn list_versions(&self, draft_id: DraftId) -> CollabResult<Vec<VersionSummary>> {
        let mut inner = self.lock();
        inner.begin(Operation::ListVersions)?;
        let document_id = inner.draft(draft_id)?.document_id;
        let mut versions: Vec<VersionSummary> = inner
            .drafts
            .values()
            .filter(|d| d.document_id == document_id)
            .map(VersionSummary::from)
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }
}

impl AnnotationStore for InMemoryBackend {
    async fn create_annotation_record(&self, record: AnnotationRecord) -> CollabResult<StableId> {
        let mut inner = self.lock();
        inner.begin(Operation::CreateAnnotation)?;
        inner.draft(record.draft_id)?;
        let id = record.id;
        inner.annotations.insert((record.draft_id, id), record);
        Ok(id)
    }

    async fn delete_annotation_records(
        &self,
        draft_id: DraftId,
        ids: &[StableId],
        requester_id: &str,
    ) -> CollabResult<usize> {
        let mut inner = self.lock();
        inner.begin(Operation::DeleteAnnotations)?;
        inner.authorize_annotations(draft_id, ids, requester_id)?;
        let deleted = ids
            .iter()
            .filter(|id| inner.annotations.remove(&(draft_id, **id)).is_some())
            .count();
        Ok(deleted)
    }

    async fn update_annotation_records(
        &self,
        draft_id: DraftId,
        records: Vec<AnnotationRecord>,
        requester_id: &str,
    ) -> CollabResult<usize> {
        let mut inner = self.lock();
        inner.begin(Operation::UpdateAnnotations)?;
        let ids: Vec<StableId> = records.iter().map(|r| r.id).collect();
        inner.authorize_annotations(draft_id, &ids, requester_id)?;
        let mut updated = 0;
        for record in records {
            if let Some(stored) = inner.annotations.get_mut(&(draft_id, record.id)) {
                stored.start = record.start;
                stored.end = record.end;
                stored.text = record.text;
                stored.tag = record.tag;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn list_annotation_records(&self, draft_id: DraftId) -> CollabResult<Vec<AnnotationRecord>> {
        let mut inner = self.lock();
        inner.begin(Operation::ListAnnotations)?;
        inner.draft(draft_id)?;
        Ok(inner
            .annotations
            .values()
            .filter(|r| r.draft_id == draft_id)
            .cloned()
            .collect())
    }
}

impl ReferenceStore for InMemoryBackend {
    async fn create_reference_record(&self, record: ReferenceRecord) -> CollabResult<()> {
        let mut inner = self.lock();
        inner.begin(Operation::CreateReference)?;
        inner.draft(record.draft_id)?;
        inner.references.insert((record.draft_id, record.id), record);
        Ok(())
    }

    async fn delete_reference_record(
        &self,
        draft_id: DraftId,
        id: StableId,
        requester_id: &str,
    ) -> CollabResult<()> {
        let mut inner = self.lock();
        inner.begin(Operation::DeleteReference)?;
        inner.authorize(draft_id, requester_id)?;
        match inner.references.remove(&(draft_id, id)) {
            Some(_) => Ok(()),
            None => Err(CollaboratorError::NotFound(format!("reference {id}"))),
        }
    }

    async fn list_reference_records(&self, draft_id: DraftId) -> CollabResult<Vec<ReferenceRecord>> {
        let mut inner = self.lock();
        inner.begin(Operation::ListReferences)?;
        inner.draft(draft_id)?;
        Ok(inner
            .references
            .values()
            .filter(|r| r.draft_id == draft_id)
            .cloned()
            .collect())
    }
}

impl BinaryStore for InMemoryBackend {
    async fn upload_binary(
        &self,
        owner_id: &str,
        draft_id: DraftId,
        id: StableId,
        bytes: Vec<u8>,
    ) -> CollabResult<String> {
        let mut inner = self.lock();
        inner.begin(Operation::UploadBinary)?;
        inner.authorize(draft_id, owner_id)?;
        inner.next_binary += 1;
        let url = format!("mem://{owner_id}/{draft_id}/{id}/{}", inner.next_binary);
        inner.binaries.insert(url.clone(), bytes);
        Ok(url)
    }

    async fn delete_binary(&self, url: &str) -> CollabResult<()> {
        let mut inner = self.lock();
        inner.begin(Operation::DeleteBinary)?;
        if inner.binaries.remove(url).is_none() {
            return Err(CollaboratorError::NotFound(format!("binary {url}")));
        }
        inner.deleted_binaries.push(url.to_string());
        Ok(())
    }
}
