//! External collaborator interfaces
//!
//! The relational store, the annotation and reference side tables and the
//! binary store live outside the engine. Each is an async trait so sessions
//! can drive them from a background task. Implementations reject a
//! requester that does not own the target with
//! [`CollaboratorError::Unauthorized`], never with `NotFound`.

use crate::{AnnotationRecord, CollabResult, DraftId, DraftVersion, ReferenceRecord, VersionSummary};
use doc_model::StableId;

/// Draft rows holding the serialized document
#[trait_variant::make(Send)]
pub trait DocumentPersistence: Send + Sync {
    /// Overwrite the content of a draft version
    async fn persist_document(
        &self,
        draft_id: DraftId,
        html: String,
        json: String,
        plain_text: Option<String>,
        requester_id: &str,
    ) -> CollabResult<()>;

    /// Load a draft version
    async fn load_draft(&self, draft_id: DraftId) -> CollabResult<DraftVersion>;

    /// Create the next version of a draft's document, copying its content
    /// and its annotation and reference records
    async fn fork_draft(&self, from: DraftId, requester_id: &str) -> CollabResult<DraftVersion>;

    /// List every version of the document a draft belongs to, oldest first
    async fn list_versions(&self, draft_id: DraftId) -> CollabResult<Vec<VersionSummary>>;
}

/// Annotation side table
#[trait_variant::make(Send)]
pub trait AnnotationStore: Send + Sync {
    async fn create_annotation_record(&self, record: AnnotationRecord) -> CollabResult<StableId>;

    /// Delete a draft's records in one round trip. Ids without a record are
    /// ignored.
    async fn delete_annotation_records(
        &self,
        draft_id: DraftId,
        ids: &[StableId],
        requester_id: &str,
    ) -> CollabResult<usize>;

    /// Overwrite the anchors of existing records of a draft in one round
    /// trip. Records without a stored counterpart are ignored.
    async fn update_annotation_records(
        &self,
        draft_id: DraftId,
        records: Vec<AnnotationRecord>,
        requester_id: &str,
    ) -> CollabResult<usize>;

    async fn list_annotation_records(&self, draft_id: DraftId) -> CollabResult<Vec<AnnotationRecord>>;
}

/// Reference side table
#[trait_variant::make(Send)]
pub trait ReferenceStore: Send + Sync {
    async fn create_reference_record(&self, record: ReferenceRecord) -> CollabResult<()>;

    async fn delete_reference_record(
        &self,
        draft_id: DraftId,
        id: StableId,
        requester_id: &str,
    ) -> CollabResult<()>;

    async fn list_reference_records(&self, draft_id: DraftId) -> CollabResult<Vec<ReferenceRecord>>;
}

/// Blob storage for uploaded images
#[trait_variant::make(Send)]
pub trait BinaryStore: Send + Sync {
    /// Store bytes and return their URL
    async fn upload_binary(
        &self,
        owner_id: &str,
        draft_id: DraftId,
        id: StableId,
        bytes: Vec<u8>,
    ) -> CollabResult<String>;

    async fn delete_binary(&self, url: &str) -> CollabResult<()>;
}

/// Every collaborator a session talks to
pub trait Backend: DocumentPersistence + AnnotationStore + ReferenceStore + BinaryStore + 'static {}

impl<T> Backend for T where T: DocumentPersistence + AnnotationStore + ReferenceStore + BinaryStore + 'static {}
