//! Persisted record shapes
//!
//! Annotation and reference records form a derived index of the document:
//! the marks and reference nodes inside the document are authoritative and
//! records are created and deleted to follow them.

use chrono::{DateTime, Utc};
use doc_model::{AtomAttrs, Document, NodeKind, StableId};
use edit_engine::AnnotationDraft;
use render_model::AnnotationRange;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a draft version row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(Uuid);

impl DraftId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted annotation, addressed by the id of its mark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    pub id: StableId,
    pub draft_id: DraftId,
    /// Start text offset
    pub start: usize,
    /// End text offset (exclusive)
    pub end: usize,
    /// Quoted text at the time of recording
    pub text: String,
    pub author_id: String,
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnnotationRecord {
    /// Record a freshly applied annotation
    pub fn from_draft(draft_id: DraftId, draft: &AnnotationDraft) -> Self {
        Self {
            id: draft.mark.annotation_id,
            draft_id,
            start: draft.start,
            end: draft.end,
            text: draft.text.clone(),
            author_id: draft.mark.author_id.clone(),
            tag: draft.mark.tag.clone(),
            created_at: draft.mark.created_at,
        }
    }

    /// Synthesize the record of an annotation live in a document
    pub fn from_document(draft_id: DraftId, doc: &Document, id: StableId) -> Option<Self> {
        let meta = doc.annotation_meta(id)?;
        let range = doc.annotation_ranges().get(&id).copied()?;
        let text = doc
            .find_annotation(id)
            .map(|(from, to)| doc.text_between(from, to))
            .unwrap_or_default();
        Some(Self {
            id,
            draft_id,
            start: range.start,
            end: range.end,
            text,
            author_id: meta.author_id.clone(),
            tag: meta.tag.clone(),
            created_at: meta.created_at,
        })
    }

    /// Copy of this record under another draft
    pub fn for_draft(&self, draft_id: DraftId) -> Self {
        Self {
            draft_id,
            ..self.clone()
        }
    }

    /// Whether two records anchor the same text with the same tag
    pub fn same_anchor(&self, other: &Self) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.text == other.text
            && self.tag == other.tag
    }
}

impl From<&AnnotationRecord> for AnnotationRange {
    fn from(record: &AnnotationRecord) -> Self {
        AnnotationRange {
            id: record.id,
            start: record.start,
            end: record.end,
            author_id: record.author_id.clone(),
        }
    }
}

/// Kind of a reference record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceKind {
    Citation,
    Image,
    Formula,
}

impl ReferenceKind {
    pub fn of(attrs: &AtomAttrs) -> Self {
        match attrs {
            AtomAttrs::Citation(_) => ReferenceKind::Citation,
            AtomAttrs::Image(_) => ReferenceKind::Image,
            AtomAttrs::Formula(_) => ReferenceKind::Formula,
        }
    }

    pub fn node_kind(&self) -> NodeKind {
        match self {
            ReferenceKind::Citation => NodeKind::Citation,
            ReferenceKind::Image => NodeKind::Image,
            ReferenceKind::Formula => NodeKind::Formula,
        }
    }
}

/// Persisted metadata of a reference node, addressed by its reference id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRecord {
    pub id: StableId,
    pub draft_id: DraftId,
    pub kind: ReferenceKind,
    pub attrs: AtomAttrs,
    /// URL of the stored binary, for images
    pub binary_url: Option<String>,
}

impl ReferenceRecord {
    pub fn new(id: StableId, draft_id: DraftId, attrs: AtomAttrs) -> Self {
        let binary_url = match &attrs {
            AtomAttrs::Image(image) => image.src.clone(),
            AtomAttrs::Citation(_) | AtomAttrs::Formula(_) => None,
        };
        Self {
            id,
            draft_id,
            kind: ReferenceKind::of(&attrs),
            attrs,
            binary_url,
        }
    }

    /// Synthesize the record of a reference node live in a document
    pub fn from_document(draft_id: DraftId, doc: &Document, id: StableId) -> Option<Self> {
        let pos = doc.find_node_by_id(id)?;
        let atom = doc.atom_at(pos)?;
        Some(Self::new(id, draft_id, atom.attrs.clone()))
    }

    pub fn for_draft(&self, draft_id: DraftId) -> Self {
        Self {
            draft_id,
            ..self.clone()
        }
    }
}

/// A persisted draft version row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftVersion {
    pub draft_id: DraftId,
    /// Groups the versions of one piece of writing
    pub document_id: Uuid,
    pub owner_id: String,
    pub version_number: u32,
    pub html_content: String,
    pub json_content: String,
    pub plain_text: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl DraftVersion {
    /// A first, empty version owned by `owner_id`
    pub fn first(owner_id: impl Into<String>) -> Self {
        Self {
            draft_id: DraftId::new(),
            document_id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            version_number: 1,
            html_content: String::new(),
            json_content: String::new(),
            plain_text: String::new(),
            published_at: None,
        }
    }

    /// Parse the stored document. An empty row holds an empty document.
    pub fn document(&self) -> crate::Result<Document> {
        if self.json_content.trim().is_empty() {
            return Ok(Document::new());
        }
        Ok(Document::from_json(&self.json_content)?)
    }
}

/// Summary of a version, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub draft_id: DraftId,
    pub version_number: u32,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<&DraftVersion> for VersionSummary {
    fn from(version: &DraftVersion) -> Self {
        Self {
            draft_id: version.draft_id,
            version_number: version.version_number,
            published_at: version.published_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{AnnotationMark, ImageAttrs, Mark, Node};

    #[test]
    fn test_record_from_document() {
        let mark = AnnotationMark::new("alice", true, Utc::now()).with_tag("typo");
        let id = mark.annotation_id;
        let doc = Document::from_blocks(vec![Node::paragraph(vec![
            Node::text("The "),
            Node::marked_text("quick", vec![Mark::Annotation(mark)]),
            Node::text(" fox"),
        ])]);

        let draft_id = DraftId::new();
        let record = AnnotationRecord::from_document(draft_id, &doc, id).unwrap();
        assert_eq!((record.start, record.end), (4, 9));
        assert_eq!(record.text, "quick");
        assert_eq!(record.author_id, "alice");
        assert_eq!(record.tag.as_deref(), Some("typo"));

        assert!(AnnotationRecord::from_document(draft_id, &doc, StableId::mint()).is_none());
    }

    #[test]
    fn test_reference_record_takes_binary_url() {
        let attrs = AtomAttrs::Image(ImageAttrs {
            src: Some("mem://blob/1".into()),
            ..Default::default()
        });
        let record = ReferenceRecord::new(StableId::mint(), DraftId::new(), attrs);
        assert_eq!(record.kind, ReferenceKind::Image);
        assert_eq!(record.binary_url.as_deref(), Some("mem://blob/1"));
    }

    #[test]
    fn test_empty_version_loads_empty_document() {
        let version = DraftVersion::first("alice");
        assert_eq!(version.document().unwrap(), Document::new());
    }

    #[test]
    fn test_record_json_shape() {
        let record = AnnotationRecord {
            id: StableId::mint(),
            draft_id: DraftId::new(),
            start: 0,
            end: 5,
            text: "quick".into(),
            author_id: "bob".into(),
            tag: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["authorId"], "bob");
        assert_eq!(json["draftId"], record.draft_id.to_string());
    }
}
