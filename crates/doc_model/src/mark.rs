//! Marks - attribute bags attached to text ranges
//!
//! Formatting marks (bold, italic, ...) and annotation highlights both live on
//! text runs. Annotation marks carry the identity of an out-of-band comment
//! thread; several may overlap on the same run as long as their ids differ.

use crate::StableId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata carried by an annotation highlight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationMark {
    /// Identity of the annotation thread
    pub annotation_id: StableId,
    /// Author of the annotation
    pub author_id: String,
    /// Whether the annotation was made by the document's author
    pub is_author: bool,
    /// When the annotation was created
    pub created_at: DateTime<Utc>,
    /// Optional free-form tag
    #[serde(default)]
    pub tag: Option<String>,
}

impl AnnotationMark {
    /// Create annotation metadata with a freshly minted id
    pub fn new(author_id: impl Into<String>, is_author: bool, created_at: DateTime<Utc>) -> Self {
        Self {
            annotation_id: StableId::mint(),
            author_id: author_id.into(),
            is_author,
            created_at,
            tag: None,
        }
    }

    /// Set the tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Use a specific annotation id
    pub fn with_id(mut self, id: StableId) -> Self {
        self.annotation_id = id;
        self
    }
}

/// The kind of a mark, in canonical ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarkKind {
    Link,
    Bold,
    Italic,
    Underline,
    Code,
    Annotation,
}

/// A mark attached to a text run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Code,
    Link { href: String },
    Annotation(AnnotationMark),
}

impl Mark {
    /// Get the kind of this mark
    pub fn kind(&self) -> MarkKind {
        match self {
            Mark::Bold => MarkKind::Bold,
            Mark::Italic => MarkKind::Italic,
            Mark::Underline => MarkKind::Underline,
            Mark::Code => MarkKind::Code,
            Mark::Link { .. } => MarkKind::Link,
            Mark::Annotation(_) => MarkKind::Annotation,
        }
    }

    /// Whether text typed at the right edge of this mark inherits it.
    ///
    /// Annotation highlights are exclusive at both ends so that continued
    /// typing after a commented span does not grow the span.
    pub fn is_inclusive(&self) -> bool {
        match self {
            Mark::Bold | Mark::Italic | Mark::Underline | Mark::Code => true,
            Mark::Link { .. } | Mark::Annotation(_) => false,
        }
    }

    /// Get the annotation id, if this is an annotation mark
    pub fn annotation_id(&self) -> Option<StableId> {
        match self {
            Mark::Annotation(a) => Some(a.annotation_id),
            _ => None,
        }
    }

    /// Get the annotation metadata, if this is an annotation mark
    pub fn as_annotation(&self) -> Option<&AnnotationMark> {
        match self {
            Mark::Annotation(a) => Some(a),
            _ => None,
        }
    }

    /// Whether two marks occupy the same slot in a mark set, meaning adding
    /// one replaces the other
    pub fn same_slot(&self, other: &Mark) -> bool {
        match (self, other) {
            (Mark::Annotation(a), Mark::Annotation(b)) => a.annotation_id == b.annotation_id,
            _ => self.kind() == other.kind(),
        }
    }

    fn sort_key(&self) -> (MarkKind, Option<StableId>) {
        (self.kind(), self.annotation_id())
    }
}

/// Selects which marks a removal applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "camelCase")]
pub enum MarkMatch {
    /// Every mark of a kind
    Kind { kind: MarkKind },
    /// The annotation mark with a specific id
    Annotation { id: StableId },
    /// Every annotation mark
    AllAnnotations,
}

impl MarkMatch {
    /// Check whether a mark is selected
    pub fn matches(&self, mark: &Mark) -> bool {
        match self {
            MarkMatch::Kind { kind } => mark.kind() == *kind,
            MarkMatch::Annotation { id } => mark.annotation_id() == Some(*id),
            MarkMatch::AllAnnotations => mark.kind() == MarkKind::Annotation,
        }
    }
}

/// Add a mark to a set, replacing any mark in the same slot, and keep the set
/// in canonical order
pub fn add_to_set(marks: &mut Vec<Mark>, mark: Mark) {
    marks.retain(|m| !m.same_slot(&mark));
    marks.push(mark);
    sort_set(marks);
}

/// Remove every matching mark from a set. Returns true if anything was removed.
pub fn remove_from_set(marks: &mut Vec<Mark>, matcher: &MarkMatch) -> bool {
    let before = marks.len();
    marks.retain(|m| !matcher.matches(m));
    marks.len() != before
}

/// Sort a mark set into canonical order
pub fn sort_set(marks: &mut [Mark]) {
    marks.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(author: &str) -> AnnotationMark {
        AnnotationMark::new(author, false, Utc::now())
    }

    #[test]
    fn test_inclusive_policy() {
        assert!(Mark::Bold.is_inclusive());
        assert!(!Mark::Link { href: "https://example.com".into() }.is_inclusive());
        assert!(!Mark::Annotation(annotation("u1")).is_inclusive());
    }

    #[test]
    fn test_add_replaces_same_annotation_id() {
        let first = annotation("u1");
        let mut second = first.clone();
        second.tag = Some("question".into());

        let mut marks = vec![Mark::Annotation(first)];
        add_to_set(&mut marks, Mark::Annotation(second.clone()));

        assert_eq!(marks, vec![Mark::Annotation(second)]);
    }

    #[test]
    fn test_distinct_annotations_coexist() {
        let mut marks = Vec::new();
        add_to_set(&mut marks, Mark::Annotation(annotation("u1")));
        add_to_set(&mut marks, Mark::Annotation(annotation("u2")));
        add_to_set(&mut marks, Mark::Bold);

        assert_eq!(marks.len(), 3);
        assert_eq!(marks[0], Mark::Bold);
    }

    #[test]
    fn test_remove_by_match() {
        let a = annotation("u1");
        let b = annotation("u2");
        let mut marks = vec![Mark::Bold, Mark::Annotation(a.clone()), Mark::Annotation(b)];

        assert!(remove_from_set(&mut marks, &MarkMatch::Annotation { id: a.annotation_id }));
        assert_eq!(marks.len(), 2);
        assert!(remove_from_set(&mut marks, &MarkMatch::AllAnnotations));
        assert_eq!(marks, vec![Mark::Bold]);
        assert!(!remove_from_set(&mut marks, &MarkMatch::AllAnnotations));
    }

    #[test]
    fn test_mark_json_shape() {
        let mark = Mark::Annotation(annotation("u1").with_tag("typo"));
        let json = serde_json::to_value(&mark).unwrap();
        assert_eq!(json["type"], "annotation");
        assert_eq!(json["authorId"], "u1");
        assert_eq!(json["tag"], "typo");

        let parsed: Mark = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, mark);
    }
}
