//! Offline range reconstruction
//!
//! Re-derives annotation highlights from an HTML snapshot and a list of
//! annotation records without a live document. Text offsets count the
//! characters of every text node in document order, except text inside
//! reference nodes (`data-atomic`) or rendered formula output, which matches
//! the text offsets of the live document.

use crate::dom::{Dom, NodeRef};
use crate::html::{annotation_attrs, ANNOTATION_ID_ATTR, ATOMIC_ATTR, FORMULA_CLASS};
use crate::Result;
use doc_model::{StableId, TextRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An annotation to place, in text offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRange {
    pub id: StableId,
    pub start: usize,
    pub end: usize,
    pub author_id: String,
}

/// Why an annotation was not placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Start equals end
    Empty,
    /// Start after end
    Reversed,
    /// Start beyond the text
    OutOfBounds,
    /// Neither a single wrap nor per-node wraps could be applied
    Unwrappable,
}

/// The reconstructed HTML and how each annotation was placed
#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    pub html: String,
    /// Placed with a single highlight element
    pub applied: Vec<StableId>,
    /// Placed with one highlight element per text node
    pub fallback: Vec<StableId>,
    pub skipped: Vec<(StableId, SkipReason)>,
}

/// A counted text node and its text-offset range
#[derive(Debug, Clone, Copy)]
struct Segment {
    node: NodeRef,
    start: usize,
    end: usize,
}

fn is_opaque(dom: &Dom, node: NodeRef) -> bool {
    dom.attr(node, ATOMIC_ATTR).is_some() || dom.has_class(node, FORMULA_CLASS)
}

/// Build the cumulative offset table in a single pass over the text nodes
fn offset_table(dom: &Dom) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut offset = 0;
    for node in dom.text_nodes() {
        if dom.ancestors(node).any(|a| is_opaque(dom, a)) {
            continue;
        }
        let len = dom.text(node).map(|t| t.chars().count()).unwrap_or(0);
        segments.push(Segment {
            node,
            start: offset,
            end: offset + len,
        });
        offset += len;
    }
    segments
}

/// Split the text node containing `offset` so a node boundary falls on it
fn split_at(dom: &mut Dom, offset: usize) -> Result<()> {
    let hit = offset_table(dom)
        .into_iter()
        .find(|s| s.start < offset && offset < s.end);
    if let Some(segment) = hit {
        dom.split_text(segment.node, offset - segment.start)?;
    }
    Ok(())
}

fn highlight(dom: &mut Dom, range: &AnnotationRange) -> NodeRef {
    dom.create_element("mark", annotation_attrs(range.id, &range.author_id))
}

fn place(dom: &mut Dom, range: &AnnotationRange) -> std::result::Result<bool, SkipReason> {
    split_at(dom, range.start).map_err(|_| SkipReason::Unwrappable)?;
    split_at(dom, range.end).map_err(|_| SkipReason::Unwrappable)?;

    let covered: Vec<NodeRef> = offset_table(dom)
        .into_iter()
        .filter(|s| s.start >= range.start && s.end <= range.end && s.start < s.end)
        .map(|s| s.node)
        .collect();
    let (Some(&first), Some(&last)) = (covered.first(), covered.last()) else {
        return Err(SkipReason::Unwrappable);
    };

    if dom.parent(first).is_some() && dom.parent(first) == dom.parent(last) {
        let mark = highlight(dom, range);
        match dom.wrap_siblings(first, last, mark) {
            Ok(()) => return Ok(false),
            Err(e) => {
                dom.detach(mark);
                tracing::debug!(id = %range.id, error = %e, "single wrap failed");
            }
        }
    }

    tracing::warn!(id = %range.id, nodes = covered.len(), "annotation spans elements, wrapping per text node");
    for node in covered {
        let mark = highlight(dom, range);
        if let Err(e) = dom.wrap_siblings(node, node, mark) {
            tracing::warn!(id = %range.id, error = %e, "per-node wrap failed");
            dom.detach(mark);
            return Err(SkipReason::Unwrappable);
        }
    }
    Ok(true)
}

/// Place annotation highlights into an HTML snapshot
pub fn reconstruct(html: &str, ranges: &[AnnotationRange]) -> Result<Reconstruction> {
    let mut dom = Dom::parse(html)?;
    let total = offset_table(&dom).last().map(|s| s.end).unwrap_or(0);
    let mut result = Reconstruction::default();

    let mut ordered: Vec<&AnnotationRange> = ranges.iter().collect();
    // Outer ranges first so overlapping highlights nest
    ordered.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    for range in ordered {
        let reason = if range.start == range.end {
            Some(SkipReason::Empty)
        } else if range.start > range.end {
            Some(SkipReason::Reversed)
        } else if range.start >= total {
            Some(SkipReason::OutOfBounds)
        } else {
            None
        };
        if let Some(reason) = reason {
            tracing::debug!(id = %range.id, ?reason, "annotation dropped");
            result.skipped.push((range.id, reason));
            continue;
        }

        let clamped = AnnotationRange {
            end: range.end.min(total),
            ..range.clone()
        };
        match place(&mut dom, &clamped) {
            Ok(false) => result.applied.push(range.id),
            Ok(true) => result.fallback.push(range.id),
            Err(reason) => {
                tracing::warn!(id = %range.id, ?reason, "annotation skipped");
                result.skipped.push((range.id, reason));
            }
        }
    }

    result.html = dom.to_html();
    Ok(result)
}

/// Highlighted text-offset ranges per annotation id in any HTML, merged into
/// maximal contiguous ranges
pub fn highlighted_ranges(html: &str) -> Result<BTreeMap<StableId, Vec<TextRange>>> {
    let dom = Dom::parse(html)?;
    let mut ranges: BTreeMap<StableId, Vec<TextRange>> = BTreeMap::new();
    for segment in offset_table(&dom) {
        if segment.start == segment.end {
            continue;
        }
        for ancestor in dom.ancestors(segment.node) {
            let Some(id) = dom.attr(ancestor, ANNOTATION_ID_ATTR).and_then(StableId::parse) else {
                continue;
            };
            let list = ranges.entry(id).or_default();
            match list.last_mut() {
                Some(last) if last.end == segment.start => last.end = segment.end,
                Some(last) if last.end >= segment.end => {}
                _ => list.push(TextRange::new(segment.start, segment.end)),
            }
        }
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(id: StableId, start: usize, end: usize) -> AnnotationRange {
        AnnotationRange {
            id,
            start,
            end,
            author_id: "alice".to_string(),
        }
    }

    #[test]
    fn test_single_wrap() {
        let id = StableId::mint();
        let result = reconstruct("<p>The quick brown fox</p>", &[range(id, 4, 9)]).unwrap();

        assert_eq!(result.applied, vec![id]);
        let ranges = highlighted_ranges(&result.html).unwrap();
        assert_eq!(ranges[&id], vec![TextRange::new(4, 9)]);
        assert!(result.html.starts_with("<p>The <mark"));
        assert!(result.html.ends_with(">quick</mark> brown fox</p>"));
    }

    #[test]
    fn test_fallback_across_elements() {
        let id = StableId::mint();
        let result =
            reconstruct("<p>ab<strong>cd</strong>ef</p><p>gh</p>", &[range(id, 1, 7)]).unwrap();

        assert_eq!(result.fallback, vec![id]);
        let ranges = highlighted_ranges(&result.html).unwrap();
        assert_eq!(ranges[&id], vec![TextRange::new(1, 7)]);
    }

    #[test]
    fn test_atomic_and_formula_text_is_not_counted() {
        let id = StableId::mint();
        let html = concat!(
            "<p>ab<cite data-atomic=\"true\">[1]</cite>cd",
            "<span class=\"rendered-formula\"><span>x^2</span></span>ef</p>"
        );
        let result = reconstruct(html, &[range(id, 1, 5)]).unwrap();

        let ranges = highlighted_ranges(&result.html).unwrap();
        assert_eq!(ranges[&id], vec![TextRange::new(1, 5)]);
        assert!(result.html.contains("<cite data-atomic=\"true\">[1]</cite>"));
        assert!(result.html.contains("<span>x^2</span>"));
    }

    #[test]
    fn test_degenerate_ranges_are_dropped() {
        let empty = StableId::mint();
        let reversed = StableId::mint();
        let beyond = StableId::mint();
        let result = reconstruct(
            "<p>abc</p>",
            &[range(empty, 1, 1), range(reversed, 2, 1), range(beyond, 5, 9)],
        )
        .unwrap();

        assert_eq!(result.html, "<p>abc</p>");
        assert_eq!(
            result.skipped,
            vec![
                (empty, SkipReason::Empty),
                (reversed, SkipReason::Reversed),
                (beyond, SkipReason::OutOfBounds),
            ]
        );
    }

    #[test]
    fn test_overlaps_nest() {
        let outer = StableId::mint();
        let inner = StableId::mint();
        let result = reconstruct(
            "<p>The quick brown fox</p>",
            &[range(inner, 10, 19), range(outer, 4, 15)],
        )
        .unwrap();

        let ranges = highlighted_ranges(&result.html).unwrap();
        assert_eq!(ranges[&outer], vec![TextRange::new(4, 15)]);
        assert_eq!(ranges[&inner], vec![TextRange::new(10, 19)]);
        assert!(result.html.matches("<mark").count() <= 4);
    }
}
