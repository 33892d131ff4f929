//! Live and offline rendering must highlight the same characters

use chrono::Utc;
use doc_model::{
    AtomAttrs, CitationAttrs, Document, FormulaAttrs, Node, Selection, StableId, TextRange,
};
use edit_engine::EditingEngine;
use proptest::prelude::*;
use render_model::{highlighted_ranges, reconstruct, to_html, AnnotationRange, HtmlOptions};
use std::collections::BTreeMap;

fn sample_engine() -> EditingEngine {
    EditingEngine::with_document(Document::from_blocks(vec![
        Node::paragraph(vec![
            Node::text("The quick brown fox "),
            Node::atom(AtomAttrs::Citation(CitationAttrs {
                title: "Foxes".into(),
                ..Default::default()
            })),
            Node::text(" jumps over"),
        ]),
        Node::paragraph(vec![
            Node::text("the lazy "),
            Node::atom(AtomAttrs::Formula(FormulaAttrs {
                source: r"\frac{1}{2}".into(),
                display: false,
            })),
            Node::text(" dog"),
        ]),
    ]))
}

/// Annotation ranges as the live document holds them, merged per id
fn live_ranges(doc: &Document) -> BTreeMap<StableId, Vec<TextRange>> {
    let mut ranges: BTreeMap<StableId, Vec<TextRange>> = BTreeMap::new();
    for span in doc.annotation_spans() {
        let list = ranges.entry(span.annotation_id).or_default();
        match list.last_mut() {
            Some(last) if last.end == span.start => last.end = span.end,
            _ => list.push(TextRange::new(span.start, span.end)),
        }
    }
    ranges
}

/// Records as garbage collection would leave them
fn records(doc: &Document) -> Vec<AnnotationRange> {
    doc.annotation_ranges()
        .into_iter()
        .map(|(id, range)| AnnotationRange {
            id,
            start: range.start,
            end: range.end,
            author_id: doc
                .annotation_meta(id)
                .map(|m| m.author_id.clone())
                .unwrap_or_default(),
        })
        .collect()
}

fn assert_parity(doc: &Document) {
    let expected = live_ranges(doc);

    let live_html = to_html(doc, &HtmlOptions::default());
    assert_eq!(highlighted_ranges(&live_html).unwrap(), expected);

    let persisted = to_html(doc, &HtmlOptions::persisted());
    let rebuilt = reconstruct(&persisted, &records(doc)).unwrap();
    assert!(rebuilt.skipped.is_empty());
    assert_eq!(highlighted_ranges(&rebuilt.html).unwrap(), expected);
}

#[test]
fn test_parity_for_overlapping_annotations() {
    let mut engine = sample_engine();
    engine.set_selection(Selection::new(5, 16));
    engine.annotate_selection("alice", false, Utc::now(), None).unwrap();
    engine.set_selection(Selection::new(11, 30));
    engine.annotate_selection("bob", true, Utc::now(), None).unwrap();

    assert_eq!(engine.doc().annotation_ids().len(), 2);
    assert_parity(engine.doc());
}

#[test]
fn test_parity_across_blocks_and_atoms() {
    let mut engine = sample_engine();
    let size = engine.doc().content_size();
    engine.set_selection(Selection::new(18, size - 3));
    engine.annotate_selection("carol", false, Utc::now(), None).unwrap();

    assert_parity(engine.doc());
}

#[derive(Debug, Clone)]
enum Op {
    Annotate(usize, usize, u8),
    Delete(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..60, 1usize..20, 0u8..3).prop_map(|(at, len, author)| Op::Annotate(at, at + len, author)),
        (0usize..60, 1usize..8).prop_map(|(at, len)| Op::Delete(at, at + len)),
    ]
}

proptest! {
    #[test]
    fn prop_parity_after_random_edits(ops in proptest::collection::vec(op(), 1..12)) {
        let mut engine = sample_engine();
        for op in ops {
            let size = engine.doc().content_size();
            match op {
                Op::Annotate(from, to, author) => {
                    engine.set_selection(Selection::new(from.min(size), to.min(size)));
                    let _ = engine.annotate_selection(&format!("author-{author}"), false, Utc::now(), None);
                }
                Op::Delete(from, to) => {
                    let _ = engine.execute(&edit_engine::DeleteRange::new(from.min(size), to.min(size)));
                }
            }
        }
        assert_parity(engine.doc());
    }
}
