//! End-to-end tests of editing sessions against the in-memory backend

use doc_model::{AtomAttrs, CitationAttrs, Document, ImageAttrs, Node, Selection, StableId};
use edit_engine::{check_consistency, DeleteKey, DeleteRange};
use proptest::prelude::*;
use render_model::{highlighted_ranges, reconstruct, AnnotationRange};
use std::sync::Arc;
use std::time::Duration;
use store::{
    BinaryStore, DraftId, DraftVersion, EditingSession, InMemoryBackend, Operation, ReferenceStore,
    SessionConfig,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn draft_with(backend: &InMemoryBackend, owner: &str, doc: &Document) -> DraftId {
    backend.insert_draft(DraftVersion {
        json_content: doc.to_json().unwrap(),
        plain_text: doc.plain_text(),
        ..DraftVersion::first(owner)
    })
}

fn paragraph(text: &str) -> Document {
    Document::from_blocks(vec![Node::paragraph(vec![Node::text(text)])])
}

async fn open(text: &str) -> (Arc<InMemoryBackend>, EditingSession<InMemoryBackend>) {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    let draft = draft_with(&backend, "alice", &paragraph(text));
    let session = EditingSession::open(backend.clone(), draft, "alice", SessionConfig::default())
        .await
        .unwrap();
    (backend, session)
}

#[tokio::test]
async fn test_annotation_follows_edits_and_record_is_collected() {
    let (backend, mut session) = open("The quick brown fox").await;
    let draft = session.draft_id();

    session.set_selection(Selection::new(5, 10));
    let annotation = session.annotate(None).unwrap();
    assert_eq!((annotation.start, annotation.end), (4, 9));
    assert_eq!(annotation.text, "quick");
    let id = annotation.mark.annotation_id;

    session.flush().await.unwrap();
    assert_eq!(backend.annotation_ids(draft), vec![id]);
    assert_eq!(backend.annotation(draft, id).unwrap().text, "quick");

    // Delete "The "
    session.execute(&DeleteRange::new(1, 5)).unwrap();
    let range = session.doc().annotation_ranges()[&id];
    assert_eq!((range.start, range.end), (0, 5));
    let (from, to) = session.doc().find_annotation(id).unwrap();
    assert_eq!(session.doc().text_between(from, to), "quick");

    // Delete "quick"
    session.execute(&DeleteRange::new(1, 6)).unwrap();
    assert!(session.doc().annotation_ids().is_empty());

    let summary = session.flush().await.unwrap();
    assert_eq!(summary.annotations_deleted, 1);
    assert!(backend.annotation_ids(draft).is_empty());

    let again = session.flush().await.unwrap();
    assert_eq!(again.annotations_deleted, 0);
    assert_eq!(backend.calls(Operation::DeleteAnnotations), 1);
    assert_eq!(backend.draft(draft).unwrap().plain_text, " brown fox");
}

#[tokio::test]
async fn test_offline_highlights_follow_moved_annotation() {
    let (backend, mut session) = open("The quick brown fox").await;
    let draft = session.draft_id();

    session.set_selection(Selection::new(5, 10));
    let id = session.annotate(None).unwrap().mark.annotation_id;
    session.flush().await.unwrap();

    session.execute(&DeleteRange::new(1, 5)).unwrap();
    let summary = session.flush().await.unwrap();
    assert_eq!(summary.annotations_updated, 1);

    let record = backend.annotation(draft, id).unwrap();
    assert_eq!((record.start, record.end), (0, 5));
    assert_eq!(record.text, "quick");

    let stored = backend.draft(draft).unwrap();
    let ranges: Vec<AnnotationRange> = backend
        .annotation_ids(draft)
        .iter()
        .filter_map(|id| backend.annotation(draft, *id))
        .map(|record| AnnotationRange::from(&record))
        .collect();
    let rebuilt = reconstruct(&stored.html_content, &ranges).unwrap();
    assert!(rebuilt.skipped.is_empty());

    let highlighted = highlighted_ranges(&rebuilt.html).unwrap();
    let covered: Vec<(usize, usize)> = highlighted[&id].iter().map(|r| (r.start, r.end)).collect();
    assert_eq!(covered, vec![(0, 5)]);
    assert!(rebuilt.html.contains(">quick</mark>"), "{}", rebuilt.html);
}

#[tokio::test]
async fn test_replacing_image_source_removes_old_binary() {
    let (backend, mut session) = open("").await;
    let draft = session.draft_id();

    let id = session
        .insert_image(vec![1, 2, 3], ImageAttrs::default())
        .await
        .unwrap();
    session.flush().await.unwrap();
    let old_url = match &session.doc().atom_at(session.doc().find_node_by_id(id).unwrap()).unwrap().attrs {
        AtomAttrs::Image(image) => image.src.clone().unwrap(),
        other => panic!("expected an image, found {other:?}"),
    };
    let new_url = backend.upload_binary("alice", draft, id, vec![4, 5, 6]).await.unwrap();

    let replacement = ImageAttrs {
        src: Some(new_url.clone()),
        alt: "redrawn".into(),
        ..Default::default()
    };
    assert!(session.update_reference(id, AtomAttrs::Image(replacement)).unwrap());
    session.flush().await.unwrap();

    assert!(!backend.has_binary(&old_url));
    assert!(backend.has_binary(&new_url));
    assert_eq!(backend.deleted_binaries(), vec![old_url]);
    let records = backend.list_reference_records(draft).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].binary_url.as_deref(), Some(new_url.as_str()));

    // A failed record write leaves the binary the stored record points at
    let third_url = backend.upload_binary("alice", draft, id, vec![7]).await.unwrap();
    backend.fail(Operation::CreateReference);
    let retry = ImageAttrs {
        src: Some(third_url),
        ..Default::default()
    };
    assert!(session.update_reference(id, AtomAttrs::Image(retry)).unwrap());
    session.flush().await.unwrap();
    backend.restore(Operation::CreateReference);

    assert!(backend.has_binary(&new_url));
    assert_eq!(backend.calls(Operation::DeleteBinary), 1);
    let records = backend.list_reference_records(draft).await.unwrap();
    assert_eq!(records[0].binary_url.as_deref(), Some(new_url.as_str()));
}

#[tokio::test]
async fn test_backspace_over_image_cleans_up_exactly_once() {
    let (backend, mut session) = open("").await;
    let draft = session.draft_id();

    let id = session
        .insert_image(
            vec![0x89, 0x50, 0x4e, 0x47],
            ImageAttrs {
                alt: "diagram".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    session.flush().await.unwrap();
    assert_eq!(backend.reference_ids(draft), vec![id]);
    let pos = session.doc().find_node_by_id(id).unwrap();
    let url = match &session.doc().atom_at(pos).unwrap().attrs {
        AtomAttrs::Image(image) => image.src.clone().unwrap(),
        other => panic!("expected an image, found {other:?}"),
    };
    assert!(backend.has_binary(&url));

    session.delete_key(DeleteKey::Backspace).unwrap();
    assert!(session.doc().find_node_by_id(id).is_none());

    session.flush().await.unwrap();
    session.flush().await.unwrap();

    assert!(backend.reference_ids(draft).is_empty());
    assert_eq!(backend.calls(Operation::DeleteReference), 1);
    assert_eq!(backend.calls(Operation::DeleteBinary), 1);
    assert_eq!(backend.deleted_binaries(), vec![url]);
}

#[tokio::test]
async fn test_citation_deleted_by_id_cleans_up_once() {
    let (backend, mut session) = open("Growth").await;
    let draft = session.draft_id();
    session.set_selection(Selection::caret(7));

    let id = session
        .insert_reference(AtomAttrs::Citation(CitationAttrs {
            title: "On Growth and Form".into(),
            year: Some(1917),
            ..Default::default()
        }))
        .unwrap();
    session.flush().await.unwrap();
    assert_eq!(backend.reference_ids(draft), vec![id]);

    assert!(session.delete_reference(id).unwrap());
    assert!(!session.delete_reference(id).unwrap());
    assert!(!session
        .update_reference(id, AtomAttrs::Citation(CitationAttrs::default()))
        .unwrap());

    session.flush().await.unwrap();
    assert!(backend.reference_ids(draft).is_empty());
    assert_eq!(backend.calls(Operation::DeleteReference), 1);
    assert_eq!(backend.calls(Operation::DeleteBinary), 0);
}

#[tokio::test]
async fn test_numbers_follow_document_order() {
    let (_backend, mut session) = open("").await;
    let citation = |title: &str| {
        AtomAttrs::Citation(CitationAttrs {
            title: title.into(),
            ..Default::default()
        })
    };

    let c1 = session.insert_reference(citation("first")).unwrap();
    let c2 = session.insert_reference(citation("second")).unwrap();
    assert!(session.render_frame());
    assert_eq!(session.renderer().number_of(c1), Some(1));
    assert_eq!(session.renderer().number_of(c2), Some(2));
    assert!(!session.render_frame());

    session.set_selection(Selection::caret(1));
    let c0 = session.insert_reference(citation("zeroth")).unwrap();
    assert!(session.render_frame());
    assert_eq!(session.renderer().number_of(c0), Some(1));
    assert_eq!(session.renderer().number_of(c1), Some(2));
    assert_eq!(session.renderer().number_of(c2), Some(3));
    assert_eq!(session.doc().reference_ids(), vec![c0, c1, c2]);
}

#[tokio::test(start_paused = true)]
async fn test_writes_are_debounced_to_latest_state() {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    let draft = draft_with(&backend, "alice", &paragraph(""));
    let config = SessionConfig::default().with_debounce_ms(500);
    let mut session = EditingSession::open(backend.clone(), draft, "alice", config)
        .await
        .unwrap();

    for word in ["one", " two", " three"] {
        session.insert_text(word).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(backend.calls(Operation::PersistDocument), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.calls(Operation::PersistDocument), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.calls(Operation::PersistDocument), 1);
    assert_eq!(backend.draft(draft).unwrap().plain_text, "one two three");

    let status = session.status().await;
    assert!(!status.dirty);
    assert_eq!(status.last_persisted_revision, Some(status.revision));
}

#[tokio::test]
async fn test_failed_record_creation_heals_on_next_pass() {
    let (backend, mut session) = open("The quick brown fox").await;
    let draft = session.draft_id();
    backend.fail(Operation::CreateAnnotation);

    session.set_selection(Selection::new(5, 10));
    let id = session.annotate(Some("style".into())).unwrap().mark.annotation_id;
    let summary = session.flush().await.unwrap();
    assert!(!summary.is_clean());
    assert!(session.status().await.last_error.is_some());
    assert!(session.doc().annotation_ids().contains(&id));

    backend.restore(Operation::CreateAnnotation);
    let summary = session.flush().await.unwrap();
    assert_eq!(summary.annotations_created, 1);
    assert!(session.status().await.last_error.is_none());
    assert_eq!(backend.annotation(draft, id).unwrap().tag.as_deref(), Some("style"));
}

#[tokio::test]
async fn test_failed_batch_delete_keeps_document() {
    let (backend, mut session) = open("The quick brown fox").await;
    let draft = session.draft_id();
    session.set_selection(Selection::new(5, 10));
    let id = session.annotate(None).unwrap().mark.annotation_id;
    session.flush().await.unwrap();

    assert!(session.clear_annotation(id).unwrap());
    backend.fail(Operation::DeleteAnnotations);
    let summary = session.flush().await.unwrap();
    assert_eq!(summary.annotations_deleted, 0);
    assert!(session.status().await.last_error.unwrap().contains("delete annotation records"));
    assert!(session.doc().annotation_ids().is_empty());
    assert_eq!(backend.annotation_ids(draft), vec![id]);

    backend.restore(Operation::DeleteAnnotations);
    let summary = session.flush().await.unwrap();
    assert_eq!(summary.annotations_deleted, 1);
    assert!(backend.annotation_ids(draft).is_empty());
}

#[tokio::test]
async fn test_unauthorized_requester_is_reported() {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    let draft = draft_with(&backend, "alice", &paragraph("hello"));
    let mut session = EditingSession::open(backend.clone(), draft, "mallory", SessionConfig::default())
        .await
        .unwrap();

    session.set_selection(Selection::new(1, 6));
    let annotation = session.annotate(None).unwrap();
    assert!(!annotation.mark.is_author);

    session.flush().await.unwrap();
    let error = session.status().await.last_error.unwrap();
    assert!(error.contains("unauthorized"), "{error}");
    assert_eq!(backend.draft(draft).unwrap().plain_text, "hello");
    assert!(session.status().await.dirty);
}

#[tokio::test]
async fn test_duplicate_marks_repaired_on_open() {
    init_tracing();
    let mark = doc_model::AnnotationMark::new("bob", false, chrono::Utc::now());
    let doc = Document::from_blocks(vec![Node::paragraph(vec![Node::Text(doc_model::TextNode {
        text: "twice".into(),
        marks: vec![
            doc_model::Mark::Annotation(mark.clone()),
            doc_model::Mark::Annotation(mark.clone()),
        ],
    })])]);
    assert!(!check_consistency(&doc).is_clean());

    let backend = Arc::new(InMemoryBackend::new());
    let draft = draft_with(&backend, "alice", &doc);
    let config = SessionConfig::default().with_consistency_check_interval(1);
    let session = EditingSession::open(backend, draft, "alice", config).await.unwrap();

    assert!(check_consistency(session.doc()).is_clean());
    assert_eq!(session.doc().annotation_ids().len(), 1);
}

#[tokio::test]
async fn test_close_flushes_pending_edits() {
    let (backend, mut session) = open("draft").await;
    let draft = session.draft_id();
    session.set_selection(Selection::caret(6));
    session.insert_text(" two").unwrap();

    let summary = session.close().await.unwrap();
    assert!(summary.persisted);
    assert_eq!(backend.draft(draft).unwrap().plain_text, "draft two");
}

#[derive(Debug, Clone)]
enum Op {
    Annotate(usize, usize),
    Delete(usize, usize),
    Type(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..40, 1usize..12).prop_map(|(at, len)| Op::Annotate(at, len)),
        (0usize..40, 1usize..8).prop_map(|(at, len)| Op::Delete(at, len)),
        (0usize..40).prop_map(Op::Type),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_records_converge_to_marks(ops in proptest::collection::vec(op(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (backend, mut session) = open("The quick brown fox jumps over the lazy dog").await;
            let draft = session.draft_id();

            for op in ops {
                let size = session.doc().content_size();
                match op {
                    Op::Annotate(at, len) => {
                        let from = (at + 1).min(size - 1);
                        let to = (from + len).min(size - 1);
                        session.set_selection(Selection::new(from, to));
                        let _ = session.annotate(None);
                    }
                    Op::Delete(at, len) => {
                        let from = (at + 1).min(size - 1);
                        let to = (from + len).min(size - 1);
                        let _ = session.execute(&DeleteRange::new(from, to));
                    }
                    Op::Type(at) => {
                        session.set_selection(Selection::caret((at + 1).min(size - 1)));
                        session.insert_text("ab").unwrap();
                    }
                }
                if session.doc().content_size() % 3 == 0 {
                    session.flush().await.unwrap();
                }
            }

            session.flush().await.unwrap();
            let mut live: Vec<StableId> = session.doc().annotation_ids().into_iter().collect();
            let mut persisted = backend.annotation_ids(draft);
            live.sort();
            persisted.sort();
            assert_eq!(live, persisted);

            let ranges = session.doc().annotation_ranges();
            for id in &persisted {
                let record = backend.annotation(draft, *id).unwrap();
                assert_eq!((record.start, record.end), (ranges[id].start, ranges[id].end));
            }

            let summary = session.flush().await.unwrap();
            assert!(!summary.changed_any());
        });
    }
}
