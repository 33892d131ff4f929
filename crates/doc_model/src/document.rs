//! Document root and document-level queries
//!
//! Two coordinate systems are used against a document:
//! - **positions**: absolute offsets into the tree (block boundaries, characters
//!   and atoms each count one unit), used by steps and selections;
//! - **text offsets**: counts of text characters only, used by persisted
//!   annotation records and by the offline rendering path, which never sees
//!   block boundaries or the content of atomic nodes.

use crate::flat::{self, Token};
use crate::{
    AnnotationMark, AtomNode, BlockKind, DocModelError, Mark, Node, Result, StableId, StepMap,
    TextNode,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A half-open range of text offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A contiguous stretch of text covered by one annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationSpan {
    pub start: usize,
    pub end: usize,
    pub annotation_id: StableId,
}

/// The content of a single position unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Open(BlockKind),
    Close,
    Char(char),
    Atom(StableId),
}

/// A position resolved against the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPos {
    /// The absolute position
    pub pos: usize,
    /// Nesting depth of the parent (0 = document)
    pub depth: usize,
    /// The innermost block containing the position
    pub parent: BlockKind,
    /// Offset from the start of the parent's content
    pub parent_offset: usize,
    /// Index of the child the position is before or inside
    pub index: usize,
}

/// The root document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    content: Vec<Node>,
}

impl Document {
    /// Create a document holding a single empty paragraph
    pub fn new() -> Self {
        Self {
            content: vec![Node::paragraph(Vec::new())],
        }
    }

    /// Create a document from top-level blocks, normalizing the structure
    pub fn from_blocks(blocks: Vec<Node>) -> Self {
        let (doc, _) = Self::from_tokens(flat::flatten(&blocks));
        doc
    }

    /// Parse a document from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: Document = serde_json::from_str(json)?;
        Ok(Self::from_blocks(parsed.content))
    }

    /// Serialize the document to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize the document to a JSON value
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub(crate) fn tokens(&self) -> Vec<Token> {
        flat::flatten(&self.content)
    }

    pub(crate) fn from_tokens(tokens: Vec<Token>) -> (Self, StepMap) {
        let rebuilt = flat::rebuild(tokens);
        (
            Self {
                content: rebuilt.content,
            },
            rebuilt.repairs,
        )
    }

    /// Get the top-level blocks
    pub fn content(&self) -> &[Node] {
        &self.content
    }

    /// Size of the document content; valid positions are `0..=content_size()`
    pub fn content_size(&self) -> usize {
        self.content.iter().map(Node::node_size).sum()
    }

    /// Visit every node in document order with the position before it.
    ///
    /// Returning `false` from the callback skips the node's children.
    pub fn descendants<'a>(&'a self, mut f: impl FnMut(&'a Node, usize) -> bool) {
        walk(&self.content, 0, &mut f);
    }

    /// Resolve a position against the tree
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos> {
        let size = self.content_size();
        if pos > size {
            return Err(DocModelError::InvalidPosition { pos, size });
        }

        let mut parent = BlockKind::Doc;
        let mut nodes: &[Node] = &self.content;
        let mut start = 0;
        let mut depth = 0;

        'descend: loop {
            let mut offset = start;
            for (index, child) in nodes.iter().enumerate() {
                let end = offset + child.node_size();
                if pos == offset {
                    return Ok(ResolvedPos {
                        pos,
                        depth,
                        parent,
                        parent_offset: pos - start,
                        index,
                    });
                }
                if pos < end {
                    if let Node::Block(block) = child {
                        parent = block.kind;
                        nodes = &block.content;
                        start = offset + 1;
                        depth += 1;
                        continue 'descend;
                    }
                    return Ok(ResolvedPos {
                        pos,
                        depth,
                        parent,
                        parent_offset: pos - start,
                        index,
                    });
                }
                offset = end;
            }
            return Ok(ResolvedPos {
                pos,
                depth,
                parent,
                parent_offset: pos - start,
                index: nodes.len(),
            });
        }
    }

    /// Find the position of the inline atomic node with the given reference id
    pub fn find_node_by_id(&self, id: StableId) -> Option<usize> {
        let mut found = None;
        self.descendants(|node, pos| {
            if found.is_some() {
                return false;
            }
            if let Node::Atom(atom) = node {
                if atom.reference_id() == id {
                    found = Some(pos);
                }
            }
            true
        });
        found
    }

    /// Get the atom node directly after a position
    pub fn atom_at(&self, pos: usize) -> Option<&AtomNode> {
        let mut found = None;
        self.descendants(|node, node_pos| {
            if found.is_some() || node_pos > pos {
                return false;
            }
            if let Node::Atom(atom) = node {
                if node_pos == pos {
                    found = Some(atom);
                }
            }
            true
        });
        found
    }

    /// All atomic reference nodes in document order, with their positions
    pub fn reference_nodes(&self) -> Vec<(usize, &AtomNode)> {
        let mut out = Vec::new();
        self.descendants(|node, pos| {
            if let Node::Atom(atom) = node {
                out.push((pos, atom));
            }
            true
        });
        out
    }

    /// Reference ids of all atomic nodes in document order
    pub fn reference_ids(&self) -> Vec<StableId> {
        self.reference_nodes()
            .into_iter()
            .map(|(_, atom)| atom.reference_id())
            .collect()
    }

    /// Reference ids of atomic nodes lying within `[from, to)`
    pub fn reference_ids_between(&self, from: usize, to: usize) -> Vec<StableId> {
        self.reference_nodes()
            .into_iter()
            .filter(|(pos, _)| *pos >= from && *pos < to)
            .map(|(_, atom)| atom.reference_id())
            .collect()
    }

    /// All text runs in document order, with their positions
    pub fn text_runs(&self) -> Vec<(usize, &TextNode)> {
        let mut out = Vec::new();
        self.descendants(|node, pos| {
            if let Node::Text(text) = node {
                out.push((pos, text));
            }
            true
        });
        out
    }

    /// Plain text with textblocks separated by newlines
    pub fn plain_text(&self) -> String {
        let mut blocks = Vec::new();
        self.descendants(|node, _| match node {
            Node::Block(block) if block.kind.is_textblock() => {
                blocks.push(node.text_content());
                false
            }
            _ => true,
        });
        blocks.join("\n")
    }

    /// Total number of text characters
    pub fn text_len(&self) -> usize {
        self.text_runs().iter().map(|(_, t)| t.char_len()).sum()
    }

    /// Text offset corresponding to a position
    pub fn text_offset(&self, pos: usize) -> usize {
        flat::chars_before(&self.tokens(), pos)
    }

    /// Text characters between two positions
    pub fn text_between(&self, from: usize, to: usize) -> String {
        let tokens = self.tokens();
        let to = to.min(tokens.len());
        let from = from.min(to);
        tokens[from..to]
            .iter()
            .filter_map(|t| match t {
                Token::Char(c, _) => Some(*c),
                _ => None,
            })
            .collect()
    }

    /// What occupies the position unit starting at `pos`
    pub fn unit_at(&self, pos: usize) -> Option<Unit> {
        self.tokens().get(pos).map(|token| match token {
            Token::Open(kind) => Unit::Open(*kind),
            Token::Close => Unit::Close,
            Token::Char(c, _) => Unit::Char(*c),
            Token::Atom(atom) => Unit::Atom(atom.reference_id()),
        })
    }

    /// The unbroken characters directly before a position, stopping at atoms
    /// and block boundaries
    pub fn inline_text_before(&self, pos: usize) -> String {
        let tokens = self.tokens();
        let end = pos.min(tokens.len());
        let mut chars: Vec<char> = tokens[..end]
            .iter()
            .rev()
            .map_while(|t| match t {
                Token::Char(c, _) => Some(*c),
                _ => None,
            })
            .collect();
        chars.reverse();
        chars.into_iter().collect()
    }

    /// The unbroken characters directly after a position, stopping at atoms
    /// and block boundaries
    pub fn inline_text_after(&self, pos: usize) -> String {
        let tokens = self.tokens();
        let start = pos.min(tokens.len());
        tokens[start..]
            .iter()
            .map_while(|t| match t {
                Token::Char(c, _) => Some(*c),
                _ => None,
            })
            .collect()
    }

    /// Convert a text-offset range to the tightest position range covering it
    pub fn text_range_to_positions(&self, range: TextRange) -> Option<(usize, usize)> {
        if range.is_empty() {
            return None;
        }
        let mut from = None;
        let mut to = None;
        let mut offset = 0;
        for (index, token) in self.tokens().iter().enumerate() {
            if let Token::Char(..) = token {
                if offset == range.start {
                    from = Some(index);
                }
                if offset + 1 == range.end {
                    to = Some(index + 1);
                    break;
                }
                offset += 1;
            }
        }
        Some((from?, to?))
    }

    /// Ids of every annotation present as a mark
    pub fn annotation_ids(&self) -> BTreeSet<StableId> {
        self.text_runs()
            .iter()
            .flat_map(|(_, t)| t.marks.iter().filter_map(Mark::annotation_id))
            .collect()
    }

    /// Metadata of the first mark carrying an annotation id
    pub fn annotation_meta(&self, id: StableId) -> Option<&AnnotationMark> {
        self.text_runs().into_iter().find_map(|(_, t)| {
            t.marks
                .iter()
                .filter_map(Mark::as_annotation)
                .find(|a| a.annotation_id == id)
        })
    }

    /// Contiguous text-offset spans covered by each annotation, ordered by start
    pub fn annotation_spans(&self) -> Vec<AnnotationSpan> {
        let mut spans = Vec::new();
        let mut open: BTreeMap<StableId, usize> = BTreeMap::new();
        let mut offset = 0;

        for token in self.tokens() {
            let Token::Char(_, marks) = token else {
                continue;
            };
            let current: BTreeSet<StableId> = marks.iter().filter_map(Mark::annotation_id).collect();

            let ended: Vec<StableId> = open.keys().filter(|id| !current.contains(id)).copied().collect();
            for id in ended {
                if let Some(start) = open.remove(&id) {
                    spans.push(AnnotationSpan {
                        start,
                        end: offset,
                        annotation_id: id,
                    });
                }
            }
            for id in current {
                open.entry(id).or_insert(offset);
            }
            offset += 1;
        }
        for (id, start) in open {
            spans.push(AnnotationSpan {
                start,
                end: offset,
                annotation_id: id,
            });
        }

        spans.sort();
        spans
    }

    /// Text-offset envelope covered by each annotation
    pub fn annotation_ranges(&self) -> BTreeMap<StableId, TextRange> {
        let mut ranges: BTreeMap<StableId, TextRange> = BTreeMap::new();
        for span in self.annotation_spans() {
            ranges
                .entry(span.annotation_id)
                .and_modify(|r| {
                    r.start = r.start.min(span.start);
                    r.end = r.end.max(span.end);
                })
                .or_insert(TextRange::new(span.start, span.end));
        }
        ranges
    }

    /// Position envelope of the characters carrying an annotation
    pub fn find_annotation(&self, id: StableId) -> Option<(usize, usize)> {
        let mut first = None;
        let mut last = None;
        for (index, token) in self.tokens().iter().enumerate() {
            if let Token::Char(_, marks) = token {
                if marks.iter().any(|m| m.annotation_id() == Some(id)) {
                    first.get_or_insert(index);
                    last = Some(index + 1);
                }
            }
        }
        Some((first?, last?))
    }

    /// Marks that text inserted at a position inherits.
    ///
    /// Inside a run every mark carries over. At a run boundary only inclusive
    /// marks of the preceding run carry over, unless the following run carries
    /// the same mark, so exclusive marks such as annotations never grow at
    /// their edges. Right after an inline atom only marks carried by both the
    /// nearest character before the atom and the character after the
    /// position carry over, so a span running across the atom stays whole.
    pub fn marks_at(&self, pos: usize) -> Vec<Mark> {
        let tokens = self.tokens();
        let char_marks = |index: usize| match tokens.get(index) {
            Some(Token::Char(_, marks)) => Some(marks),
            _ => None,
        };
        let before = pos.checked_sub(1).and_then(|i| tokens.get(i));
        let (main, other) = match before {
            Some(Token::Char(_, marks)) => (Some(marks), char_marks(pos)),
            Some(Token::Atom(_)) => {
                let behind = char_marks_behind_atoms(&tokens, pos);
                let (Some(after), Some(behind)) = (char_marks(pos), behind) else {
                    return Vec::new();
                };
                return behind.iter().filter(|m| after.contains(m)).cloned().collect();
            }
            _ => (char_marks(pos), None),
        };
        let Some(main) = main else {
            return Vec::new();
        };
        main.iter()
            .filter(|m| m.is_inclusive() || other.is_some_and(|o| o.contains(m)))
            .cloned()
            .collect()
    }
}

/// Marks of the nearest character before `pos` when only inline atoms of
/// the same textblock lie between them
fn char_marks_behind_atoms(tokens: &[Token], pos: usize) -> Option<&Vec<Mark>> {
    tokens[..pos.min(tokens.len())]
        .iter()
        .rev()
        .find(|t| !matches!(t, Token::Atom(_)))
        .and_then(|t| match t {
            Token::Char(_, marks) => Some(marks),
            _ => None,
        })
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn walk<'a>(nodes: &'a [Node], start: usize, f: &mut dyn FnMut(&'a Node, usize) -> bool) {
    let mut pos = start;
    for node in nodes {
        if f(node, pos) {
            if let Node::Block(block) = node {
                walk(&block.content, pos + 1, f);
            }
        }
        pos += node.node_size();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AtomAttrs, CitationAttrs};
    use chrono::Utc;

    fn annotation() -> AnnotationMark {
        AnnotationMark::new("author-1", false, Utc::now())
    }

    fn citation(id: StableId) -> Node {
        Node::Atom(AtomNode::with_reference_id(
            id,
            AtomAttrs::Citation(CitationAttrs::default()),
        ))
    }

    #[test]
    fn test_new_document_has_empty_paragraph() {
        let doc = Document::new();
        assert_eq!(doc.content_size(), 2);
        assert_eq!(doc.plain_text(), "");
    }

    #[test]
    fn test_resolve_positions() {
        let doc = Document::from_blocks(vec![
            Node::paragraph(vec![Node::text("ab")]),
            Node::blockquote(vec![Node::paragraph(vec![Node::text("c")])]),
        ]);

        let rp = doc.resolve(0).unwrap();
        assert_eq!(rp.parent, BlockKind::Doc);
        assert_eq!(rp.index, 0);

        let rp = doc.resolve(2).unwrap();
        assert_eq!(rp.parent, BlockKind::Paragraph);
        assert_eq!(rp.parent_offset, 1);
        assert_eq!(rp.depth, 1);

        let rp = doc.resolve(6).unwrap();
        assert_eq!(rp.parent, BlockKind::Paragraph);
        assert_eq!(rp.depth, 2);

        let rp = doc.resolve(4).unwrap();
        assert_eq!(rp.parent, BlockKind::Doc);
        assert_eq!(rp.index, 1);

        assert!(doc.resolve(100).is_err());
    }

    #[test]
    fn test_find_node_by_id() {
        let id = StableId::mint();
        let doc = Document::from_blocks(vec![Node::paragraph(vec![
            Node::text("see"),
            citation(id),
        ])]);

        assert_eq!(doc.find_node_by_id(id), Some(4));
        assert!(doc.atom_at(4).is_some());
        assert_eq!(doc.find_node_by_id(StableId::mint()), None);
        assert_eq!(doc.reference_ids(), vec![id]);
        assert_eq!(doc.reference_ids_between(0, 4), Vec::<StableId>::new());
        assert_eq!(doc.reference_ids_between(4, 5), vec![id]);
    }

    #[test]
    fn test_text_offsets_skip_atoms_and_boundaries() {
        let doc = Document::from_blocks(vec![
            Node::paragraph(vec![Node::text("ab"), citation(StableId::mint()), Node::text("c")]),
            Node::paragraph(vec![Node::text("de")]),
        ]);

        assert_eq!(doc.text_len(), 5);
        assert_eq!(doc.text_offset(3), 2);
        assert_eq!(doc.text_offset(4), 2);
        assert_eq!(doc.text_offset(8), 4);
        assert_eq!(doc.text_range_to_positions(TextRange::new(1, 4)), Some((2, 8)));
        assert_eq!(doc.text_between(2, 8), "bcd");
        assert_eq!(doc.text_range_to_positions(TextRange::new(3, 9)), None);
        assert_eq!(doc.plain_text(), "abc\nde");

        assert_eq!(doc.unit_at(0), Some(Unit::Open(BlockKind::Paragraph)));
        assert!(matches!(doc.unit_at(3), Some(Unit::Atom(_))));
        assert_eq!(doc.unit_at(5), Some(Unit::Close));
        assert_eq!(doc.inline_text_before(3), "ab");
        assert_eq!(doc.inline_text_after(4), "c");
        assert_eq!(doc.inline_text_before(4), "");
    }

    #[test]
    fn test_annotation_spans_and_ranges() {
        let a = annotation();
        let b = annotation();
        let doc = Document::from_blocks(vec![Node::paragraph(vec![
            Node::text("The "),
            Node::marked_text("quick", vec![Mark::Annotation(a.clone())]),
            Node::marked_text(" brown", vec![Mark::Annotation(a.clone()), Mark::Annotation(b.clone())]),
            Node::text(" fox"),
        ])]);

        let ranges = doc.annotation_ranges();
        assert_eq!(ranges[&a.annotation_id], TextRange::new(4, 15));
        assert_eq!(ranges[&b.annotation_id], TextRange::new(9, 15));
        assert_eq!(doc.annotation_ids().len(), 2);
        assert_eq!(doc.find_annotation(a.annotation_id), Some((5, 16)));
        assert_eq!(doc.annotation_meta(b.annotation_id), Some(&b));
    }

    #[test]
    fn test_marks_at_respects_exclusive_edges() {
        let a = annotation();
        let doc = Document::from_blocks(vec![Node::paragraph(vec![
            Node::text("ab"),
            Node::marked_text("cd", vec![Mark::Bold, Mark::Annotation(a.clone())]),
            Node::text("ef"),
        ])]);

        // Before "c": the preceding run carries nothing
        assert!(doc.marks_at(3).is_empty());
        // Between "c" and "d": everything carries over
        assert_eq!(doc.marks_at(4).len(), 2);
        // After "d": only the inclusive bold mark carries over
        assert_eq!(doc.marks_at(5), vec![Mark::Bold]);
    }

    #[test]
    fn test_json_roundtrip() {
        let doc = Document::from_blocks(vec![
            Node::heading(1, vec![Node::text("Title")]),
            Node::paragraph(vec![Node::marked_text("body", vec![Mark::Annotation(annotation())])]),
        ]);
        let json = doc.to_json().unwrap();
        let parsed = Document::from_json(&json).unwrap();
        assert_eq!(parsed, doc);
    }
}
