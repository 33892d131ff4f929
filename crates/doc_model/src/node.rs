//! Core node types
//!
//! A node is a block (paragraph, heading, list, ...), an inline atomic
//! reference (citation, image, formula) or a run of marked text. Behavior is
//! dispatched on the closed [`NodeKind`] enumeration.

use crate::{Mark, StableId};
use serde::{Deserialize, Serialize};

/// Enumeration of all node kinds in the document tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Doc,
    Paragraph,
    Heading,
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
    CodeBlock,
    Text,
    Citation,
    Image,
    Formula,
}

impl NodeKind {
    /// Check if this kind is an inline atomic reference node
    pub fn is_atom(&self) -> bool {
        matches!(self, NodeKind::Citation | NodeKind::Image | NodeKind::Formula)
    }

    /// Check if this kind is a block
    pub fn is_block(&self) -> bool {
        !self.is_atom() && *self != NodeKind::Text
    }

    /// Check if this kind is inline content (text or atom)
    pub fn is_inline(&self) -> bool {
        !self.is_block()
    }
}

/// Block node kinds with their attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockKind {
    Doc,
    Paragraph,
    Heading { level: u8 },
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
    CodeBlock,
}

impl BlockKind {
    /// Get the node kind
    pub fn node_kind(&self) -> NodeKind {
        match self {
            BlockKind::Doc => NodeKind::Doc,
            BlockKind::Paragraph => NodeKind::Paragraph,
            BlockKind::Heading { .. } => NodeKind::Heading,
            BlockKind::Blockquote => NodeKind::Blockquote,
            BlockKind::BulletList => NodeKind::BulletList,
            BlockKind::OrderedList => NodeKind::OrderedList,
            BlockKind::ListItem => NodeKind::ListItem,
            BlockKind::CodeBlock => NodeKind::CodeBlock,
        }
    }

    /// Textblocks hold inline content; all other blocks hold blocks
    pub fn is_textblock(&self) -> bool {
        matches!(
            self,
            BlockKind::Paragraph | BlockKind::Heading { .. } | BlockKind::CodeBlock
        )
    }

    /// Check if this block is a list container
    pub fn is_list(&self) -> bool {
        matches!(self, BlockKind::BulletList | BlockKind::OrderedList)
    }
}

/// Citation attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationAttrs {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Image attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttrs {
    /// URL of the stored binary, once uploaded
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
}

/// Formula attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaAttrs {
    /// TeX source of the formula
    pub source: String,
    /// Display (block-style) rendering rather than inline
    #[serde(default)]
    pub display: bool,
}

/// Attributes of an inline atomic node; the variant determines its kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AtomAttrs {
    Citation(CitationAttrs),
    Image(ImageAttrs),
    Formula(FormulaAttrs),
}

impl AtomAttrs {
    /// Get the node kind these attributes belong to
    pub fn kind(&self) -> NodeKind {
        match self {
            AtomAttrs::Citation(_) => NodeKind::Citation,
            AtomAttrs::Image(_) => NodeKind::Image,
            AtomAttrs::Formula(_) => NodeKind::Formula,
        }
    }
}

/// An inline atomic reference node (citation, image, formula)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomNode {
    reference_id: StableId,
    pub attrs: AtomAttrs,
}

impl AtomNode {
    /// Create an atom node with a freshly minted reference id
    pub fn new(attrs: AtomAttrs) -> Self {
        Self {
            reference_id: StableId::mint(),
            attrs,
        }
    }

    /// Create an atom node with a specific reference id (for deserialization and tests)
    pub fn with_reference_id(reference_id: StableId, attrs: AtomAttrs) -> Self {
        Self { reference_id, attrs }
    }

    /// Get the reference id
    pub fn reference_id(&self) -> StableId {
        self.reference_id
    }

    /// Get the node kind
    pub fn kind(&self) -> NodeKind {
        self.attrs.kind()
    }
}

/// A run of text with a set of marks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Vec<Mark>,
}

impl TextNode {
    /// Number of characters (Unicode scalar values) in the run
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A block node and its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub kind: BlockKind,
    #[serde(default)]
    pub content: Vec<Node>,
}

impl BlockNode {
    /// Size of the content between the opening and closing boundary
    pub fn content_size(&self) -> usize {
        self.content.iter().map(Node::node_size).sum()
    }
}

/// A node in the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "camelCase")]
pub enum Node {
    Block(BlockNode),
    Atom(AtomNode),
    Text(TextNode),
}

impl Node {
    /// Create a block node
    pub fn block(kind: BlockKind, content: Vec<Node>) -> Self {
        Node::Block(BlockNode { kind, content })
    }

    /// Create a paragraph
    pub fn paragraph(content: Vec<Node>) -> Self {
        Self::block(BlockKind::Paragraph, content)
    }

    /// Create a heading
    pub fn heading(level: u8, content: Vec<Node>) -> Self {
        Self::block(BlockKind::Heading { level: level.clamp(1, 6) }, content)
    }

    /// Create a blockquote
    pub fn blockquote(content: Vec<Node>) -> Self {
        Self::block(BlockKind::Blockquote, content)
    }

    /// Create a bullet list from list items
    pub fn bullet_list(items: Vec<Node>) -> Self {
        Self::block(BlockKind::BulletList, items)
    }

    /// Create an ordered list from list items
    pub fn ordered_list(items: Vec<Node>) -> Self {
        Self::block(BlockKind::OrderedList, items)
    }

    /// Create a list item
    pub fn list_item(content: Vec<Node>) -> Self {
        Self::block(BlockKind::ListItem, content)
    }

    /// Create a plain text run
    pub fn text(text: impl Into<String>) -> Self {
        Self::marked_text(text, Vec::new())
    }

    /// Create a text run with marks
    pub fn marked_text(text: impl Into<String>, mut marks: Vec<Mark>) -> Self {
        crate::sort_set(&mut marks);
        Node::Text(TextNode {
            text: text.into(),
            marks,
        })
    }

    /// Create an inline atomic node with a fresh reference id
    pub fn atom(attrs: AtomAttrs) -> Self {
        Node::Atom(AtomNode::new(attrs))
    }

    /// Get the kind of this node
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Block(b) => b.kind.node_kind(),
            Node::Atom(a) => a.kind(),
            Node::Text(_) => NodeKind::Text,
        }
    }

    /// Check if this node is inline content
    pub fn is_inline(&self) -> bool {
        self.kind().is_inline()
    }

    /// Size of this node in position units
    pub fn node_size(&self) -> usize {
        match self {
            Node::Block(b) => b.content_size() + 2,
            Node::Atom(_) => 1,
            Node::Text(t) => t.char_len(),
        }
    }

    /// Get the child nodes (empty for leaves)
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Block(b) => &b.content,
            Node::Atom(_) | Node::Text(_) => &[],
        }
    }

    /// Concatenated text of all text runs below this node
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Block(b) => b.content.iter().for_each(|c| c.collect_text(out)),
            Node::Atom(_) => {}
            Node::Text(t) => out.push_str(&t.text),
        }
    }

    /// Get the atom, if this is an atomic node
    pub fn as_atom(&self) -> Option<&AtomNode> {
        match self {
            Node::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// Get the text run, if this is a text node
    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(t) => Some(t),
            _ => None,
        }
    }
}
