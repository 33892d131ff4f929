//! A small arena DOM for HTML snapshots
//!
//! Parsing goes through quick-xml in a lenient configuration: end tags need
//! not match, stray end tags are ignored, HTML void elements never take
//! children, and the common named HTML entities are resolved.

use crate::{RenderError, Result};
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// HTML elements that never have content or an end tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Handle to a node in a [`Dom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(usize);

/// The payload of a DOM node
#[derive(Debug, Clone, PartialEq)]
pub enum DomData {
    Root,
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct DomNode {
    data: DomData,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
}

/// An HTML document tree
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<DomNode>,
}

impl Dom {
    /// Create an empty document
    pub fn new() -> Self {
        Self {
            nodes: vec![DomNode {
                data: DomData::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse an HTML fragment
    pub fn parse(html: &str) -> Result<Self> {
        let mut dom = Self::new();
        let mut stack = vec![dom.root()];

        let mut reader = Reader::from_str(html);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            let top = stack.last().copied().unwrap_or(dom.root());
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let (name, attrs) = element_parts(&e);
                    let void = is_void(&name);
                    let node = dom.create_element(name, attrs);
                    dom.append_child(top, node);
                    if !void {
                        stack.push(node);
                    }
                }
                Ok(Event::Empty(e)) => {
                    let (name, attrs) = element_parts(&e);
                    let node = dom.create_element(name, attrs);
                    dom.append_child(top, node);
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                    let open = stack
                        .iter()
                        .rposition(|n| dom.element_name(*n) == Some(name.as_str()));
                    match open {
                        Some(index) if index > 0 => stack.truncate(index),
                        _ => tracing::debug!(%name, "ignoring unmatched end tag"),
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = match e.unescape_with(resolve_html_entity) {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    if !text.is_empty() {
                        let node = dom.create_text(text);
                        dom.append_child(top, node);
                    }
                }
                Ok(Event::CData(e)) => {
                    let node = dom.create_text(String::from_utf8_lossy(&e).into_owned());
                    dom.append_child(top, node);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(RenderError::Parse(format!(
                        "at byte {}: {e}",
                        reader.error_position()
                    )))
                }
            }
        }

        Ok(dom)
    }

    /// Get the root node
    pub fn root(&self) -> NodeRef {
        NodeRef(0)
    }

    /// Get a node's data
    pub fn data(&self, node: NodeRef) -> &DomData {
        &self.nodes[node.0].data
    }

    /// Get a node's parent
    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes[node.0].parent
    }

    /// Get a node's children
    pub fn children(&self, node: NodeRef) -> &[NodeRef] {
        &self.nodes[node.0].children
    }

    /// Get the tag name, if the node is an element
    pub fn element_name(&self, node: NodeRef) -> Option<&str> {
        match self.data(node) {
            DomData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Get an attribute value
    pub fn attr(&self, node: NodeRef, key: &str) -> Option<&str> {
        match self.data(node) {
            DomData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Check whether an element's class list contains a class
    pub fn has_class(&self, node: NodeRef, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    /// Get the text, if the node is a text node
    pub fn text(&self, node: NodeRef) -> Option<&str> {
        match self.data(node) {
            DomData::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Iterate a node's ancestors, nearest first
    pub fn ancestors(&self, node: NodeRef) -> impl Iterator<Item = NodeRef> + '_ {
        std::iter::successors(self.parent(node), move |n| self.parent(*n))
    }

    /// Create a detached element
    pub fn create_element(&mut self, name: impl Into<String>, attrs: Vec<(String, String)>) -> NodeRef {
        self.push(DomData::Element {
            name: name.into(),
            attrs,
        })
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeRef {
        self.push(DomData::Text(text.into()))
    }

    fn push(&mut self, data: DomData) -> NodeRef {
        self.nodes.push(DomNode {
            data,
            parent: None,
            children: Vec::new(),
        });
        NodeRef(self.nodes.len() - 1)
    }

    /// Append a node as the last child of a parent
    pub fn append_child(&mut self, parent: NodeRef, child: NodeRef) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert a node before a reference child
    pub fn insert_before(&mut self, reference: NodeRef, node: NodeRef) -> Result<()> {
        self.detach(node);
        let parent = self
            .parent(reference)
            .ok_or_else(|| RenderError::Wrap("reference node is detached".to_string()))?;
        let index = self.index_in_parent(parent, reference)?;
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, node);
        Ok(())
    }

    /// Insert a node after a reference child
    pub fn insert_after(&mut self, reference: NodeRef, node: NodeRef) -> Result<()> {
        self.detach(node);
        let parent = self
            .parent(reference)
            .ok_or_else(|| RenderError::Wrap("reference node is detached".to_string()))?;
        let index = self.index_in_parent(parent, reference)?;
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index + 1, node);
        Ok(())
    }

    /// Remove a node from its parent
    pub fn detach(&mut self, node: NodeRef) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    fn index_in_parent(&self, parent: NodeRef, child: NodeRef) -> Result<usize> {
        self.children(parent)
            .iter()
            .position(|c| *c == child)
            .ok_or_else(|| RenderError::Wrap("node missing from its parent".to_string()))
    }

    /// Split a text node at a character offset.
    ///
    /// The node keeps the text before the offset and a new sibling holding
    /// the rest is inserted after it and returned.
    pub fn split_text(&mut self, node: NodeRef, at: usize) -> Result<NodeRef> {
        let text = self
            .text(node)
            .ok_or_else(|| RenderError::Wrap("cannot split a non-text node".to_string()))?;
        let len = text.chars().count();
        if at == 0 || at >= len {
            return Err(RenderError::Wrap(format!(
                "split offset {at} outside text of length {len}"
            )));
        }
        let byte = text
            .char_indices()
            .nth(at)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let tail = text[byte..].to_string();
        let head = text[..byte].to_string();

        self.nodes[node.0].data = DomData::Text(head);
        let rest = self.create_text(tail);
        self.insert_after(node, rest)?;
        Ok(rest)
    }

    /// Move consecutive siblings `first..=last` into a new wrapper element
    pub fn wrap_siblings(&mut self, first: NodeRef, last: NodeRef, wrapper: NodeRef) -> Result<()> {
        let parent = self
            .parent(first)
            .ok_or_else(|| RenderError::Wrap("cannot wrap a detached node".to_string()))?;
        if self.parent(last) != Some(parent) {
            return Err(RenderError::Wrap("range spans different parents".to_string()));
        }
        let start = self.index_in_parent(parent, first)?;
        let end = self.index_in_parent(parent, last)?;
        if end < start {
            return Err(RenderError::Wrap("range ends before it starts".to_string()));
        }

        let moved: Vec<NodeRef> = self.children(parent)[start..=end].to_vec();
        self.insert_before(first, wrapper)?;
        for child in moved {
            self.append_child(wrapper, child);
        }
        Ok(())
    }

    /// All text nodes in document order
    pub fn text_nodes(&self) -> Vec<NodeRef> {
        let mut out = Vec::new();
        self.collect_text_nodes(self.root(), &mut out);
        out
    }

    fn collect_text_nodes(&self, node: NodeRef, out: &mut Vec<NodeRef>) {
        for child in self.children(node) {
            match self.data(*child) {
                DomData::Text(_) => out.push(*child),
                _ => self.collect_text_nodes(*child, out),
            }
        }
    }

    /// Serialize the document back to HTML
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.write_node(*child, &mut out);
        }
        out
    }

    fn write_node(&self, node: NodeRef, out: &mut String) {
        match self.data(node) {
            DomData::Root => {}
            DomData::Text(text) => out.push_str(&partial_escape(text.as_str())),
            DomData::Element { name, attrs } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape(value.as_str()));
                    out.push('"');
                }
                out.push('>');
                if is_void(name) {
                    return;
                }
                for child in self.children(node) {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

fn element_parts(e: &BytesStart<'_>) -> (String, Vec<(String, String)>) {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
    let mut attrs = Vec::new();
    for attr in e.html_attributes() {
        match attr {
            Ok(attr) => {
                let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
                let value = match attr.unescape_value() {
                    Ok(value) => value.into_owned(),
                    Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
                };
                attrs.push((key, value));
            }
            Err(e) => tracing::debug!(error = %e, %name, "skipping malformed attribute"),
        }
    }
    (name, attrs)
}

/// Named entities beyond the XML set that appear in editor HTML
fn resolve_html_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "nbsp" => Some("\u{a0}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        "hellip" => Some("\u{2026}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "copy" => Some("\u{a9}"),
        "times" => Some("\u{d7}"),
        _ => None,
    }
}
