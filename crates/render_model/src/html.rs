//! Live HTML export
//!
//! Serializes a document the way the editor displays it. Reference nodes are
//! emitted as `data-atomic` elements whose text is never counted as document
//! text; annotation marks become `<mark>` elements when requested. The
//! persisted snapshot omits annotation marks since records carry them.

use crate::color::author_color;
use crate::formula::{render_formula_body, FormulaRenderer, ValidatingRenderer};
use crate::numbering::{number_references, NumberDecoration};
use doc_model::{AnnotationMark, AtomAttrs, AtomNode, BlockKind, Document, Mark, Node, StableId, TextNode};
use quick_xml::escape::{escape, partial_escape};
use std::collections::HashMap;

/// Class on the highlight element of an annotation
pub const ANNOTATION_CLASS: &str = "annotation";
/// Attribute holding the annotation id on a highlight element
pub const ANNOTATION_ID_ATTR: &str = "data-annotation-id";
/// Marker attribute on elements whose content is not document text
pub const ATOMIC_ATTR: &str = "data-atomic";
/// Class on the wrapper of rendered formula output
pub const FORMULA_CLASS: &str = "rendered-formula";

/// Export options
pub struct HtmlOptions<'a> {
    /// Emit annotation marks as highlight elements
    pub include_annotations: bool,
    pub formula_renderer: &'a dyn FormulaRenderer,
}

impl Default for HtmlOptions<'_> {
    fn default() -> Self {
        Self {
            include_annotations: true,
            formula_renderer: &ValidatingRenderer,
        }
    }
}

impl HtmlOptions<'_> {
    /// Options for the persisted snapshot
    pub fn persisted() -> Self {
        Self {
            include_annotations: false,
            ..Self::default()
        }
    }
}

/// Export a document to HTML
pub fn to_html(doc: &Document, options: &HtmlOptions<'_>) -> String {
    let numbers: HashMap<StableId, NumberDecoration> = number_references(doc)
        .into_iter()
        .map(|d| (d.reference_id, d))
        .collect();
    let mut writer = HtmlWriter {
        options,
        numbers,
        out: String::new(),
    };
    for node in doc.content() {
        writer.node(node);
    }
    writer.out
}

/// Attributes of an annotation highlight element
pub fn annotation_attrs(annotation_id: StableId, author_id: &str) -> Vec<(String, String)> {
    vec![
        ("class".to_string(), ANNOTATION_CLASS.to_string()),
        (ANNOTATION_ID_ATTR.to_string(), annotation_id.to_string()),
        ("data-author-id".to_string(), author_id.to_string()),
        ("style".to_string(), author_color(author_id).style()),
    ]
}

/// Open tag for an annotation highlight
pub fn annotation_open_tag(annotation_id: StableId, author_id: &str) -> String {
    let mut tag = String::from("<mark");
    for (key, value) in annotation_attrs(annotation_id, author_id) {
        tag.push_str(&format!(" {key}=\"{}\"", escape(value.as_str())));
    }
    tag.push('>');
    tag
}

struct HtmlWriter<'a> {
    options: &'a HtmlOptions<'a>,
    numbers: HashMap<StableId, NumberDecoration>,
    out: String,
}

impl HtmlWriter<'_> {
    fn node(&mut self, node: &Node) {
        match node {
            Node::Block(block) => {
                let tag = block_tag(block.kind);
                self.out.push_str(&format!("<{tag}>"));
                for child in &block.content {
                    self.node(child);
                }
                self.out.push_str(&format!("</{tag}>"));
            }
            Node::Text(text) => self.text(text),
            Node::Atom(atom) => self.atom(atom),
        }
    }

    fn text(&mut self, text: &TextNode) {
        let mut close = Vec::new();
        for mark in &text.marks {
            match mark {
                Mark::Bold => self.open_simple("strong", &mut close),
                Mark::Italic => self.open_simple("em", &mut close),
                Mark::Underline => self.open_simple("u", &mut close),
                Mark::Code => self.open_simple("code", &mut close),
                Mark::Link { href } => {
                    self.out
                        .push_str(&format!("<a href=\"{}\">", escape(href.as_str())));
                    close.push("a");
                }
                Mark::Annotation(AnnotationMark {
                    annotation_id,
                    author_id,
                    ..
                }) => {
                    if self.options.include_annotations {
                        self.out
                            .push_str(&annotation_open_tag(*annotation_id, author_id));
                        close.push("mark");
                    }
                }
            }
        }
        self.out.push_str(&partial_escape(text.text.as_str()));
        for tag in close.iter().rev() {
            self.out.push_str(&format!("</{tag}>"));
        }
    }

    fn open_simple(&mut self, tag: &'static str, close: &mut Vec<&'static str>) {
        self.out.push_str(&format!("<{tag}>"));
        close.push(tag);
    }

    fn atom(&mut self, atom: &AtomNode) {
        let id = atom.reference_id();
        let common = format!("{ATOMIC_ATTR}=\"true\" data-reference-id=\"{id}\"");
        let label = self
            .numbers
            .get(&id)
            .map(NumberDecoration::label)
            .unwrap_or_default();

        match &atom.attrs {
            AtomAttrs::Citation(attrs) => {
                self.out.push_str(&format!(
                    "<cite class=\"citation\" {common} data-kind=\"citation\" title=\"{}\">{}</cite>",
                    escape(attrs.title.as_str()),
                    partial_escape(label.as_str())
                ));
            }
            AtomAttrs::Image(attrs) => {
                let src = attrs.src.as_deref().unwrap_or_default();
                self.out.push_str(&format!(
                    "<img class=\"figure\" {common} data-kind=\"image\" data-label=\"{}\" src=\"{}\" alt=\"{}\">",
                    escape(label.as_str()),
                    escape(src),
                    escape(attrs.alt.as_str())
                ));
            }
            AtomAttrs::Formula(attrs) => {
                let body =
                    render_formula_body(self.options.formula_renderer, &attrs.source, attrs.display);
                self.out.push_str(&format!(
                    "<span class=\"{FORMULA_CLASS}\" {common} data-kind=\"formula\" data-label=\"{}\">{body}</span>",
                    escape(label.as_str())
                ));
            }
        }
    }
}

fn block_tag(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::Doc => "div",
        BlockKind::Paragraph => "p",
        BlockKind::Heading { level } => match level {
            1 => "h1",
            2 => "h2",
            3 => "h3",
            4 => "h4",
            5 => "h5",
            _ => "h6",
        },
        BlockKind::Blockquote => "blockquote",
        BlockKind::BulletList => "ul",
        BlockKind::OrderedList => "ol",
        BlockKind::ListItem => "li",
        BlockKind::CodeBlock => "pre",
    }
}
