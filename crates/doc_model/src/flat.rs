//! Flat token view of the document content
//!
//! A position is an index into the flattened token sequence: each block
//! contributes an opening and a closing token, each character and each atom
//! one token. Steps edit the token sequence and the tree is rebuilt from it.
//! Rebuilding repairs structure left unbalanced by cross-block deletions and
//! records every repair in a [`StepMap`].

use crate::{AtomNode, BlockKind, BlockNode, Mark, Node, StepMap, TextNode};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Open(BlockKind),
    Close,
    Char(char, Vec<Mark>),
    Atom(AtomNode),
}

/// Flatten a list of nodes into tokens
pub(crate) fn flatten(content: &[Node]) -> Vec<Token> {
    let mut out = Vec::new();
    for node in content {
        flatten_node(node, &mut out);
    }
    out
}

fn flatten_node(node: &Node, out: &mut Vec<Token>) {
    match node {
        Node::Block(block) => {
            out.push(Token::Open(block.kind));
            for child in &block.content {
                flatten_node(child, out);
            }
            out.push(Token::Close);
        }
        Node::Atom(atom) => out.push(Token::Atom(atom.clone())),
        Node::Text(text) => {
            out.extend(text.text.chars().map(|c| Token::Char(c, text.marks.clone())));
        }
    }
}

/// The rebuilt document content and the repairs made while rebuilding
pub(crate) struct Rebuilt {
    pub content: Vec<Node>,
    pub repairs: StepMap,
}

struct Frame {
    kind: BlockKind,
    content: Vec<Node>,
    text: Option<TextNode>,
}

impl Frame {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            content: Vec::new(),
            text: None,
        }
    }

    fn flush_text(&mut self) {
        if let Some(text) = self.text.take() {
            self.content.push(Node::Text(text));
        }
    }

    fn push_char(&mut self, c: char, marks: Vec<Mark>) {
        match &mut self.text {
            Some(run) if run.marks == marks => run.text.push(c),
            _ => {
                self.flush_text();
                self.text = Some(TextNode {
                    text: c.to_string(),
                    marks,
                });
            }
        }
    }

    fn finish(mut self) -> Node {
        self.flush_text();
        Node::Block(BlockNode {
            kind: self.kind,
            content: self.content,
        })
    }
}

struct Builder {
    stack: Vec<Frame>,
    repairs: StepMap,
}

impl Builder {
    fn top(&mut self) -> &mut Frame {
        // The document frame is never popped
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn open(&mut self, kind: BlockKind) {
        self.top().flush_text();
        self.stack.push(Frame::new(kind));
    }

    fn close(&mut self) {
        if let Some(frame) = self.stack.pop() {
            let node = frame.finish();
            self.top().content.push(node);
        }
    }

    /// Open implicit wrappers so inline content at `index` lands in a textblock
    fn ensure_textblock(&mut self, index: usize) {
        let kind = self.top().kind;
        if kind.is_textblock() {
            return;
        }
        if kind.is_list() {
            self.open(BlockKind::ListItem);
            self.repairs.push(index, 0, 1);
        }
        self.open(BlockKind::Paragraph);
        self.repairs.push(index, 0, 1);
    }
}

/// Rebuild a document body from tokens, repairing unbalanced structure
pub(crate) fn rebuild(tokens: Vec<Token>) -> Rebuilt {
    let len = tokens.len();
    let mut builder = Builder {
        stack: vec![Frame::new(BlockKind::Doc)],
        repairs: StepMap::empty(),
    };

    for (index, token) in tokens.into_iter().enumerate() {
        match token {
            Token::Open(kind) => {
                let top = builder.top().kind;
                if top.is_textblock() {
                    // A block boundary removed by a deletion: join into the open textblock
                    builder.repairs.push(index, 1, 0);
                    continue;
                }
                if kind == BlockKind::ListItem && !top.is_list() {
                    builder.open(BlockKind::BulletList);
                    builder.repairs.push(index, 0, 1);
                } else if kind != BlockKind::ListItem && top.is_list() {
                    builder.open(BlockKind::ListItem);
                    builder.repairs.push(index, 0, 1);
                }
                builder.open(kind);
            }
            Token::Close => {
                builder.top().flush_text();
                if builder.stack.len() == 1 {
                    builder.repairs.push(index, 1, 0);
                    continue;
                }
                builder.close();
            }
            Token::Char(c, marks) => {
                builder.ensure_textblock(index);
                builder.top().push_char(c, marks);
            }
            Token::Atom(atom) => {
                builder.ensure_textblock(index);
                let top = builder.top();
                top.flush_text();
                top.content.push(Node::Atom(atom));
            }
        }
    }

    builder.top().flush_text();
    let mut unclosed = 0;
    while builder.stack.len() > 1 {
        builder.close();
        unclosed += 1;
    }
    let mut doc = builder.stack.pop().map(|f| f.content).unwrap_or_default();
    if doc.is_empty() {
        doc.push(Node::paragraph(Vec::new()));
        unclosed += 2;
    }
    builder.repairs.push(len, 0, unclosed);

    Rebuilt {
        content: doc,
        repairs: builder.repairs,
    }
}

/// Count the characters before a token index
pub(crate) fn chars_before(tokens: &[Token], index: usize) -> usize {
    tokens[..index.min(tokens.len())]
        .iter()
        .filter(|t| matches!(t, Token::Char(..)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(text: &str) -> Node {
        Node::paragraph(vec![Node::text(text)])
    }

    #[test]
    fn test_flatten_rebuild_is_identity() {
        let content = vec![
            para("ab"),
            Node::bullet_list(vec![Node::list_item(vec![para("c")])]),
        ];
        let tokens = flatten(&content);
        assert_eq!(tokens.len(), 4 + 7);

        let rebuilt = rebuild(tokens);
        assert_eq!(rebuilt.content, content);
        assert!(rebuilt.repairs.is_empty());
    }

    #[test]
    fn test_cross_block_delete_joins() {
        // <p>ab</p><p>cd</p> with "b</p><p>c" removed
        let mut tokens = flatten(&[para("ab"), para("cd")]);
        tokens.drain(2..6);

        let rebuilt = rebuild(tokens);
        assert_eq!(rebuilt.content, vec![para("ad")]);
        assert!(rebuilt.repairs.is_empty());
    }

    #[test]
    fn test_unbalanced_close_is_dropped() {
        // <p>a</p><ul><li><p>b</p></li></ul> with "</p><ul><li><p>" removed
        let content = vec![
            para("a"),
            Node::bullet_list(vec![Node::list_item(vec![para("b")])]),
        ];
        let mut tokens = flatten(&content);
        tokens.drain(2..6);

        let rebuilt = rebuild(tokens);
        assert_eq!(rebuilt.content, vec![para("ab")]);
        assert_eq!(rebuilt.repairs.ranges().len(), 1);
        assert_eq!(rebuilt.repairs.ranges()[0].old_size, 2);
    }

    #[test]
    fn test_empty_document_gets_paragraph() {
        let rebuilt = rebuild(Vec::new());
        assert_eq!(rebuilt.content, vec![Node::paragraph(Vec::new())]);
        assert_eq!(rebuilt.repairs.ranges()[0].new_size, 2);
    }

    #[test]
    fn test_stray_text_is_wrapped() {
        let rebuilt = rebuild(vec![Token::Char('x', Vec::new())]);
        assert_eq!(rebuilt.content, vec![para("x")]);
    }
}
