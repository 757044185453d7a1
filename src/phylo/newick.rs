//! Recursive-descent Newick reader.
//!
//! ```text
//! tree     = subtree ';'
//! subtree  = '(' subtree (',' subtree)* ')' label | label
//! label    = name? (':' length)?
//! ```
//! Quoted names (`'...'`) and bracketed comments (`[...]`) are accepted.
//! Unquoted names are kept verbatim; see [`PhyloTree::find_tip`] for how
//! underscores are matched.

use super::tree::{Node, NodeId, PhyloTree};
use crate::error::{DivError, Result};

/// Parse a Newick string into a [`PhyloTree`].
pub fn parse(input: &str) -> Result<PhyloTree> {
    let mut reader = Reader {
        input: input.as_bytes(),
        pos: 0,
        nodes: Vec::new(),
    };
    let root = reader.subtree(None)?;
    reader.skip_blank();
    if reader.peek() != Some(b';') {
        return Err(reader.error("expected ';' after tree"));
    }
    PhyloTree::from_nodes(reader.nodes, root)
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    nodes: Vec<Node>,
}

impl Reader<'_> {
    fn subtree(&mut self, parent: Option<NodeId>) -> Result<NodeId> {
        self.skip_blank();
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent,
            children: Vec::new(),
            branch_length: None,
            name: None,
        });

        if self.peek() == Some(b'(') {
            self.pos += 1;
            loop {
                let child = self.subtree(Some(id))?;
                self.nodes[id].children.push(child);
                self.skip_blank();
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }
        }

        self.label(id)?;
        Ok(id)
    }

    fn label(&mut self, id: NodeId) -> Result<()> {
        self.skip_blank();
        let name = if self.peek() == Some(b'\'') {
            self.quoted()?
        } else {
            self.take_while(|b| !b":,();[".contains(&b) && !b.is_ascii_whitespace())
        };
        if !name.is_empty() {
            self.nodes[id].name = Some(name);
        }

        self.skip_blank();
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_blank();
            let raw = self.take_while(|b| b.is_ascii_digit() || b"+-.eE".contains(&b));
            let length = raw
                .parse::<f64>()
                .map_err(|_| self.error(&format!("invalid branch length '{}'", raw)))?;
            self.nodes[id].branch_length = Some(length);
        }
        Ok(())
    }

    fn quoted(&mut self) -> Result<String> {
        self.pos += 1;
        let mut name = String::new();
        loop {
            match self.peek() {
                // '' escapes a quote inside a quoted label
                Some(b'\'') if self.input.get(self.pos + 1) == Some(&b'\'') => {
                    name.push('\'');
                    self.pos += 2;
                }
                Some(b'\'') => {
                    self.pos += 1;
                    return Ok(name);
                }
                Some(b) => {
                    name.push(b as char);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated quoted name")),
            }
        }
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while self.peek().map_or(false, &keep) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn skip_blank(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'[') => {
                    while self.peek().map_or(false, |b| b != b']') {
                        self.pos += 1;
                    }
                    self.pos += 1;
                }
                _ => break,
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn error(&self, msg: &str) -> DivError {
        DivError::Newick(format!("{} at byte {}", msg, self.pos))
    }
}
