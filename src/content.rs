//! Section content model
//!
//! A loaded section is reduced to the ordered list of text nodes inside its
//! `<body>`, each tagged with the child-step path that addresses it. Steps
//! follow fragment-identifier numbering: element children take even indices
//! (2, 4, ...) and the text runs around them take odd indices (1, 3, ...),
//! counted from the root `<html>` element, so `<body>` is usually step 4.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ReaderError;
use crate::navigation::resolve_entity;
use crate::package::local_name;

/// One addressable run of text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextNode {
    /// Child steps from the root element, ending in the odd text step
    pub path: Vec<u32>,
    /// Decoded text
    pub text: String,
    /// Offset of the first character within the section text
    pub start: usize,
    /// Length in characters
    pub len: usize,
}

impl TextNode {
    /// Offset one past the last character within the section text
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Parsed, position-addressable content of one spine item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionContent {
    /// Spine index
    pub index: usize,
    /// Archive path of the section document
    pub href: String,
    /// Body text nodes in document order
    pub nodes: Vec<TextNode>,
    /// Concatenated node text (the section's `textContent`)
    pub text: String,
    /// Length of `text` in characters
    pub char_len: usize,
}

impl SectionContent {
    /// Build content from already-split nodes (their `start`/`len` are recomputed)
    pub fn from_nodes(index: usize, href: impl Into<String>, mut nodes: Vec<TextNode>) -> Self {
        let mut text = String::new();
        let mut cursor = 0;
        for node in &mut nodes {
            node.start = cursor;
            node.len = node.text.chars().count();
            cursor += node.len;
            text.push_str(&node.text);
        }
        Self {
            index,
            href: href.into(),
            nodes,
            text,
            char_len: cursor,
        }
    }

    /// Locate the node containing a section-level character offset.
    ///
    /// Offsets on a boundary resolve to the start of the following node; the
    /// end of the section resolves to the end of the last node.
    pub fn node_at(&self, offset: usize) -> Option<(usize, usize)> {
        if self.nodes.is_empty() || offset > self.char_len {
            return None;
        }
        let idx = self
            .nodes
            .partition_point(|node| node.end() <= offset)
            .min(self.nodes.len() - 1);
        let node = &self.nodes[idx];
        Some((idx, offset.saturating_sub(node.start).min(node.len)))
    }

    /// Index of the node addressed by a step path
    pub fn node_by_path(&self, path: &[u32]) -> Option<usize> {
        self.nodes.iter().position(|node| node.path == path)
    }

    /// Section-level offset of a point inside a node
    pub fn char_offset(&self, node: usize, offset: usize) -> Option<usize> {
        let node = self.nodes.get(node)?;
        (offset <= node.len).then_some(node.start + offset)
    }

    /// Characters `[start, end)` of the section text
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.text
            .chars()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect()
    }
}

fn is_skipped(name: &str) -> bool {
    matches!(name, "script" | "style" | "noscript" | "template")
}

struct Walker {
    /// Element children seen so far, one counter per open element
    counts: Vec<u32>,
    /// Steps of the open elements below the root
    path: Vec<u32>,
    body_depth: Option<usize>,
    skip_depth: usize,
    nodes: Vec<TextNode>,
}

impl Walker {
    fn open(&mut self, name: &str, empty: bool) {
        if self.counts.is_empty() {
            if !empty {
                self.counts.push(0);
            }
            return;
        }
        let count = self.counts.last_mut().map(|c| {
            *c += 1;
            *c
        });
        if empty {
            return;
        }
        self.path.push(count.unwrap_or(1) * 2);
        self.counts.push(0);
        if name == "body" && self.body_depth.is_none() {
            self.body_depth = Some(self.counts.len());
        }
        if self.skip_depth > 0 || (self.body_depth.is_some() && is_skipped(name)) {
            self.skip_depth += 1;
        }
    }

    fn close(&mut self) {
        if self.counts.pop().is_none() {
            return;
        }
        if self.body_depth == Some(self.counts.len() + 1) {
            self.body_depth = None;
        }
        self.path.pop();
        self.skip_depth = self.skip_depth.saturating_sub(1);
    }

    fn text(&mut self, text: &str) {
        if self.body_depth.is_none() || self.skip_depth > 0 || text.is_empty() {
            return;
        }
        let step = self.counts.last().copied().unwrap_or(0) * 2 + 1;
        if let Some(last) = self.nodes.last_mut() {
            if last.path.len() == self.path.len() + 1
                && last.path.last() == Some(&step)
                && last.path[..self.path.len()] == self.path[..]
            {
                last.text.push_str(text);
                return;
            }
        }
        let mut path = self.path.clone();
        path.push(step);
        self.nodes.push(TextNode {
            path,
            text: text.to_string(),
            start: 0,
            len: 0,
        });
    }
}

/// Parse an XHTML section document into addressable text nodes
pub fn parse_section(index: usize, href: &str, xhtml: &[u8]) -> Result<SectionContent, ReaderError> {
    let mut reader = Reader::from_reader(xhtml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut walker = Walker {
        counts: Vec::new(),
        path: Vec::new(),
        body_depth: None,
        skip_depth: 0,
        nodes: Vec::new(),
    };

    let parse_err = |e: quick_xml::Error| ReaderError::Parse(format!("{}: {:?}", href, e));

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => walker.open(&element_name(&reader, &e)?, false),
            Ok(Event::Empty(e)) => walker.open(&element_name(&reader, &e)?, true),
            Ok(Event::End(_)) => walker.close(),
            Ok(Event::Text(e)) => {
                let text = e
                    .decode()
                    .map_err(|e| ReaderError::Parse(format!("Decode error: {:?}", e)))?;
                walker.text(&text);
            }
            Ok(Event::CData(e)) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| ReaderError::Parse(format!("Decode error: {:?}", e)))?;
                walker.text(&text);
            }
            Ok(Event::GeneralRef(e)) => {
                let name = e
                    .decode()
                    .map_err(|e| ReaderError::Parse(format!("Decode error: {:?}", e)))?;
                walker.text(&resolve_entity(&name));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_err(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(SectionContent::from_nodes(index, href, walker.nodes))
}

fn element_name(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<String, ReaderError> {
    Ok(local_name(reader, e)?.to_ascii_lowercase())
}
