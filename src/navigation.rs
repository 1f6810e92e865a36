//! Navigation tree parsing and chapter-label resolution
//!
//! Supports EPUB 3 XHTML navigation documents (`epub:type="toc"`) and the
//! EPUB 2 NCX fallback. Hrefs are resolved to archive paths once at load so
//! that sections can be matched against them directly.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::ReaderError;
use crate::package::{attr_value, local_name, resolve_relative_path};

/// A single table-of-contents entry
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NavPoint {
    /// Display label
    pub label: String,
    /// Target reference (archive path, possibly with fragment)
    pub href: String,
    /// Nested entries
    pub children: Vec<NavPoint>,
}

/// Navigation structure of a document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Table of contents entries
    pub toc: Vec<NavPoint>,
    /// Landmark entries (cover, bodymatter, ...)
    pub landmarks: Vec<NavPoint>,
}

impl Navigation {
    /// Total number of TOC entries, including nested ones
    pub fn toc_count(&self) -> usize {
        fn count(points: &[NavPoint]) -> usize {
            points.iter().map(|p| 1 + count(&p.children)).sum()
        }
        count(&self.toc)
    }

    /// Flatten the TOC into `(depth, entry)` pairs in document order
    pub fn toc_flat(&self) -> Vec<(usize, &NavPoint)> {
        fn flatten<'a>(points: &'a [NavPoint], depth: usize, out: &mut Vec<(usize, &'a NavPoint)>) {
            for point in points {
                out.push((depth, point));
                flatten(&point.children, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        flatten(&self.toc, 0, &mut out);
        out
    }

    /// Label of the TOC entry that points at `section_href`, or an empty string.
    ///
    /// An entry matches when its href, minus the fragment, equals the section
    /// href or is contained in it. The first match in document order wins.
    pub fn chapter_label(&self, section_href: &str) -> String {
        let flat = self.toc_flat();
        let base = |p: &NavPoint| p.href.split('#').next().unwrap_or_default().to_string();
        flat.iter()
            .find(|(_, p)| base(p) == section_href)
            .or_else(|| {
                flat.iter().find(|(_, p)| {
                    let b = base(p);
                    !b.is_empty() && section_href.contains(b.as_str())
                })
            })
            .map(|(_, p)| p.label.trim().to_string())
            .unwrap_or_default()
    }

    /// Resolve every href against the navigation document's archive path
    pub fn resolve_against(&mut self, nav_path: &str) {
        fn visit(points: &mut [NavPoint], nav_path: &str) {
            for point in points {
                let fragment = point.href.split_once('#').map(|(_, f)| f.to_string());
                let path = resolve_relative_path(nav_path, &point.href);
                point.href = match fragment {
                    Some(f) => format!("{}#{}", path, f),
                    None => path,
                };
                visit(&mut point.children, nav_path);
            }
        }
        visit(&mut self.toc, nav_path);
        visit(&mut self.landmarks, nav_path);
    }
}

#[derive(Default)]
struct PartialNavPoint {
    href: Option<String>,
    label: String,
    children: Vec<NavPoint>,
}

impl PartialNavPoint {
    fn finish(self) -> Option<NavPoint> {
        let label = collapse_whitespace(&self.label);
        match self.href {
            Some(href) if !label.is_empty() => Some(NavPoint {
                label,
                href,
                children: self.children,
            }),
            // entries without a link still group their children
            None if !self.children.is_empty() => Some(NavPoint {
                label,
                href: String::new(),
                children: self.children,
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NavKind {
    Toc,
    Landmarks,
    Other,
}

/// Parse an EPUB 3 XHTML navigation document
pub fn parse_nav_xhtml(content: &[u8]) -> Result<Navigation, ReaderError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut nav = Navigation::default();
    let mut kind: Option<NavKind> = None;
    let mut stack: Vec<PartialNavPoint> = Vec::new();
    let mut results: Vec<NavPoint> = Vec::new();
    let mut in_anchor = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(&reader, &e)?.as_str() {
                "nav" => {
                    kind = Some(match attr_value(&reader, &e, "type")?.as_deref() {
                        Some("toc") => NavKind::Toc,
                        Some("landmarks") => NavKind::Landmarks,
                        _ => NavKind::Other,
                    });
                    results.clear();
                }
                "li" if kind.is_some() => stack.push(PartialNavPoint::default()),
                "a" | "span" if kind.is_some() => {
                    in_anchor = true;
                    if let (Some(href), Some(item)) =
                        (attr_value(&reader, &e, "href")?, stack.last_mut())
                    {
                        item.href = Some(href);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_anchor => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| ReaderError::Navigation(format!("Decode error: {:?}", e)))?;
                if let Some(item) = stack.last_mut() {
                    item.label.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(e)) if in_anchor => {
                let name = e
                    .decode()
                    .map_err(|e| ReaderError::Navigation(format!("Decode error: {:?}", e)))?;
                if let Some(item) = stack.last_mut() {
                    item.label.push_str(&resolve_entity(&name));
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                let name = reader
                    .decoder()
                    .decode(local.as_ref())
                    .map_err(|e| ReaderError::Navigation(format!("Decode error: {:?}", e)))?;
                match name.as_ref() {
                    "a" | "span" => in_anchor = false,
                    "li" if kind.is_some() => {
                        if let Some(point) = stack.pop().and_then(PartialNavPoint::finish) {
                            match stack.last_mut() {
                                Some(parent) => parent.children.push(point),
                                None => results.push(point),
                            }
                        }
                    }
                    "nav" => {
                        let completed = core::mem::take(&mut results);
                        match kind.take() {
                            Some(NavKind::Toc) if nav.toc.is_empty() => nav.toc = completed,
                            Some(NavKind::Landmarks) => nav.landmarks = completed,
                            _ => {}
                        }
                        stack.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReaderError::Navigation(format!(
                    "Nav XML parse error: {:?}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(nav)
}

/// Parse an EPUB 2 NCX navigation document
pub fn parse_ncx(content: &[u8]) -> Result<Navigation, ReaderError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut nav = Navigation::default();
    let mut stack: Vec<PartialNavPoint> = Vec::new();
    let mut in_nav_map = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match local_name(&reader, &e)?.as_str() {
                "navMap" => in_nav_map = true,
                "navPoint" if in_nav_map => stack.push(PartialNavPoint::default()),
                "text" => in_text = true,
                "content" => {
                    if let (Some(src), Some(point)) =
                        (attr_value(&reader, &e, "src")?, stack.last_mut())
                    {
                        point.href = Some(src);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| ReaderError::Navigation(format!("Decode error: {:?}", e)))?;
                if let Some(point) = stack.last_mut() {
                    point.label.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                let name = reader
                    .decoder()
                    .decode(local.as_ref())
                    .map_err(|e| ReaderError::Navigation(format!("Decode error: {:?}", e)))?;
                match name.as_ref() {
                    "text" => in_text = false,
                    "navMap" => in_nav_map = false,
                    "navPoint" => {
                        if let Some(point) = stack.pop().and_then(PartialNavPoint::finish) {
                            match stack.last_mut() {
                                Some(parent) => parent.children.push(point),
                                None => nav.toc.push(point),
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReaderError::Navigation(format!(
                    "NCX parse error: {:?}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(nav)
}

/// Resolve a general entity reference name (without `&`/`;`) to text
pub(crate) fn resolve_entity(name: &str) -> String {
    let escaped = format!("&{};", name);
    match quick_xml::escape::unescape(&escaped) {
        Ok(text) => text.into_owned(),
        Err(_) => match name {
            "nbsp" => "\u{a0}".to_string(),
            "mdash" => "\u{2014}".to_string(),
            "ndash" => "\u{2013}".to_string(),
            "hellip" => "\u{2026}".to_string(),
            _ => escaped,
        },
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
