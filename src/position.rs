//! Portable reading positions
//!
//! A [`Position`] addresses a character inside a section's text nodes and
//! serializes to an EPUB canonical fragment identifier:
//!
//! ```text
//! epubcfi(/6/4!/4/2/1:12)      section 1, text node /4/2/1, character 12
//! epubcfi(/6/4)                section 1, coarse (section start)
//! epubcfi(/6/4!/4/2,/1:5,/3:2) range inside section 1
//! ```
//!
//! Character offsets count Unicode scalar values. The serialized form is the
//! only representation handed to external stores, and it round-trips
//! losslessly through `Display` / `FromStr`.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use crate::content::SectionContent;
use crate::layout::PageGeometry;
use crate::locations::LocationIndex;

/// Step of the spine element inside the package document
const SPINE_STEP: u32 = 6;

/// A point inside a document, ordered by reading order
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    /// Spine index of the section
    pub spine: usize,
    /// Child steps inside the section document; empty for a coarse position
    pub steps: Vec<u32>,
    /// Character offset inside the addressed text node
    pub offset: Option<usize>,
}

impl Position {
    /// Section-level position (start of the section)
    pub fn section_start(spine: usize) -> Self {
        Self {
            spine,
            steps: Vec::new(),
            offset: None,
        }
    }

    /// Whether this position only identifies a section
    pub fn is_coarse(&self) -> bool {
        self.steps.is_empty()
    }

    /// Exact position of a section-level character offset
    pub fn at_char(section: &SectionContent, offset: usize) -> Self {
        match section.node_at(offset) {
            Some((node, within)) => Self {
                spine: section.index,
                steps: section.nodes[node].path.clone(),
                offset: Some(within),
            },
            None => Self::section_start(section.index),
        }
    }

    /// Section-level character offset this position resolves to, if its node exists
    pub fn char_offset(&self, section: &SectionContent) -> Option<usize> {
        if self.spine != section.index {
            return None;
        }
        if self.is_coarse() {
            return Some(0);
        }
        let node = section.node_by_path(&self.steps)?;
        section.char_offset(node, self.offset.unwrap_or(0))
    }

    fn tokens(&self) -> Vec<Step> {
        let mut tokens = vec![
            Step {
                index: SPINE_STEP,
                indirect: false,
            },
            Step {
                index: (self.spine as u32 + 1) * 2,
                indirect: !self.steps.is_empty(),
            },
        ];
        tokens.extend(self.steps.iter().map(|&index| Step {
            index,
            indirect: false,
        }));
        tokens
    }
}

/// Order two positions: section index first, then position inside the section
pub fn compare(a: &Position, b: &Position) -> Ordering {
    a.cmp(b)
}

/// A highlighted or selected span
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionRange {
    /// Inclusive start
    pub start: Position,
    /// Exclusive end
    pub end: Position,
}

impl PositionRange {
    /// Range covering the start of one section (used when exact resolution fails)
    pub fn coarse(spine: usize) -> Self {
        Self {
            start: Position::section_start(spine),
            end: Position::section_start(spine),
        }
    }

    /// Whether `position` lies inside `[start, end)` (or equals a collapsed range)
    pub fn contains(&self, position: &Position) -> bool {
        if self.start == self.end {
            return *position == self.start;
        }
        self.start <= *position && *position < self.end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Step {
    index: u32,
    indirect: bool,
}

fn write_steps(f: &mut fmt::Formatter<'_>, steps: &[Step]) -> fmt::Result {
    for step in steps {
        write!(f, "/{}", step.index)?;
        if step.indirect {
            f.write_str("!")?;
        }
    }
    Ok(())
}

fn write_offset(f: &mut fmt::Formatter<'_>, offset: Option<usize>) -> fmt::Result {
    match offset {
        Some(offset) => write!(f, ":{}", offset),
        None => Ok(()),
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("epubcfi(")?;
        write_steps(f, &self.tokens())?;
        write_offset(f, self.offset)?;
        f.write_str(")")
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            return fmt::Display::fmt(&self.start, f);
        }
        let start = self.start.tokens();
        let end = self.end.tokens();
        let common = start
            .iter()
            .zip(end.iter())
            .take_while(|(a, b)| a == b)
            .count();

        f.write_str("epubcfi(")?;
        write_steps(f, &start[..common])?;
        f.write_str(",")?;
        write_steps(f, &start[common..])?;
        write_offset(f, self.start.offset)?;
        f.write_str(",")?;
        write_steps(f, &end[common..])?;
        write_offset(f, self.end.offset)?;
        f.write_str(")")
    }
}

/// Failure to parse a serialized position
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PositionParseError {
    /// Not wrapped in `epubcfi( ... )`
    MissingWrapper,
    /// A step was not a number
    InvalidStep(String),
    /// Character offset was not a number
    InvalidOffset(String),
    /// No spine step, or the spine step is not a positive even number
    MissingSpineStep,
    /// Range does not have exactly parent, start, and end parts
    MalformedRange,
}

impl fmt::Display for PositionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionParseError::MissingWrapper => write!(f, "expected epubcfi(...)"),
            PositionParseError::InvalidStep(s) => write!(f, "invalid step '{}'", s),
            PositionParseError::InvalidOffset(s) => write!(f, "invalid offset '{}'", s),
            PositionParseError::MissingSpineStep => write!(f, "missing spine step"),
            PositionParseError::MalformedRange => write!(f, "malformed range"),
        }
    }
}

impl std::error::Error for PositionParseError {}

fn unwrap_cfi(s: &str) -> Result<&str, PositionParseError> {
    s.trim()
        .strip_prefix("epubcfi(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or(PositionParseError::MissingWrapper)
}

/// Drop `[...]` assertions, which carry no addressing information here
fn strip_assertions(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for ch in s.chars() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

fn parse_part(part: &str) -> Result<(Vec<Step>, Option<usize>), PositionParseError> {
    let (path, offset) = match part.split_once(':') {
        Some((path, offset)) => {
            let offset = offset
                .parse::<usize>()
                .map_err(|_| PositionParseError::InvalidOffset(offset.to_string()))?;
            (path, Some(offset))
        }
        None => (part, None),
    };

    let mut steps = Vec::new();
    for raw in path.split('/').skip(1) {
        let (digits, indirect) = match raw.strip_suffix('!') {
            Some(digits) => (digits, true),
            None => (raw, false),
        };
        let index = digits
            .parse::<u32>()
            .map_err(|_| PositionParseError::InvalidStep(raw.to_string()))?;
        steps.push(Step { index, indirect });
    }
    if !path.is_empty() && !path.starts_with('/') {
        return Err(PositionParseError::InvalidStep(path.to_string()));
    }
    Ok((steps, offset))
}

fn position_from_steps(steps: &[Step], offset: Option<usize>) -> Result<Position, PositionParseError> {
    let spine_step = steps.get(1).ok_or(PositionParseError::MissingSpineStep)?;
    if spine_step.index < 2 || spine_step.index % 2 != 0 {
        return Err(PositionParseError::MissingSpineStep);
    }
    let inner: Vec<u32> = steps[2..].iter().map(|s| s.index).collect();
    if !inner.is_empty() && !spine_step.indirect {
        return Err(PositionParseError::MissingSpineStep);
    }
    Ok(Position {
        spine: (spine_step.index / 2 - 1) as usize,
        offset: if inner.is_empty() { None } else { offset },
        steps: inner,
    })
}

impl FromStr for Position {
    type Err = PositionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = strip_assertions(unwrap_cfi(s)?);
        if body.contains(',') {
            return Err(PositionParseError::MalformedRange);
        }
        let (steps, offset) = parse_part(&body)?;
        position_from_steps(&steps, offset)
    }
}

impl FromStr for PositionRange {
    type Err = PositionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = strip_assertions(unwrap_cfi(s)?);
        let parts: Vec<&str> = body.split(',').collect();
        match parts.as_slice() {
            [point] => {
                let (steps, offset) = parse_part(point)?;
                let position = position_from_steps(&steps, offset)?;
                Ok(Self {
                    start: position.clone(),
                    end: position,
                })
            }
            [parent, start, end] => {
                let (parent, parent_offset) = parse_part(parent)?;
                if parent_offset.is_some() {
                    return Err(PositionParseError::MalformedRange);
                }
                let resolve = |local: &str| -> Result<Position, PositionParseError> {
                    let (mut steps, offset) = parse_part(local)?;
                    let mut full = parent.clone();
                    full.append(&mut steps);
                    position_from_steps(&full, offset)
                };
                Ok(Self {
                    start: resolve(start)?,
                    end: resolve(end)?,
                })
            }
            _ => Err(PositionParseError::MalformedRange),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Position {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Position {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PositionRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PositionRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A point in a live selection: text node index within the section and offset in that node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextPoint {
    /// Index into `SectionContent::nodes`
    pub node: usize,
    /// Character offset inside the node
    pub offset: usize,
}

/// Selection could not be mapped onto addressable text
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RangeResolutionError {
    /// Node index does not exist in the section
    NodeOutOfRange {
        /// Offending node index
        node: usize,
    },
    /// Offset exceeds the node's length
    OffsetOutOfRange {
        /// Node index
        node: usize,
        /// Offending offset
        offset: usize,
    },
    /// End comes before start
    Inverted,
}

impl fmt::Display for RangeResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeResolutionError::NodeOutOfRange { node } => {
                write!(f, "text node {} does not exist", node)
            }
            RangeResolutionError::OffsetOutOfRange { node, offset } => {
                write!(f, "offset {} is outside text node {}", offset, node)
            }
            RangeResolutionError::Inverted => write!(f, "selection end precedes start"),
        }
    }
}

impl std::error::Error for RangeResolutionError {}

fn resolve_point(section: &SectionContent, point: TextPoint) -> Result<Position, RangeResolutionError> {
    let node = section
        .nodes
        .get(point.node)
        .ok_or(RangeResolutionError::NodeOutOfRange { node: point.node })?;
    if point.offset > node.len {
        return Err(RangeResolutionError::OffsetOutOfRange {
            node: point.node,
            offset: point.offset,
        });
    }
    Ok(Position {
        spine: section.index,
        steps: node.path.clone(),
        offset: Some(point.offset),
    })
}

/// Map a selection inside a loaded section to a position range
pub fn try_range_from_selection(
    section: &SectionContent,
    start: TextPoint,
    end: TextPoint,
) -> Result<PositionRange, RangeResolutionError> {
    let start = resolve_point(section, start)?;
    let end = resolve_point(section, end)?;
    if end < start {
        return Err(RangeResolutionError::Inverted);
    }
    Ok(PositionRange { start, end })
}

/// Like [`try_range_from_selection`], but degrades to a section-level range on failure
pub fn range_from_selection(section: &SectionContent, start: TextPoint, end: TextPoint) -> PositionRange {
    try_range_from_selection(section, start, end).unwrap_or_else(|err| {
        log::debug!(
            "[POSITION] Falling back to section {} start: {}",
            section.index,
            err
        );
        PositionRange::coarse(section.index)
    })
}

/// Range covering `len` characters from a section-level offset
pub fn range_from_chars(section: &SectionContent, start: usize, len: usize) -> PositionRange {
    let end = start.saturating_add(len);
    match (section.node_at(start), section.node_at(end)) {
        (Some((sn, so)), Some((en, eo))) => range_from_selection(
            section,
            TextPoint { node: sn, offset: so },
            // a match that ends exactly on a node boundary ends inside the previous node
            if eo == 0 && en > sn {
                TextPoint {
                    node: en - 1,
                    offset: section.nodes[en - 1].len,
                }
            } else {
                TextPoint { node: en, offset: eo }
            },
        ),
        _ => PositionRange::coarse(section.index),
    }
}

/// Percentage through the document for `position`, in `[0, 100]`.
///
/// Needs the location index; without it the caller's last known value is
/// returned unchanged. `section` refines the result to character precision
/// when the position's section is loaded.
pub fn percentage(
    position: &Position,
    index: Option<&LocationIndex>,
    section: Option<&SectionContent>,
    last_known: f32,
) -> f32 {
    let Some(index) = index else {
        return last_known;
    };
    let within = section
        .and_then(|s| position.char_offset(s))
        .unwrap_or(0);
    index.percentage(position.spine, within)
}

/// Where a position sits in the paginated view of its section
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportLocation {
    /// Zero-based page inside the section
    pub page: usize,
    /// Character offset from the top of that page
    pub offset_in_page: usize,
}

/// Map a position to a page and in-page offset
pub fn locate(position: &Position, section: &SectionContent, geometry: &PageGeometry) -> ViewportLocation {
    let offset = position.char_offset(section).unwrap_or(0).min(section.char_len);
    let page = geometry.page_of(offset, section.char_len);
    let (start, _) = geometry.page_bounds(page, section.char_len);
    ViewportLocation {
        page,
        offset_in_page: offset - start,
    }
}

/// Position at the first character of a page
pub fn page_start(page: usize, section: &SectionContent, geometry: &PageGeometry) -> Position {
    let (start, _) = geometry.page_bounds(page, section.char_len);
    if start == 0 && section.nodes.is_empty() {
        return Position::section_start(section.index);
    }
    Position::at_char(section, start)
}
