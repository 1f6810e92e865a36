//! Highlight marks painted over the rendered text
//!
//! The overlay only knows ranges and colours; where highlights are stored is
//! someone else's concern. Marks are keyed by the serialized range, so
//! applying the same range twice never produces a second mark.
//!
//! Painted character spans are derived per section and cached. When a section
//! is evicted the cache entry is dropped with [`AnnotationOverlay::forget_section`];
//! the session calls [`AnnotationOverlay::reapply_section`] on reload before
//! it builds the next page view.

use std::collections::{BTreeMap, HashMap};

use crate::annotations::HighlightColor;
use crate::content::SectionContent;
use crate::position::PositionRange;

/// One applied mark
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mark {
    /// Marked range
    pub range: PositionRange,
    /// Fill colour
    pub color: HighlightColor,
}

/// A mark resolved to section-level character offsets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaintedSpan {
    /// First marked character
    pub start: usize,
    /// One past the last marked character
    pub end: usize,
    /// Fill colour
    pub color: HighlightColor,
}

/// Set of live marks plus their per-section painted spans
#[derive(Debug, Default)]
pub struct AnnotationOverlay {
    marks: BTreeMap<String, Mark>,
    painted: HashMap<usize, Vec<PaintedSpan>>,
}

impl AnnotationOverlay {
    /// Empty overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a range. Returns `false` when the identical mark is already present.
    ///
    /// Re-applying a range with another colour recolours the existing mark.
    pub fn apply(&mut self, range: PositionRange, color: HighlightColor) -> bool {
        let key = range.to_string();
        if let Some(existing) = self.marks.get_mut(&key) {
            if existing.color == color {
                return false;
            }
            existing.color = color;
        } else {
            self.marks.insert(key, Mark { range: range.clone(), color });
        }
        self.invalidate(&range);
        true
    }

    /// Remove the mark for a range; a missing mark is ignored
    pub fn remove(&mut self, range: &PositionRange) -> bool {
        match self.marks.remove(&range.to_string()) {
            Some(_) => {
                self.invalidate(range);
                true
            }
            None => false,
        }
    }

    /// Number of marks
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether there are no marks
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Marks that start in section `spine`, in reading order
    pub fn marks_in(&self, spine: usize) -> Vec<&Mark> {
        let mut marks: Vec<&Mark> = self
            .marks
            .values()
            .filter(|mark| mark.range.start.spine == spine)
            .collect();
        marks.sort_by(|a, b| a.range.cmp(&b.range));
        marks
    }

    /// Cached spans for a section, if it has been painted since its last change
    pub fn painted(&self, spine: usize) -> Option<&[PaintedSpan]> {
        self.painted.get(&spine).map(Vec::as_slice)
    }

    /// Resolve every mark of a (re)loaded section to character spans.
    ///
    /// Marks whose endpoints no longer resolve, or that collapse to nothing,
    /// are skipped for painting but stay in the overlay.
    pub fn reapply_section(&mut self, section: &SectionContent) -> &[PaintedSpan] {
        let mut spans = Vec::new();
        for mark in self.marks_in(section.index) {
            let Some(start) = mark.range.start.char_offset(section) else {
                log::debug!("[OVERLAY] Mark {} no longer resolves", mark.range);
                continue;
            };
            let end = if mark.range.end.spine > section.index {
                Some(section.char_len)
            } else {
                mark.range.end.char_offset(section)
            };
            match end {
                Some(end) if end > start => spans.push(PaintedSpan {
                    start,
                    end,
                    color: mark.color,
                }),
                _ => {}
            }
        }
        self.painted.insert(section.index, spans);
        self.painted
            .get(&section.index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Drop the painted spans of an evicted section
    pub fn forget_section(&mut self, spine: usize) {
        self.painted.remove(&spine);
    }

    /// Remove every mark
    pub fn clear(&mut self) {
        self.marks.clear();
        self.painted.clear();
    }

    fn invalidate(&mut self, range: &PositionRange) {
        for spine in range.start.spine..=range.end.spine {
            self.painted.remove(&spine);
        }
    }
}
