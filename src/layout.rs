//! Page geometry for the reading viewport
//!
//! Sections are paginated by character capacity: the viewport, margins, and
//! typography settings give a fixed number of characters per page, and a
//! section's pages are consecutive character windows of that size. This keeps
//! page boundaries a pure function of (settings, viewport, text length).

use crate::settings::{ReaderSettings, SpreadMode, ViewMode};

/// Minimum viewport width for which a two-page spread is laid out
pub const MIN_SPREAD_WIDTH: f32 = 800.0;

/// Reading viewport in CSS pixels
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Viewport {
    /// Width in px
    pub width: f32,
    /// Height in px
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 800.0,
        }
    }
}

/// Resolved page capacity for one (viewport, settings) pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageGeometry {
    /// Characters that fit on one screen (both columns in a spread)
    pub chars_per_page: usize,
    /// 2 when a spread is active, otherwise 1
    pub columns: u8,
}

impl PageGeometry {
    /// Horizontal and vertical page margin in px
    pub const MARGIN: f32 = 40.0;
    /// Gap between spread columns in px
    pub const COLUMN_GAP: f32 = 48.0;

    /// Compute the page capacity for a viewport and settings
    pub fn compute(viewport: Viewport, settings: &ReaderSettings) -> Self {
        if settings.view_mode == ViewMode::Scrolled {
            return Self {
                chars_per_page: usize::MAX,
                columns: 1,
            };
        }

        let columns: u8 = match settings.spread {
            SpreadMode::Auto if viewport.width >= MIN_SPREAD_WIDTH => 2,
            SpreadMode::Auto => {
                log::debug!(
                    "[LAYOUT] Spread unavailable at {}px width, using single page",
                    viewport.width
                );
                1
            }
            SpreadMode::None => 1,
        };

        let content_width = (viewport.width - 2.0 * Self::MARGIN).max(1.0);
        let content_height = (viewport.height - 2.0 * Self::MARGIN).max(1.0);
        let column_width =
            ((content_width - Self::COLUMN_GAP * f32::from(columns - 1)) / f32::from(columns)).max(1.0);

        let font_px = f32::from(settings.font_size);
        let advance = font_px * settings.font_family.advance_ratio();
        let line_px = font_px * settings.line_height;

        let chars_per_line = if advance > 0.0 {
            ((column_width / advance).floor() as usize).max(1)
        } else {
            1
        };
        let lines = if line_px > 0.0 {
            ((content_height / line_px).floor() as usize).max(1)
        } else {
            1
        };

        Self {
            chars_per_page: chars_per_line
                .saturating_mul(lines)
                .saturating_mul(usize::from(columns)),
            columns,
        }
    }

    /// Number of pages for a section of `char_len` characters (never zero)
    pub fn page_count(&self, char_len: usize) -> usize {
        char_len.div_ceil(self.chars_per_page).max(1)
    }

    /// Page containing a character offset
    pub fn page_of(&self, offset: usize, char_len: usize) -> usize {
        (offset / self.chars_per_page).min(self.page_count(char_len) - 1)
    }

    /// Character range `[start, end)` shown on `page`
    pub fn page_bounds(&self, page: usize, char_len: usize) -> (usize, usize) {
        let start = page.saturating_mul(self.chars_per_page).min(char_len);
        let end = start.saturating_add(self.chars_per_page).min(char_len);
        (start, end)
    }
}
