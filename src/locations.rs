//! Location index: document-wide character offsets for progress reporting
//!
//! Built once per document in the background by loading every section and
//! recording its length. Until it exists, percentages are best-effort.

use std::sync::Arc;

use crate::book::SectionLoader;

/// Characters per location, matching the usual reader granularity
pub const DEFAULT_CHARS_PER_LOCATION: usize = 1024;

/// Prefix sums of section lengths
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationIndex {
    /// `prefix[i]` is the number of characters before section `i`
    prefix: Vec<usize>,
    total: usize,
    chars_per_location: usize,
    /// First location number of each section
    location_starts: Vec<usize>,
    location_count: usize,
}

impl LocationIndex {
    /// Build from per-section character counts
    pub fn from_lengths(lengths: &[usize], chars_per_location: usize) -> Self {
        let chars_per_location = chars_per_location.max(1);
        let mut prefix = Vec::with_capacity(lengths.len());
        let mut location_starts = Vec::with_capacity(lengths.len());
        let mut total = 0;
        let mut locations = 0;
        for &len in lengths {
            prefix.push(total);
            location_starts.push(locations);
            total += len;
            locations += len.div_ceil(chars_per_location).max(1);
        }
        Self {
            prefix,
            total,
            chars_per_location,
            location_starts,
            location_count: locations,
        }
    }

    /// Total characters in the document
    pub fn total_chars(&self) -> usize {
        self.total
    }

    /// Number of locations (each section spans at least one)
    pub fn location_count(&self) -> usize {
        self.location_count
    }

    /// Document-wide character offset of a point inside a section
    pub fn global_offset(&self, spine: usize, within: usize) -> usize {
        match self.prefix.get(spine) {
            Some(&before) => {
                let next = self.prefix.get(spine + 1).copied().unwrap_or(self.total);
                before + within.min(next - before)
            }
            None => self.total,
        }
    }

    /// Location number of a point inside a section
    pub fn location_of(&self, spine: usize, within: usize) -> usize {
        let last = self.location_count.saturating_sub(1);
        let location = match self.location_starts.get(spine) {
            Some(&first) => first + within / self.chars_per_location,
            None => last,
        };
        location.min(last)
    }

    /// Percentage through the document, rounded to two decimals and clamped to `[0, 100]`
    pub fn percentage(&self, spine: usize, within: usize) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        let ratio = self.global_offset(spine, within) as f64 / self.total as f64;
        ((ratio * 10_000.0).round() / 100.0).clamp(0.0, 100.0) as f32
    }
}

/// Load every section and index its length.
///
/// Sections that fail to load count as empty; the failure is logged and the
/// build carries on.
pub async fn build_index(loader: Arc<dyn SectionLoader>, chars_per_location: usize) -> LocationIndex {
    let count = loader.section_count();
    let mut lengths = Vec::with_capacity(count);
    for index in 0..count {
        match loader.load_section(index).await {
            Ok(section) => lengths.push(section.char_len),
            Err(err) => {
                log::warn!("[LOCATIONS] Section {} skipped: {}", index, err);
                lengths.push(0);
            }
        }
        tokio::task::yield_now().await;
    }
    log::debug!("[LOCATIONS] Indexed {} sections", count);
    LocationIndex::from_lengths(&lengths, chars_per_location)
}
