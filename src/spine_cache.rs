//! Bounded window of loaded sections around the reading position
//!
//! Every spine index has exactly one [`SlotState`]. The cache is the sole
//! owner of strong section handles; everything else borrows through
//! [`SpineCache::get`] for the duration of a call or holds a weak handle.
//!
//! Transitions:
//!
//! ```text
//! Unloaded --focus (in window)--> Loading --complete(Ok, in window)--> Loaded
//!     ^                              |  complete(Err) / left window      |
//!     +------------------------------+-----------------------------------+
//!                                           evicted by focus
//! ```

use std::sync::{Arc, Weak};

use heapless::Vec as HeaplessVec;

use crate::content::SectionContent;
use crate::error::ReaderError;

/// Sections kept on each side of the current one
pub const WINDOW_RADIUS: usize = 2;

/// Upper bound on simultaneously loaded sections
pub const MAX_LOADED: usize = 2 * WINDOW_RADIUS + 1;

/// Load state of one spine index
#[derive(Clone, Debug, Default)]
pub enum SlotState {
    /// Not in memory
    #[default]
    Unloaded,
    /// A prefetch is in flight
    Loading,
    /// Parsed content is resident
    Loaded(Arc<SectionContent>),
}

impl SlotState {
    /// Whether content is resident
    pub fn is_loaded(&self) -> bool {
        matches!(self, SlotState::Loaded(_))
    }
}

/// Work requested by a focus change
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CachePlan {
    /// Sections released because they left the window
    pub evicted: Vec<usize>,
    /// Sections that should be loaded in the background (already marked `Loading`)
    pub prefetch: HeaplessVec<usize, { 2 * WINDOW_RADIUS }>,
}

/// Spine-indexed load states with a sliding window
#[derive(Debug)]
pub struct SpineCache {
    slots: Vec<SlotState>,
    current: Option<usize>,
}

impl SpineCache {
    /// Empty cache for a spine of `section_count` items
    pub fn new(section_count: usize) -> Self {
        Self {
            slots: vec![SlotState::Unloaded; section_count],
            current: None,
        }
    }

    /// Number of spine slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the spine is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Currently displayed section
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// State of one slot (`Unloaded` for out-of-range indices)
    pub fn state(&self, index: usize) -> &SlotState {
        static UNLOADED: SlotState = SlotState::Unloaded;
        self.slots.get(index).unwrap_or(&UNLOADED)
    }

    /// Whether `index` is resident
    pub fn is_loaded(&self, index: usize) -> bool {
        self.state(index).is_loaded()
    }

    /// Resident content for `index`
    pub fn get(&self, index: usize) -> Option<Arc<SectionContent>> {
        match self.slots.get(index) {
            Some(SlotState::Loaded(content)) => Some(Arc::clone(content)),
            _ => None,
        }
    }

    /// Indices of resident sections, ascending
    pub fn loaded_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_loaded())
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether `index` lies within the window around the current section
    pub fn in_window(&self, index: usize) -> bool {
        self.current
            .is_some_and(|current| index.abs_diff(current) <= WINDOW_RADIUS)
    }

    /// Weak handles to every resident section, for readers that must not pin memory
    pub fn snapshot(&self) -> Vec<Option<Weak<SectionContent>>> {
        self.slots
            .iter()
            .map(|slot| match slot {
                SlotState::Loaded(content) => Some(Arc::downgrade(content)),
                _ => None,
            })
            .collect()
    }

    /// Move the window to `index`.
    ///
    /// A step of at most one section prefetches previous, next, and next+1.
    /// A jump fills the whole window. Sections outside the window are released,
    /// except `index` itself.
    pub fn focus(&mut self, index: usize) -> CachePlan {
        let previous = self.current.replace(index);
        let mut plan = CachePlan::default();

        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i == index || i.abs_diff(index) <= WINDOW_RADIUS {
                continue;
            }
            match slot {
                SlotState::Loaded(_) => {
                    *slot = SlotState::Unloaded;
                    plan.evicted.push(i);
                }
                SlotState::Loading => *slot = SlotState::Unloaded,
                SlotState::Unloaded => {}
            }
        }

        let sequential = previous.is_some_and(|p| p.abs_diff(index) <= 1);
        let candidates: HeaplessVec<isize, { 2 * WINDOW_RADIUS }> = if sequential {
            [-1, 1, 2].into_iter().collect()
        } else {
            [-2, -1, 1, 2].into_iter().collect()
        };
        for delta in candidates {
            let Some(target) = index.checked_add_signed(delta) else {
                continue;
            };
            if let Some(slot @ SlotState::Unloaded) = self.slots.get_mut(target) {
                *slot = SlotState::Loading;
                // capacity matches the candidate list
                let _ = plan.prefetch.push(target);
            }
        }

        if !plan.evicted.is_empty() {
            log::debug!("[CACHE] Released sections {:?}", plan.evicted);
        }
        plan
    }

    /// Store content the caller loaded itself (the displayed section)
    pub fn insert(&mut self, content: Arc<SectionContent>) {
        let index = content.index;
        if Some(index) == self.current || self.in_window(index) {
            if let Some(slot) = self.slots.get_mut(index) {
                *slot = SlotState::Loaded(content);
            }
        }
    }

    /// Record the outcome of a background load.
    ///
    /// Content is kept only if the slot is still waiting for it and the index
    /// is still inside the window; otherwise it is dropped on the spot.
    /// Failures are logged and reset the slot.
    pub fn complete(&mut self, index: usize, result: Result<SectionContent, ReaderError>) {
        let in_window = self.in_window(index);
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        match result {
            Ok(content) => match slot {
                SlotState::Loading if in_window => {
                    *slot = SlotState::Loaded(Arc::new(content));
                }
                SlotState::Loaded(_) => {}
                _ => log::debug!("[CACHE] Discarding late load of section {}", index),
            },
            Err(err) => {
                log::warn!("[CACHE] Prefetch of section {} failed: {}", index, err);
                if matches!(slot, SlotState::Loading) {
                    *slot = SlotState::Unloaded;
                }
            }
        }
    }

    /// Give up on a prefetch that will not be issued
    pub fn abandon(&mut self, index: usize) {
        if let Some(slot @ SlotState::Loading) = self.slots.get_mut(index) {
            *slot = SlotState::Unloaded;
        }
    }

    /// Release everything
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = SlotState::Unloaded;
        }
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(index: usize) -> SectionContent {
        SectionContent::from_nodes(index, format!("s{index}.xhtml"), Vec::new())
    }

    /// Run a focus and immediately complete every prefetch
    fn settle(cache: &mut SpineCache, index: usize) -> CachePlan {
        let plan = cache.focus(index);
        cache.insert(Arc::new(content(index)));
        for &i in &plan.prefetch {
            cache.complete(i, Ok(content(i)));
        }
        plan
    }

    #[test]
    fn test_jump_fills_window() {
        let mut cache = SpineCache::new(10);
        settle(&mut cache, 0);
        assert_eq!(cache.loaded_indices(), vec![0, 1, 2]);

        let plan = settle(&mut cache, 5);
        assert_eq!(plan.evicted, vec![0, 1, 2]);
        assert_eq!(cache.loaded_indices(), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_sequential_prefetches_prev_next_and_next_plus_one() {
        let mut cache = SpineCache::new(10);
        settle(&mut cache, 3);
        let plan = cache.focus(4);
        // 3 and 5 are loaded already, 6 is new
        assert_eq!(plan.prefetch.as_slice(), &[6]);
        assert_eq!(plan.evicted, vec![1]);
    }

    #[test]
    fn test_never_more_than_window() {
        let mut cache = SpineCache::new(20);
        for i in (0..20).chain((0..20).rev()).chain([7, 15, 2, 19, 0]) {
            settle(&mut cache, i);
            let loaded = cache.loaded_indices();
            assert!(loaded.len() <= MAX_LOADED, "{:?}", loaded);
            assert!(loaded.contains(&i));
        }
    }

    #[test]
    fn test_late_completion_outside_window_is_released() {
        let mut cache = SpineCache::new(10);
        let plan = cache.focus(0);
        assert_eq!(plan.prefetch.as_slice(), &[1, 2]);
        cache.focus(8);
        cache.complete(1, Ok(content(1)));
        assert!(!cache.is_loaded(1));
        assert!(matches!(cache.state(1), SlotState::Unloaded));
    }

    #[test]
    fn test_failed_prefetch_resets_slot() {
        let mut cache = SpineCache::new(4);
        cache.focus(0);
        cache.complete(1, Err(ReaderError::Parse("boom".into())));
        assert!(matches!(cache.state(1), SlotState::Unloaded));
        // the next focus retries it
        let plan = cache.focus(0);
        assert!(plan.prefetch.contains(&1));
    }

    #[test]
    fn test_completion_does_not_replace_displayed_content() {
        let mut cache = SpineCache::new(4);
        cache.focus(1);
        let shown = Arc::new(content(1));
        cache.insert(Arc::clone(&shown));
        cache.complete(1, Ok(content(1)));
        assert!(Arc::ptr_eq(&cache.get(1).unwrap(), &shown));
    }

    #[test]
    fn test_snapshot_does_not_pin_sections() {
        let mut cache = SpineCache::new(10);
        settle(&mut cache, 0);
        let snapshot = cache.snapshot();
        assert!(snapshot[1].as_ref().and_then(Weak::upgrade).is_some());
        settle(&mut cache, 9);
        assert!(snapshot[1].as_ref().and_then(Weak::upgrade).is_none());
    }

    #[test]
    fn test_abandon_only_resets_loading() {
        let mut cache = SpineCache::new(4);
        cache.focus(0);
        cache.insert(Arc::new(content(0)));
        cache.abandon(0);
        cache.abandon(1);
        assert!(cache.is_loaded(0));
        assert!(matches!(cache.state(1), SlotState::Unloaded));
    }

    #[test]
    fn test_clear() {
        let mut cache = SpineCache::new(3);
        settle(&mut cache, 1);
        cache.clear();
        assert!(cache.loaded_indices().is_empty());
        assert_eq!(cache.current(), None);
    }
}
