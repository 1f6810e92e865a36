//! Full-text search across every section of a document
//!
//! A scan walks the spine in order. Sections the spine cache already holds
//! are read through weak handles; the rest are loaded on demand through the
//! [`SectionLoader`] and dropped as soon as they have been scanned, so a
//! full-book search never grows the cache or moves its window.
//!
//! Each new query cancels the previous run. Cancellation is checked between
//! sections, and a cancelled or superseded run never publishes results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;

use crate::book::SectionLoader;
use crate::content::SectionContent;
use crate::position::{range_from_chars, Position, PositionRange};

/// Cancellation hook for long-running scans
pub trait CancelToken {
    /// Whether the scan should stop at the next section boundary
    fn is_cancelled(&self) -> bool;
}

/// Never-cancel token for callers that run a scan to completion
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared flag flipped by [`CancelFlag::cancel`]
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl CancelToken for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Search limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchOptions {
    /// Stop after this many matches
    pub max_results: usize,
    /// Characters of context on each side of a match
    pub context_chars: usize,
    /// Shorter (trimmed) queries are rejected as insufficient input
    pub min_query_chars: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 50,
            context_chars: 50,
            min_query_chars: 2,
        }
    }
}

/// One match
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchResult {
    /// Where the match starts
    pub position: Position,
    /// Matched span (section-level when exact resolution failed)
    pub range: PositionRange,
    /// Match with surrounding context
    pub excerpt: String,
    /// Label of the chapter containing the match
    pub chapter_label: Option<String>,
}

/// Observable search state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SearchState {
    /// No query
    #[default]
    Idle,
    /// Query too short to run
    InsufficientInput,
    /// Scan in progress
    Searching,
    /// Scan finished with matches
    Found,
    /// Scan finished without matches
    NoResults,
    /// The document could not be read at all
    Failed(String),
}

/// Everything a scan needs, detached from the session
#[derive(Clone)]
pub struct SearchSource {
    /// On-demand loader for sections that are not resident
    pub loader: Arc<dyn SectionLoader>,
    /// Weak handles to sections resident in the spine cache, by spine index
    pub resident: Vec<Option<Weak<SectionContent>>>,
    /// Chapter label for each spine index (empty when unknown)
    pub labels: Vec<String>,
}

/// How a scan ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every section visited, or the result limit reached
    Completed(Vec<SearchResult>),
    /// Stopped by the cancel token
    Cancelled,
    /// No section could be loaded
    Unreadable(String),
}

/// Scan the whole document for `query` (case-insensitive, overlapping matches)
pub async fn scan<C: CancelToken + ?Sized>(
    source: &SearchSource,
    query: &str,
    options: &SearchOptions,
    cancel: &C,
) -> ScanOutcome {
    let needle: Vec<char> = query.chars().map(fold).collect();
    let count = source.loader.section_count();
    let mut results = Vec::new();
    let mut failures = 0;
    let mut last_error = String::new();

    for index in 0..count {
        if cancel.is_cancelled() {
            log::debug!("[SEARCH] Cancelled before section {}", index);
            return ScanOutcome::Cancelled;
        }
        if results.len() >= options.max_results {
            break;
        }

        let resident = source
            .resident
            .get(index)
            .and_then(|slot| slot.as_ref())
            .and_then(Weak::upgrade);
        let section = match resident {
            Some(section) => section,
            None => match source.loader.load_section(index).await {
                Ok(section) => Arc::new(section),
                Err(err) => {
                    log::warn!("[SEARCH] Skipping section {}: {}", index, err);
                    failures += 1;
                    last_error = err.to_string();
                    continue;
                }
            },
        };

        let label = source
            .labels
            .get(index)
            .filter(|label| !label.is_empty())
            .cloned();
        scan_section(&section, &needle, options, label, &mut results);
        drop(section);

        tokio::task::yield_now().await;
    }

    if count > 0 && failures == count {
        return ScanOutcome::Unreadable(last_error);
    }
    ScanOutcome::Completed(results)
}

fn scan_section(
    section: &SectionContent,
    needle: &[char],
    options: &SearchOptions,
    label: Option<String>,
    results: &mut Vec<SearchResult>,
) {
    if needle.is_empty() || section.char_len < needle.len() {
        return;
    }
    let original: Vec<char> = section.text.chars().collect();
    let folded: Vec<char> = original.iter().copied().map(fold).collect();

    for start in 0..=folded.len() - needle.len() {
        if results.len() >= options.max_results {
            return;
        }
        if folded[start..start + needle.len()] != *needle {
            continue;
        }
        let range = range_from_chars(section, start, needle.len());
        results.push(SearchResult {
            position: range.start.clone(),
            range,
            excerpt: excerpt(&original, start, needle.len(), options.context_chars),
            chapter_label: label.clone(),
        });
    }
}

fn excerpt(text: &[char], start: usize, len: usize, context: usize) -> String {
    let from = start.saturating_sub(context);
    let to = (start + len + context).min(text.len());
    let mut out = String::new();
    if from > 0 {
        out.push_str("...");
    }
    out.extend(&text[from..to]);
    if to < text.len() {
        out.push_str("...");
    }
    out
}

/// Single-char lowercase so that folded and original text stay index-aligned
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Runs scans in the background and keeps the latest result set
#[derive(Debug)]
pub struct SearchEngine {
    options: SearchOptions,
    state: SearchState,
    query: String,
    results: Vec<SearchResult>,
    current: Option<usize>,
    generation: u64,
    running: Option<Running>,
}

#[derive(Debug)]
struct Running {
    cancel: CancelFlag,
    handle: JoinHandle<(u64, ScanOutcome)>,
}

impl SearchEngine {
    /// Engine with custom limits
    pub fn new(options: SearchOptions) -> Self {
        Self {
            options,
            state: SearchState::Idle,
            query: String::new(),
            results: Vec::new(),
            current: None,
            generation: 0,
            running: None,
        }
    }

    /// Current state
    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Query of the latest run
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Results of the latest completed run, in document order
    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    /// Index of the selected result
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Selected result
    pub fn current_result(&self) -> Option<&SearchResult> {
        self.current.and_then(|i| self.results.get(i))
    }

    /// Start a new search, cancelling any run in flight
    pub fn search(&mut self, query: &str, source: SearchSource) -> &SearchState {
        self.cancel_running();
        self.results.clear();
        self.current = None;

        let query = query.trim();
        self.query = query.to_string();
        if query.is_empty() {
            self.state = SearchState::Idle;
            return &self.state;
        }
        if query.chars().count() < self.options.min_query_chars {
            self.state = SearchState::InsufficientInput;
            return &self.state;
        }

        self.generation += 1;
        let generation = self.generation;
        let cancel = CancelFlag::default();
        let token = cancel.clone();
        let options = self.options;
        let needle = query.to_string();
        let handle = tokio::spawn(async move {
            let outcome = scan(&source, &needle, &options, &token).await;
            (generation, outcome)
        });
        self.running = Some(Running { cancel, handle });
        self.state = SearchState::Searching;
        &self.state
    }

    /// Wait for the run in flight (if any) and publish its outcome
    pub async fn wait(&mut self) -> &SearchState {
        let Some(running) = self.running.take() else {
            return &self.state;
        };
        match running.handle.await {
            Ok((generation, outcome)) if generation == self.generation => self.publish(outcome),
            Ok(_) => {}
            Err(err) => {
                log::warn!("[SEARCH] Scan task ended abnormally: {}", err);
                self.state = SearchState::Failed(err.to_string());
            }
        }
        &self.state
    }

    /// Whether the run in flight has finished and can be published without waiting
    pub fn is_settled(&self) -> bool {
        self.running
            .as_ref()
            .map_or(true, |running| running.handle.is_finished())
    }

    /// Cancel the run in flight and return to idle
    pub fn cancel(&mut self) {
        self.cancel_running();
        self.state = SearchState::Idle;
    }

    /// Forget the query and its results
    pub fn clear(&mut self) {
        self.cancel();
        self.query.clear();
        self.results.clear();
        self.current = None;
    }

    /// Select the next result, wrapping around
    pub fn next(&mut self) -> Option<&SearchResult> {
        let len = self.results.len();
        if len == 0 {
            return None;
        }
        self.current = Some(self.current.map_or(0, |i| (i + 1) % len));
        self.current_result()
    }

    /// Select the previous result, wrapping around
    pub fn prev(&mut self) -> Option<&SearchResult> {
        let len = self.results.len();
        if len == 0 {
            return None;
        }
        self.current = Some(self.current.map_or(len - 1, |i| (i + len - 1) % len));
        self.current_result()
    }

    /// Select a result by index; out-of-range selections are ignored
    pub fn select(&mut self, index: usize) -> Option<&SearchResult> {
        if index < self.results.len() {
            self.current = Some(index);
        }
        self.current_result()
    }

    fn publish(&mut self, outcome: ScanOutcome) {
        match outcome {
            ScanOutcome::Completed(results) => {
                log::debug!("[SEARCH] '{}': {} results", self.query, results.len());
                self.state = if results.is_empty() {
                    SearchState::NoResults
                } else {
                    SearchState::Found
                };
                self.current = (!results.is_empty()).then_some(0);
                self.results = results;
            }
            ScanOutcome::Cancelled => self.state = SearchState::Idle,
            ScanOutcome::Unreadable(reason) => self.state = SearchState::Failed(reason),
        }
    }

    fn cancel_running(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(SearchOptions::default())
    }
}

impl Drop for SearchEngine {
    fn drop(&mut self) {
        self.cancel_running();
    }
}
