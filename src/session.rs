//! Lifecycle of one open document
//!
//! ```text
//! Idle -> Loading -> Ready <-> Displaying
//!            |         |
//!            v         v
//!          Failed   Destroyed
//! ```
//!
//! A session is driven from a single task through `&mut self` methods, so
//! navigations are serviced one at a time and their `PositionChanged` events
//! come out in issue order. Background work (prefetch and the location index)
//! runs on a [`JoinSet`]; finished jobs are folded back into the session by
//! [`DocumentSession::pump_background`], which every navigation calls first,
//! or awaited with [`DocumentSession::settle`].
//!
//! A navigation only waits for its own section. If the target is not
//! resident it is loaded directly; prefetches in flight are left alone.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::annotations::{Highlight, HighlightColor};
use crate::book::{open_document, Book, DocumentProvider, SectionLoader};
use crate::content::SectionContent;
use crate::error::ReaderError;
use crate::layout::{PageGeometry, Viewport};
use crate::locations::{build_index, LocationIndex, DEFAULT_CHARS_PER_LOCATION};
use crate::navigation::NavPoint;
use crate::overlay::{AnnotationOverlay, PaintedSpan};
use crate::position::{self, locate, page_start, Position, PositionRange, TextPoint};
use crate::search::SearchSource;
use crate::settings::{Palette, ReaderSettings, SettingsPatch};
use crate::spine_cache::SpineCache;

/// Session construction options
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionOptions {
    /// Initial viewport
    pub viewport: Viewport,
    /// Initial settings
    pub settings: ReaderSettings,
    /// Load neighbouring sections in the background
    pub prefetch: bool,
    /// Granularity of the location index
    pub chars_per_location: usize,
    /// Host prefers a dark colour scheme (resolves `Theme::Auto`)
    pub system_dark: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            settings: ReaderSettings::default(),
            prefetch: true,
            chars_per_location: DEFAULT_CHARS_PER_LOCATION,
            system_dark: false,
        }
    }
}

/// Where the session is in its lifecycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing opened yet
    #[default]
    Idle,
    /// Fetching and parsing the document
    Loading,
    /// Showing a page, ready for commands
    Ready,
    /// A navigation is in progress
    Displaying,
    /// The document could not be opened
    Failed(ReaderError),
    /// Torn down
    Destroyed,
}

/// Notifications published to subscribers
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Document opened
    Opened {
        /// Book title
        title: String,
        /// Number of spine sections
        section_count: usize,
    },
    /// A navigation completed
    PositionChanged {
        /// New position
        position: Position,
        /// Percentage through the document (best effort until the index exists)
        percentage: f32,
        /// Label of the current chapter, empty when unknown
        chapter_label: String,
    },
    /// The location index finished; the percentage is now exact
    ProgressRefined {
        /// Current position
        position: Position,
        /// Exact percentage
        percentage: f32,
    },
    /// Settings were replaced
    SettingsApplied(ReaderSettings),
    /// Opening failed
    Failed(ReaderError),
}

/// Fan-out of session events to any number of subscribers
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventBus {
    /// New receiver for every event published from now on
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Publish to every live subscriber; dropped receivers are pruned
    pub fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn close(&mut self) {
        self.subscribers.clear();
    }
}

/// What is currently on screen
#[derive(Clone, Debug, PartialEq)]
pub struct PageView {
    /// Spine index
    pub section: usize,
    /// Zero-based page inside the section
    pub page: usize,
    /// Pages in the section
    pub page_count: usize,
    /// Visible text
    pub text: String,
    /// Highlight spans relative to `text`
    pub marks: Vec<PaintedSpan>,
    /// 2 for a spread, otherwise 1
    pub columns: u8,
    /// Settings the page was laid out with
    pub settings: ReaderSettings,
    /// Resolved colours
    pub palette: Palette,
}

enum Background {
    Section(usize, Result<SectionContent, ReaderError>),
    Locations(LocationIndex),
}

/// One open document and everything needed to read it
pub struct DocumentSession {
    options: SessionOptions,
    state: SessionState,
    book: Option<Arc<Book>>,
    loader: Option<Arc<dyn SectionLoader>>,
    cache: SpineCache,
    overlay: AnnotationOverlay,
    settings: ReaderSettings,
    viewport: Viewport,
    geometry: PageGeometry,
    position: Option<Position>,
    page: usize,
    percentage: f32,
    locations: Option<LocationIndex>,
    bus: EventBus,
    tasks: JoinSet<Background>,
}

impl Default for DocumentSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl DocumentSession {
    /// Idle session
    pub fn new(options: SessionOptions) -> Self {
        let options = SessionOptions {
            settings: options.settings.merged(&SettingsPatch::default()),
            ..options
        };
        Self {
            options,
            state: SessionState::Idle,
            book: None,
            loader: None,
            cache: SpineCache::new(0),
            overlay: AnnotationOverlay::new(),
            settings: options.settings,
            viewport: options.viewport,
            geometry: PageGeometry::compute(options.viewport, &options.settings),
            position: None,
            page: 0,
            percentage: 0.0,
            locations: None,
            bus: EventBus::default(),
            tasks: JoinSet::new(),
        }
    }

    /// Receive session events
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// Fetch a document through `provider` and display it.
    ///
    /// `initial` is a serialized position. If it does not parse or no longer
    /// resolves, the document opens at its start instead.
    pub async fn open(
        &mut self,
        provider: &dyn DocumentProvider,
        url: &str,
        initial: Option<&str>,
    ) -> Result<(), ReaderError> {
        self.begin_open()?;
        match open_document(provider, url).await {
            Ok(book) => self.attach(Arc::new(book), None, initial).await,
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Display an already opened book
    pub async fn open_book(&mut self, book: Book, initial: Option<&str>) -> Result<(), ReaderError> {
        self.begin_open()?;
        self.attach(Arc::new(book), None, initial).await
    }

    /// Display a book whose sections come from a custom loader
    pub async fn open_with_loader(
        &mut self,
        book: Book,
        loader: Arc<dyn SectionLoader>,
        initial: Option<&str>,
    ) -> Result<(), ReaderError> {
        self.begin_open()?;
        self.attach(Arc::new(book), Some(loader), initial).await
    }

    /// Display `target`. An unresolvable position inside a valid section lands on the section start.
    pub async fn goto(&mut self, target: &Position) -> Result<(), ReaderError> {
        self.ensure_ready()?;
        self.pump_background();
        self.state = SessionState::Displaying;
        let content = match self.load(target.spine).await {
            Ok(content) => content,
            Err(err) => {
                self.state = SessionState::Ready;
                return Err(err);
            }
        };
        let target = if target.char_offset(&content).is_some() {
            target.clone()
        } else {
            log::debug!("[SESSION] {} does not resolve, using section start", target);
            Position::section_start(target.spine)
        };
        self.show(target, content);
        Ok(())
    }

    /// Parse and display a serialized position
    pub async fn goto_locator(&mut self, locator: &str) -> Result<(), ReaderError> {
        let target: Position = locator
            .parse()
            .map_err(|err| ReaderError::Parse(format!("invalid position '{}': {}", locator, err)))?;
        self.goto(&target).await
    }

    /// Next page. Returns `false` on the last page of the last section.
    pub async fn next(&mut self) -> Result<bool, ReaderError> {
        self.ensure_ready()?;
        self.pump_background();
        let spine = self.current_spine()?;
        let current = self.load(spine).await?;

        if self.page + 1 < self.geometry.page_count(current.char_len) {
            let target = page_start(self.page + 1, &current, &self.geometry);
            self.show(target, current);
            return Ok(true);
        }
        let next = spine + 1;
        if next >= self.section_count() {
            return Ok(false);
        }
        self.state = SessionState::Displaying;
        let content = match self.load(next).await {
            Ok(content) => content,
            Err(err) => {
                self.state = SessionState::Ready;
                return Err(err);
            }
        };
        self.show(Position::section_start(next), content);
        Ok(true)
    }

    /// Previous page. Returns `false` on the first page of the first section.
    pub async fn prev(&mut self) -> Result<bool, ReaderError> {
        self.ensure_ready()?;
        self.pump_background();
        let spine = self.current_spine()?;

        if self.page > 0 {
            let current = self.load(spine).await?;
            let target = page_start(self.page - 1, &current, &self.geometry);
            self.show(target, current);
            return Ok(true);
        }
        if spine == 0 {
            return Ok(false);
        }
        self.state = SessionState::Displaying;
        let content = match self.load(spine - 1).await {
            Ok(content) => content,
            Err(err) => {
                self.state = SessionState::Ready;
                return Err(err);
            }
        };
        let last = self.geometry.page_count(content.char_len) - 1;
        let target = if last == 0 {
            Position::section_start(spine - 1)
        } else {
            page_start(last, &content, &self.geometry)
        };
        self.show(target, content);
        Ok(true)
    }

    /// Merge a settings patch and re-lay out the current section in place.
    ///
    /// The position and percentage are left untouched.
    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<ReaderSettings, ReaderError> {
        if self.state == SessionState::Destroyed {
            return Err(ReaderError::Destroyed);
        }
        let merged = self.settings.merged(patch);
        self.settings = merged;
        self.geometry = PageGeometry::compute(self.viewport, &self.settings);
        self.relocate();
        self.bus.emit(SessionEvent::SettingsApplied(merged));
        Ok(merged)
    }

    /// New viewport size; the position is kept
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.geometry = PageGeometry::compute(viewport, &self.settings);
        self.relocate();
    }

    /// Fold finished background jobs into the session without waiting
    pub fn pump_background(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.absorb(joined);
        }
    }

    /// Wait for every background job and fold it in
    pub async fn settle(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.absorb(joined);
        }
    }

    /// Abort background work and release every section
    pub fn destroy(&mut self) {
        self.tasks.abort_all();
        self.tasks.detach_all();
        self.cache.clear();
        self.overlay.clear();
        self.position = None;
        self.locations = None;
        self.state = SessionState::Destroyed;
        self.bus.close();
        log::debug!("[SESSION] Destroyed");
    }

    /// Current lifecycle state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Open book
    pub fn book(&self) -> Option<&Book> {
        self.book.as_deref()
    }

    /// Current position
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Last reported percentage
    pub fn percentage(&self) -> f32 {
        self.percentage
    }

    /// Current page inside the section
    pub fn page(&self) -> usize {
        self.page
    }

    /// Active settings
    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Active page geometry
    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// Section cache
    pub fn cache(&self) -> &SpineCache {
        &self.cache
    }

    /// Highlight overlay
    pub fn overlay(&self) -> &AnnotationOverlay {
        &self.overlay
    }

    /// Location index, once built
    pub fn location_index(&self) -> Option<&LocationIndex> {
        self.locations.as_ref()
    }

    /// Table of contents
    pub fn toc(&self) -> &[NavPoint] {
        self.book
            .as_deref()
            .map(|book| book.navigation().toc.as_slice())
            .unwrap_or_default()
    }

    /// Label of the chapter on screen
    pub fn chapter_label(&self) -> String {
        self.position
            .as_ref()
            .map(|p| self.chapter_label_for(p.spine))
            .unwrap_or_default()
    }

    /// Snapshot of the visible page
    pub fn page_view(&mut self) -> Option<PageView> {
        let spine = self.position.as_ref()?.spine;
        let content = self.cache.get(spine)?;
        let page_count = self.geometry.page_count(content.char_len);
        let (start, end) = self.geometry.page_bounds(self.page, content.char_len);
        let spans = match self.overlay.painted(spine) {
            Some(spans) => spans.to_vec(),
            None => self.overlay.reapply_section(&content).to_vec(),
        };
        let marks = spans
            .into_iter()
            .filter(|span| span.end > start && span.start < end)
            .map(|span| PaintedSpan {
                start: span.start.max(start) - start,
                end: span.end.min(end) - start,
                color: span.color,
            })
            .collect();
        Some(PageView {
            section: spine,
            page: self.page,
            page_count,
            text: content.slice(start, end),
            marks,
            columns: self.geometry.columns,
            settings: self.settings,
            palette: self.settings.theme.palette(self.options.system_dark),
        })
    }

    /// Map a selection in the displayed section to a range (coarse on failure)
    pub fn range_from_selection(&self, start: TextPoint, end: TextPoint) -> Option<PositionRange> {
        let content = self.cache.get(self.position.as_ref()?.spine)?;
        Some(position::range_from_selection(&content, start, end))
    }

    /// Mark a range; repaints its section at once if it is resident
    pub fn apply_highlight(&mut self, range: PositionRange, color: HighlightColor) -> bool {
        let spine = range.start.spine;
        let changed = self.overlay.apply(range, color);
        if changed {
            self.repaint(spine);
        }
        changed
    }

    /// Unmark a range; unknown ranges are ignored
    pub fn remove_highlight(&mut self, range: &PositionRange) -> bool {
        let removed = self.overlay.remove(range);
        if removed {
            self.repaint(range.start.spine);
        }
        removed
    }

    /// Mark every stored highlight
    pub fn load_highlights(&mut self, highlights: &[Highlight]) {
        for highlight in highlights {
            self.apply_highlight(highlight.range.clone(), highlight.color);
        }
    }

    /// Inputs for a document-wide search that leaves the cache alone
    pub fn search_source(&self) -> Option<SearchSource> {
        let book = self.book.as_deref()?;
        let loader = self.loader.clone()?;
        Some(SearchSource {
            loader,
            resident: self.cache.snapshot(),
            labels: book
                .sections()
                .iter()
                .map(|section| book.navigation().chapter_label(&section.href))
                .collect(),
        })
    }

    fn begin_open(&mut self) -> Result<(), ReaderError> {
        if self.state == SessionState::Destroyed {
            return Err(ReaderError::Destroyed);
        }
        self.tasks.abort_all();
        self.tasks.detach_all();
        self.overlay.clear();
        self.position = None;
        self.locations = None;
        self.page = 0;
        self.percentage = 0.0;
        self.state = SessionState::Loading;
        Ok(())
    }

    fn fail(&mut self, err: ReaderError) -> ReaderError {
        log::warn!("[SESSION] Open failed: {}", err);
        self.state = SessionState::Failed(err.clone());
        self.bus.emit(SessionEvent::Failed(err.clone()));
        err
    }

    async fn attach(
        &mut self,
        book: Arc<Book>,
        loader: Option<Arc<dyn SectionLoader>>,
        initial: Option<&str>,
    ) -> Result<(), ReaderError> {
        let loader = loader.unwrap_or_else(|| Arc::clone(&book) as Arc<dyn SectionLoader>);
        let section_count = book.sections().len();
        self.cache = SpineCache::new(section_count);
        self.loader = Some(loader);
        self.bus.emit(SessionEvent::Opened {
            title: book.metadata().title.clone(),
            section_count,
        });
        self.book = Some(book);

        let (target, content) = match self.initial_target(initial).await {
            Some(found) => found,
            None => match self.load(0).await {
                Ok(content) => (Position::section_start(0), content),
                Err(err) => return Err(self.fail(err)),
            },
        };
        self.show(target, content);
        self.spawn_location_index();
        Ok(())
    }

    async fn initial_target(&self, initial: Option<&str>) -> Option<(Position, Arc<SectionContent>)> {
        let locator = initial?;
        let target: Position = match locator.parse() {
            Ok(target) => target,
            Err(err) => {
                log::debug!("[SESSION] Ignoring initial position '{}': {}", locator, err);
                return None;
            }
        };
        let content = match self.load(target.spine).await {
            Ok(content) => content,
            Err(err) => {
                log::debug!("[SESSION] Initial section unavailable: {}", err);
                return None;
            }
        };
        if target.char_offset(&content).is_none() {
            log::debug!("[SESSION] Initial position {} no longer resolves", target);
            return None;
        }
        Some((target, content))
    }

    /// Resident content, or a direct load that does not touch the cache
    async fn load(&self, index: usize) -> Result<Arc<SectionContent>, ReaderError> {
        if let Some(content) = self.cache.get(index) {
            return Ok(content);
        }
        let loader = self.loader.as_ref().ok_or(ReaderError::NotReady)?;
        if index >= loader.section_count() {
            return Err(ReaderError::SectionOutOfBounds {
                index,
                section_count: loader.section_count(),
            });
        }
        loader.load_section(index).await.map(Arc::new)
    }

    fn show(&mut self, target: Position, content: Arc<SectionContent>) {
        let spine = content.index;
        let plan = self.cache.focus(spine);
        for &evicted in &plan.evicted {
            self.overlay.forget_section(evicted);
        }
        self.cache.insert(Arc::clone(&content));
        self.spawn_prefetch(&plan.prefetch);
        if self.overlay.painted(spine).is_none() {
            self.overlay.reapply_section(&content);
        }

        self.page = locate(&target, &content, &self.geometry).page;
        self.percentage = position::percentage(
            &target,
            self.locations.as_ref(),
            Some(&content),
            self.percentage,
        );
        let chapter_label = self.chapter_label_for(spine);
        self.position = Some(target.clone());
        self.state = SessionState::Ready;
        self.bus.emit(SessionEvent::PositionChanged {
            position: target,
            percentage: self.percentage,
            chapter_label,
        });
    }

    fn spawn_prefetch(&mut self, indices: &[usize]) {
        let Some(loader) = self.loader.as_ref() else {
            return;
        };
        for &index in indices {
            if !self.options.prefetch {
                self.cache.abandon(index);
                continue;
            }
            let loader = Arc::clone(loader);
            self.tasks.spawn(async move {
                Background::Section(index, loader.load_section(index).await)
            });
        }
    }

    fn spawn_location_index(&mut self) {
        let Some(loader) = self.loader.clone() else {
            return;
        };
        let chars_per_location = self.options.chars_per_location;
        self.tasks.spawn(async move {
            Background::Locations(build_index(loader, chars_per_location).await)
        });
    }

    fn absorb(&mut self, joined: Result<Background, tokio::task::JoinError>) {
        if self.state == SessionState::Destroyed {
            return;
        }
        match joined {
            Ok(Background::Section(index, result)) => {
                self.cache.complete(index, result);
                if self.overlay.painted(index).is_none() {
                    if let Some(content) = self.cache.get(index) {
                        self.overlay.reapply_section(&content);
                    }
                }
            }
            Ok(Background::Locations(index)) => {
                log::debug!(
                    "[SESSION] Location index ready: {} locations",
                    index.location_count()
                );
                self.locations = Some(index);
                let Some(position) = self.position.clone() else {
                    return;
                };
                let content = self.cache.get(position.spine);
                self.percentage = position::percentage(
                    &position,
                    self.locations.as_ref(),
                    content.as_deref(),
                    self.percentage,
                );
                self.bus.emit(SessionEvent::ProgressRefined {
                    position,
                    percentage: self.percentage,
                });
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => log::warn!("[SESSION] Background task failed: {}", err),
        }
    }

    fn relocate(&mut self) {
        let Some(position) = self.position.as_ref() else {
            return;
        };
        if let Some(content) = self.cache.get(position.spine) {
            self.page = locate(position, &content, &self.geometry).page;
        }
    }

    fn repaint(&mut self, spine: usize) {
        if let Some(content) = self.cache.get(spine) {
            self.overlay.reapply_section(&content);
        }
    }

    fn ensure_ready(&self) -> Result<(), ReaderError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Destroyed => Err(ReaderError::Destroyed),
            _ => Err(ReaderError::NotReady),
        }
    }

    fn current_spine(&self) -> Result<usize, ReaderError> {
        self.position
            .as_ref()
            .map(|p| p.spine)
            .ok_or(ReaderError::NotReady)
    }

    fn section_count(&self) -> usize {
        self.cache.len()
    }

    fn chapter_label_for(&self, spine: usize) -> String {
        let Some(book) = self.book.as_deref() else {
            return String::new();
        };
        book.section(spine)
            .map(|section| book.navigation().chapter_label(&section.href))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::MemoryProvider;
    use crate::settings::Theme;
    use crate::test_support::epub_with_paragraphs;

    fn ten_sections() -> Book {
        let paragraphs: Vec<String> = (0..10).map(|i| format!("Body of section {i}.")).collect();
        let refs: Vec<&str> = paragraphs.iter().map(String::as_str).collect();
        Book::from_bytes(epub_with_paragraphs(&refs)).expect("fixture should open")
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn position_changes(events: &[SessionEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::PositionChanged { position, .. } => Some(position.spine),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_open_emits_opened_then_position() {
        let mut session = DocumentSession::default();
        let mut rx = session.subscribe();
        session.open_book(ten_sections(), None).await.expect("open");
        assert_eq!(session.state(), &SessionState::Ready);

        let events = drain(&mut rx);
        assert!(matches!(
            &events[0],
            SessionEvent::Opened { section_count: 10, .. }
        ));
        assert_eq!(
            events[1],
            SessionEvent::PositionChanged {
                position: Position::section_start(0),
                percentage: 0.0,
                chapter_label: "Chapter 1".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_goto_fills_window() {
        let mut session = DocumentSession::default();
        session.open_book(ten_sections(), None).await.expect("open");
        session.goto(&Position::section_start(5)).await.expect("goto");
        session.settle().await;
        assert_eq!(session.cache().loaded_indices(), vec![3, 4, 5, 6, 7]);
        assert_eq!(session.chapter_label(), "Chapter 6");
    }

    #[tokio::test]
    async fn test_boundaries_are_noops() {
        let mut session = DocumentSession::default();
        session.open_book(ten_sections(), None).await.expect("open");
        let mut rx = session.subscribe();

        assert!(!session.prev().await.expect("prev"));
        assert_eq!(session.position(), Some(&Position::section_start(0)));

        session.goto(&Position::section_start(9)).await.expect("goto");
        drain(&mut rx);
        assert!(!session.next().await.expect("next"));
        assert_eq!(session.position(), Some(&Position::section_start(9)));
        assert!(position_changes(&drain(&mut rx)).is_empty());
    }

    #[tokio::test]
    async fn test_next_and_prev_cross_sections() {
        let mut session = DocumentSession::default();
        let mut rx = session.subscribe();
        session.open_book(ten_sections(), None).await.expect("open");
        assert!(session.next().await.expect("next"));
        assert!(session.next().await.expect("next"));
        assert!(session.prev().await.expect("prev"));
        assert_eq!(position_changes(&drain(&mut rx)), vec![0, 1, 2, 1]);
    }

    #[tokio::test]
    async fn test_paging_inside_a_long_section() {
        let long = "word ".repeat(2_000);
        let book = Book::from_bytes(epub_with_paragraphs(&[&long, "tail"])).expect("open");
        let mut session = DocumentSession::default();
        session.open_book(book, None).await.expect("open");

        let pages = session.page_view().expect("page view").page_count;
        assert!(pages > 1);
        session.next().await.expect("next");
        assert_eq!(session.page(), 1);
        assert_eq!(session.position().map(|p| p.spine), Some(0));
        session.prev().await.expect("prev");
        assert_eq!(session.page(), 0);

        // stepping back from the next section lands on the last page
        session.goto(&Position::section_start(1)).await.expect("goto");
        session.prev().await.expect("prev");
        assert_eq!(session.page(), pages - 1);
    }

    #[tokio::test]
    async fn test_settings_keep_position_and_percentage() {
        let mut session = DocumentSession::default();
        session.open_book(ten_sections(), None).await.expect("open");
        session.goto(&Position::section_start(4)).await.expect("goto");
        session.settle().await;
        let position = session.position().cloned();
        let percentage = session.percentage();

        let applied = session
            .update_settings(&SettingsPatch {
                theme: Some(Theme::Dark),
                font_size: Some(20),
                ..SettingsPatch::default()
            })
            .expect("settings");
        assert_eq!(applied.theme, Theme::Dark);
        assert_eq!(applied.font_size, 20);
        assert_eq!(session.position().cloned(), position);
        assert_eq!(session.percentage(), percentage);
        assert_eq!(session.page_view().expect("view").palette.background, "#1a1a1a");
    }

    #[tokio::test]
    async fn test_initial_settings_are_clamped() {
        let mut session = DocumentSession::new(SessionOptions {
            settings: ReaderSettings {
                font_size: 0,
                line_height: 9.0,
                ..ReaderSettings::default()
            },
            ..SessionOptions::default()
        });
        assert_eq!(session.settings().font_size, crate::settings::MIN_FONT_SIZE);
        assert_eq!(session.settings().line_height, crate::settings::MAX_LINE_HEIGHT);

        session.open_book(ten_sections(), None).await.expect("open");
        assert_eq!(session.page_view().expect("view").page_count, 1);
    }

    #[tokio::test]
    async fn test_bad_initial_position_falls_back_to_start() {
        for initial in ["not a cfi", "epubcfi(/6/40)", "epubcfi(/6/4!/4/99/1:0)"] {
            let mut session = DocumentSession::default();
            session
                .open_book(ten_sections(), Some(initial))
                .await
                .expect("open");
            assert_eq!(session.position(), Some(&Position::section_start(0)), "{initial}");
        }
    }

    #[tokio::test]
    async fn test_initial_position_is_honoured() {
        let mut session = DocumentSession::default();
        session
            .open_book(ten_sections(), Some("epubcfi(/6/8!/4/4/1:3)"))
            .await
            .expect("open");
        assert_eq!(session.position().map(|p| p.to_string()).as_deref(), Some("epubcfi(/6/8!/4/4/1:3)"));
    }

    #[tokio::test]
    async fn test_location_index_refines_percentage() {
        let mut session = DocumentSession::default();
        let mut rx = session.subscribe();
        session.open_book(ten_sections(), None).await.expect("open");
        session.goto(&Position::section_start(5)).await.expect("goto");
        session.settle().await;

        assert!(session.location_index().is_some());
        assert!(session.percentage() > 40.0 && session.percentage() < 60.0);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SessionEvent::ProgressRefined { .. })));
    }

    #[tokio::test]
    async fn test_open_failure_is_terminal_state() {
        let mut session = DocumentSession::default();
        let mut rx = session.subscribe();
        let provider = MemoryProvider::new();
        let err = session
            .open(&provider, "mem://missing", None)
            .await
            .expect_err("missing document");
        assert!(matches!(session.state(), SessionState::Failed(_)));
        assert_eq!(drain(&mut rx), vec![SessionEvent::Failed(err)]);
        assert_eq!(session.next().await, Err(ReaderError::NotReady));
    }

    #[tokio::test]
    async fn test_destroy_releases_everything() {
        let mut session = DocumentSession::default();
        session.open_book(ten_sections(), None).await.expect("open");
        session.destroy();
        assert!(session.cache().loaded_indices().is_empty());
        assert_eq!(session.next().await, Err(ReaderError::Destroyed));
        session.settle().await;
        assert!(session.cache().loaded_indices().is_empty());
    }

    #[tokio::test]
    async fn test_highlight_survives_reload() {
        let mut session = DocumentSession::default();
        session.open_book(ten_sections(), None).await.expect("open");
        let range = session
            .range_from_selection(TextPoint { node: 1, offset: 0 }, TextPoint { node: 1, offset: 4 })
            .expect("range");
        assert!(session.apply_highlight(range.clone(), HighlightColor::Blue));
        assert!(!session.apply_highlight(range, HighlightColor::Blue));

        session.goto(&Position::section_start(8)).await.expect("goto");
        session.goto(&Position::section_start(0)).await.expect("goto");
        let view = session.page_view().expect("view");
        assert_eq!(view.marks.len(), 1);
        assert_eq!((view.marks[0].start, view.marks[0].end), (9, 13));
    }
}
