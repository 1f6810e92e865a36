//! Reader features that talk to remote collaborators, driven through mocks

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use mu_reader::annotations::{reconcile, AnnotationStore, Bookmark, Highlight, HighlightColor};
use mu_reader::gesture::{Command, GestureInput, InputEvent, Key};
use mu_reader::position::{Position, TextPoint};
use mu_reader::progress::{ProgressRecord, ProgressStore, ProgressSync};
use mu_reader::selection::{
    Action, ActionOutcome, Definition, DictionaryEntry, DictionaryService, Popup, PopupStatus, Rect,
    SelectionController, TranslationService,
};
use mu_reader::session::{DocumentSession, SessionEvent};
use mu_reader::{Book, ServiceError};

async fn open(bytes: Vec<u8>) -> DocumentSession {
    let mut session = DocumentSession::default();
    let book = Book::from_bytes(bytes).expect("fixture should open");
    session.open_book(book, None).await.expect("open");
    session
}

fn bounds() -> Rect {
    Rect {
        left: 300.0,
        top: 200.0,
        right: 400.0,
        bottom: 220.0,
    }
}

// -- Selection ----------------------------------------------------------------

#[derive(Default)]
struct Services {
    translations: Mutex<u32>,
    lookups: Mutex<u32>,
}

#[async_trait]
impl TranslationService for Services {
    async fn translate(
        &self,
        text: &str,
        target: &str,
        _source: Option<&str>,
    ) -> Result<String, ServiceError> {
        *self.translations.lock().unwrap() += 1;
        Ok(format!("[{target}] {text}"))
    }
}

#[async_trait]
impl DictionaryService for Services {
    async fn lookup(&self, word: &str) -> Result<DictionaryEntry, ServiceError> {
        *self.lookups.lock().unwrap() += 1;
        if word == "zzz" {
            return Err(ServiceError::NotFound(word.to_string()));
        }
        Ok(DictionaryEntry {
            word: word.to_string(),
            phonetic: None,
            definitions: (0..20)
                .map(|i| Definition {
                    part_of_speech: if i % 2 == 0 { "noun" } else { "verb" }.to_string(),
                    definition: format!("sense {i}"),
                    example: None,
                })
                .collect(),
        })
    }
}

#[tokio::test]
async fn test_translation_popup_and_cache() {
    let session = open(common::ten_parts()).await;
    let range = session
        .range_from_selection(TextPoint { node: 1, offset: 0 }, TextPoint { node: 1, offset: 4 })
        .expect("range");
    let services = Services::default();
    let mut controller = SelectionController::default();

    assert!(controller.select(range.clone(), "Text", bounds(), 1000.0));
    let Some(ActionOutcome::Pending(job)) = controller.dispatch(Action::Translate) else {
        panic!("translation should start loading");
    };
    assert!(matches!(
        controller.popup(),
        Some(Popup::Translation {
            status: PopupStatus::Loading,
            ..
        })
    ));
    let answer = job.run(&services, &services).await;
    assert!(controller.complete(job.popup, answer));
    assert!(matches!(
        controller.popup(),
        Some(Popup::Translation { status: PopupStatus::Ready(text), .. }) if text == "[en] Text"
    ));

    // same text again is served from the cache
    controller.dismiss();
    controller.select(range, "Text", bounds(), 1000.0);
    assert!(matches!(
        controller.dispatch(Action::Translate),
        Some(ActionOutcome::Opened(_))
    ));
    assert_eq!(*services.translations.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_stale_answer_is_dropped() {
    let session = open(common::ten_parts()).await;
    let range = session
        .range_from_selection(TextPoint { node: 1, offset: 0 }, TextPoint { node: 1, offset: 4 })
        .expect("range");
    let services = Services::default();
    let mut controller = SelectionController::default();

    controller.select(range, "Text", bounds(), 1000.0);
    let Some(ActionOutcome::Pending(job)) = controller.dispatch(Action::Translate) else {
        panic!("translation should start loading");
    };
    controller.pointer_outside();
    let answer = job.run(&services, &services).await;
    assert!(!controller.complete(job.popup, answer));
    assert_eq!(controller.popup(), None);
    assert_eq!(controller.selection(), None);
}

#[tokio::test]
async fn test_dictionary_trims_definitions_and_reports_misses() {
    let session = open(common::ten_parts()).await;
    let range = session
        .range_from_selection(TextPoint { node: 1, offset: 0 }, TextPoint { node: 1, offset: 4 })
        .expect("range");
    let services = Services::default();
    let mut controller = SelectionController::default();

    controller.select(range.clone(), "  Whale  bone", bounds(), 1000.0);
    let Some(ActionOutcome::Pending(job)) = controller.dispatch(Action::LookUp) else {
        panic!("lookup should start loading");
    };
    let answer = job.run(&services, &services).await;
    controller.complete(job.popup, answer);
    match controller.popup() {
        Some(Popup::Dictionary {
            word,
            status: PopupStatus::Ready(entry),
            ..
        }) => {
            assert_eq!(word, "whale");
            assert_eq!(entry.definitions.len(), 6);
        }
        other => panic!("unexpected popup {other:?}"),
    }

    controller.select(range, "zzz", bounds(), 1000.0);
    let Some(ActionOutcome::Pending(job)) = controller.dispatch(Action::LookUp) else {
        panic!("lookup should start loading");
    };
    let answer = job.run(&services, &services).await;
    controller.complete(job.popup, answer);
    assert!(matches!(
        controller.popup(),
        Some(Popup::Dictionary { status: PopupStatus::Failed(msg), .. })
            if msg == "No definition found for \"zzz\""
    ));
}

#[tokio::test]
async fn test_highlight_action_paints_session() {
    let mut session = open(common::ten_parts()).await;
    let range = session
        .range_from_selection(TextPoint { node: 1, offset: 0 }, TextPoint { node: 1, offset: 4 })
        .expect("range");
    let mut controller = SelectionController::default();
    controller.select(range, "Text", bounds(), 1000.0);

    let Some(ActionOutcome::Highlight(highlight)) =
        controller.dispatch(Action::Highlight(HighlightColor::Green))
    else {
        panic!("highlight expected");
    };
    assert!(highlight.local_only);
    assert!(highlight.id.starts_with("temp-"));
    assert_eq!(controller.popup(), None);

    session.apply_highlight(highlight.range.clone(), highlight.color);
    let view = session.page_view().expect("view");
    assert_eq!(view.marks.len(), 1);
    assert_eq!(view.marks[0].color, HighlightColor::Green);
}

// -- Annotations --------------------------------------------------------------

#[derive(Default)]
struct MemoryStore {
    highlights: Mutex<Vec<Highlight>>,
    bookmarks: Mutex<Vec<Bookmark>>,
}

#[async_trait]
impl AnnotationStore for MemoryStore {
    async fn list_highlights(&self, _document: &str) -> Result<Vec<Highlight>, ServiceError> {
        Ok(self.highlights.lock().unwrap().clone())
    }

    async fn create_highlight(
        &self,
        _document: &str,
        highlight: &Highlight,
    ) -> Result<Highlight, ServiceError> {
        let mut stored = highlight.clone();
        stored.id = format!("h{}", self.highlights.lock().unwrap().len() + 1);
        stored.local_only = false;
        self.highlights.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update_highlight(
        &self,
        _document: &str,
        highlight: &Highlight,
    ) -> Result<(), ServiceError> {
        let mut all = self.highlights.lock().unwrap();
        let slot = all
            .iter_mut()
            .find(|h| h.id == highlight.id)
            .ok_or_else(|| ServiceError::NotFound(highlight.id.clone()))?;
        *slot = highlight.clone();
        Ok(())
    }

    async fn delete_highlight(&self, _document: &str, id: &str) -> Result<(), ServiceError> {
        self.highlights.lock().unwrap().retain(|h| h.id != id);
        Ok(())
    }

    async fn list_bookmarks(&self, _document: &str) -> Result<Vec<Bookmark>, ServiceError> {
        Ok(self.bookmarks.lock().unwrap().clone())
    }

    async fn create_bookmark(
        &self,
        _document: &str,
        bookmark: &Bookmark,
    ) -> Result<Bookmark, ServiceError> {
        let mut stored = bookmark.clone();
        stored.id = format!("b{}", self.bookmarks.lock().unwrap().len() + 1);
        stored.local_only = false;
        self.bookmarks.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn delete_bookmark(&self, _document: &str, id: &str) -> Result<(), ServiceError> {
        self.bookmarks.lock().unwrap().retain(|b| b.id != id);
        Ok(())
    }
}

#[tokio::test]
async fn test_synced_highlights_repaint_on_reopen() {
    let store = MemoryStore::default();
    let mut session = open(common::ten_parts()).await;
    let range = session
        .range_from_selection(TextPoint { node: 1, offset: 5 }, TextPoint { node: 1, offset: 7 })
        .expect("range");

    let local = Highlight::pending(range, "of", HighlightColor::Blue);
    let offline = Highlight::pending(
        mu_reader::PositionRange::coarse(4),
        "Part 5",
        HighlightColor::Pink,
    );
    store.create_highlight("doc", &local).await.expect("create");

    let remote = store.list_highlights("doc").await.expect("list");
    let merged = reconcile(vec![offline.clone()], remote);
    assert_eq!(merged.len(), 2);
    assert!(merged.iter().any(|h| h.id == "h1" && !h.local_only));
    assert!(merged.iter().any(|h| h.id == offline.id));

    let mut reopened = open(common::ten_parts()).await;
    reopened.load_highlights(&merged);
    assert_eq!(reopened.overlay().len(), 2);
    assert_eq!(reopened.page_view().expect("view").marks.len(), 1);
    session.destroy();
}

#[tokio::test]
async fn test_bookmark_roundtrip_through_store() {
    let store = MemoryStore::default();
    let pending = Bookmark::pending(Position::section_start(3), Some("later".into()));
    let saved = store.create_bookmark("doc", &pending).await.expect("create");
    assert_eq!(saved.id, "b1");

    let listed = store.list_bookmarks("doc").await.expect("list");
    assert_eq!(listed[0].position.to_string(), "epubcfi(/6/8)");
    store.delete_bookmark("doc", "b1").await.expect("delete");
    assert!(store.list_bookmarks("doc").await.expect("list").is_empty());
}

// -- Progress -----------------------------------------------------------------

#[derive(Default)]
struct Progress {
    puts: Mutex<Vec<ProgressRecord>>,
}

#[async_trait]
impl ProgressStore for Progress {
    async fn get(&self, _document: &str) -> Result<Option<ProgressRecord>, ServiceError> {
        Ok(Some(ProgressRecord {
            position: "epubcfi(/6/10)".into(),
            percentage: 40.0,
        }))
    }

    async fn put(&self, _document: &str, record: &ProgressRecord) -> Result<(), ServiceError> {
        self.puts.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_progress_follows_page_turns() {
    let store = Arc::new(Progress::default());
    let mut sync = ProgressSync::new(store.clone(), "doc");
    let resume = sync.load_initial().await.expect("stored position");

    let mut session = DocumentSession::default();
    let mut events = session.subscribe();
    let book = Book::from_bytes(common::ten_parts()).expect("open");
    session
        .open_book(book, Some(&resume.to_string()))
        .await
        .expect("open");
    session.next().await.expect("next");
    session.next().await.expect("next");

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::PositionChanged {
            position,
            percentage,
            ..
        } = event
        {
            sync.record(&position, percentage);
        }
    }
    tokio::time::sleep(Duration::from_secs(4)).await;

    let puts = store.puts.lock().unwrap().clone();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].position, "epubcfi(/6/14)");
}

// -- Gestures -----------------------------------------------------------------

#[tokio::test]
async fn test_gestures_turn_pages() {
    let mut session = open(common::ten_parts()).await;
    let mut input = GestureInput::default();

    let swipe_left = [
        InputEvent::TouchStart {
            x: 300.0,
            y: 100.0,
            time_ms: 0,
        },
        InputEvent::TouchMove {
            x: 200.0,
            y: 110.0,
            time_ms: 120,
        },
        InputEvent::TouchEnd,
    ];
    let mut commands = Vec::new();
    for event in swipe_left {
        commands.extend(input.handle(event));
    }
    commands.extend(input.handle(InputEvent::Key(Key::ArrowRight)));
    commands.extend(input.handle(InputEvent::Tap {
        x: 10.0,
        width: 600.0,
    }));
    assert_eq!(commands, vec![Command::Next, Command::Next, Command::Prev]);

    for command in commands {
        match command {
            Command::Next => {
                session.next().await.expect("next");
            }
            Command::Prev => {
                session.prev().await.expect("prev");
            }
            _ => {}
        }
    }
    assert_eq!(session.position(), Some(&Position::section_start(1)));
}
