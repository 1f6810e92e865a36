//! Text selection to user actions
//!
//! The controller owns only transient UI state: the captured selection, the
//! one open popup, and the memo caches for external lookups. Actions are
//! handed back to the caller as [`ActionOutcome`] values; translation and
//! dictionary requests come back as a [`Job`] the caller runs off the UI path
//! and feeds to [`SelectionController::complete`].
//!
//! Every async popup carries a [`PopupId`]. A completion whose id does not
//! match the open popup is dropped, so a late response can never reopen or
//! overwrite another popup.

use async_trait::async_trait;

use crate::annotations::{Highlight, HighlightColor};
use crate::error::ServiceError;
use crate::memo::{
    dictionary_key, translation_key, BoundedCache, DICTIONARY_CACHE_CAPACITY,
    TRANSLATION_CACHE_CAPACITY,
};
use crate::position::PositionRange;

/// Definitions kept per part of speech
pub const MAX_DEFINITIONS_PER_PART: usize = 3;

/// Definitions kept per entry
pub const MAX_DEFINITIONS: usize = 10;

/// Translates text
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translate `text` into `target`; `source` is detected when `None`
    async fn translate(
        &self,
        text: &str,
        target: &str,
        source: Option<&str>,
    ) -> Result<String, ServiceError>;
}

/// Looks up word definitions
#[async_trait]
pub trait DictionaryService: Send + Sync {
    /// Definitions for a single normalized word
    async fn lookup(&self, word: &str) -> Result<DictionaryEntry, ServiceError>;
}

/// One sense of a word
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Definition {
    /// Part of speech ("noun", "verb", ...)
    pub part_of_speech: String,
    /// Definition text
    pub definition: String,
    /// Usage example
    pub example: Option<String>,
}

/// Dictionary answer for a word
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DictionaryEntry {
    /// Headword
    pub word: String,
    /// Pronunciation
    pub phonetic: Option<String>,
    /// Senses in service order
    pub definitions: Vec<Definition>,
}

impl DictionaryEntry {
    /// Cap definitions per part of speech and overall
    pub fn trimmed(mut self) -> Self {
        let mut kept: Vec<Definition> = Vec::new();
        for def in self.definitions {
            if kept.len() >= MAX_DEFINITIONS {
                break;
            }
            let same_part = kept
                .iter()
                .filter(|d| d.part_of_speech == def.part_of_speech)
                .count();
            if same_part < MAX_DEFINITIONS_PER_PART {
                kept.push(def);
            }
        }
        self.definitions = kept;
        self
    }
}

/// Normalize a selection into a dictionary query: first word, trimmed, lowercased
pub fn dictionary_query(text: &str) -> Option<String> {
    text.split_whitespace().next().map(str::to_lowercase)
}

/// Axis-aligned box in viewport px
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    /// Left edge
    pub left: f32,
    /// Top edge
    pub top: f32,
    /// Right edge
    pub right: f32,
    /// Bottom edge
    pub bottom: f32,
}

/// Where the menu sits relative to the selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Above the selection
    Above,
    /// Below the selection (not enough room above)
    Below,
}

/// Top-left corner of the action menu
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MenuAnchor {
    /// Left edge in px
    pub x: f32,
    /// Top edge in px
    pub y: f32,
    /// Side of the selection
    pub placement: Placement,
}

/// Menu geometry and lookup language
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionConfig {
    /// Menu width in px
    pub menu_width: f32,
    /// Menu height in px
    pub menu_height: f32,
    /// Minimum distance to the viewport edges and the selection
    pub margin: f32,
    /// Language translations and definitions are requested in
    pub target_language: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            menu_width: 280.0,
            menu_height: 48.0,
            margin: 10.0,
            target_language: "en".into(),
        }
    }
}

/// Place the menu centred over the selection, clamped to the viewport
pub fn menu_anchor(selection: Rect, viewport_width: f32, config: &SelectionConfig) -> MenuAnchor {
    let centre = (selection.left + selection.right) / 2.0;
    let max_x = viewport_width - config.menu_width - config.margin;
    // the left margin wins when the menu is wider than the viewport
    let x = (centre - config.menu_width / 2.0).min(max_x).max(config.margin);

    let above = selection.top - config.menu_height - config.margin;
    if above < config.margin {
        MenuAnchor {
            x,
            y: selection.bottom + config.margin,
            placement: Placement::Below,
        }
    } else {
        MenuAnchor {
            x,
            y: above,
            placement: Placement::Above,
        }
    }
}

/// Selection captured when the menu opened
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedSelection {
    /// Selected range
    pub range: PositionRange,
    /// Selected text
    pub text: String,
    /// Menu placement
    pub anchor: MenuAnchor,
}

/// Identity of an async popup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PopupId(u64);

/// Progress of an async popup
#[derive(Clone, Debug, PartialEq)]
pub enum PopupStatus<T> {
    /// Request in flight
    Loading,
    /// Answer available
    Ready(T),
    /// Request failed; message shown inline
    Failed(String),
}

/// The single open popup
#[derive(Clone, Debug, PartialEq)]
pub enum Popup {
    /// Floating action menu
    Menu,
    /// Translation of the selection
    Translation {
        /// Popup identity
        id: PopupId,
        /// Text being translated
        text: String,
        /// Request progress
        status: PopupStatus<String>,
    },
    /// Definition of the first selected word
    Dictionary {
        /// Popup identity
        id: PopupId,
        /// Normalized word
        word: String,
        /// Request progress
        status: PopupStatus<DictionaryEntry>,
    },
}

/// Menu actions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Highlight with a colour
    Highlight(HighlightColor),
    /// Translate the selection
    Translate,
    /// Look up the first word
    LookUp,
    /// Copy to clipboard
    Copy,
    /// Share as a quote
    Share,
}

/// External request owned by a popup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Translation request
    Translate {
        /// Source text
        text: String,
        /// Target language
        target: String,
    },
    /// Dictionary request
    LookUp {
        /// Normalized word
        word: String,
    },
}

/// A request to run for a popup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    /// Popup the answer belongs to
    pub popup: PopupId,
    /// What to ask
    pub request: Request,
}

/// Answer to a [`Job`]
#[derive(Clone, Debug, PartialEq)]
pub enum JobResult {
    /// Translation answer
    Translation(Result<String, ServiceError>),
    /// Dictionary answer
    Definition(Result<DictionaryEntry, ServiceError>),
}

impl Job {
    /// Run the request against the external services
    pub async fn run(
        &self,
        translator: &dyn TranslationService,
        dictionary: &dyn DictionaryService,
    ) -> JobResult {
        match &self.request {
            Request::Translate { text, target } => {
                JobResult::Translation(translator.translate(text, target, None).await)
            }
            Request::LookUp { word } => JobResult::Definition(dictionary.lookup(word).await),
        }
    }
}

/// What the caller should do after an action
#[derive(Clone, Debug, PartialEq)]
pub enum ActionOutcome {
    /// Persist and paint this highlight
    Highlight(Highlight),
    /// Put text on the clipboard
    Copy(String),
    /// Share text; fall back to copying it when sharing is unavailable
    Share(String),
    /// A popup opened with a cached answer
    Opened(PopupId),
    /// A popup opened in `Loading`; run the job and complete it
    Pending(Job),
}

/// Selection menu and popup state
#[derive(Debug)]
pub struct SelectionController {
    config: SelectionConfig,
    selection: Option<CapturedSelection>,
    popup: Option<Popup>,
    next_id: u64,
    translations: BoundedCache<String, String>,
    definitions: BoundedCache<String, DictionaryEntry>,
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new(SelectionConfig::default())
    }
}

impl SelectionController {
    /// Controller with custom geometry
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            selection: None,
            popup: None,
            next_id: 0,
            translations: BoundedCache::new(TRANSLATION_CACHE_CAPACITY),
            definitions: BoundedCache::new(DICTIONARY_CACHE_CAPACITY),
        }
    }

    /// Captured selection, if the menu or a popup is open for one
    pub fn selection(&self) -> Option<&CapturedSelection> {
        self.selection.as_ref()
    }

    /// Open popup
    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    /// Handle a finished selection. Blank text closes everything.
    pub fn select(
        &mut self,
        range: PositionRange,
        text: &str,
        bounds: Rect,
        viewport_width: f32,
    ) -> bool {
        if text.trim().is_empty() {
            self.dismiss();
            return false;
        }
        self.selection = Some(CapturedSelection {
            range,
            text: text.to_string(),
            anchor: menu_anchor(bounds, viewport_width, &self.config),
        });
        self.popup = Some(Popup::Menu);
        true
    }

    /// Run a menu action on the captured selection
    pub fn dispatch(&mut self, action: Action) -> Option<ActionOutcome> {
        let selection = self.selection.clone()?;
        match action {
            Action::Highlight(color) => {
                self.dismiss();
                Some(ActionOutcome::Highlight(Highlight::pending(
                    selection.range,
                    selection.text,
                    color,
                )))
            }
            Action::Copy => {
                self.dismiss();
                Some(ActionOutcome::Copy(selection.text))
            }
            Action::Share => {
                self.dismiss();
                Some(ActionOutcome::Share(format!("\"{}\"", selection.text)))
            }
            Action::Translate => Some(self.open_translation(selection.text)),
            Action::LookUp => {
                let word = dictionary_query(&selection.text)?;
                Some(self.open_dictionary(word))
            }
        }
    }

    /// Deliver a job answer. Returns `false` if the popup it belonged to is gone.
    pub fn complete(&mut self, popup: PopupId, result: JobResult) -> bool {
        match result {
            JobResult::Translation(result) => self.complete_translation(popup, result),
            JobResult::Definition(result) => self.complete_lookup(popup, result),
        }
    }

    /// Deliver a translation answer
    pub fn complete_translation(&mut self, popup: PopupId, result: Result<String, ServiceError>) -> bool {
        let target = self.config.target_language.clone();
        let Some(Popup::Translation { id, text, status }) = self.popup.as_mut() else {
            log::debug!("[SELECTION] Dropping stale translation");
            return false;
        };
        if *id != popup {
            log::debug!("[SELECTION] Dropping stale translation");
            return false;
        }
        *status = match result {
            Ok(translated) => {
                self.translations
                    .insert(translation_key(text, &target, None), translated.clone());
                PopupStatus::Ready(translated)
            }
            Err(err) => PopupStatus::Failed(err.to_string()),
        };
        true
    }

    /// Deliver a dictionary answer
    pub fn complete_lookup(
        &mut self,
        popup: PopupId,
        result: Result<DictionaryEntry, ServiceError>,
    ) -> bool {
        let target = self.config.target_language.clone();
        let Some(Popup::Dictionary { id, word, status }) = self.popup.as_mut() else {
            log::debug!("[SELECTION] Dropping stale definition");
            return false;
        };
        if *id != popup {
            log::debug!("[SELECTION] Dropping stale definition");
            return false;
        }
        *status = match result {
            Ok(entry) => {
                let entry = entry.trimmed();
                self.definitions
                    .insert(dictionary_key(word, &target), entry.clone());
                PopupStatus::Ready(entry)
            }
            Err(err) => PopupStatus::Failed(err.to_string()),
        };
        true
    }

    /// Pointer went down outside any popup
    pub fn pointer_outside(&mut self) {
        self.dismiss();
    }

    /// Escape pressed
    pub fn cancel_key(&mut self) {
        self.dismiss();
    }

    /// Close the open popup and forget the selection
    pub fn dismiss(&mut self) {
        self.popup = None;
        self.selection = None;
    }

    fn allocate_id(&mut self) -> PopupId {
        self.next_id += 1;
        PopupId(self.next_id)
    }

    fn open_translation(&mut self, text: String) -> ActionOutcome {
        let id = self.allocate_id();
        let target = self.config.target_language.clone();
        let cached = self
            .translations
            .get(&translation_key(&text, &target, None))
            .cloned();
        match cached {
            Some(translated) => {
                self.popup = Some(Popup::Translation {
                    id,
                    text,
                    status: PopupStatus::Ready(translated),
                });
                ActionOutcome::Opened(id)
            }
            None => {
                self.popup = Some(Popup::Translation {
                    id,
                    text: text.clone(),
                    status: PopupStatus::Loading,
                });
                ActionOutcome::Pending(Job {
                    popup: id,
                    request: Request::Translate { text, target },
                })
            }
        }
    }

    fn open_dictionary(&mut self, word: String) -> ActionOutcome {
        let id = self.allocate_id();
        let cached = self
            .definitions
            .get(&dictionary_key(&word, &self.config.target_language))
            .cloned();
        match cached {
            Some(entry) => {
                self.popup = Some(Popup::Dictionary {
                    id,
                    word,
                    status: PopupStatus::Ready(entry),
                });
                ActionOutcome::Opened(id)
            }
            None => {
                self.popup = Some(Popup::Dictionary {
                    id,
                    word: word.clone(),
                    status: PopupStatus::Loading,
                });
                ActionOutcome::Pending(Job {
                    popup: id,
                    request: Request::LookUp { word },
                })
            }
        }
    }
}
