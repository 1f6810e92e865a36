//! mu-reader -- EPUB reading engine
//!
//! Opens EPUB documents, paginates their sections, and tracks a portable
//! reading position while a reader pages through the book. Around that core
//! sit the features of an online reader: highlights and bookmarks synced to a
//! remote store, document-wide search, selection actions (translate, define,
//! copy, share), debounced progress sync, and touch/keyboard gestures.
//!
//! Remote collaborators (annotation and progress stores, translation and
//! dictionary services, document fetching) are traits; the host supplies
//! implementations.
//!
//! # Features
//!
//! - `serde` -- `Serialize`/`Deserialize` for settings, annotations, and positions
//! - `cli` -- the `mu-reader` inspection binary
//!
//! # Memory
//!
//! At most five sections are parsed and resident at any time: the displayed
//! one and two on either side (see [`spine_cache`]). Search and the location
//! index load sections on demand and drop them as soon as they are scanned.

#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

pub mod annotations;
pub mod book;
pub mod content;
pub mod error;
pub mod gesture;
pub mod layout;
pub mod locations;
pub mod memo;
pub mod navigation;
pub mod overlay;
pub mod package;
pub mod position;
pub mod progress;
pub mod search;
pub mod selection;
pub mod session;
pub mod settings;
pub mod spine_cache;
pub mod zip;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use annotations::{reconcile, Annotation, AnnotationStore, Bookmark, Highlight, HighlightColor};
pub use book::{open_document, Book, DocumentProvider, FileProvider, MemoryProvider, SectionLoader};
pub use content::SectionContent;
pub use error::{ReaderError, ServiceError, ZipError, ZipErrorKind};
pub use gesture::{Command, GestureConfig, GestureInput, InputEvent, Key};
pub use layout::{PageGeometry, Viewport};
pub use locations::LocationIndex;
pub use navigation::{NavPoint, Navigation};
pub use overlay::AnnotationOverlay;
pub use package::BookMetadata;
pub use position::{compare, Position, PositionParseError, PositionRange, TextPoint};
pub use progress::{ProgressRecord, ProgressStore, ProgressSync};
pub use search::{CancelFlag, CancelToken, SearchEngine, SearchOptions, SearchResult, SearchState};
pub use selection::{
    Action, ActionOutcome, DictionaryEntry, DictionaryService, Popup, SelectionController,
    TranslationService,
};
pub use session::{DocumentSession, PageView, SessionEvent, SessionOptions, SessionState};
pub use settings::{ReaderSettings, SettingsPatch, Theme};
pub use spine_cache::SpineCache;
pub use zip::ZipLimits;
