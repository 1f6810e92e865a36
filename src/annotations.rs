//! Highlights, bookmarks, and their persistence contract
//!
//! The reading session keeps the authoritative local copy. Remote stores are
//! synced best-effort and merged back with [`reconcile`] when a document is
//! opened: the remote copy wins unless the local one is still marked
//! local-only (created or edited offline and not yet acknowledged).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::position::{Position, PositionRange};

/// Highlight palette
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum HighlightColor {
    /// Default marker colour
    #[default]
    Yellow,
    /// Green
    Green,
    /// Blue
    Blue,
    /// Pink
    Pink,
}

impl HighlightColor {
    /// Every palette entry, in menu order
    pub const ALL: [HighlightColor; 4] = [
        HighlightColor::Yellow,
        HighlightColor::Green,
        HighlightColor::Blue,
        HighlightColor::Pink,
    ];

    /// Translucent fill painted over the text
    pub fn overlay_rgba(self) -> &'static str {
        match self {
            HighlightColor::Yellow => "rgba(255, 255, 0, 0.4)",
            HighlightColor::Green => "rgba(0, 255, 0, 0.3)",
            HighlightColor::Blue => "rgba(0, 191, 255, 0.3)",
            HighlightColor::Pink => "rgba(255, 105, 180, 0.3)",
        }
    }

    /// Lowercase name used by stores
    pub fn name(self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
        }
    }
}

/// A highlighted range of text
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Highlight {
    /// Store-assigned id (`temp-…` until acknowledged)
    pub id: String,
    /// Highlighted range
    pub range: PositionRange,
    /// Text snapshot at creation time
    pub text: String,
    /// Marker colour
    pub color: HighlightColor,
    /// Optional user note
    pub note: Option<String>,
    /// Creation time in Unix milliseconds
    pub created_at: u64,
    /// Not yet acknowledged by the remote store
    #[cfg_attr(feature = "serde", serde(default, skip_serializing))]
    pub local_only: bool,
}

impl Highlight {
    /// New unsynced highlight with a temporary id
    pub fn pending(range: PositionRange, text: impl Into<String>, color: HighlightColor) -> Self {
        let created_at = now_millis();
        Self {
            id: temp_id(created_at),
            range,
            text: text.into(),
            color,
            note: None,
            created_at,
            local_only: true,
        }
    }
}

/// A saved point in the document
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bookmark {
    /// Store-assigned id
    pub id: String,
    /// Bookmarked position
    pub position: Position,
    /// Optional user note
    pub note: Option<String>,
    /// Creation time in Unix milliseconds
    pub created_at: u64,
    /// Not yet acknowledged by the remote store
    #[cfg_attr(feature = "serde", serde(default, skip_serializing))]
    pub local_only: bool,
}

impl Bookmark {
    /// New unsynced bookmark with a temporary id
    pub fn pending(position: Position, note: Option<String>) -> Self {
        let created_at = now_millis();
        Self {
            id: temp_id(created_at),
            position,
            note,
            created_at,
            local_only: true,
        }
    }
}

/// Common view of highlights and bookmarks for reconciliation
pub trait Annotation: Clone {
    /// Stable id
    fn id(&self) -> &str;
    /// Whether the local copy has unsynced changes
    fn is_local_only(&self) -> bool;
    /// Creation timestamp, used to order the merged list
    fn created_at(&self) -> u64;
}

impl Annotation for Highlight {
    fn id(&self) -> &str {
        &self.id
    }
    fn is_local_only(&self) -> bool {
        self.local_only
    }
    fn created_at(&self) -> u64 {
        self.created_at
    }
}

impl Annotation for Bookmark {
    fn id(&self) -> &str {
        &self.id
    }
    fn is_local_only(&self) -> bool {
        self.local_only
    }
    fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// Merge local and remote annotation lists.
///
/// - local-only items are kept as they are, whatever the remote says
/// - otherwise the remote copy wins
/// - synced local items missing remotely were deleted elsewhere and are dropped
///
/// The result is ordered by creation time, then id.
pub fn reconcile<T: Annotation>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
    let mut merged: BTreeMap<String, T> = BTreeMap::new();
    for item in remote {
        merged.insert(item.id().to_string(), item);
    }
    for item in local {
        if item.is_local_only() {
            merged.insert(item.id().to_string(), item);
        }
    }
    let mut out: Vec<T> = merged.into_values().collect();
    out.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
    out
}

/// Remote CRUD for annotations, keyed by document and id
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// All highlights for a document
    async fn list_highlights(&self, document: &str) -> Result<Vec<Highlight>, ServiceError>;
    /// Persist a new highlight; returns the stored copy with its permanent id
    async fn create_highlight(&self, document: &str, highlight: &Highlight) -> Result<Highlight, ServiceError>;
    /// Update colour or note
    async fn update_highlight(&self, document: &str, highlight: &Highlight) -> Result<(), ServiceError>;
    /// Delete by id
    async fn delete_highlight(&self, document: &str, id: &str) -> Result<(), ServiceError>;
    /// All bookmarks for a document
    async fn list_bookmarks(&self, document: &str) -> Result<Vec<Bookmark>, ServiceError>;
    /// Persist a new bookmark; returns the stored copy with its permanent id
    async fn create_bookmark(&self, document: &str, bookmark: &Bookmark) -> Result<Bookmark, ServiceError>;
    /// Delete by id
    async fn delete_bookmark(&self, document: &str, id: &str) -> Result<(), ServiceError>;
}

/// Unique per process even for items created in the same millisecond
fn temp_id(created_at: u64) -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("temp-{}-{}", created_at, seq)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlight(id: &str, created_at: u64, color: HighlightColor, local_only: bool) -> Highlight {
        Highlight {
            id: id.to_string(),
            range: PositionRange::coarse(0),
            text: "text".into(),
            color,
            note: None,
            created_at,
            local_only,
        }
    }

    #[test]
    fn test_remote_wins_without_local_marker() {
        let local = vec![highlight("a", 1, HighlightColor::Yellow, false)];
        let remote = vec![highlight("a", 1, HighlightColor::Pink, false)];
        let merged = reconcile(local, remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].color, HighlightColor::Pink);
    }

    #[test]
    fn test_local_only_is_kept() {
        let local = vec![
            highlight("a", 1, HighlightColor::Green, true),
            highlight("temp-5", 5, HighlightColor::Blue, true),
        ];
        let remote = vec![highlight("a", 1, HighlightColor::Pink, false)];
        let merged = reconcile(local, remote);
        let summary: Vec<_> = merged.iter().map(|h| (h.id.as_str(), h.color)).collect();
        assert_eq!(
            summary,
            vec![("a", HighlightColor::Green), ("temp-5", HighlightColor::Blue)]
        );
    }

    #[test]
    fn test_synced_item_deleted_remotely_is_dropped() {
        let local = vec![highlight("gone", 1, HighlightColor::Yellow, false)];
        let remote = vec![highlight("b", 2, HighlightColor::Yellow, false)];
        let merged = reconcile(local, remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "b");
    }

    #[test]
    fn test_pending_highlight_has_temp_id() {
        let h = Highlight::pending(PositionRange::coarse(2), "whale", HighlightColor::default());
        assert!(h.id.starts_with("temp-"));
        assert!(h.local_only);
        assert_eq!(h.color, HighlightColor::Yellow);
    }

    #[test]
    fn test_back_to_back_pending_items_survive_reconcile() {
        let a = Highlight::pending(PositionRange::coarse(0), "a", HighlightColor::Yellow);
        let b = Highlight::pending(PositionRange::coarse(1), "b", HighlightColor::Green);
        assert_ne!(a.id, b.id);
        assert_eq!(reconcile(vec![a, b], Vec::new()).len(), 2);

        let first = Bookmark::pending(Position::section_start(0), None);
        let second = Bookmark::pending(Position::section_start(0), None);
        assert_ne!(first.id, second.id);
        assert_eq!(reconcile(vec![first, second], Vec::new()).len(), 2);
    }

    #[test]
    fn test_palette() {
        assert_eq!(HighlightColor::Yellow.overlay_rgba(), "rgba(255, 255, 0, 0.4)");
        assert_eq!(HighlightColor::ALL.len(), 4);
        assert_eq!(HighlightColor::Pink.name(), "pink");
    }
}
