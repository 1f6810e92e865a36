//! Reading-progress persistence
//!
//! The stored position is read once when a document opens. Afterwards every
//! position change is offered to [`ProgressSync::record`], which debounces
//! writes and skips values equal to the last one saved.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::ServiceError;
use crate::position::Position;

/// What the progress store keeps per (user, document)
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressRecord {
    /// Serialized position
    pub position: String,
    /// Percentage through the document
    pub percentage: f32,
}

/// Remote progress store
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Stored progress for a document, if any
    async fn get(&self, document: &str) -> Result<Option<ProgressRecord>, ServiceError>;
    /// Replace stored progress
    async fn put(&self, document: &str, record: &ProgressRecord) -> Result<(), ServiceError>;
}

/// Progress sync options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressOptions {
    /// Quiet period before a recorded position is written
    pub debounce: Duration,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(3),
        }
    }
}

/// Debounced writer for one document
pub struct ProgressSync {
    store: Arc<dyn ProgressStore>,
    document: String,
    options: ProgressOptions,
    last_saved: Arc<Mutex<Option<ProgressRecord>>>,
    pending: Option<(ProgressRecord, JoinHandle<()>)>,
}

impl ProgressSync {
    /// Sync for `document` with default options
    pub fn new(store: Arc<dyn ProgressStore>, document: impl Into<String>) -> Self {
        Self::with_options(store, document, ProgressOptions::default())
    }

    /// Sync for `document`
    pub fn with_options(
        store: Arc<dyn ProgressStore>,
        document: impl Into<String>,
        options: ProgressOptions,
    ) -> Self {
        Self {
            store,
            document: document.into(),
            options,
            last_saved: Arc::new(Mutex::new(None)),
            pending: None,
        }
    }

    /// Fetch the stored position. Failures and unparsable values yield `None`.
    pub async fn load_initial(&self) -> Option<Position> {
        let record = match self.store.get(&self.document).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(err) => {
                log::warn!("[PROGRESS] Load for '{}' failed: {}", self.document, err);
                return None;
            }
        };
        let position = match record.position.parse::<Position>() {
            Ok(position) => position,
            Err(err) => {
                log::debug!("[PROGRESS] Ignoring stored position '{}': {}", record.position, err);
                return None;
            }
        };
        self.remember(record);
        Some(position)
    }

    /// Last value acknowledged by the store
    pub fn last_saved(&self) -> Option<ProgressRecord> {
        self.last_saved.lock().ok().and_then(|guard| guard.clone())
    }

    /// Schedule a write. Returns `false` when the value is already saved or pending.
    pub fn record(&mut self, position: &Position, percentage: f32) -> bool {
        let record = ProgressRecord {
            position: position.to_string(),
            percentage,
        };
        if self.last_saved().as_ref() == Some(&record) {
            return false;
        }
        if let Some((pending, handle)) = &self.pending {
            if *pending == record && !handle.is_finished() {
                return false;
            }
        }
        if let Some((_, handle)) = self.pending.take() {
            handle.abort();
        }

        let store = Arc::clone(&self.store);
        let document = self.document.clone();
        let last_saved = Arc::clone(&self.last_saved);
        let delay = self.options.debounce;
        let to_save = record.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            write(store.as_ref(), &document, to_save, &last_saved).await;
        });
        self.pending = Some((record, handle));
        true
    }

    /// Write any pending value now
    pub async fn flush(&mut self) {
        let Some((record, handle)) = self.pending.take() else {
            return;
        };
        if handle.is_finished() {
            return;
        }
        handle.abort();
        if self.last_saved().as_ref() != Some(&record) {
            write(self.store.as_ref(), &self.document, record, &self.last_saved).await;
        }
    }

    fn remember(&self, record: ProgressRecord) {
        if let Ok(mut guard) = self.last_saved.lock() {
            *guard = Some(record);
        }
    }
}

impl Drop for ProgressSync {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.pending.take() {
            handle.abort();
        }
    }
}

async fn write(
    store: &dyn ProgressStore,
    document: &str,
    record: ProgressRecord,
    last_saved: &Mutex<Option<ProgressRecord>>,
) {
    match store.put(document, &record).await {
        Ok(()) => {
            if let Ok(mut guard) = last_saved.lock() {
                *guard = Some(record);
            }
        }
        Err(err) => log::warn!("[PROGRESS] Save for '{}' failed: {}", document, err),
    }
}
