//! Transcript aggregation
//!
//! Transcription text arrives as incremental fragments per speaker; an
//! utterance only becomes a transcript item once the model signals the
//! turn is complete.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

/// One committed utterance, immutable after creation
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptItem {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Read handle onto the append-only committed list.
///
/// The presentation layer polls `snapshot()`; items are never mutated or
/// removed after append.
#[derive(Debug, Clone, Default)]
pub struct TranscriptFeed {
    items: Arc<Mutex<Vec<TranscriptItem>>>,
}

impl TranscriptFeed {
    /// Clone of the committed list, in append order
    #[must_use]
    pub fn snapshot(&self) -> Vec<TranscriptItem> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    /// Number of committed items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or_default()
    }

    /// Whether anything has been committed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, item: TranscriptItem) {
        if let Ok(mut items) = self.items.lock() {
            items.push(item);
        }
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut items) = self.items.lock() {
            items.clear();
        }
    }
}

/// Accumulates per-speaker fragments and commits them on turn boundaries
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    pending_user: String,
    pending_model: String,
    feed: TranscriptFeed,
}

impl TranscriptAggregator {
    /// Create an aggregator committing into the given feed
    #[must_use]
    pub fn new(feed: TranscriptFeed) -> Self {
        Self {
            pending_user: String::new(),
            pending_model: String::new(),
            feed,
        }
    }

    /// Append a user-speech fragment. Whitespace-only fragments are no-ops.
    pub fn append_user(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.pending_user.push_str(text);
        }
    }

    /// Append a model-speech fragment. Whitespace-only fragments are no-ops.
    pub fn append_model(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.pending_model.push_str(text);
        }
    }

    /// Commit pending buffers as finalized items, user before model.
    ///
    /// Buffers that trim to empty produce nothing; with both empty this is
    /// a no-op. Returns the number of items committed.
    pub fn commit(&mut self) -> usize {
        let mut committed = 0;

        for (speaker, pending) in [
            (Speaker::User, &mut self.pending_user),
            (Speaker::Model, &mut self.pending_model),
        ] {
            let text = pending.trim().to_string();
            pending.clear();
            if text.is_empty() {
                continue;
            }

            self.feed.push(TranscriptItem {
                id: Uuid::new_v4(),
                speaker,
                text,
                timestamp: Utc::now(),
            });
            committed += 1;
        }

        if committed > 0 {
            tracing::debug!(committed, total = self.feed.len(), "turn committed");
        }
        committed
    }

    /// Whether either speaker has uncommitted text
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending_user.trim().is_empty() || !self.pending_model.trim().is_empty()
    }

    /// Read handle onto the committed list
    #[must_use]
    pub fn feed(&self) -> TranscriptFeed {
        self.feed.clone()
    }
}
