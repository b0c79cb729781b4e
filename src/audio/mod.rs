//! Audio pipeline module
//!
//! Capture, wire codec, and scheduled playback. The session controller
//! (see `session`) wires these together around the realtime transport.

mod capture;
mod pcm;
mod playback;

pub use capture::{AudioFrame, CapturePipeline, FRAME_SIZE, SAMPLE_RATE};
pub use pcm::{EncodedChunk, decode_chunk, encode_frame};
pub use playback::{PLAYBACK_SAMPLE_RATE, PlaybackScheduler, PlaybackTimeline, PlaybackUnit};

use std::sync::{Arc, Mutex};

/// Amplitude reading over the most recent audio block
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelSnapshot {
    /// RMS energy in [0, 1]
    pub rms: f32,
    /// Peak absolute sample in [0, 1]
    pub peak: f32,
}

/// Lossy, best-effort amplitude feed for visualization.
///
/// The producing pipeline overwrites the slot on every block; readers poll
/// `snapshot()` whenever they feel like it. Unread blocks are simply lost.
#[derive(Debug, Clone, Default)]
pub struct LevelFeed {
    slot: Arc<Mutex<LevelSnapshot>>,
}

impl LevelFeed {
    /// Read the most recent level without consuming it
    #[must_use]
    pub fn snapshot(&self) -> LevelSnapshot {
        self.slot.lock().map(|s| *s).unwrap_or_default()
    }

    pub(crate) fn store(&self, snapshot: LevelSnapshot) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = snapshot;
        }
    }
}

/// Measure RMS energy and peak amplitude of a sample block
#[allow(clippy::cast_precision_loss)]
pub(crate) fn measure_level(samples: &[f32]) -> LevelSnapshot {
    if samples.is_empty() {
        return LevelSnapshot::default();
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    let peak = samples.iter().fold(0.0f32, |p, s| p.max(s.abs()));

    LevelSnapshot {
        rms: (sum_squares / samples.len() as f32).sqrt(),
        peak,
    }
}
