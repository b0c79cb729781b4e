//! Scheduled audio playback
//!
//! Serializes a stream of decoded audio units onto one continuous output
//! timeline: each unit starts exactly when the previous one ends, never in
//! the past, and an interruption flushes everything still pending.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::audio::{LevelFeed, measure_level};
use crate::{Error, Result};

/// Sample rate for playback (matches the model's audio output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// A decoded audio buffer ready for scheduling
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    /// Mono samples at `sample_rate`
    pub samples: Vec<f32>,
    /// Rate the samples are meant to play at
    pub sample_rate: u32,
    /// Wall-clock length of the buffer
    pub duration: Duration,
}

/// A unit placed on the timeline, waiting to play or playing
#[derive(Debug)]
struct ScheduledUnit {
    /// Timeline position (in samples) of the first sample
    start: u64,
    samples: Vec<f32>,
}

/// The output timeline.
///
/// The playhead is the output clock: it advances only as the device renders
/// samples. The cursor is the next permissible start position; it never
/// moves backwards except on `interrupt()`. Units are strictly FIFO and
/// never overlap.
#[derive(Debug, Default)]
pub struct PlaybackTimeline {
    playhead: u64,
    cursor: u64,
    active: VecDeque<ScheduledUnit>,
}

impl PlaybackTimeline {
    /// Create an empty timeline with the clock at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a unit at `max(cursor, playhead)` and advance the cursor
    /// past its end. Returns the scheduled start position.
    pub fn enqueue(&mut self, unit: PlaybackUnit) -> u64 {
        let start = self.cursor.max(self.playhead);
        self.cursor = start + unit.samples.len() as u64;
        self.active.push_back(ScheduledUnit {
            start,
            samples: unit.samples,
        });
        start
    }

    /// Hard-stop everything: drop all active units, discarding any audio
    /// not yet rendered, and pull the cursor back to the playhead.
    pub fn interrupt(&mut self) {
        self.active.clear();
        self.cursor = self.playhead;
    }

    /// Render the next output sample and advance the playhead.
    ///
    /// Zero-fills until the front unit's start position, then plays it to
    /// completion; finished units are retired as the playhead crosses them.
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_sample(&mut self) -> f32 {
        let t = self.playhead;
        self.playhead += 1;

        while let Some(front) = self.active.front() {
            if t < front.start {
                return 0.0;
            }
            let offset = (t - front.start) as usize;
            if offset < front.samples.len() {
                return front.samples[offset];
            }
            self.active.pop_front();
        }

        0.0
    }

    /// Render a block of output samples
    pub fn render(&mut self, out: &mut [f32]) {
        for slot in out.iter_mut() {
            *slot = self.next_sample();
        }
    }

    /// Current output-clock position in samples
    #[must_use]
    pub const fn playhead(&self) -> u64 {
        self.playhead
    }

    /// Next permissible start position in samples
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Number of units scheduled or playing
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Scheduled start positions of all active units, in order
    #[must_use]
    pub fn active_starts(&self) -> Vec<u64> {
        self.active.iter().map(|u| u.start).collect()
    }
}

/// Plays scheduled audio to the default output device
pub struct PlaybackScheduler {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    timeline: Arc<Mutex<PlaybackTimeline>>,
    level: LevelFeed,
    stream: Option<Stream>,
}

impl PlaybackScheduler {
    /// Create a new playback scheduler on the default output device
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no output device supports 24 kHz
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no suitable output config found".to_string())
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "playback scheduler initialized"
        );

        Ok(Self {
            device,
            config,
            timeline: Arc::new(Mutex::new(PlaybackTimeline::new())),
            level: LevelFeed::default(),
            stream: None,
        })
    }

    /// Start the output stream
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let timeline = Arc::clone(&self.timeline);
        let level = self.level.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut tl) = timeline.lock() else {
                        data.fill(0.0);
                        return;
                    };

                    let mut rendered = Vec::with_capacity(data.len() / channels);
                    for frame in data.chunks_mut(channels) {
                        let sample = tl.next_sample();
                        rendered.push(sample);
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                    drop(tl);

                    level.store(measure_level(&rendered));
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("playback stream started");
        Ok(())
    }

    /// Schedule a decoded unit for back-to-back playback
    pub fn enqueue(&self, unit: PlaybackUnit) {
        let duration = unit.duration;
        if let Ok(mut tl) = self.timeline.lock() {
            let start = tl.enqueue(unit);
            tracing::trace!(start, duration = ?duration, "unit scheduled");
        }
    }

    /// Flush all pending playback immediately (barge-in, not an error)
    pub fn interrupt(&self) {
        if let Ok(mut tl) = self.timeline.lock() {
            let dropped = tl.active_len();
            tl.interrupt();
            tracing::debug!(dropped, "playback interrupted");
        }
    }

    /// Interrupt and release the output device. Idempotent.
    pub fn stop(&mut self) {
        self.interrupt();
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("playback stream stopped");
        }
    }

    /// Shared handle to the timeline (the session dispatch path uses this)
    #[must_use]
    pub fn timeline_handle(&self) -> Arc<Mutex<PlaybackTimeline>> {
        Arc::clone(&self.timeline)
    }

    /// Amplitude feed of what is actually being rendered
    #[must_use]
    pub fn level_feed(&self) -> LevelFeed {
        self.level.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(len: usize) -> PlaybackUnit {
        PlaybackUnit {
            samples: vec![0.5; len],
            sample_rate: PLAYBACK_SAMPLE_RATE,
            duration: Duration::from_secs_f64(len as f64 / f64::from(PLAYBACK_SAMPLE_RATE)),
        }
    }

    #[test]
    fn test_units_schedule_back_to_back() {
        let mut tl = PlaybackTimeline::new();
        let a = tl.enqueue(unit(100));
        let b = tl.enqueue(unit(50));
        let c = tl.enqueue(unit(25));

        assert_eq!(a, 0);
        assert_eq!(b, 100);
        assert_eq!(c, 150);
        assert_eq!(tl.cursor(), 175);
    }

    #[test]
    fn test_enqueue_never_starts_in_the_past() {
        let mut tl = PlaybackTimeline::new();
        tl.enqueue(unit(10));

        // Let playback run past the end of the unit
        let mut out = vec![0.0; 50];
        tl.render(&mut out);
        assert_eq!(tl.playhead(), 50);

        // Stale cursor (10) must be clamped up to the playhead
        let start = tl.enqueue(unit(20));
        assert_eq!(start, 50);
        assert_eq!(tl.cursor(), 70);
    }

    #[test]
    fn test_render_plays_units_in_order() {
        let mut tl = PlaybackTimeline::new();
        tl.enqueue(PlaybackUnit {
            samples: vec![0.1, 0.1],
            sample_rate: PLAYBACK_SAMPLE_RATE,
            duration: Duration::default(),
        });
        tl.enqueue(PlaybackUnit {
            samples: vec![0.2, 0.2],
            sample_rate: PLAYBACK_SAMPLE_RATE,
            duration: Duration::default(),
        });

        let mut out = vec![0.0; 6];
        tl.render(&mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2, 0.0, 0.0]);
        assert_eq!(tl.active_len(), 0);
    }

    #[test]
    fn test_interrupt_clears_active_and_resets_cursor() {
        let mut tl = PlaybackTimeline::new();
        tl.enqueue(unit(100));
        tl.enqueue(unit(100));

        let mut out = vec![0.0; 30];
        tl.render(&mut out);
        assert_eq!(tl.active_len(), 2);

        tl.interrupt();
        assert_eq!(tl.active_len(), 0);
        assert_eq!(tl.cursor(), tl.playhead());

        // Remaining audio is discarded: output goes silent immediately
        let mut out = vec![1.0; 10];
        tl.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_enqueue_after_interrupt_uses_fresh_clock() {
        let mut tl = PlaybackTimeline::new();
        tl.enqueue(unit(1000));

        let mut out = vec![0.0; 300];
        tl.render(&mut out);
        tl.interrupt();

        let start = tl.enqueue(unit(10));
        assert!(start >= 300);
        assert_eq!(start, tl.playhead());
    }

    #[test]
    fn test_start_times_non_decreasing_with_interleaved_render() {
        let mut tl = PlaybackTimeline::new();
        let mut starts = Vec::new();
        let mut prev_end = 0u64;

        for len in [64usize, 256, 16, 128, 32] {
            let start = tl.enqueue(unit(len));
            starts.push(start);
            assert!(start >= prev_end, "unit overlaps its predecessor");
            prev_end = start + len as u64;

            let mut out = vec![0.0; 40];
            tl.render(&mut out);
        }

        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_empty_unit_is_retired_immediately() {
        let mut tl = PlaybackTimeline::new();
        tl.enqueue(unit(0));
        tl.enqueue(PlaybackUnit {
            samples: vec![0.3],
            sample_rate: PLAYBACK_SAMPLE_RATE,
            duration: Duration::default(),
        });

        let mut out = vec![0.0; 2];
        tl.render(&mut out);
        assert_eq!(out, vec![0.3, 0.0]);
    }
}
