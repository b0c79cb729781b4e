//! Microphone capture pipeline
//!
//! Owns the input device and emits fixed-size frames at a fixed rate.
//! Muting gates the outbound forwarding path only; frames keep flowing so
//! the level feed stays live while muted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::audio::{LevelFeed, measure_level};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per emitted frame (256ms at 16kHz)
pub const FRAME_SIZE: usize = 4096;

/// Frames in flight before the capture callback starts dropping.
///
/// The capture cadence is never allowed to stall on a slow consumer; a
/// full channel means the frame is discarded, not queued.
const FRAME_CHANNEL_CAPACITY: usize = 8;

/// One block of captured audio, consumed exactly once by the encoder
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Normalized samples in [-1, 1] at [`SAMPLE_RATE`]
    pub samples: Vec<f32>,
}

/// Captures framed audio from the default input device
pub struct CapturePipeline {
    device: Device,
    config: StreamConfig,
    muted: Arc<AtomicBool>,
    level: LevelFeed,
    stream: Option<Stream>,
}

impl CapturePipeline {
    /// Create a new capture pipeline on the default input device
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` or `DeviceUnavailable` if the microphone
    /// cannot be acquired
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(acquire_error)?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no suitable capture config found".to_string())
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "capture pipeline initialized"
        );

        Ok(Self {
            device,
            config,
            muted: Arc::new(AtomicBool::new(false)),
            level: LevelFeed::default(),
            stream: None,
        })
    }

    /// Start capturing and return the frame stream.
    ///
    /// The stream is continuous and non-restartable: it ends when `stop()`
    /// releases the device, and a second `start()` on a running pipeline is
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if already capturing, or a device error if
    /// the input stream cannot be built
    pub fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.stream.is_some() {
            return Err(Error::InvalidState("capture already running".to_string()));
        }

        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let level = self.level.clone();
        let mut pending: Vec<f32> = Vec::with_capacity(FRAME_SIZE * 2);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pending.extend_from_slice(data);

                    while pending.len() >= FRAME_SIZE {
                        let samples: Vec<f32> = pending.drain(..FRAME_SIZE).collect();
                        level.store(measure_level(&samples));

                        if tx.try_send(AudioFrame { samples }).is_err() {
                            // Consumer is behind or gone; drop rather than stall
                            tracing::trace!("capture frame dropped");
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(acquire_error)?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("capture started");
        Ok(rx)
    }

    /// Release the device and end the frame stream. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("capture stopped");
        }
    }

    /// Gate outbound forwarding without pausing the device
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
        tracing::debug!(muted, "mute changed");
    }

    /// Flip the mute gate, returning the new state
    pub fn toggle_muted(&self) -> bool {
        let muted = !self.is_muted();
        self.set_muted(muted);
        muted
    }

    /// Whether outbound forwarding is currently gated
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Amplitude feed of the most recent captured frame
    #[must_use]
    pub fn level_feed(&self) -> LevelFeed {
        self.level.clone()
    }
}

/// Map device acquisition failures onto the session error taxonomy.
///
/// cpal surfaces platform permission refusals as backend-specific errors;
/// anything mentioning permissions is treated as a denial, the rest as a
/// missing device.
fn acquire_error<E: std::fmt::Display>(err: E) -> Error {
    let msg = err.to_string();
    let lowered = msg.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") {
        Error::PermissionDenied(msg)
    } else {
        Error::DeviceUnavailable(msg)
    }
}
