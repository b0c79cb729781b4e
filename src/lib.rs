//! lingua-live - realtime voice-conversation client for language practice
//!
//! This library provides the core of a voice conversation with a realtime
//! speech model: microphone capture, the PCM wire codec, gapless scheduled
//! playback, session lifecycle, and transcript aggregation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Presentation (CLI)                   │
//! │   state watch │ transcript feed │ level feeds        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ start / stop / toggle mute
//! ┌────────────────────▼────────────────────────────────┐
//! │                Session Controller                    │
//! │  Capture ─► PCM encode ─► transport ─► remote model  │
//! │  remote model ─► dispatch ─► decode ─► Playback      │
//! │                          └─► Transcript              │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use config::{Config, Difficulty, Scenario, default_scenarios};
pub use error::{Error, Result};
pub use session::{
    Session, SessionPipeline, SessionState, Speaker, TranscriptAggregator, TranscriptFeed,
    TranscriptItem,
};
