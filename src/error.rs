//! Error types for the lingua-live client

use thiserror::Error;

/// Result type alias for lingua-live operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the lingua-live client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone access was denied by the platform
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture or playback device
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Malformed inbound audio chunk; the chunk is dropped, the session continues
    #[error("decode error: {0}")]
    Decode(String),

    /// Failure signaled by the realtime channel
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation rejected in the current session state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
