//! Session controller
//!
//! Owns the lifecycle of one realtime conversation: allocates the audio
//! devices, opens the transport, wires capture frames out and inbound
//! messages into playback and the transcript, and tears everything down
//! deterministically on stop or error.

mod transcript;

pub use transcript::{Speaker, TranscriptAggregator, TranscriptFeed, TranscriptItem};

use std::fmt;
use std::sync::{Arc, Mutex};

use secrecy::SecretString;
use tokio::sync::{mpsc, watch};

use crate::audio::{
    AudioFrame, CapturePipeline, LevelFeed, PLAYBACK_SAMPLE_RATE, PlaybackScheduler,
    PlaybackTimeline, SAMPLE_RATE, decode_chunk, encode_frame,
};
use crate::config::{Config, Scenario};
use crate::transport::{RealtimeTransport, ServerContent, Setup, TransportEvent};
use crate::{Error, Result};

/// Connection lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Why the run loop ended
enum CloseReason {
    Requested,
    Closed,
    Failed(String),
}

/// Routes inbound message content to playback and the transcript.
///
/// Field handling order within one message is fixed: audio, interruption,
/// model text, user text, turn-complete. Messages are handled strictly in
/// arrival order; fields are not assumed mutually exclusive.
pub struct SessionPipeline {
    timeline: Arc<Mutex<PlaybackTimeline>>,
    transcript: TranscriptAggregator,
}

impl SessionPipeline {
    /// Create a pipeline dispatching onto the given timeline and feed
    #[must_use]
    pub fn new(timeline: Arc<Mutex<PlaybackTimeline>>, feed: TranscriptFeed) -> Self {
        Self {
            timeline,
            transcript: TranscriptAggregator::new(feed),
        }
    }

    /// Apply one inbound message's content
    pub fn handle_content(&mut self, content: ServerContent) {
        if let Some(turn) = &content.model_turn {
            for part in &turn.parts {
                let Some(chunk) = &part.inline_data else {
                    continue;
                };
                // A bad chunk is dropped; the cursor and queued units are untouched
                match decode_chunk(chunk, PLAYBACK_SAMPLE_RATE) {
                    Ok(unit) => {
                        if let Ok(mut timeline) = self.timeline.lock() {
                            let start = timeline.enqueue(unit);
                            tracing::trace!(start, "audio chunk scheduled");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping undecodable audio chunk");
                    }
                }
            }
        }

        if content.interrupted {
            if let Ok(mut timeline) = self.timeline.lock() {
                let dropped = timeline.active_len();
                timeline.interrupt();
                tracing::debug!(dropped, "barge-in: playback flushed");
            }
        }

        if let Some(fragment) = &content.output_transcription {
            self.transcript.append_model(&fragment.text);
        }

        if let Some(fragment) = &content.input_transcription {
            self.transcript.append_user(&fragment.text);
        }

        if content.turn_complete {
            self.transcript.commit();
        }
    }

    /// Read handle onto the committed transcript
    #[must_use]
    pub fn transcript_feed(&self) -> TranscriptFeed {
        self.transcript.feed()
    }
}

/// One realtime conversation and everything it owns.
///
/// Only one session may be connected at a time; `start()` is rejected
/// unless the state is disconnected or errored. The cpal streams inside
/// are not `Send`, so the session lives and dies on the thread that runs
/// its loop.
pub struct Session {
    model: String,
    voice: String,
    api_key: Option<SecretString>,
    state_tx: watch::Sender<SessionState>,
    transcript: TranscriptFeed,
    capture: Option<CapturePipeline>,
    playback: Option<PlaybackScheduler>,
    transport: Option<RealtimeTransport>,
    pipeline: Option<SessionPipeline>,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    events: Option<mpsc::Receiver<TransportEvent>>,
}

impl Session {
    /// Create an idle session from the client configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            model: config.model,
            voice: config.voice,
            api_key: config.api_key,
            state_tx,
            transcript: TranscriptFeed::default(),
            capture: None,
            playback: None,
            transport: None,
            pipeline: None,
            frames: None,
            events: None,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch the connection state; collaborators read but never mutate
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
        tracing::debug!(%state, "session state");
    }

    /// Start a conversation with the given scenario.
    ///
    /// Acquires the audio devices, opens the transport, and returns once
    /// the server has confirmed the session; the state is `Connected`
    /// when this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if a session is already starting or active
    /// (no side effects); device or transport failures leave the session
    /// in the `Error` state with everything released.
    pub async fn start(&mut self, scenario: &Scenario) -> Result<()> {
        match self.state() {
            SessionState::Disconnected | SessionState::Error => {}
            state => {
                return Err(Error::InvalidState(format!(
                    "cannot start a session while {state}"
                )));
            }
        }

        tracing::info!(scenario = %scenario.id, "starting session");
        self.set_state(SessionState::Connecting);
        self.transcript.clear();

        if let Err(e) = self.open(scenario).await {
            self.teardown().await;
            self.set_state(SessionState::Error);
            return Err(e);
        }

        self.set_state(SessionState::Connected);
        tracing::info!("session connected");
        Ok(())
    }

    async fn open(&mut self, scenario: &Scenario) -> Result<()> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("api key required to start a session".to_string()))?;

        // Output first: resources are stored as they come up so a failure
        // part-way releases everything already acquired
        let mut playback = PlaybackScheduler::new()?;
        playback.start()?;
        self.pipeline = Some(SessionPipeline::new(
            playback.timeline_handle(),
            self.transcript.clone(),
        ));
        self.playback = Some(playback);

        let mut capture = CapturePipeline::new()?;
        self.frames = Some(capture.start()?);
        self.capture = Some(capture);

        let setup = Setup::new(&self.model, &self.voice, &scenario.system_instruction);
        let (transport, events) = RealtimeTransport::connect(api_key, setup).await?;
        self.transport = Some(transport);
        self.events = Some(events);

        Ok(())
    }

    /// Drive the session until it stops: the shutdown signal fires, the
    /// server closes, or the transport fails.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the session was never started, or
    /// `Transport` after a channel failure (the session is then in the
    /// `Error` state, already torn down)
    pub async fn run_until(&mut self, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
        let mut frames = self
            .frames
            .take()
            .ok_or_else(|| Error::InvalidState("session not started".to_string()))?;
        let mut events = self
            .events
            .take()
            .ok_or_else(|| Error::InvalidState("session not started".to_string()))?;

        let reason = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown requested");
                    break CloseReason::Requested;
                }
                maybe_frame = frames.recv() => {
                    match maybe_frame {
                        Some(frame) => self.forward_frame(frame).await,
                        None => {
                            tracing::debug!("frame stream ended");
                            break CloseReason::Requested;
                        }
                    }
                }
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(TransportEvent::Message(msg)) => {
                            if let Some(content) = msg.server_content {
                                if let Some(pipeline) = self.pipeline.as_mut() {
                                    pipeline.handle_content(content);
                                }
                            }
                        }
                        Some(TransportEvent::Closed) | None => {
                            tracing::info!("server closed the session");
                            break CloseReason::Closed;
                        }
                        Some(TransportEvent::Error(e)) => break CloseReason::Failed(e),
                    }
                }
            }
        };

        match reason {
            CloseReason::Requested | CloseReason::Closed => {
                self.stop().await;
                Ok(())
            }
            CloseReason::Failed(e) => {
                tracing::error!(error = %e, "transport failed");
                self.teardown().await;
                self.set_state(SessionState::Error);
                Err(Error::Transport(e))
            }
        }
    }

    /// Forward one captured frame to the transport.
    ///
    /// Muted frames are dropped here, at the forwarding gate; capture and
    /// the level feed keep running. Send failures are logged and dropped;
    /// a slow transport delays this send only, never the capture cadence.
    async fn forward_frame(&mut self, frame: AudioFrame) {
        if self.capture.as_ref().is_some_and(CapturePipeline::is_muted) {
            return;
        }

        let chunk = encode_frame(&frame.samples, SAMPLE_RATE);
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.send_audio(chunk).await {
                tracing::warn!(error = %e, "frame send failed, dropping");
            }
        }
    }

    /// Stop the session and release everything. Idempotent; safe from any
    /// state, including `Error`.
    pub async fn stop(&mut self) {
        let was_active = self.teardown().await;
        self.set_state(SessionState::Disconnected);
        if was_active {
            tracing::info!("session stopped");
        }
    }

    /// Release devices and transport; returns whether anything was held
    async fn teardown(&mut self) -> bool {
        let mut held = false;

        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            held = true;
        }
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
            held = true;
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
            held = true;
        }
        // In-flight frames or messages still queued here are discarded
        self.frames = None;
        self.events = None;

        held
    }

    /// Flip the mute gate, returning the new state
    pub fn toggle_mute(&self) -> bool {
        self.capture
            .as_ref()
            .is_some_and(CapturePipeline::toggle_muted)
    }

    /// Gate or open outbound audio
    pub fn set_muted(&self, muted: bool) {
        if let Some(capture) = self.capture.as_ref() {
            capture.set_muted(muted);
        }
    }

    /// Whether outbound audio is currently gated
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.capture.as_ref().is_some_and(CapturePipeline::is_muted)
    }

    /// Read handle onto the committed transcript; survives `stop()`
    #[must_use]
    pub fn transcript_feed(&self) -> TranscriptFeed {
        self.transcript.clone()
    }

    /// Microphone amplitude feed, `None` while no session is active
    #[must_use]
    pub fn input_level_feed(&self) -> Option<LevelFeed> {
        self.capture.as_ref().map(CapturePipeline::level_feed)
    }

    /// Playback amplitude feed, `None` while no session is active
    #[must_use]
    pub fn output_level_feed(&self) -> Option<LevelFeed> {
        self.playback.as_ref().map(PlaybackScheduler::level_feed)
    }
}
