//! Realtime transport
//!
//! Bidirectional websocket channel to the speech model. `connect` sends
//! the session setup and only returns once the server confirms it, so the
//! caller can treat a successful connect as "open". Inbound messages are
//! pumped into an ordered channel; outbound messages carry one encoded
//! audio chunk each.

mod messages;

pub use messages::{
    Content, ContentPart, GenerationConfig, ModelTurn, RealtimeInput, RealtimeInputEnvelope,
    ServerContent, ServerMessage, Setup, SetupComplete, SetupEnvelope, SpeechConfig, TextPart,
    TranscriptionConfig, TranscriptionFragment,
};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::audio::EncodedChunk;
use crate::{Error, Result};

/// Realtime endpoint of the speech model service
const ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Inbound events buffered between the reader task and the session loop.
/// The channel preserves arrival order; dispatch never reorders.
const EVENT_CHANNEL_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event delivered from the reader task to the session loop
#[derive(Debug)]
pub enum TransportEvent {
    /// A parsed inbound message
    Message(Box<ServerMessage>),
    /// The server closed the channel
    Closed,
    /// The channel failed
    Error(String),
}

/// An open realtime channel
pub struct RealtimeTransport {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
}

impl RealtimeTransport {
    /// Open the channel, send the setup, and wait for the server to
    /// confirm it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the socket cannot be opened, the
    /// setup is rejected, or the server closes before confirming
    pub async fn connect(
        api_key: &SecretString,
        setup: Setup,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let endpoint = format!(
            "{ENDPOINT}?key={}",
            urlencoding::encode(api_key.expose_secret())
        );
        url::Url::parse(&endpoint)
            .map_err(|e| Error::Transport(format!("invalid endpoint: {e}")))?;

        let (ws, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| Error::Transport(format!("connect failed: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        let payload = serde_json::to_string(&SetupEnvelope { setup })?;
        sink.send(Message::Text(payload))
            .await
            .map_err(|e| Error::Transport(format!("setup send failed: {e}")))?;

        wait_for_setup_confirmation(&mut stream).await?;
        tracing::debug!("realtime channel open");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = tokio::spawn(pump_events(stream, tx));

        Ok((Self { sink, reader }, rx))
    }

    /// Send one encoded capture frame.
    ///
    /// Callers treat this as fire-and-forget: a failed send is logged and
    /// dropped, it never tears the session down by itself.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the socket rejects the message
    pub async fn send_audio(&mut self, chunk: EncodedChunk) -> Result<()> {
        let payload = serde_json::to_string(&RealtimeInputEnvelope::audio(chunk))?;
        self.sink
            .send(Message::Text(payload))
            .await
            .map_err(|e| Error::Transport(format!("send failed: {e}")))
    }

    /// Close the channel. Any in-flight inbound messages are discarded.
    pub async fn close(&mut self) {
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            tracing::debug!(error = %e, "close frame not delivered");
        }
        self.reader.abort();
        tracing::debug!("realtime channel closed");
    }
}

/// Consume inbound frames until the server confirms the setup
async fn wait_for_setup_confirmation(stream: &mut SplitStream<WsStream>) -> Result<()> {
    while let Some(item) = stream.next().await {
        let frame = item.map_err(|e| Error::Transport(format!("setup failed: {e}")))?;
        match frame {
            Message::Text(text) => {
                if let Some(msg) = parse_message(text.as_bytes()) {
                    if msg.setup_complete.is_some() {
                        return Ok(());
                    }
                }
            }
            Message::Binary(bytes) => {
                if let Some(msg) = parse_message(&bytes) {
                    if msg.setup_complete.is_some() {
                        return Ok(());
                    }
                }
            }
            Message::Close(frame) => {
                return Err(Error::Transport(format!(
                    "server closed during setup: {frame:?}"
                )));
            }
            _ => {}
        }
    }

    Err(Error::Transport(
        "channel ended before setup confirmation".to_string(),
    ))
}

/// Forward inbound messages, in arrival order, until the channel ends
async fn pump_events(mut stream: SplitStream<WsStream>, tx: mpsc::Sender<TransportEvent>) {
    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(Message::Text(text)) => parse_message(text.as_bytes())
                .map(|msg| TransportEvent::Message(Box::new(msg))),
            Ok(Message::Binary(bytes)) => {
                parse_message(&bytes).map(|msg| TransportEvent::Message(Box::new(msg)))
            }
            Ok(Message::Close(_)) => {
                let _ = tx.send(TransportEvent::Closed).await;
                return;
            }
            Ok(_) => None,
            Err(e) => {
                let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                return;
            }
        };

        if let Some(event) = event {
            if tx.send(event).await.is_err() {
                // Session loop is gone; teardown is in progress
                return;
            }
        }
    }

    let _ = tx.send(TransportEvent::Closed).await;
}

/// Parse one inbound frame; unparseable frames are logged and skipped so a
/// protocol addition never kills the session
fn parse_message(bytes: &[u8]) -> Option<ServerMessage> {
    match serde_json::from_slice(bytes) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparseable inbound message");
            None
        }
    }
}
