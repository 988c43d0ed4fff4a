//! Live session transport — WebSocket connection to the agent endpoint.
//!
//! [`Connector`] is the seam the session controller opens sessions through;
//! [`WsConnector`] is the production implementation built on
//! `tokio-tungstenite`.  A successful [`Connector::connect`] call has
//! already completed the setup handshake — capture must not start before
//! that, and the controller relies on it.
//!
//! A [`LiveSession`] owns the socket through two background tasks:
//!
//! * **writer** — drains the outbound queue and serializes audio envelopes;
//! * **reader** — parses inbound frames into [`AgentEvent`]s and forwards
//!   them to the controller's event channel.
//!
//! [`LiveSession::close`] is idempotent and safe to call from any teardown
//! path; [`LiveSession::send_audio`] after close is a silent no-op so
//! capture callbacks racing shutdown never surface spurious errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::audio::codec::EncodedPacket;
use crate::config::AppConfig;
use crate::transport::protocol::{
    AgentEvent, Content, EmptyConfig, GenerationConfig, PrebuiltVoiceConfig, RealtimeInputMessage,
    ServerMessage, SetupMessage, Setup, SpeechConfig, VoiceConfig,
};

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Errors raised while opening a session.
///
/// Mid-session socket failures do not surface here — the reader task turns
/// them into [`AgentEvent::Error`], which the controller treats as
/// session-fatal.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The WebSocket connection or the setup handshake failed or timed out.
    /// Fatal to the attempted session; restart is a fresh manual start.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The endpoint answered the handshake with something other than a
    /// setup acknowledgment.
    #[error("unexpected handshake reply: {0}")]
    Handshake(String),
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Async seam for opening live sessions.
///
/// Implementations must be `Send + Sync` so the controller can hold an
/// `Arc<dyn Connector>` and tests can substitute a mock that counts
/// connection attempts.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session: connect, send setup, await the acknowledgment.
    ///
    /// Suspends the caller until the handshake succeeds or the configured
    /// timeout elapses.
    async fn connect(&self, config: &AppConfig) -> Result<LiveSession, TransportError>;
}

// ---------------------------------------------------------------------------
// LiveSession
// ---------------------------------------------------------------------------

/// Frames travelling from the session handle to the writer task.
pub(crate) enum OutboundFrame {
    Audio(Box<RealtimeInputMessage>),
    Close,
}

/// Opaque handle to one open agent session.
///
/// At most one `LiveSession` is alive at any time; the session controller
/// owns it for the lifetime of the `Active` state and drops it on teardown.
pub struct LiveSession {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    events: Option<mpsc::UnboundedReceiver<AgentEvent>>,
    closed: Arc<AtomicBool>,
}

impl LiveSession {
    /// Assemble a session from raw channel halves.
    ///
    /// Used by [`WsConnector`] once the handshake is done, and by tests that
    /// fake the remote end with plain channels.
    fn assemble(
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        events: mpsc::UnboundedReceiver<AgentEvent>,
    ) -> Self {
        Self {
            outbound,
            events: Some(events),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take the inbound event receiver.  The controller calls this exactly
    /// once when attaching the session to its event loop.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<AgentEvent>> {
        self.events.take()
    }

    /// Send one encoded audio envelope, fire-and-forget.
    ///
    /// After [`close`](Self::close) this is a silent no-op — capture
    /// callbacks may race shutdown and must never observe an error.
    pub fn send_audio(&self, packet: EncodedPacket) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let _ = self
            .outbound
            .send(OutboundFrame::Audio(Box::new(RealtimeInputMessage::audio(
                packet,
            ))));
    }

    /// Close the session.  Idempotent; safe to call multiple times and from
    /// error paths.  Releases the handle synchronously — the writer task
    /// performs the socket close in the background.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(OutboundFrame::Close);
        log::debug!("transport: session closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Detached session over raw channels — the transport and controller
    /// tests fake the remote end through this.
    #[cfg(test)]
    pub(crate) fn test_pair() -> (
        Self,
        mpsc::UnboundedReceiver<OutboundFrame>,
        mpsc::UnboundedSender<AgentEvent>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self::assemble(outbound_tx, events_rx),
            outbound_rx,
            events_tx,
        )
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// WsConnector
// ---------------------------------------------------------------------------

/// Production [`Connector`] over `tokio-tungstenite`.
#[derive(Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }

    /// Endpoint URL with the API key appended as a query parameter when
    /// configured.
    fn session_url(config: &AppConfig) -> String {
        let endpoint = &config.transport.endpoint;
        match config.transport.api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                let sep = if endpoint.contains('?') { '&' } else { '?' };
                format!("{endpoint}{sep}key={key}")
            }
            _ => endpoint.clone(),
        }
    }

    /// Build the setup handshake message from the agent configuration.
    fn setup_message(config: &AppConfig) -> SetupMessage {
        let agent = &config.agent;
        SetupMessage {
            setup: Setup {
                model: agent.model.clone(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".into()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: agent.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: agent
                    .system_instruction
                    .as_ref()
                    .map(|text| Content::text(text.clone())),
                input_audio_transcription: agent.transcribe_input.then(EmptyConfig::default),
                output_audio_transcription: agent.transcribe_output.then(EmptyConfig::default),
            },
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, config: &AppConfig) -> Result<LiveSession, TransportError> {
        let url = Self::session_url(config);
        let timeout = Duration::from_secs(config.transport.connect_timeout_secs);

        let handshake = async {
            let (ws, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            let (mut write, mut read) = ws.split();

            let setup = serde_json::to_string(&Self::setup_message(config))
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            write
                .send(Message::Text(setup))
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;

            // The first frame must acknowledge the setup.
            loop {
                match read.next().await {
                    Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                        let text = message_text(&msg);
                        let parsed: ServerMessage = serde_json::from_str(&text)
                            .map_err(|e| TransportError::Handshake(e.to_string()))?;
                        if parsed.setup_complete.is_some() {
                            return Ok((write, read));
                        }
                        return Err(TransportError::Handshake(
                            "first frame was not a setup acknowledgment".into(),
                        ));
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(reason))) => {
                        return Err(TransportError::Connection(format!(
                            "endpoint closed during handshake: {reason:?}"
                        )));
                    }
                    Some(Ok(other)) => {
                        return Err(TransportError::Handshake(format!(
                            "unexpected frame during handshake: {other:?}"
                        )));
                    }
                    Some(Err(e)) => return Err(TransportError::Connection(e.to_string())),
                    None => {
                        return Err(TransportError::Connection(
                            "socket closed during handshake".into(),
                        ));
                    }
                }
            }
        };

        let (mut write, mut read) = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::Connection(format!(
                    "handshake timed out after {}s",
                    timeout.as_secs()
                ))
            })??;

        log::info!("transport: session established with {}", config.agent.model);

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<AgentEvent>();

        // Writer: serialize outbound envelopes until Close or channel drop.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    OutboundFrame::Audio(msg) => {
                        let json = match serde_json::to_string(&*msg) {
                            Ok(json) => json,
                            Err(e) => {
                                log::warn!("transport: dropping unserializable frame: {e}");
                                continue;
                            }
                        };
                        if write.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    OutboundFrame::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            log::debug!("transport: writer task finished");
        });

        // Reader: flatten inbound frames into AgentEvents.
        tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                        let text = message_text(&msg);
                        let parsed: ServerMessage = match serde_json::from_str(&text) {
                            Ok(parsed) => parsed,
                            Err(e) => {
                                // A single bad frame never terminates an
                                // otherwise healthy session.
                                log::warn!("transport: dropping unparseable frame: {e}");
                                continue;
                            }
                        };
                        for event in parsed.into_events() {
                            if events_tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events_tx.send(AgentEvent::Closed);
                        return;
                    }
                    Some(Err(e)) => {
                        let _ = events_tx.send(AgentEvent::Error(e.to_string()));
                        return;
                    }
                }
            }
        });

        Ok(LiveSession::assemble(outbound_tx, events_rx))
    }
}

/// Extract the JSON text of a data frame.  Some endpoints deliver JSON in
/// binary frames; both shapes are accepted.
fn message_text(msg: &Message) -> String {
    match msg {
        Message::Text(text) => text.clone(),
        Message::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
