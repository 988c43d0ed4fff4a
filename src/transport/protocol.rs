//! Wire protocol for the live agent session.
//!
//! The remote endpoint speaks JSON text frames over a WebSocket, camelCase
//! keys.  The client sends exactly two message shapes — a one-shot `setup`
//! at handshake time and `realtimeInput` audio envelopes afterwards — and
//! receives `ServerMessage` frames that are flattened into the [`AgentEvent`]
//! enum so the session controller can dispatch the whole protocol in one
//! `match`.

use serde::{Deserialize, Serialize};

use crate::audio::codec::EncodedPacket;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Which side of the conversation a transcript fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human speaking into the microphone.
    Caller,
    /// The remote conversational agent.
    Agent,
}

impl Role {
    /// Display label used in transcript records and the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Caller => "caller",
            Role::Agent => "agent",
        }
    }
}

// ---------------------------------------------------------------------------
// Client → server messages
// ---------------------------------------------------------------------------

/// Handshake message sent once, immediately after the socket opens.
#[derive(Debug, Clone, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Agent model identifier.
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Present (empty object) to enable caller-side transcription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<EmptyConfig>,
    /// Present (empty object) to enable agent-side transcription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<EmptyConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Feature toggles that are switched on by their mere presence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyConfig {}

/// Streaming audio input envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

impl RealtimeInputMessage {
    /// Wrap one encoded capture block for transmission.
    pub fn audio(packet: EncodedPacket) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![Blob {
                    mime_type: packet.mime_type,
                    data: packet.data,
                }],
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client messages
// ---------------------------------------------------------------------------

/// Inline binary payload carried as base64 text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A single-text-part content block (system instructions).
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

/// One agent turn: transcription fragments, audio parts and turn flags may
/// arrive in any combination.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
    #[serde(default)]
    pub interrupted: Option<bool>,
}

/// Top-level inbound frame.  Unknown fields are ignored so protocol
/// additions on the server side do not break older clients.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<EmptyConfig>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
}

// ---------------------------------------------------------------------------
// AgentEvent
// ---------------------------------------------------------------------------

/// Flattened inbound protocol event, dispatched by a single handler in the
/// session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Partial transcription fragment for one role.
    Transcript { role: Role, text: String },
    /// Inline synthesized audio chunk.
    Audio(EncodedPacket),
    /// The agent finished its turn.
    TurnComplete,
    /// Barge-in: the agent's in-flight utterance is discarded because new
    /// input superseded it.
    Interrupted,
    /// The server closed the session.
    Closed,
    /// A transport-level failure; session-fatal.
    Error(String),
}

impl ServerMessage {
    /// Flatten one inbound frame into zero or more [`AgentEvent`]s, in
    /// protocol order: interruption first, then transcripts, audio parts and
    /// the turn boundary.
    pub fn into_events(self) -> Vec<AgentEvent> {
        let mut events = Vec::new();

        let Some(content) = self.server_content else {
            return events;
        };

        if content.interrupted.unwrap_or(false) {
            events.push(AgentEvent::Interrupted);
        }

        if let Some(t) = content.input_transcription {
            if !t.text.is_empty() {
                events.push(AgentEvent::Transcript {
                    role: Role::Caller,
                    text: t.text,
                });
            }
        }

        if let Some(t) = content.output_transcription {
            if !t.text.is_empty() {
                events.push(AgentEvent::Transcript {
                    role: Role::Agent,
                    text: t.text,
                });
            }
        }

        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    events.push(AgentEvent::Audio(EncodedPacket {
                        mime_type: blob.mime_type,
                        data: blob.data,
                    }));
                }
            }
        }

        if content.turn_complete.unwrap_or(false) {
            events.push(AgentEvent::TurnComplete);
        }

        events
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
