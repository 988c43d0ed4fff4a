//! voicebridge — realtime bidirectional voice session client.
//!
//! Streams live microphone audio to a remote conversational agent over a
//! WebSocket and plays the agent's synthesized replies back as one
//! continuous, gapless stream, with barge-in (mid-utterance interruption)
//! support.
//!
//! # Architecture
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → downmix + resample
//!           → codec::encode → LiveSession.send_audio ──────▶ agent
//!
//! agent ──▶ AgentEvent (mpsc) ─┬─ Audio        → codec::decode → PlaybackScheduler → PlaybackSink
//!                              ├─ Transcript   → TranscriptAggregator
//!                              ├─ TurnComplete → commit paired transcript records
//!                              ├─ Interrupted  → PlaybackScheduler::interrupt
//!                              └─ Closed/Error → SessionController teardown
//! ```
//!
//! [`session::SessionController`] owns every moving part and is the single
//! mutation point for the playback timeline and the per-turn transcript
//! accumulators.  Front-ends talk to it exclusively through the
//! [`app::SessionCommand`] / [`app::SessionNotice`] channel pair.

pub mod app;
pub mod audio;
pub mod config;
pub mod session;
pub mod transport;
