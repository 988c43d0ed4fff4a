//! Session orchestration — lifecycle state machine, controller event loop
//! and per-turn transcript aggregation.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                 SessionController                      │
//! │                                                        │
//! │  SessionCommand ──▶ state machine (SessionPhase)       │
//! │                     Idle → Connecting → Active         │
//! │                          → Closing → Idle              │
//! │                                                        │
//! │  AgentEvent ──▶ TranscriptAggregator  (text)           │
//! │             └─▶ PlaybackScheduler     (audio/barge-in) │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod state;
pub mod transcript;

pub use controller::SessionController;
pub use state::{new_shared_state, SessionPhase, SessionState, SharedState};
pub use transcript::{TranscriptAggregator, TranscriptRecord};
