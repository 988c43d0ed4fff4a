//! Session transport — WebSocket plumbing to the remote agent endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Connector (trait)                     │
//! │                                                         │
//! │   WsConnector::connect(config)                          │
//! │     ├─ WebSocket connect + setup handshake (timeout)    │
//! │     ├─ writer task: RealtimeInputMessage → Text frames  │
//! │     └─ reader task: frames → ServerMessage → AgentEvent │
//! │                                                         │
//! │   → LiveSession { send_audio, close, take_events }      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The whole inbound protocol surfaces as the [`AgentEvent`] enum so the
//! session controller dispatches it in one place.

pub mod protocol;
pub mod session;

pub use protocol::{AgentEvent, Role};
pub use session::{Connector, LiveSession, TransportError, WsConnector};
