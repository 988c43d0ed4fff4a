//! Session state machine and shared observable state.
//!
//! [`SessionPhase`] drives the controller's lifecycle.  Front-ends read it
//! via [`SharedState`] to render status; the controller is the only writer.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<SessionState>>` — cheap to
//! clone and safe to share across threads.

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Lifecycle states of one live voice session.
///
/// The state machine transitions are:
///
/// ```text
/// Idle ──start()──▶ Connecting
///                   ──handshake ok──▶ Active
///                   ──handshake fail──▶ Idle  (error surfaced)
/// Active ──stop() | remote close | remote error──▶ Closing
/// Closing ──cleanup complete──▶ Idle
/// ```
///
/// `start()` in any state but `Idle` is a guarded no-op, so duplicate
/// overlapping sessions cannot exist.  There is no automatic retry on any
/// failure; restart is always a fresh manual `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session; waiting for a start command.
    Idle,

    /// Device permission and the transport handshake are in progress.
    Connecting,

    /// Capture is streaming up and agent audio is being scheduled.
    Active,

    /// Teardown in progress: capture severed, playback cleared, transport
    /// handle released.
    Closing,
}

impl SessionPhase {
    /// Returns `true` while a session exists in any form.
    ///
    /// `start()` is only honored when this is `false`.
    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionPhase::Idle)
    }

    /// A short human-readable label for status display.
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::Connecting => "Connecting",
            SessionPhase::Active => "Active",
            SessionPhase::Closing => "Closing",
        }
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Idle
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Observable session state — what a front-end needs to render status.
///
/// Held behind [`SharedState`]; the controller mutates it, front-ends read.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Current lifecycle phase.
    pub phase: SessionPhase,

    /// Error message from the most recent failure, cleared on `start()`.
    pub error_message: Option<String>,

    /// Number of turns committed since the session started.
    pub turns_completed: usize,
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`SessionState`].
///
/// Cheap to clone (`Arc` clone).  Lock for a short critical section; do
/// **not** hold the lock across `.await` points.
pub type SharedState = Arc<Mutex<SessionState>>;

/// Construct a new [`SharedState`] in the `Idle` phase.
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(SessionState::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_is_not_busy() {
        assert!(!SessionPhase::Idle.is_busy());
    }

    #[test]
    fn non_idle_phases_are_busy() {
        assert!(SessionPhase::Connecting.is_busy());
        assert!(SessionPhase::Active.is_busy());
        assert!(SessionPhase::Closing.is_busy());
    }

    #[test]
    fn labels() {
        assert_eq!(SessionPhase::Idle.label(), "Idle");
        assert_eq!(SessionPhase::Connecting.label(), "Connecting");
        assert_eq!(SessionPhase::Active.label(), "Active");
        assert_eq!(SessionPhase::Closing.label(), "Closing");
    }

    #[test]
    fn default_phase_is_idle() {
        assert_eq!(SessionPhase::default(), SessionPhase::Idle);
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }

    #[test]
    fn shared_state_can_be_cloned_and_mutated() {
        let state = new_shared_state();
        let state2 = Arc::clone(&state);

        state.lock().unwrap().phase = SessionPhase::Connecting;
        assert_eq!(state2.lock().unwrap().phase, SessionPhase::Connecting);
    }
}
