//! Front-end ⇄ controller message types.
//!
//! Any front-end (the bundled CLI, or an embedding application) drives the
//! session controller through two channel endpoints:
//!
//! * `command_tx` — sends [`SessionCommand`]s to the controller.
//! * `notice_rx`  — receives [`SessionNotice`]s: phase changes, committed
//!   transcript turns and errors.
//!
//! Closing the command channel shuts the controller down; there is no
//! separate shutdown message.

use crate::session::state::SessionPhase;
use crate::session::transcript::TranscriptRecord;

// ---------------------------------------------------------------------------
// SessionCommand
// ---------------------------------------------------------------------------

/// Commands sent from a front-end to the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Open a session: acquire the microphone, connect, start streaming.
    /// A guarded no-op unless the controller is idle.
    Start,
    /// Immediately tear the current session down.  No-op when idle.
    Stop,
}

// ---------------------------------------------------------------------------
// SessionNotice
// ---------------------------------------------------------------------------

/// Progress events delivered from the controller to the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// The lifecycle phase changed.
    PhaseChanged(SessionPhase),

    /// A turn completed; both role records of the finished turn, caller
    /// first.
    TurnCommitted { records: Vec<TranscriptRecord> },

    /// An error was surfaced (session-fatal ones arrive after teardown).
    Error { message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
