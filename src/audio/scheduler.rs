//! Playback scheduler — stitches network-delivered buffers into one
//! continuous, gapless output timeline.
//!
//! The agent streams synthesized audio in discrete chunks with network
//! jitter between them.  [`PlaybackScheduler`] reserves an absolute start
//! time for every chunk **synchronously, in strict arrival order**, before
//! the chunk actually plays:
//!
//! ```text
//! cursor = max(cursor, sink.clock())   // never schedule into the past
//! sink.play_at(buffer, cursor)         // reservation at the cursor
//! cursor += buffer duration            // next chunk lands exactly after
//! ```
//!
//! Because the reservation happens before playback begins, no two buffers
//! can ever overlap, and consecutive chunks are sample-adjacent regardless
//! of when they arrived.  Buffers are assumed delivered in order by the
//! transport; the scheduler carries no sequence numbers and performs no
//! reordering.
//!
//! On barge-in ([`PlaybackScheduler::interrupt`]) everything in flight is
//! stopped, the in-flight set is cleared and the cursor resets to zero —
//! the agent's utterance is discarded because new input superseded it.
//!
//! All mutation happens from the session controller's event loop; the
//! scheduler itself is a plain owned struct with no interior locking.

use std::collections::HashMap;
use std::sync::Arc;

use super::playback::{BufferId, PlaybackSink};

// ---------------------------------------------------------------------------
// ScheduledBuffer
// ---------------------------------------------------------------------------

/// Bookkeeping record for one buffer between scheduling and completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    /// Sink-assigned identity of the buffer.
    pub id: BufferId,
    /// Absolute start time reserved on the sink clock, in seconds.
    pub start_secs: f64,
    /// Buffer duration in seconds.
    pub duration_secs: f64,
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

/// Owns the playback timeline: the cursor, the in-flight set and the sink.
///
/// The cursor only ever increases — each call to [`enqueue`](Self::enqueue)
/// advances it by the buffer's duration — except on
/// [`interrupt`](Self::interrupt), which resets it to zero.  It reflects
/// reservations already made, never playback-actual time.
pub struct PlaybackScheduler {
    sink: Arc<dyn PlaybackSink>,
    /// Next free absolute start time on the sink clock, in seconds.
    cursor: f64,
    /// Buffers scheduled but not yet finished or cancelled.
    in_flight: HashMap<BufferId, ScheduledBuffer>,
    next_id: BufferId,
}

impl PlaybackScheduler {
    /// Create a scheduler over `sink` with an empty timeline.
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            cursor: 0.0,
            in_flight: HashMap::new(),
            next_id: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Reserve the next free slot for `samples` (mono at `sample_rate`) and
    /// hand the buffer to the sink.
    ///
    /// The clamp against the sink clock only matters for the first buffer
    /// after silence, when the cursor may have fallen behind real playback
    /// time; within an utterance the cursor is always ahead.
    pub fn enqueue(&mut self, samples: Vec<f32>, sample_rate: u32) -> ScheduledBuffer {
        let now = self.sink.clock();
        if self.cursor < now {
            self.cursor = now;
        }

        let duration_secs = samples.len() as f64 / sample_rate as f64;
        let id = self.next_id;
        self.next_id += 1;

        let scheduled = ScheduledBuffer {
            id,
            start_secs: self.cursor,
            duration_secs,
        };

        self.in_flight.insert(id, scheduled);
        self.sink.play_at(id, samples, scheduled.start_secs);
        self.cursor += duration_secs;

        log::trace!(
            "scheduler: buffer {id} reserved [{:.3}s..{:.3}s]",
            scheduled.start_secs,
            self.cursor
        );

        scheduled
    }

    /// Remove `id` from the in-flight set after the sink reported its
    /// natural completion.  Unknown ids (already cancelled by an interrupt)
    /// are ignored.
    pub fn on_finished(&mut self, id: BufferId) {
        if self.in_flight.remove(&id).is_some() {
            log::trace!("scheduler: buffer {id} finished");
        }
    }

    // -----------------------------------------------------------------------
    // Interruption (barge-in)
    // -----------------------------------------------------------------------

    /// Stop every in-flight buffer, clear the set and reset the cursor to
    /// zero.
    ///
    /// Idempotent: with nothing in flight and the cursor already at zero
    /// this returns without touching the sink, so repeated interrupts
    /// behave identically to one.
    pub fn interrupt(&mut self) {
        if self.in_flight.is_empty() && self.cursor == 0.0 {
            return;
        }

        log::debug!(
            "scheduler: interrupt — cancelling {} in-flight buffer(s)",
            self.in_flight.len()
        );

        self.sink.stop_all();
        self.in_flight.clear();
        self.cursor = 0.0;
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Next free absolute start time in seconds.
    pub fn cursor_secs(&self) -> f64 {
        self.cursor
    }

    /// Number of buffers scheduled but not yet finished or cancelled.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
