//! Per-turn transcript aggregation.
//!
//! The agent streams transcription as small role-tagged fragments that are
//! already segmented — no whitespace massaging happens here.
//! [`TranscriptAggregator`] keeps one running accumulator per role and
//! commits both as paired records when the turn completes, so a
//! conversational timeline interleaves caller and agent correctly.
//!
//! The aggregator is an explicitly owned state object the controller passes
//! through its event loop — never a closure capture — so fragments can't be
//! appended to a stale turn across asynchronous callbacks.

use crate::transport::protocol::Role;

// ---------------------------------------------------------------------------
// TranscriptRecord
// ---------------------------------------------------------------------------

/// One committed transcript line: everything a role said within one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRecord {
    pub role: Role,
    pub text: String,
}

// ---------------------------------------------------------------------------
// TranscriptAggregator
// ---------------------------------------------------------------------------

/// Accumulates streamed partial text into per-turn records.
///
/// Accumulation is append-only within a turn; [`commit_turn`] atomically
/// produces the paired records and clears both accumulators for the next
/// turn.
///
/// [`commit_turn`]: Self::commit_turn
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    caller: String,
    agent: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment verbatim to the matching role's accumulator.
    pub fn append(&mut self, role: Role, fragment: &str) {
        match role {
            Role::Caller => self.caller.push_str(fragment),
            Role::Agent => self.agent.push_str(fragment),
        }
    }

    /// Commit the current turn: one record per role — caller first — even
    /// when a side is empty, then clear both accumulators.
    ///
    /// Empty sides are recorded on purpose: consumers pair records
    /// positionally to interleave the timeline, and suppressing a side
    /// would shift that pairing.
    pub fn commit_turn(&mut self) -> [TranscriptRecord; 2] {
        [
            TranscriptRecord {
                role: Role::Caller,
                text: std::mem::take(&mut self.caller),
            },
            TranscriptRecord {
                role: Role::Agent,
                text: std::mem::take(&mut self.agent),
            },
        ]
    }

    /// Whether both accumulators are empty (nothing said this turn yet).
    pub fn is_empty(&self) -> bool {
        self.caller.is_empty() && self.agent.is_empty()
    }

    /// Discard any partial accumulation without committing (teardown).
    pub fn clear(&mut self) {
        self.caller.clear();
        self.agent.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Fragments concatenate verbatim and commit as one record.
    #[test]
    fn fragments_concatenate_across_a_turn() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Role::Caller, "Hel");
        agg.append(Role::Caller, "lo");

        let [caller, agent] = agg.commit_turn();
        assert_eq!(caller.role, Role::Caller);
        assert_eq!(caller.text, "Hello");
        assert_eq!(agent.role, Role::Agent);
        assert_eq!(agent.text, "");
    }

    /// The next turn starts from empty accumulators.
    #[test]
    fn commit_clears_for_the_next_turn() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Role::Caller, "first turn");
        agg.commit_turn();

        assert!(agg.is_empty());
        agg.append(Role::Caller, "second");
        let [caller, _] = agg.commit_turn();
        assert_eq!(caller.text, "second");
    }

    /// Both roles are committed even when one side said nothing.
    #[test]
    fn empty_side_is_still_committed() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Role::Agent, "only the agent spoke");

        let [caller, agent] = agg.commit_turn();
        assert_eq!(caller.text, "");
        assert_eq!(agent.text, "only the agent spoke");
    }

    /// Roles accumulate independently within the same turn.
    #[test]
    fn roles_accumulate_independently() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Role::Caller, "what is");
        agg.append(Role::Agent, "I think");
        agg.append(Role::Caller, " this?");
        agg.append(Role::Agent, " that…");

        let [caller, agent] = agg.commit_turn();
        assert_eq!(caller.text, "what is this?");
        assert_eq!(agent.text, "I think that…");
    }

    /// Fragments are appended verbatim — no whitespace massaging.
    #[test]
    fn fragments_are_verbatim() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Role::Agent, "a ");
        agg.append(Role::Agent, " b");

        let [_, agent] = agg.commit_turn();
        assert_eq!(agent.text, "a  b");
    }

    /// `clear` drops partial accumulation without producing records.
    #[test]
    fn clear_discards_partial_turn() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Role::Caller, "discard me");
        agg.clear();
        assert!(agg.is_empty());
    }
}
