//! Per-submission commitment state machine

use solana_commitment_config::CommitmentLevel;

/// Lifecycle of one submitted transaction
///
/// `Pending` moves to exactly one terminal state. Terminal states never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitmentState {
    Pending,
    Confirmed { level: CommitmentLevel },
    Failed { detail: String },
    TimedOut,
}

/// Ledger-side observation fed into [`CommitmentState::advance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Ledger has no record yet
    Unseen,
    Landed(CommitmentLevel),
    Failed(String),
    /// The wait bound elapsed
    Deadline,
}

pub(crate) fn rank(level: CommitmentLevel) -> u8 {
    match level {
        CommitmentLevel::Processed => 0,
        CommitmentLevel::Confirmed => 1,
        CommitmentLevel::Finalized => 2,
    }
}

/// Whether `observed` is at least as deep as `required`
pub fn satisfies(observed: CommitmentLevel, required: CommitmentLevel) -> bool {
    rank(observed) >= rank(required)
}

impl CommitmentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Apply one observation against the caller-required level
    pub fn advance(self, observation: Observation, required: CommitmentLevel) -> Self {
        if self.is_terminal() {
            return self;
        }
        match observation {
            Observation::Unseen => Self::Pending,
            Observation::Landed(level) if satisfies(level, required) => Self::Confirmed { level },
            Observation::Landed(_) => Self::Pending,
            Observation::Failed(detail) => Self::Failed { detail },
            Observation::Deadline => Self::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(satisfies(CommitmentLevel::Finalized, CommitmentLevel::Confirmed));
        assert!(satisfies(CommitmentLevel::Confirmed, CommitmentLevel::Confirmed));
        assert!(!satisfies(CommitmentLevel::Processed, CommitmentLevel::Confirmed));
    }

    #[test]
    fn test_pending_until_required_depth() {
        let required = CommitmentLevel::Confirmed;
        let state = CommitmentState::Pending
            .advance(Observation::Unseen, required)
            .advance(Observation::Landed(CommitmentLevel::Processed), required);
        assert_eq!(state, CommitmentState::Pending);

        let state = state.advance(Observation::Landed(CommitmentLevel::Confirmed), required);
        assert_eq!(
            state,
            CommitmentState::Confirmed {
                level: CommitmentLevel::Confirmed
            }
        );
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let required = CommitmentLevel::Confirmed;
        let failed = CommitmentState::Pending.advance(Observation::Failed("boom".into()), required);
        assert_eq!(
            failed.clone().advance(Observation::Landed(CommitmentLevel::Finalized), required),
            failed
        );

        let timed_out = CommitmentState::Pending.advance(Observation::Deadline, required);
        assert_eq!(timed_out, CommitmentState::TimedOut);
        assert_eq!(
            timed_out.advance(Observation::Failed("late".into()), required),
            CommitmentState::TimedOut
        );
    }
}
