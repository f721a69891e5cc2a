//! Error taxonomy shared by the encoder, the ledger and the submission layer.

use crate::quest::{PendingId, QuestId};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QuestError>;

/// Errors raised while sealing contributions or driving the reward lifecycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuestError {
    #[error("encoding error: {0}")]
    /// Plaintext input or transport bytes failed validation.
    Encoding(String),
    #[error("quest {0} not found")]
    /// No quest is registered under the identifier.
    QuestNotFound(QuestId),
    #[error("quest {quest_id} is full ({max} participants)")]
    /// The quest already admitted `max_participants`.
    CapacityExceeded {
        /// Quest that rejected the join.
        quest_id: QuestId,
        /// Capacity of the quest.
        max: u32,
    },
    #[error("participant {participant} has not joined quest {quest_id}")]
    /// Completion attempted by a participant that never joined.
    NotJoined {
        /// Quest the completion targeted.
        quest_id: QuestId,
        /// Offending participant.
        participant: String,
    },
    #[error("participant {participant} already joined quest {quest_id}")]
    /// The participant holds a slot in the quest already.
    AlreadyJoined {
        /// Quest the join targeted.
        quest_id: QuestId,
        /// Offending participant.
        participant: String,
    },
    #[error("participant {participant} already completed quest {quest_id}")]
    /// Completion submitted twice.
    AlreadyCompleted {
        /// Quest the completion targeted.
        quest_id: QuestId,
        /// Offending participant.
        participant: String,
    },
    #[error("quest {0} rewards are still sealed")]
    /// Reveal attempted before the completion threshold was met.
    NotReady(QuestId),
    #[error("quest {0} rewards already revealed")]
    /// Reveal attempted a second time.
    AlreadyRevealed(QuestId),
    #[error("quest {0} rewards have not been revealed")]
    /// Claim attempted before reveal.
    RewardsNotRevealed(QuestId),
    #[error("participant {participant} already claimed from quest {quest_id}")]
    /// Claim submitted twice.
    AlreadyClaimed {
        /// Quest the claim targeted.
        quest_id: QuestId,
        /// Offending participant.
        participant: String,
    },
    #[error("participant {participant} is not eligible to claim from quest {quest_id}")]
    /// Claim by a participant that never joined or never completed.
    NotEligible {
        /// Quest the claim targeted.
        quest_id: QuestId,
        /// Offending participant.
        participant: String,
    },
    #[error("wallet not connected")]
    /// Caller identity was absent.
    WalletRequired,
    #[error("{operation} submission failed: {reason}")]
    /// The chain collaborator rejected or failed the call.
    SubmissionFailed {
        /// Contract function that was attempted.
        operation: &'static str,
        /// Reason reported by the collaborator.
        reason: String,
        /// Speculative ledger operation awaiting reconciliation, if any.
        pending: Option<PendingId>,
    },
    #[error("quest {0} is not accepting participants")]
    /// Join attempted on a closed or revealed quest.
    QuestInactive(QuestId),
    #[error("invalid quest parameters: {0}")]
    /// Quest creation parameters violate the count invariants.
    InvalidQuest(String),
    #[error("proof rejected by {backend} backend")]
    /// The cipher backend refused the attached proof.
    ProofRejected {
        /// Backend that performed the verification.
        backend: &'static str,
    },
    #[error("no pending operation {0}")]
    /// Confirm or rollback referenced an unknown or already settled operation.
    UnknownPending(PendingId),
    #[error("cannot roll back {pending}: {reason}")]
    /// Later state depends on the speculative operation.
    RollbackConflict {
        /// Operation whose rollback was refused.
        pending: PendingId,
        /// Dependency that blocks the rollback.
        reason: String,
    },
    #[error("config error: {0}")]
    /// Configuration could not be loaded or failed validation.
    Config(String),
}

impl QuestError {
    /// Builds an [`QuestError::Encoding`] from any message.
    pub fn encoding<T: Into<String>>(msg: T) -> Self {
        QuestError::Encoding(msg.into())
    }

    /// Returns the pending operation left behind by a failed submission.
    pub fn pending(&self) -> Option<PendingId> {
        match self {
            QuestError::SubmissionFailed { pending, .. } => *pending,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_quest() {
        let err = QuestError::CapacityExceeded {
            quest_id: 7,
            max: 2,
        };
        assert_eq!(err.to_string(), "quest 7 is full (2 participants)");
    }

    #[test]
    fn submission_failure_exposes_pending() {
        let pending = PendingId { quest_id: 3, seq: 9 };
        let err = QuestError::SubmissionFailed {
            operation: "joinQuest",
            reason: "user rejected".into(),
            pending: Some(pending),
        };
        assert_eq!(err.pending(), Some(pending));
        assert_eq!(QuestError::WalletRequired.pending(), None);
    }
}
