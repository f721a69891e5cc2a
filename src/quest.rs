//! Quest aggregate and its reward lifecycle.
//!
//! A [`Quest`] owns its counters, its participants and a journal of
//! speculative operations that have not been confirmed on chain yet.  The
//! methods here are plain state transitions; serialising access to them is the
//! ledger's job.

use crate::encoder::{SealedContribution, SealedReward, SealedScore};
use crate::error::{QuestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifier of a quest (the contract's `uint256 questId`).
pub type QuestId = u64;

/// Transaction hash reported by the chain collaborator.
pub type TxHash = String;

/// Upper bound on quest capacity; the contract reports counts as `uint8`.
pub const MAX_PARTICIPANTS_LIMIT: u32 = u8::MAX as u32;

/// Handle for a speculative ledger operation awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingId {
    /// Quest the operation was applied to.
    pub quest_id: QuestId,
    /// Per-quest sequence number.
    pub seq: u64,
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.quest_id, self.seq)
    }
}

/// Reward lifecycle of a quest.  Only ever moves forward once confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RewardState {
    /// Reward fixed but undisclosed.
    Sealed,
    /// Completion threshold met; waiting for an explicit reveal.
    Ready,
    /// Reward readable by eligible participants.
    Revealed,
}

impl fmt::Display for RewardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RewardState::Sealed => "sealed",
            RewardState::Ready => "ready",
            RewardState::Revealed => "revealed",
        };
        f.write_str(label)
    }
}

/// Progress of a single participant through a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantStatus {
    /// Holds a slot.
    Joined,
    /// Submitted a completion score.
    Completed,
    /// Collected the revealed reward.
    Claimed,
}

/// Parameters supplied when a quest is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestParams {
    /// Display title.
    pub title: String,
    /// Display description.
    pub description: String,
    /// Address of the organiser.
    pub organizer: String,
    /// Maximum number of participants admitted.
    pub max_participants: u32,
    /// Completions required before rewards may be revealed.
    pub completion_threshold: u32,
    /// Unix time (seconds) the quest opens.
    pub start_time: u64,
    /// Length of the quest in seconds.
    pub duration_secs: u64,
    /// Optional sealed reward pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed_reward: Option<SealedReward>,
}

impl QuestParams {
    /// Checks the count invariants against the configured capacity limit.
    pub fn validate(&self, max_participants_limit: u32) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(QuestError::InvalidQuest("title must not be empty".into()));
        }
        if self.max_participants == 0 {
            return Err(QuestError::InvalidQuest(
                "max_participants must be positive".into(),
            ));
        }
        if self.max_participants > max_participants_limit {
            return Err(QuestError::InvalidQuest(format!(
                "max_participants {} exceeds limit {max_participants_limit}",
                self.max_participants
            )));
        }
        if self.completion_threshold == 0 || self.completion_threshold > self.max_participants {
            return Err(QuestError::InvalidQuest(format!(
                "completion_threshold must be within 1..={}",
                self.max_participants
            )));
        }
        Ok(())
    }
}

/// Operation applied speculatively to a quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOp {
    /// A participant took a slot.
    Join {
        /// Participant admitted.
        participant: String,
    },
    /// A participant submitted a completion.
    Complete {
        /// Participant that completed.
        participant: String,
    },
    /// Rewards were revealed.
    ///
    /// Irreversible once confirmed.  While still pending it can be rolled
    /// back, returning the quest to ready, provided nobody has claimed.
    Reveal,
    /// A participant claimed a revealed reward.
    Claim {
        /// Participant that claimed.
        participant: String,
        /// Amount recorded for the claim.
        amount: u64,
    },
}

impl LedgerOp {
    /// Contract function that mirrors this operation.
    pub fn function_name(&self) -> &'static str {
        match self {
            LedgerOp::Join { .. } => "joinQuest",
            LedgerOp::Complete { .. } => "completeQuest",
            LedgerOp::Reveal => "revealRewards",
            LedgerOp::Claim { .. } => "claimReward",
        }
    }
}

/// Journal entry for a speculative operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOp {
    /// Handle of the operation.
    pub id: PendingId,
    /// What was applied.
    pub op: LedgerOp,
    /// Transaction hash, set once confirmed.
    pub tx_hash: Option<TxHash>,
}

/// Read-only snapshot of a quest, shaped like the contract's `getQuestInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestInfo {
    /// Quest identifier.
    pub id: QuestId,
    /// Display title.
    pub title: String,
    /// Display description.
    pub description: String,
    /// Capacity.
    pub max_participants: u32,
    /// Participants holding a slot.
    pub current_participants: u32,
    /// Completions required to unseal.
    pub completion_threshold: u32,
    /// Participants that completed.
    pub completed_participants: u32,
    /// Whether the quest accepts new participants.
    pub is_active: bool,
    /// Whether the completion threshold has been met.
    pub is_completed: bool,
    /// Whether rewards are revealed.
    pub rewards_revealed: bool,
    /// Organiser address.
    pub organizer: String,
    /// Unix time (seconds) the quest opened.
    pub start_time: u64,
    /// Unix time (seconds) the quest closes.
    pub end_time: u64,
    /// Unix time (seconds) rewards were revealed.
    pub reveal_time: Option<u64>,
    /// Lifecycle state.
    pub reward_state: RewardState,
    /// Operations still awaiting confirmation.
    pub pending_operations: usize,
}

impl QuestInfo {
    /// Completion progress as a whole percentage, for display only.
    pub fn completion_rate_percent(&self) -> u8 {
        if self.max_participants == 0 {
            return 0;
        }
        let pct = u64::from(self.completed_participants) * 100 / u64::from(self.max_participants);
        pct.min(100) as u8
    }
}

/// What the ledger holds for one participant of a quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Position in join order, starting at 1.
    pub index: u32,
    /// Progress through the quest.
    pub status: ParticipantStatus,
    /// Sealed contribution supplied on join.
    pub contribution: SealedContribution,
    /// Sealed score supplied on completion.
    pub score: Option<SealedScore>,
    /// Amount recorded by a claim.
    pub claimed_amount: Option<u64>,
}

/// Quest aggregate guarded by the ledger.
#[derive(Debug, Clone)]
pub(crate) struct Quest {
    id: QuestId,
    params: QuestParams,
    current_participants: u32,
    completed_participants: u32,
    state: RewardState,
    active: bool,
    reveal_time: Option<u64>,
    next_index: u32,
    next_seq: u64,
    participants: HashMap<String, ParticipantRecord>,
    pending: BTreeMap<u64, PendingOp>,
}

impl Quest {
    pub(crate) fn new(id: QuestId, params: QuestParams) -> Self {
        Self {
            id,
            params,
            current_participants: 0,
            completed_participants: 0,
            state: RewardState::Sealed,
            active: true,
            reveal_time: None,
            next_index: 1,
            next_seq: 0,
            participants: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    pub(crate) fn state(&self) -> RewardState {
        self.state
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active && self.state != RewardState::Revealed
    }

    pub(crate) fn close(&mut self) {
        self.active = false;
    }

    pub(crate) fn participant(&self, participant: &str) -> Option<&ParticipantRecord> {
        self.participants.get(participant)
    }

    pub(crate) fn join(
        &mut self,
        participant: &str,
        contribution: SealedContribution,
        enforce_active: bool,
    ) -> Result<u32> {
        if enforce_active && !self.is_active() {
            return Err(QuestError::QuestInactive(self.id));
        }
        if contribution.proof.is_empty() {
            return Err(QuestError::encoding("contribution proof is empty"));
        }
        match &contribution.binding {
            Some(binding) if binding.quest_id == self.id && binding.participant == participant => {}
            Some(binding) => {
                return Err(QuestError::encoding(format!(
                    "contribution sealed by {} for quest {} cannot join quest {} as {participant}",
                    binding.participant, binding.quest_id, self.id
                )))
            }
            None => {
                return Err(QuestError::encoding(
                    "contribution does not name its quest and participant",
                ))
            }
        }
        if self.participants.contains_key(participant) {
            return Err(QuestError::AlreadyJoined {
                quest_id: self.id,
                participant: participant.to_string(),
            });
        }
        if self.current_participants >= self.params.max_participants {
            return Err(QuestError::CapacityExceeded {
                quest_id: self.id,
                max: self.params.max_participants,
            });
        }
        let index = self.next_index;
        self.next_index += 1;
        self.current_participants += 1;
        self.participants.insert(
            participant.to_string(),
            ParticipantRecord {
                index,
                status: ParticipantStatus::Joined,
                contribution,
                score: None,
                claimed_amount: None,
            },
        );
        Ok(index)
    }

    /// Returns true when this completion moved the quest from sealed to ready.
    pub(crate) fn complete(&mut self, participant: &str, score: SealedScore) -> Result<bool> {
        let quest_id = self.id;
        let record = self
            .participants
            .get_mut(participant)
            .ok_or_else(|| QuestError::NotJoined {
                quest_id,
                participant: participant.to_string(),
            })?;
        if record.status != ParticipantStatus::Joined {
            return Err(QuestError::AlreadyCompleted {
                quest_id,
                participant: participant.to_string(),
            });
        }
        record.status = ParticipantStatus::Completed;
        record.score = Some(score);
        self.completed_participants += 1;
        // First crossing only; later completions leave the state alone.
        if self.state == RewardState::Sealed
            && self.completed_participants >= self.params.completion_threshold
        {
            self.state = RewardState::Ready;
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn reveal(&mut self, now_secs: u64) -> Result<()> {
        match self.state {
            RewardState::Sealed => Err(QuestError::NotReady(self.id)),
            RewardState::Revealed => Err(QuestError::AlreadyRevealed(self.id)),
            RewardState::Ready => {
                self.state = RewardState::Revealed;
                self.reveal_time = Some(now_secs);
                Ok(())
            }
        }
    }

    pub(crate) fn claim(&mut self, participant: &str, amount: u64) -> Result<()> {
        let quest_id = self.id;
        if self.state != RewardState::Revealed {
            return Err(QuestError::RewardsNotRevealed(quest_id));
        }
        let not_eligible = || QuestError::NotEligible {
            quest_id,
            participant: participant.to_string(),
        };
        let record = self.participants.get_mut(participant).ok_or_else(not_eligible)?;
        match record.status {
            ParticipantStatus::Joined => Err(not_eligible()),
            ParticipantStatus::Claimed => Err(QuestError::AlreadyClaimed {
                quest_id,
                participant: participant.to_string(),
            }),
            ParticipantStatus::Completed => {
                record.status = ParticipantStatus::Claimed;
                record.claimed_amount = Some(amount);
                Ok(())
            }
        }
    }

    pub(crate) fn record_pending(&mut self, op: LedgerOp) -> PendingId {
        let id = PendingId {
            quest_id: self.id,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.insert(
            id.seq,
            PendingOp {
                id,
                op,
                tx_hash: None,
            },
        );
        id
    }

    pub(crate) fn pending_ops(&self) -> impl Iterator<Item = &PendingOp> {
        self.pending.values()
    }

    pub(crate) fn confirm(&mut self, id: PendingId, tx_hash: TxHash) -> Result<PendingOp> {
        let mut entry = self
            .pending
            .remove(&id.seq)
            .ok_or(QuestError::UnknownPending(id))?;
        entry.tx_hash = Some(tx_hash);
        Ok(entry)
    }

    /// Undoes a speculative operation if nothing recorded since depends on it.
    pub(crate) fn rollback(&mut self, id: PendingId) -> Result<PendingOp> {
        let entry = self
            .pending
            .get(&id.seq)
            .cloned()
            .ok_or(QuestError::UnknownPending(id))?;
        let conflict = |reason: &str| QuestError::RollbackConflict {
            pending: id,
            reason: reason.to_string(),
        };
        match &entry.op {
            LedgerOp::Join { participant } => {
                match self.participants.get(participant).map(|r| r.status) {
                    Some(ParticipantStatus::Joined) => {}
                    Some(_) => return Err(conflict("participant already completed")),
                    None => return Err(conflict("participant record missing")),
                }
                self.participants.remove(participant);
                self.current_participants -= 1;
            }
            LedgerOp::Complete { participant } => {
                if self.state == RewardState::Revealed {
                    return Err(conflict("rewards already revealed"));
                }
                let record = self
                    .participants
                    .get_mut(participant)
                    .ok_or_else(|| conflict("participant record missing"))?;
                if record.status != ParticipantStatus::Completed {
                    return Err(conflict("participant is not in completed state"));
                }
                record.status = ParticipantStatus::Joined;
                record.score = None;
                self.completed_participants -= 1;
                if self.state == RewardState::Ready
                    && self.completed_participants < self.params.completion_threshold
                {
                    self.state = RewardState::Sealed;
                }
            }
            LedgerOp::Reveal => {
                if self
                    .participants
                    .values()
                    .any(|r| r.status == ParticipantStatus::Claimed)
                {
                    return Err(conflict("rewards already claimed"));
                }
                self.state = RewardState::Ready;
                self.reveal_time = None;
            }
            LedgerOp::Claim { participant, .. } => {
                let record = self
                    .participants
                    .get_mut(participant)
                    .ok_or_else(|| conflict("participant record missing"))?;
                if record.status != ParticipantStatus::Claimed {
                    return Err(conflict("participant has not claimed"));
                }
                record.status = ParticipantStatus::Completed;
                record.claimed_amount = None;
            }
        }
        self.pending.remove(&id.seq);
        Ok(entry)
    }

    pub(crate) fn info(&self) -> QuestInfo {
        QuestInfo {
            id: self.id,
            title: self.params.title.clone(),
            description: self.params.description.clone(),
            max_participants: self.params.max_participants,
            current_participants: self.current_participants,
            completion_threshold: self.params.completion_threshold,
            completed_participants: self.completed_participants,
            is_active: self.is_active(),
            is_completed: self.state != RewardState::Sealed,
            rewards_revealed: self.state == RewardState::Revealed,
            organizer: self.params.organizer.clone(),
            start_time: self.params.start_time,
            end_time: self.params.start_time.saturating_add(self.params.duration_secs),
            reveal_time: self.reveal_time,
            reward_state: self.state,
            pending_operations: self.pending.len(),
        }
    }
}
