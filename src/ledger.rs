//! Sealed-reward ledger.
//!
//! The ledger owns every quest.  The quest map sits behind a read/write lock
//! and each quest behind its own mutex, so operations on different quests run
//! in parallel while capacity and threshold checks on one quest happen under a
//! single lock.  Every mutation is recorded as a [`PendingOp`] and stays
//! speculative until [`QuestRewardLedger::confirm`] or
//! [`QuestRewardLedger::rollback`] settles it.

use crate::config::QuestConfig;
use crate::encoder::{SealedContribution, SealedScore};
use crate::error::{QuestError, Result};
use crate::quest::{
    LedgerOp, ParticipantRecord, ParticipantStatus, PendingId, PendingOp, Quest, QuestId,
    QuestInfo, QuestParams, RewardState, TxHash,
};
use crate::unix_millis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantReceipt {
    /// Quest joined.
    pub quest_id: QuestId,
    /// Participant admitted.
    pub participant: String,
    /// Position in join order, starting at 1.
    pub participant_index: u32,
    /// Speculative operation awaiting confirmation.
    pub pending: PendingId,
}

/// Per-participant totals across every quest in the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStats {
    /// Quests registered in the ledger.
    pub total_quests: usize,
    /// Quests the participant joined.
    pub joined: usize,
    /// Quests the participant completed (claimed included).
    pub completed: usize,
    /// Joined quests still open and not yet completed.
    pub active: usize,
    /// Quests the participant claimed from.
    pub claimed: usize,
    /// Sum of recorded claim amounts.
    pub total_claimed: u64,
}

type QuestSlot = Arc<Mutex<Quest>>;

/// Owns all quests and their reward lifecycles.
#[derive(Debug)]
pub struct QuestRewardLedger {
    quests: RwLock<HashMap<QuestId, QuestSlot>>,
    next_id: AtomicU64,
    config: QuestConfig,
}

impl Default for QuestRewardLedger {
    fn default() -> Self {
        Self::new(QuestConfig::default())
    }
}

impl QuestRewardLedger {
    /// Creates an empty ledger.
    pub fn new(config: QuestConfig) -> Self {
        Self {
            quests: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Configuration in force.
    pub fn config(&self) -> &QuestConfig {
        &self.config
    }

    /// Registers a quest and returns its identifier.
    pub fn create_quest(&self, params: QuestParams) -> Result<QuestId> {
        params.validate(self.config.max_participants_limit)?;
        if params
            .sealed_reward
            .as_ref()
            .is_some_and(|reward| reward.proof.is_empty())
        {
            return Err(QuestError::encoding("reward proof is empty"));
        }
        let quest_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        info!(
            quest_id,
            title = %params.title,
            max_participants = params.max_participants,
            completion_threshold = params.completion_threshold,
            "quest created"
        );
        let quest = Quest::new(quest_id, params);
        self.quests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(quest_id, Arc::new(Mutex::new(quest)));
        Ok(quest_id)
    }

    /// Admits `caller` into the quest with a sealed contribution.
    pub fn join(
        &self,
        quest_id: QuestId,
        caller: Option<&str>,
        contribution: SealedContribution,
    ) -> Result<ParticipantReceipt> {
        let participant = caller
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(QuestError::WalletRequired)?;
        let enforce_active = self.config.enforce_active;
        self.with_quest(quest_id, |quest| {
            let participant_index = quest.join(participant, contribution, enforce_active)?;
            let pending = quest.record_pending(LedgerOp::Join {
                participant: participant.to_string(),
            });
            let info = quest.info();
            info!(
                quest_id,
                participant,
                participant_index,
                current = info.current_participants,
                max = info.max_participants,
                %pending,
                "participant joined"
            );
            Ok(ParticipantReceipt {
                quest_id,
                participant: participant.to_string(),
                participant_index,
                pending,
            })
        })
    }

    /// Records a completion; the first crossing of the threshold marks the
    /// quest ready to reveal.
    pub fn complete(
        &self,
        quest_id: QuestId,
        participant: &str,
        score: SealedScore,
    ) -> Result<PendingId> {
        if score.proof.is_empty() {
            return Err(QuestError::encoding("score proof is empty"));
        }
        self.with_quest(quest_id, |quest| {
            let crossed = quest.complete(participant, score)?;
            let pending = quest.record_pending(LedgerOp::Complete {
                participant: participant.to_string(),
            });
            let info = quest.info();
            info!(
                quest_id,
                participant,
                completed = info.completed_participants,
                threshold = info.completion_threshold,
                %pending,
                "participant completed"
            );
            if crossed {
                info!(quest_id, state = %RewardState::Ready, "completion threshold reached");
            }
            Ok(pending)
        })
    }

    /// Moves a ready quest to revealed.
    pub fn reveal(&self, quest_id: QuestId) -> Result<PendingId> {
        let now_secs = unix_millis() / 1000;
        self.with_quest(quest_id, |quest| {
            quest.reveal(now_secs)?;
            let pending = quest.record_pending(LedgerOp::Reveal);
            info!(quest_id, reveal_time = now_secs, %pending, "rewards revealed");
            Ok(pending)
        })
    }

    /// Records a claim by a completed participant of a revealed quest.
    pub fn claim(&self, quest_id: QuestId, participant: &str, amount: u64) -> Result<PendingId> {
        self.with_quest(quest_id, |quest| {
            quest.claim(participant, amount)?;
            let pending = quest.record_pending(LedgerOp::Claim {
                participant: participant.to_string(),
                amount,
            });
            info!(quest_id, participant, amount, %pending, "reward claimed");
            Ok(pending)
        })
    }

    /// Stops the quest from admitting participants.
    pub fn close_quest(&self, quest_id: QuestId) -> Result<()> {
        self.with_quest(quest_id, |quest| {
            quest.close();
            info!(quest_id, "quest closed");
            Ok(())
        })
    }

    /// Settles a speculative operation as confirmed on chain.
    pub fn confirm(&self, pending: PendingId, tx_hash: TxHash) -> Result<PendingOp> {
        self.with_pending(pending, |quest| {
            let entry = quest.confirm(pending, tx_hash)?;
            debug!(
                %pending,
                operation = entry.op.function_name(),
                tx_hash = entry.tx_hash.as_deref().unwrap_or_default(),
                "operation confirmed"
            );
            Ok(entry)
        })
    }

    /// Undoes a speculative operation.
    pub fn rollback(&self, pending: PendingId) -> Result<PendingOp> {
        self.with_pending(pending, |quest| match quest.rollback(pending) {
            Ok(entry) => {
                info!(
                    %pending,
                    operation = entry.op.function_name(),
                    state = %quest.state(),
                    "operation rolled back"
                );
                Ok(entry)
            }
            Err(err) => {
                warn!(%pending, error = %err, "rollback refused");
                Err(err)
            }
        })
    }

    /// Snapshot of one quest.
    pub fn quest_info(&self, quest_id: QuestId) -> Result<QuestInfo> {
        self.with_quest(quest_id, |quest| Ok(quest.info()))
    }

    /// Identifiers of every quest, ascending.
    pub fn quest_ids(&self) -> Vec<QuestId> {
        let mut ids: Vec<_> = self
            .quests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Progress of `participant` in the quest, if they joined.
    pub fn participant_status(
        &self,
        quest_id: QuestId,
        participant: &str,
    ) -> Result<Option<ParticipantStatus>> {
        self.with_quest(quest_id, |quest| {
            Ok(quest.participant(participant).map(|record| record.status))
        })
    }

    /// Full record held for `participant`, if they joined.
    pub fn participant(
        &self,
        quest_id: QuestId,
        participant: &str,
    ) -> Result<Option<ParticipantRecord>> {
        self.with_quest(quest_id, |quest| Ok(quest.participant(participant).cloned()))
    }

    /// Operations on the quest still awaiting confirmation, oldest first.
    pub fn pending_operations(&self, quest_id: QuestId) -> Result<Vec<PendingOp>> {
        self.with_quest(quest_id, |quest| Ok(quest.pending_ops().cloned().collect()))
    }

    /// Totals for `participant` across every quest.
    pub fn participant_stats(&self, participant: &str) -> ParticipantStats {
        let slots: Vec<QuestSlot> = self
            .quests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut stats = ParticipantStats {
            total_quests: slots.len(),
            ..ParticipantStats::default()
        };
        for slot in slots {
            let quest = lock(&slot);
            let Some(record) = quest.participant(participant) else {
                continue;
            };
            stats.joined += 1;
            match record.status {
                ParticipantStatus::Joined if quest.is_active() => stats.active += 1,
                ParticipantStatus::Joined => {}
                ParticipantStatus::Completed => stats.completed += 1,
                ParticipantStatus::Claimed => {
                    stats.completed += 1;
                    stats.claimed += 1;
                    stats.total_claimed = stats
                        .total_claimed
                        .saturating_add(record.claimed_amount.unwrap_or_default());
                }
            }
        }
        stats
    }

    fn slot(&self, quest_id: QuestId) -> Result<QuestSlot> {
        self.quests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&quest_id)
            .cloned()
            .ok_or(QuestError::QuestNotFound(quest_id))
    }

    fn with_quest<R>(&self, quest_id: QuestId, f: impl FnOnce(&mut Quest) -> Result<R>) -> Result<R> {
        let slot = self.slot(quest_id)?;
        let mut quest = lock(&slot);
        f(&mut quest)
    }

    fn with_pending<R>(
        &self,
        pending: PendingId,
        f: impl FnOnce(&mut Quest) -> Result<R>,
    ) -> Result<R> {
        let slot = self
            .slot(pending.quest_id)
            .map_err(|_| QuestError::UnknownPending(pending))?;
        let mut quest = lock(&slot);
        f(&mut quest)
    }
}

// A panic mid-transition leaves counters consistent because every transition
// validates before it mutates.
fn lock(slot: &Mutex<Quest>) -> MutexGuard<'_, Quest> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
