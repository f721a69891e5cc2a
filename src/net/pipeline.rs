#![cfg(feature = "net")]

//! Two-phase submission: speculative ledger apply, contract call, then
//! confirm or leave pending for explicit reconciliation.
//!
//! Quest locks are only held inside the synchronous ledger calls, never across
//! the `await` on the chain collaborator.

use crate::cipher::ProofDomain;
use crate::contribution::{CompletionReport, Contribution, QuestReward};
use crate::encoder::{ContributionEncoder, Sealed};
use crate::error::{QuestError, Result};
use crate::ledger::{ParticipantReceipt, QuestRewardLedger};
use crate::net::client::{ChainClient, ContractCall};
use crate::quest::{PendingId, PendingOp, QuestId, QuestInfo, QuestParams, TxHash};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const OUTCOME_BUFFER: usize = 256;

/// How a pending operation is settled by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The call landed on chain after all.
    Confirm(TxHash),
    /// Abandon the operation and undo it locally.
    Rollback,
}

/// Terminal status reported to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Confirmed on chain.
    Confirmed,
    /// Submission failed; the operation is still pending.
    Failed {
        /// Reason reported by the collaborator.
        reason: String,
    },
    /// Undone locally.
    RolledBack,
}

/// Event emitted after every submission attempt or reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    /// Quest the operation targeted.
    pub quest_id: QuestId,
    /// Contract function involved.
    pub operation: &'static str,
    /// Ledger handle, absent for quest creation.
    pub pending: Option<PendingId>,
    /// What happened.
    pub status: OutcomeStatus,
    /// Transaction hash when confirmed.
    pub tx_hash: Option<TxHash>,
}

/// Result of a confirmed join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfirmation {
    /// Ledger receipt.
    pub receipt: ParticipantReceipt,
    /// Transaction hash.
    pub tx_hash: TxHash,
}

/// Drives encoder, ledger and chain collaborator together.
pub struct SubmissionPipeline {
    encoder: ContributionEncoder,
    ledger: Arc<QuestRewardLedger>,
    client: Arc<dyn ChainClient>,
    outcomes: broadcast::Sender<OperationOutcome>,
    unsettled: Mutex<HashMap<PendingId, ContractCall>>,
}

impl std::fmt::Debug for SubmissionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionPipeline")
            .field("encoder", &self.encoder)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl SubmissionPipeline {
    /// Wires the pipeline together.
    pub fn new(
        encoder: ContributionEncoder,
        ledger: Arc<QuestRewardLedger>,
        client: Arc<dyn ChainClient>,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_BUFFER);
        let config = ledger.config();
        if config.is_placeholder() {
            warn!(
                contract = %config.contract_address,
                "contract address is the zero placeholder"
            );
        }
        Self {
            encoder,
            ledger,
            client,
            outcomes,
            unsettled: Mutex::new(HashMap::new()),
        }
    }

    /// Ledger backing the pipeline.
    pub fn ledger(&self) -> &Arc<QuestRewardLedger> {
        &self.ledger
    }

    /// Receives every [`OperationOutcome`] emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationOutcome> {
        self.outcomes.subscribe()
    }

    /// Seals the reward pool, submits `createQuest` and registers the quest
    /// locally once the call lands.
    pub async fn create_quest(
        &self,
        params: QuestParams,
        reward: &QuestReward,
    ) -> Result<(QuestId, TxHash)> {
        params.validate(self.ledger.config().max_participants_limit)?;
        let sealed_reward = self.encoder.encrypt_reward(reward)?;
        let threshold = self
            .encoder
            .encrypt_value(f64::from(params.completion_threshold))?;
        self.check_proof(ProofDomain::Reward, &sealed_reward)?;
        let call = ContractCall::CreateQuest {
            title: params.title.clone(),
            description: params.description.clone(),
            max_participants: params.max_participants,
            duration: params.duration_secs,
            reward_pool: sealed_reward.payload_bytes()?,
            completion_threshold: threshold.payload_bytes()?,
            input_proof: sealed_reward.proof_bytes(),
        };
        let operation = call.function_name();
        let tx_hash = self
            .client
            .submit(&self.ledger.config().contract_address, &call)
            .await
            .map_err(|reason| {
                warn!(operation, %reason, "submission failed");
                QuestError::SubmissionFailed {
                    operation,
                    reason,
                    pending: None,
                }
            })?;
        let quest_id = self.ledger.create_quest(QuestParams {
            sealed_reward: Some(sealed_reward),
            ..params
        })?;
        self.emit(OperationOutcome {
            quest_id,
            operation,
            pending: None,
            status: OutcomeStatus::Confirmed,
            tx_hash: Some(tx_hash.clone()),
        });
        Ok((quest_id, tx_hash))
    }

    /// Seals the contribution, applies the join speculatively and submits
    /// `joinQuest`.
    pub async fn join_quest(
        &self,
        quest_id: QuestId,
        caller: Option<&str>,
        contribution: &Contribution,
    ) -> Result<JoinConfirmation> {
        if caller.map_or(true, |c| c.trim().is_empty()) {
            return Err(QuestError::WalletRequired);
        }
        let sealed = self.encoder.encrypt_contribution(contribution)?;
        self.check_proof(ProofDomain::Contribution, &sealed)?;
        let call = ContractCall::JoinQuest {
            quest_id,
            contribution: sealed.payload_bytes()?,
            input_proof: sealed.proof_bytes(),
        };
        let receipt = self.ledger.join(quest_id, caller, sealed)?;
        let tx_hash = self.submit(receipt.pending, call).await?;
        Ok(JoinConfirmation { receipt, tx_hash })
    }

    /// Scores the completion under encryption, applies it speculatively and
    /// submits `completeQuest`.
    pub async fn complete_quest(
        &self,
        quest_id: QuestId,
        participant: &str,
        report: &CompletionReport,
    ) -> Result<TxHash> {
        let score = self.encoder.calculate_score(report)?;
        self.check_proof(ProofDomain::Score, &score)?;
        let call = ContractCall::CompleteQuest {
            quest_id,
            completion_proof: score.payload_bytes()?,
            input_proof: score.proof_bytes(),
        };
        let pending = self.ledger.complete(quest_id, participant, score)?;
        self.submit(pending, call).await
    }

    /// Applies the reveal speculatively and submits `revealRewards`.
    pub async fn reveal_rewards(&self, quest_id: QuestId) -> Result<TxHash> {
        let pending = self.ledger.reveal(quest_id)?;
        self.submit(pending, ContractCall::RevealRewards { quest_id })
            .await
    }

    /// Seals the claim amount, applies the claim speculatively and submits
    /// `claimReward`.
    pub async fn claim_reward(
        &self,
        quest_id: QuestId,
        participant: &str,
        amount: u64,
    ) -> Result<TxHash> {
        let sealed = self.encoder.encrypt_value(amount as f64)?;
        self.check_proof(ProofDomain::Value, &sealed)?;
        let call = ContractCall::ClaimReward {
            quest_id,
            reward_amount: sealed.payload_bytes()?,
            input_proof: sealed.proof_bytes(),
        };
        let pending = self.ledger.claim(quest_id, participant, amount)?;
        self.submit(pending, call).await
    }

    /// Settles an operation left pending by a failed submission.
    ///
    /// Only operations whose submission failed qualify; a call still in
    /// flight or one being resubmitted yields [`QuestError::UnknownPending`].
    pub fn reconcile(&self, pending: PendingId, resolution: Resolution) -> Result<PendingOp> {
        let mut unsettled = self.unsettled_calls();
        if !unsettled.contains_key(&pending) {
            return Err(QuestError::UnknownPending(pending));
        }
        let (entry, status) = match resolution {
            Resolution::Confirm(tx_hash) => {
                (self.ledger.confirm(pending, tx_hash)?, OutcomeStatus::Confirmed)
            }
            Resolution::Rollback => (self.ledger.rollback(pending)?, OutcomeStatus::RolledBack),
        };
        unsettled.remove(&pending);
        drop(unsettled);
        self.emit(OperationOutcome {
            quest_id: pending.quest_id,
            operation: entry.op.function_name(),
            pending: Some(pending),
            status,
            tx_hash: entry.tx_hash.clone(),
        });
        Ok(entry)
    }

    /// Submits the call behind a failed operation again.
    pub async fn resubmit(&self, pending: PendingId) -> Result<TxHash> {
        let call = self
            .unsettled_calls()
            .remove(&pending)
            .ok_or(QuestError::UnknownPending(pending))?;
        self.submit(pending, call).await
    }

    /// Reads the contract's view of a quest.
    pub async fn chain_quest_info(&self, quest_id: QuestId) -> Result<QuestInfo> {
        self.client
            .quest_info(quest_id)
            .await
            .map_err(|reason| QuestError::SubmissionFailed {
                operation: "getQuestInfo",
                reason,
                pending: None,
            })
    }

    async fn submit(&self, pending: PendingId, call: ContractCall) -> Result<TxHash> {
        let operation = call.function_name();
        debug!(%pending, operation, "submitting");
        let contract = self.ledger.config().contract_address.as_str();
        match self.client.submit(contract, &call).await {
            Ok(tx_hash) => {
                self.ledger.confirm(pending, tx_hash.clone())?;
                info!(%pending, operation, %tx_hash, "submission confirmed");
                self.emit(OperationOutcome {
                    quest_id: pending.quest_id,
                    operation,
                    pending: Some(pending),
                    status: OutcomeStatus::Confirmed,
                    tx_hash: Some(tx_hash.clone()),
                });
                Ok(tx_hash)
            }
            Err(reason) => {
                warn!(%pending, operation, %reason, "submission failed, operation left pending");
                self.unsettled_calls().insert(pending, call);
                self.emit(OperationOutcome {
                    quest_id: pending.quest_id,
                    operation,
                    pending: Some(pending),
                    status: OutcomeStatus::Failed {
                        reason: reason.clone(),
                    },
                    tx_hash: None,
                });
                Err(QuestError::SubmissionFailed {
                    operation,
                    reason,
                    pending: Some(pending),
                })
            }
        }
    }

    fn check_proof<T: Serialize>(&self, domain: ProofDomain, sealed: &Sealed<T>) -> Result<()> {
        if !self.ledger.config().verify_proofs || self.encoder.verify(domain, sealed) {
            return Ok(());
        }
        Err(QuestError::ProofRejected {
            backend: self.encoder.backend_name(),
        })
    }

    fn unsettled_calls(&self) -> std::sync::MutexGuard<'_, HashMap<PendingId, ContractCall>> {
        self.unsettled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, outcome: OperationOutcome) {
        // No subscribers is fine; outcomes are advisory.
        if let Ok(subscribers) = self.outcomes.send(outcome) {
            debug!(subscribers, "outcome emitted");
        }
    }
}
