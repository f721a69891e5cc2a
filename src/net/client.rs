#![cfg(feature = "net")]

//! Contract calls and the chain collaborator that carries them.

use crate::quest::{QuestId, QuestInfo, TxHash};
use crate::transport::encode_bytes;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// A quest contract call with its `bytes` arguments already hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "camelCase")]
pub enum ContractCall {
    /// `createQuest(string,string,uint256,uint256,bytes,bytes,bytes)`.
    #[serde(rename_all = "camelCase")]
    CreateQuest {
        /// Display title.
        title: String,
        /// Display description.
        description: String,
        /// Capacity.
        max_participants: u32,
        /// Quest length in seconds.
        duration: u64,
        /// Encoded reward pool.
        reward_pool: String,
        /// Encoded completion threshold.
        completion_threshold: String,
        /// Encoded proof.
        input_proof: String,
    },
    /// `joinQuest(uint256,bytes,bytes)`.
    #[serde(rename_all = "camelCase")]
    JoinQuest {
        /// Target quest.
        quest_id: QuestId,
        /// Encoded contribution.
        contribution: String,
        /// Encoded proof.
        input_proof: String,
    },
    /// `completeQuest(uint256,bytes,bytes)`.
    #[serde(rename_all = "camelCase")]
    CompleteQuest {
        /// Target quest.
        quest_id: QuestId,
        /// Encoded score.
        completion_proof: String,
        /// Encoded proof.
        input_proof: String,
    },
    /// `revealRewards(uint256)`.
    #[serde(rename_all = "camelCase")]
    RevealRewards {
        /// Target quest.
        quest_id: QuestId,
    },
    /// `claimReward(uint256,bytes,bytes)`.
    #[serde(rename_all = "camelCase")]
    ClaimReward {
        /// Target quest.
        quest_id: QuestId,
        /// Encoded claim amount.
        reward_amount: String,
        /// Encoded proof.
        input_proof: String,
    },
}

impl ContractCall {
    /// ABI function name.
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractCall::CreateQuest { .. } => "createQuest",
            ContractCall::JoinQuest { .. } => "joinQuest",
            ContractCall::CompleteQuest { .. } => "completeQuest",
            ContractCall::RevealRewards { .. } => "revealRewards",
            ContractCall::ClaimReward { .. } => "claimReward",
        }
    }

    /// Quest targeted by the call; `None` for creation.
    pub fn quest_id(&self) -> Option<QuestId> {
        match self {
            ContractCall::CreateQuest { .. } => None,
            ContractCall::JoinQuest { quest_id, .. }
            | ContractCall::CompleteQuest { quest_id, .. }
            | ContractCall::RevealRewards { quest_id }
            | ContractCall::ClaimReward { quest_id, .. } => Some(*quest_id),
        }
    }
}

/// External collaborator that submits calls and reads contract state.
///
/// Errors are reported as plain strings; the pipeline wraps them.
pub trait ChainClient: Send + Sync {
    /// Submits a call to the contract at `contract` and resolves to its
    /// transaction hash.
    fn submit<'a>(
        &'a self,
        contract: &'a str,
        call: &'a ContractCall,
    ) -> BoxFuture<'a, Result<TxHash, String>>;

    /// Reads the contract's view of a quest.
    fn quest_info(&self, quest_id: QuestId) -> BoxFuture<'_, Result<QuestInfo, String>>;
}

/// In-process chain that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct InMemoryChain {
    state: Mutex<ChainState>,
}

#[derive(Debug, Default)]
struct ChainState {
    submitted: Vec<ContractCall>,
    targets: Vec<String>,
    failures: VecDeque<String>,
    quests: HashMap<QuestId, QuestInfo>,
}

impl InMemoryChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next submission fail with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state().failures.push_back(reason.into());
    }

    /// Calls accepted so far, in order.
    pub fn submitted(&self) -> Vec<ContractCall> {
        self.state().submitted.clone()
    }

    /// Contract addresses the accepted calls were sent to, in order.
    pub fn targets(&self) -> Vec<String> {
        self.state().targets.clone()
    }

    /// Publishes a quest snapshot for [`ChainClient::quest_info`].
    pub fn publish(&self, info: QuestInfo) {
        self.state().quests.insert(info.id, info);
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChainClient for InMemoryChain {
    fn submit<'a>(
        &'a self,
        contract: &'a str,
        call: &'a ContractCall,
    ) -> BoxFuture<'a, Result<TxHash, String>> {
        let outcome = {
            let mut state = self.state();
            match state.failures.pop_front() {
                Some(reason) => Err(reason),
                None => {
                    state.submitted.push(call.clone());
                    state.targets.push(contract.to_string());
                    let mut hasher = Sha256::new();
                    hasher.update(contract.as_bytes());
                    hasher.update(call.function_name().as_bytes());
                    hasher.update((state.submitted.len() as u64).to_be_bytes());
                    Ok(encode_bytes(&hasher.finalize()))
                }
            }
        };
        async move { outcome }.boxed()
    }

    fn quest_info(&self, quest_id: QuestId) -> BoxFuture<'_, Result<QuestInfo, String>> {
        let info = self
            .state()
            .quests
            .get(&quest_id)
            .cloned()
            .ok_or_else(|| format!("quest {quest_id} not deployed"));
        async move { info }.boxed()
    }
}
