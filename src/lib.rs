#![deny(missing_docs)]

//! # sealed_quest
//!
//! **sealed_quest** implements the protocol side of a quest game whose
//! contributions and rewards stay confidential until the quest is done.
//!
//! ## Features
//!
//! * **Contribution sealing**: the [`ContributionEncoder`] encrypts each field
//!   of a [`Contribution`] through a pluggable [`CipherBackend`] and attaches a
//!   proof bound to the plaintext.  [`MockCipher`] stands in for a real
//!   homomorphic backend.
//! * **Transport codec**: the [`transport`] module turns payloads and proofs
//!   into the `0x`-prefixed hex strings the quest contract takes as `bytes`.
//! * **Sealed-reward ledger**: [`QuestRewardLedger`] tracks participants,
//!   completions and the `Sealed → Ready → Revealed` reward lifecycle, with a
//!   journal of speculative operations that are confirmed or rolled back.
//! * **Submission pipeline** (feature `net`): [`net::SubmissionPipeline`]
//!   applies operations speculatively, submits them through a
//!   [`net::ChainClient`], and broadcasts the outcome.
//!
//! ## Usage
//!
//! ```rust
//! use sealed_quest::{
//!     CompletionReport, Contribution, ContributionEncoder, Difficulty, QuestParams,
//!     QuestRewardLedger, RewardState,
//! };
//!
//! let encoder = ContributionEncoder::with_mock();
//! let ledger = QuestRewardLedger::default();
//! let quest_id = ledger
//!     .create_quest(QuestParams {
//!         title: "The Forgotten Cipher".into(),
//!         description: "Decode ancient symbols".into(),
//!         organizer: "0xorganizer".into(),
//!         max_participants: 2,
//!         completion_threshold: 1,
//!         start_time: 0,
//!         duration_secs: 86_400,
//!         sealed_reward: None,
//!     })
//!     .unwrap();
//!
//! let sealed = encoder
//!     .encrypt_contribution(&Contribution {
//!         amount: 100.0,
//!         difficulty: Difficulty::Medium,
//!         time_spent_hours: 2,
//!         quest_id,
//!         participant: "0xalice".into(),
//!     })
//!     .unwrap();
//! let receipt = ledger.join(quest_id, Some("0xalice"), sealed).unwrap();
//! ledger.confirm(receipt.pending, "0xtx".into()).unwrap();
//!
//! let score = encoder
//!     .calculate_score(&CompletionReport {
//!         score: 80.0,
//!         difficulty: Difficulty::Medium,
//!         time_spent_hours: 2,
//!     })
//!     .unwrap();
//! ledger.complete(quest_id, "0xalice", score).unwrap();
//! assert_eq!(ledger.quest_info(quest_id).unwrap().reward_state, RewardState::Ready);
//! ```

pub mod cipher;
pub mod config;
pub mod contribution;
pub mod encoder;
pub mod error;
pub mod ledger;
#[cfg(feature = "net")]
pub mod net;
pub mod quest;
pub mod transport;

pub use cipher::{CipherBackend, Ciphertext, MockCipher, Proof, ProofDomain};
pub use config::QuestConfig;
pub use contribution::{CompletionReport, Contribution, Difficulty, QuestReward};
pub use encoder::{
    ContributionBinding, ContributionEncoder, EncryptedContribution, EncryptedReward, Sealed,
    SealedContribution, SealedReward, SealedScore, SealedValue,
};
pub use error::{QuestError, Result};
pub use ledger::{ParticipantReceipt, ParticipantStats, QuestRewardLedger};
pub use quest::{
    LedgerOp, ParticipantRecord, ParticipantStatus, PendingId, PendingOp, QuestId, QuestInfo,
    QuestParams, RewardState, TxHash,
};
pub use transport::{decode_payload, decode_proof, encode_payload, encode_proof};

/// Milliseconds since the Unix epoch; zero if the clock reads before it.
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
