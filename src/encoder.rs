//! Seals plaintext quest data into proof-carrying payloads.
//!
//! Every call encrypts field by field through the injected
//! [`CipherBackend`] and attaches a proof bound to the canonical plaintext
//! JSON.  Encryption never touches ledger state, so an encoder can be shared
//! freely across tasks.

use crate::cipher::{json_number, CipherBackend, Ciphertext, MockCipher, Proof, ProofDomain};
use crate::contribution::{validate_amount, CompletionReport, Contribution, QuestReward};
use crate::error::{QuestError, Result};
use crate::quest::QuestId;
use crate::transport::{encode_payload, encode_proof};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Field-level ciphertexts of a contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedContribution {
    /// Encrypted contribution amount.
    pub amount: Ciphertext,
    /// Encrypted difficulty weight.
    pub difficulty: Ciphertext,
    /// Encrypted hours spent.
    pub time_spent: Ciphertext,
}

/// Field-level ciphertexts of a reward pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedReward {
    /// Encrypted base reward.
    pub base_reward: Ciphertext,
    /// Encrypted bonus multiplier.
    pub bonus_multiplier: Ciphertext,
    /// Encrypted completion bonus.
    pub completion_bonus: Ciphertext,
}

/// Quest and participant a contribution was sealed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionBinding {
    /// Quest named in the plaintext contribution.
    pub quest_id: QuestId,
    /// Participant named in the plaintext contribution.
    pub participant: String,
}

/// An encrypted payload together with the proof that accompanies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sealed<T> {
    /// Ciphertext bundle.
    pub payload: T,
    /// Attestation bound to the plaintext at sealing time.
    pub proof: Proof,
    /// Set on contributions only; never part of the transport payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<ContributionBinding>,
}

/// Sealed join contribution.
pub type SealedContribution = Sealed<EncryptedContribution>;
/// Sealed quest reward pool.
pub type SealedReward = Sealed<EncryptedReward>;
/// Sealed single value, such as a claim amount or a threshold.
pub type SealedValue = Sealed<Ciphertext>;
/// Sealed completion score.
pub type SealedScore = Sealed<Ciphertext>;

impl<T: Serialize> Sealed<T> {
    /// Transport form of the payload.
    pub fn payload_bytes(&self) -> Result<String> {
        encode_payload(&self.payload)
    }

    /// Transport form of the proof.
    pub fn proof_bytes(&self) -> String {
        encode_proof(&self.proof)
    }

    /// Splits the bundle into payload and proof.
    pub fn into_parts(self) -> (T, Proof) {
        (self.payload, self.proof)
    }
}

/// Converts plaintext quest data into sealed, transport-ready payloads.
#[derive(Clone)]
pub struct ContributionEncoder {
    cipher: Arc<dyn CipherBackend>,
}

impl fmt::Debug for ContributionEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContributionEncoder")
            .field("backend", &self.cipher.name())
            .finish()
    }
}

impl ContributionEncoder {
    /// Creates an encoder around the provided backend.
    pub fn new(cipher: Arc<dyn CipherBackend>) -> Self {
        Self { cipher }
    }

    /// Creates an encoder backed by [`MockCipher`].
    pub fn with_mock() -> Self {
        Self::new(Arc::new(MockCipher::new()))
    }

    /// Name of the backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.cipher.name()
    }

    /// Encrypts amount, difficulty and time spent independently and proves
    /// the bundle.
    pub fn encrypt_contribution(&self, contribution: &Contribution) -> Result<SealedContribution> {
        contribution.validate()?;
        let weight = contribution.difficulty.weight();
        let hours = f64::from(contribution.time_spent_hours);
        let payload = EncryptedContribution {
            amount: self.cipher.encrypt(contribution.amount),
            difficulty: self.cipher.encrypt(weight),
            time_spent: self.cipher.encrypt(hours),
        };
        let plaintext = json!({
            "amount": json_number(contribution.amount),
            "difficulty": json_number(weight),
            "timeSpent": json_number(hours),
        });
        let mut sealed = self.seal(ProofDomain::Contribution, &plaintext, payload)?;
        sealed.binding = Some(ContributionBinding {
            quest_id: contribution.quest_id,
            participant: contribution.participant.clone(),
        });
        debug!(
            quest_id = contribution.quest_id,
            participant = %contribution.participant,
            backend = self.cipher.name(),
            "contribution sealed"
        );
        Ok(sealed)
    }

    /// Encrypts a single value.
    pub fn encrypt_value(&self, value: f64) -> Result<SealedValue> {
        validate_amount("value", value)?;
        let payload = self.cipher.encrypt(value);
        self.seal(ProofDomain::Value, &json_number(value), payload)
    }

    /// Encrypts a reward pool for quest creation.
    pub fn encrypt_reward(&self, reward: &QuestReward) -> Result<SealedReward> {
        reward.validate()?;
        let payload = EncryptedReward {
            base_reward: self.cipher.encrypt(reward.base_reward),
            bonus_multiplier: self.cipher.encrypt(reward.bonus_multiplier),
            completion_bonus: self.cipher.encrypt(reward.completion_bonus),
        };
        let plaintext = json!({
            "baseReward": json_number(reward.base_reward),
            "bonusMultiplier": json_number(reward.bonus_multiplier),
            "completionBonus": json_number(reward.completion_bonus),
        });
        self.seal(ProofDomain::Reward, &plaintext, payload)
    }

    /// Computes `(score * difficulty) * (1 / time_spent)` under encryption.
    pub fn calculate_score(&self, report: &CompletionReport) -> Result<SealedScore> {
        report.validate()?;
        let score = self.cipher.encrypt(report.score);
        let difficulty = self.cipher.encrypt(report.difficulty.weight());
        let inverse_time = self
            .cipher
            .encrypt(1.0 / f64::from(report.time_spent_hours));
        let numerator = self.cipher.multiply(&score, &difficulty)?;
        let payload = self.cipher.multiply(&numerator, &inverse_time)?;
        self.seal(ProofDomain::Score, &json_number(report.plain_score()), payload)
    }

    /// Asks the backend whether `sealed` carries a valid proof.
    pub fn verify<T: Serialize>(&self, domain: ProofDomain, sealed: &Sealed<T>) -> bool {
        match serde_json::to_vec(&sealed.payload) {
            Ok(bytes) => self.cipher.verify(domain, &bytes, &sealed.proof),
            Err(_) => false,
        }
    }

    fn seal<T: Serialize>(&self, domain: ProofDomain, plaintext: &Value, payload: T) -> Result<Sealed<T>> {
        let plaintext_bytes = serde_json::to_vec(plaintext)
            .map_err(|err| QuestError::encoding(format!("plaintext serialisation failed: {err}")))?;
        let ciphertext_bytes = serde_json::to_vec(&payload)
            .map_err(|err| QuestError::encoding(format!("ciphertext serialisation failed: {err}")))?;
        let proof = self.cipher.prove(domain, &plaintext_bytes, &ciphertext_bytes);
        Ok(Sealed {
            payload,
            proof,
            binding: None,
        })
    }
}

impl Default for ContributionEncoder {
    fn default() -> Self {
        Self::with_mock()
    }
}
