//! Pluggable encryption and proof capability.
//!
//! The [`CipherBackend`] trait is the seam where a homomorphic encryption or
//! zero-knowledge backend plugs in.  The bundled [`MockCipher`] performs no
//! cryptography at all: its ciphertexts carry the plaintext value next to a
//! BLAKE2b-256 tag, and its proofs are SHA-256 commitments to the plaintext
//! salted with a timestamp and a nonce.  It exists so the ledger and the
//! submission flow can be exercised end to end, and it produces the same JSON
//! shapes the quest contract front-end has always sent.

use crate::error::{QuestError, Result};
use crate::unix_millis;
use blake2::digest::consts::U32;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

type Blake2b256 = blake2::Blake2b<U32>;

const CIPHERTEXT_DOMAIN: &[u8] = b"SEALED_QUEST_MOCK_CT";
const NONCE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const NONCE_LEN: usize = 8;

/// Opaque ciphertext as produced by a backend.
///
/// The wrapped JSON is what travels on the wire; callers must not inspect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ciphertext(Value);

impl Ciphertext {
    /// Wraps backend-specific JSON.
    pub fn from_json(value: Value) -> Self {
        Self(value)
    }

    /// Borrows the backend-specific JSON.
    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

/// Opaque attestation accompanying a ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proof(String);

impl Proof {
    /// Wraps a backend-produced proof string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the proof text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the proof carries no content.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a proof attests to; keeps proofs for different payloads apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofDomain {
    /// A participant's sealed contribution.
    Contribution,
    /// A quest reward pool.
    Reward,
    /// A single sealed value such as a claim amount.
    Value,
    /// A computed completion score.
    Score,
}

impl ProofDomain {
    /// Prefix used by string-encoded proofs.
    pub fn prefix(self) -> &'static str {
        match self {
            ProofDomain::Contribution => "contribution_proof",
            ProofDomain::Reward => "reward_proof",
            ProofDomain::Value => "value_proof",
            ProofDomain::Score => "score_proof",
        }
    }
}

/// Encryption and proof capability injected into the encoder.
pub trait CipherBackend: Send + Sync {
    /// Encrypts a single plaintext number.
    fn encrypt(&self, plaintext: f64) -> Ciphertext;

    /// Produces a proof that `ciphertext` was derived from `plaintext`.
    ///
    /// Both arguments are canonical JSON bytes.  Implementations must never
    /// return the same proof twice.
    fn prove(&self, domain: ProofDomain, plaintext: &[u8], ciphertext: &[u8]) -> Proof;

    /// Checks a proof against the transport form of its ciphertext.
    fn verify(&self, domain: ProofDomain, ciphertext: &[u8], proof: &Proof) -> bool;

    /// Homomorphic addition.
    fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext>;

    /// Homomorphic multiplication.
    fn multiply(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext>;

    /// Label for logs.
    fn name(&self) -> &'static str;
}

/// Unencrypted stand-in backend.
#[derive(Debug, Default)]
pub struct MockCipher {
    sequence: AtomicU64,
}

impl MockCipher {
    /// Creates a mock backend with a fresh nonce sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recovers the plaintext carried by a mock ciphertext.
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<f64> {
        ciphertext
            .as_json()
            .get("value")
            .and_then(Value::as_f64)
            .ok_or_else(|| QuestError::encoding("mock ciphertext missing value"))
    }

    /// Checks that a ciphertext and its proof are present and, when
    /// `expected` is given, that the ciphertext carries exactly that value.
    pub fn verify_encrypted(
        &self,
        ciphertext: &Ciphertext,
        proof: &Proof,
        expected: Option<f64>,
    ) -> bool {
        if proof.is_empty() || ciphertext.as_json().get("encrypted").is_none() {
            return false;
        }
        match (self.decrypt(ciphertext), expected) {
            (Err(_), _) => false,
            (Ok(_), None) => true,
            (Ok(value), Some(expected)) => value == expected,
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    // Random prefix of fixed width followed by the sequence number, so two
    // nonces from one backend can never be equal.
    fn fresh_nonce(&self) -> String {
        let seq = self.next_sequence();
        let mut rng = rand::thread_rng();
        let mut nonce: String = (0..NONCE_LEN)
            .map(|_| NONCE_ALPHABET[rng.gen_range(0..NONCE_ALPHABET.len())] as char)
            .collect();
        nonce.push_str(&to_base36(seq));
        nonce
    }

    fn ciphertext_tag(&self, plaintext: f64, timestamp: u64) -> String {
        let mut hasher = Blake2b256::new();
        hasher.update(CIPHERTEXT_DOMAIN);
        hasher.update(plaintext.to_bits().to_be_bytes());
        hasher.update(timestamp.to_be_bytes());
        hasher.update(self.next_sequence().to_be_bytes());
        hasher.update(rand::thread_rng().gen::<u64>().to_be_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

impl CipherBackend for MockCipher {
    fn encrypt(&self, plaintext: f64) -> Ciphertext {
        let timestamp = unix_millis();
        let tag = self.ciphertext_tag(plaintext, timestamp);
        Ciphertext(json!({
            "value": json_number(plaintext),
            "encrypted": format!("encrypted_{plaintext}_{timestamp}_{tag}"),
            "timestamp": timestamp,
        }))
    }

    fn prove(&self, domain: ProofDomain, plaintext: &[u8], _ciphertext: &[u8]) -> Proof {
        let digest = hex::encode(Sha256::digest(plaintext));
        Proof(format!(
            "{}_{digest}_{}_{}",
            domain.prefix(),
            unix_millis(),
            self.fresh_nonce()
        ))
    }

    fn verify(&self, domain: ProofDomain, ciphertext: &[u8], proof: &Proof) -> bool {
        if ciphertext.is_empty() || proof.is_empty() {
            return false;
        }
        let Some(rest) = proof
            .as_str()
            .strip_prefix(domain.prefix())
            .and_then(|tail| tail.strip_prefix('_'))
        else {
            return false;
        };
        let mut parts = rest.splitn(3, '_');
        let (Some(digest), Some(timestamp), Some(nonce)) = (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        digest.len() == 64
            && digest.bytes().all(|b| b.is_ascii_hexdigit())
            && timestamp.parse::<u64>().is_ok()
            && nonce.len() > NONCE_LEN
            && nonce.bytes().all(|b| NONCE_ALPHABET.contains(&b))
    }

    fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        Ok(self.encrypt(self.decrypt(lhs)? + self.decrypt(rhs)?))
    }

    fn multiply(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        Ok(self.encrypt(self.decrypt(lhs)? * self.decrypt(rhs)?))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Emits integral values without a fractional part, as JavaScript does.
pub(crate) fn json_number(value: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(NONCE_ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_ciphertext_keeps_front_end_shape() {
        let cipher = MockCipher::new();
        let ct = cipher.encrypt(100.0);
        let json = serde_json::to_string(&ct).unwrap();
        assert!(json.starts_with("{\"value\":100,\"encrypted\":\"encrypted_100_"));
        assert!(json.contains("\"timestamp\":"));
        assert_eq!(cipher.decrypt(&ct).unwrap(), 100.0);
    }

    #[test]
    fn fractional_values_stay_fractional() {
        assert_eq!(json_number(1.5).to_string(), "1.5");
        assert_eq!(json_number(3.0).to_string(), "3");
    }

    #[test]
    fn identical_plaintexts_encrypt_differently() {
        let cipher = MockCipher::new();
        assert_ne!(cipher.encrypt(7.0), cipher.encrypt(7.0));
    }

    #[test]
    fn proofs_are_fresh_and_verifiable() {
        let cipher = MockCipher::new();
        let a = cipher.prove(ProofDomain::Value, b"{\"v\":1}", b"ct");
        let b = cipher.prove(ProofDomain::Value, b"{\"v\":1}", b"ct");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("value_proof_"));
        assert!(cipher.verify(ProofDomain::Value, b"ct", &a));
        assert!(!cipher.verify(ProofDomain::Score, b"ct", &a));
        assert!(!cipher.verify(ProofDomain::Value, b"", &a));
        assert!(!cipher.verify(ProofDomain::Value, b"ct", &Proof::new("value_proof_zz")));
    }

    #[test]
    fn homomorphic_ops_follow_plaintext() {
        let cipher = MockCipher::new();
        let a = cipher.encrypt(4.0);
        let b = cipher.encrypt(2.5);
        assert_eq!(cipher.decrypt(&cipher.add(&a, &b).unwrap()).unwrap(), 6.5);
        assert_eq!(cipher.decrypt(&cipher.multiply(&a, &b).unwrap()).unwrap(), 10.0);
    }

    #[test]
    fn verify_encrypted_compares_expected_plaintext() {
        let cipher = MockCipher::new();
        let ct = cipher.encrypt(42.5);
        let proof = cipher.prove(ProofDomain::Value, b"42.5", b"");
        assert!(cipher.verify_encrypted(&ct, &proof, None));
        assert!(cipher.verify_encrypted(&ct, &proof, Some(42.5)));
        assert!(!cipher.verify_encrypted(&ct, &proof, Some(42.0)));
        assert!(!cipher.verify_encrypted(&ct, &Proof::new(""), Some(42.5)));
        let hollow = Ciphertext(json!({"value": 42.5}));
        assert!(!cipher.verify_encrypted(&hollow, &proof, None));
    }

    #[test]
    fn base36_matches_alphabet() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
