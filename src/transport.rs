//! Wire encoding for the contract's `bytes` arguments.
//!
//! Payloads travel as `0x` followed by the lowercase hex of the UTF-8 JSON
//! serialisation; proofs travel as `0x` followed by the lowercase hex of the
//! proof string itself.  Both forms are deterministic for a given input.

use crate::cipher::Proof;
use crate::error::{QuestError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

const HEX_PREFIX: &str = "0x";

/// Encodes an encrypted payload into its `bytes` argument form.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<String> {
    let json = serde_json::to_vec(payload)
        .map_err(|err| QuestError::encoding(format!("payload serialisation failed: {err}")))?;
    Ok(encode_bytes(&json))
}

/// Decodes a `bytes` argument produced by [`encode_payload`].
pub fn decode_payload<T: DeserializeOwned>(encoded: &str) -> Result<T> {
    let bytes = decode_bytes(encoded)?;
    serde_json::from_slice(&bytes)
        .map_err(|err| QuestError::encoding(format!("payload decode failed: {err}")))
}

/// Encodes a proof into its `bytes` argument form.
pub fn encode_proof(proof: &Proof) -> String {
    encode_bytes(proof.as_str().as_bytes())
}

/// Decodes a `bytes` argument produced by [`encode_proof`].
pub fn decode_proof(encoded: &str) -> Result<Proof> {
    let bytes = decode_bytes(encoded)?;
    let text = String::from_utf8(bytes)
        .map_err(|err| QuestError::encoding(format!("proof is not utf-8: {err}")))?;
    Ok(Proof::new(text))
}

/// Prefixes the lowercase hex form of `bytes` with `0x`.
pub fn encode_bytes(bytes: &[u8]) -> String {
    format!("{HEX_PREFIX}{}", hex::encode(bytes))
}

/// Strips the `0x` prefix and decodes the remaining hex.
pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>> {
    let digits = encoded
        .strip_prefix(HEX_PREFIX)
        .ok_or_else(|| QuestError::encoding("missing 0x prefix"))?;
    hex::decode(digits).map_err(|err| QuestError::encoding(format!("invalid hex: {err}")))
}
