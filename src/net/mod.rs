//! Contract submission layer.
//!
//! Gated behind the `net` Cargo feature.  [`client`] describes the contract
//! calls and the [`ChainClient`] collaborator that carries them; [`pipeline`]
//! ties the encoder, the ledger and a client into the speculative
//! apply/submit/confirm flow.

#![cfg(feature = "net")]

/// Contract calls and chain collaborators.
pub mod client;
/// Speculative submission and reconciliation.
pub mod pipeline;

pub use client::{ChainClient, ContractCall, InMemoryChain};
pub use pipeline::{
    JoinConfirmation, OperationOutcome, OutcomeStatus, Resolution, SubmissionPipeline,
};
