use futures::future::{BoxFuture, FutureExt};
use sealed_quest::cipher::{CipherBackend, Ciphertext, MockCipher, Proof, ProofDomain};
use sealed_quest::net::{
    ChainClient, ContractCall, InMemoryChain, OutcomeStatus, Resolution, SubmissionPipeline,
};
use sealed_quest::transport::decode_bytes;
use sealed_quest::{
    decode_payload, decode_proof, CompletionReport, Contribution, ContributionEncoder, Difficulty,
    EncryptedContribution, ParticipantStatus, QuestConfig, QuestError, QuestId, QuestInfo,
    QuestParams, QuestReward, QuestRewardLedger, RewardState, TxHash,
};
use std::sync::Arc;
use tokio::sync::Notify;

fn params(max: u32, threshold: u32) -> QuestParams {
    QuestParams {
        title: "The Forgotten Cipher".into(),
        description: "Decode ancient symbols".into(),
        organizer: "0x1234567890123456789012345678901234567890".into(),
        max_participants: max,
        completion_threshold: threshold,
        start_time: 0,
        duration_secs: 3 * 24 * 3600,
        sealed_reward: None,
    }
}

fn reward() -> QuestReward {
    QuestReward {
        base_reward: 500.0,
        bonus_multiplier: 1.5,
        completion_bonus: 50.0,
    }
}

fn contribution(quest_id: QuestId, who: &str) -> Contribution {
    Contribution {
        amount: 250.0,
        difficulty: Difficulty::Medium,
        time_spent_hours: 4,
        quest_id,
        participant: who.into(),
    }
}

fn report() -> CompletionReport {
    CompletionReport {
        score: 90.0,
        difficulty: Difficulty::Medium,
        time_spent_hours: 3,
    }
}

fn pipeline_with(chain: Arc<InMemoryChain>) -> SubmissionPipeline {
    SubmissionPipeline::new(
        ContributionEncoder::with_mock(),
        Arc::new(QuestRewardLedger::new(QuestConfig::default())),
        chain,
    )
}

#[tokio::test]
async fn join_submits_hex_encoded_call_and_confirms() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let mut outcomes = pipeline.subscribe();

    let (quest_id, _) = pipeline.create_quest(params(4, 2), &reward()).await.unwrap();
    let joined = pipeline
        .join_quest(quest_id, Some("0xalice"), &contribution(quest_id, "0xalice"))
        .await
        .unwrap();
    assert!(joined.tx_hash.starts_with("0x"));
    assert_eq!(joined.receipt.participant_index, 1);
    assert!(pipeline.ledger().pending_operations(quest_id).unwrap().is_empty());

    let calls = chain.submitted();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].function_name(), "createQuest");
    let ContractCall::JoinQuest {
        contribution,
        input_proof,
        ..
    } = &calls[1]
    else {
        panic!("expected joinQuest, got {:?}", calls[1]);
    };
    let payload: EncryptedContribution = decode_payload(contribution).unwrap();
    assert_eq!(payload.difficulty.as_json()["value"], serde_json::json!(1.5));
    let proof = decode_proof(input_proof).unwrap();
    assert!(proof.as_str().starts_with("contribution_proof_"));

    let created = outcomes.recv().await.unwrap();
    assert_eq!(created.operation, "createQuest");
    let confirmed = outcomes.recv().await.unwrap();
    assert_eq!(confirmed.operation, "joinQuest");
    assert_eq!(confirmed.status, OutcomeStatus::Confirmed);
    assert_eq!(confirmed.tx_hash, Some(joined.tx_hash));
}

#[tokio::test]
async fn created_quest_carries_sealed_reward_and_threshold() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let (quest_id, _) = pipeline.create_quest(params(10, 7), &reward()).await.unwrap();
    let info = pipeline.ledger().quest_info(quest_id).unwrap();
    assert_eq!(info.completion_threshold, 7);
    assert_eq!(info.reward_state, RewardState::Sealed);

    let calls = chain.submitted();
    let ContractCall::CreateQuest {
        completion_threshold,
        max_participants,
        ..
    } = &calls[0]
    else {
        panic!("expected createQuest");
    };
    assert_eq!(*max_participants, 10);
    let threshold: Ciphertext = decode_payload(completion_threshold).unwrap();
    assert_eq!(threshold.as_json()["value"], serde_json::json!(7));
}

#[tokio::test]
async fn failed_submission_leaves_join_pending_until_rolled_back() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let (quest_id, _) = pipeline.create_quest(params(1, 1), &reward()).await.unwrap();
    let mut outcomes = pipeline.subscribe();

    chain.fail_next("user rejected the request");
    let err = pipeline
        .join_quest(quest_id, Some("0xalice"), &contribution(quest_id, "0xalice"))
        .await
        .unwrap_err();
    let pending = err.pending().expect("failure carries the pending handle");
    assert!(matches!(err, QuestError::SubmissionFailed { operation: "joinQuest", .. }));

    let info = pipeline.ledger().quest_info(quest_id).unwrap();
    assert_eq!(info.current_participants, 1);
    assert_eq!(info.pending_operations, 1);
    let failed = outcomes.recv().await.unwrap();
    assert!(matches!(failed.status, OutcomeStatus::Failed { .. }));

    // The slot stays taken while the join is unresolved.
    assert!(matches!(
        pipeline
            .join_quest(quest_id, Some("0xbob"), &contribution(quest_id, "0xbob"))
            .await,
        Err(QuestError::CapacityExceeded { .. })
    ));

    pipeline.reconcile(pending, Resolution::Rollback).unwrap();
    let rolled = outcomes.recv().await.unwrap();
    assert_eq!(rolled.status, OutcomeStatus::RolledBack);
    assert_eq!(pipeline.ledger().quest_info(quest_id).unwrap().current_participants, 0);
    assert!(matches!(
        pipeline.resubmit(pending).await,
        Err(QuestError::UnknownPending(_))
    ));
    pipeline
        .join_quest(quest_id, Some("0xbob"), &contribution(quest_id, "0xbob"))
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_submission_can_be_resubmitted() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let (quest_id, _) = pipeline.create_quest(params(2, 1), &reward()).await.unwrap();

    chain.fail_next("network timeout");
    let pending = pipeline
        .join_quest(quest_id, Some("0xalice"), &contribution(quest_id, "0xalice"))
        .await
        .unwrap_err()
        .pending()
        .unwrap();
    let tx_hash = pipeline.resubmit(pending).await.unwrap();
    assert!(tx_hash.starts_with("0x"));
    assert!(pipeline.ledger().pending_operations(quest_id).unwrap().is_empty());
    assert_eq!(
        pipeline.ledger().participant_status(quest_id, "0xalice").unwrap(),
        Some(ParticipantStatus::Joined)
    );
}

#[tokio::test]
async fn manual_confirmation_settles_a_failed_call() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let (quest_id, _) = pipeline.create_quest(params(2, 1), &reward()).await.unwrap();
    pipeline
        .join_quest(quest_id, Some("0xalice"), &contribution(quest_id, "0xalice"))
        .await
        .unwrap();

    chain.fail_next("receipt lookup failed");
    let pending = pipeline
        .complete_quest(quest_id, "0xalice", &report())
        .await
        .unwrap_err()
        .pending()
        .unwrap();
    let settled = pipeline
        .reconcile(pending, Resolution::Confirm("0xfeed".into()))
        .unwrap();
    assert_eq!(settled.tx_hash.as_deref(), Some("0xfeed"));
    assert_eq!(
        pipeline.ledger().quest_info(quest_id).unwrap().reward_state,
        RewardState::Ready
    );
}

#[tokio::test]
async fn full_flow_through_claim() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let (quest_id, _) = pipeline.create_quest(params(2, 2), &reward()).await.unwrap();
    for who in ["0xalice", "0xbob"] {
        pipeline
            .join_quest(quest_id, Some(who), &contribution(quest_id, who))
            .await
            .unwrap();
        pipeline.complete_quest(quest_id, who, &report()).await.unwrap();
    }
    pipeline.reveal_rewards(quest_id).await.unwrap();
    pipeline.claim_reward(quest_id, "0xalice", 100).await.unwrap();
    assert!(matches!(
        pipeline.claim_reward(quest_id, "0xalice", 100).await,
        Err(QuestError::AlreadyClaimed { .. })
    ));

    let names: Vec<_> = chain.submitted().iter().map(ContractCall::function_name).collect();
    assert_eq!(
        names,
        vec![
            "createQuest",
            "joinQuest",
            "completeQuest",
            "joinQuest",
            "completeQuest",
            "revealRewards",
            "claimReward",
        ]
    );
    let ContractCall::ClaimReward { reward_amount, .. } = chain.submitted()[6].clone() else {
        panic!("expected claimReward");
    };
    let raw = decode_bytes(&reward_amount).unwrap();
    let amount: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(amount["value"], serde_json::json!(100));
}

#[tokio::test]
async fn local_validation_happens_before_network() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let (quest_id, _) = pipeline.create_quest(params(2, 1), &reward()).await.unwrap();

    assert_eq!(
        pipeline
            .join_quest(quest_id, None, &contribution(quest_id, "0xalice"))
            .await
            .unwrap_err(),
        QuestError::WalletRequired
    );
    let mut bad = contribution(quest_id, "0xalice");
    bad.amount = -5.0;
    assert!(matches!(
        pipeline.join_quest(quest_id, Some("0xalice"), &bad).await,
        Err(QuestError::Encoding(_))
    ));
    assert!(matches!(
        pipeline.reveal_rewards(quest_id).await,
        Err(QuestError::NotReady(_))
    ));
    assert!(matches!(
        pipeline.create_quest(params(3, 4), &reward()).await,
        Err(QuestError::InvalidQuest(_))
    ));
    assert_eq!(chain.submitted().len(), 1);
}

#[tokio::test]
async fn contribution_for_another_quest_or_wallet_is_refused() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let (quest_id, _) = pipeline.create_quest(params(2, 1), &reward()).await.unwrap();

    assert!(matches!(
        pipeline
            .join_quest(quest_id, Some("0xalice"), &contribution(12345, "0xmallory"))
            .await,
        Err(QuestError::Encoding(_))
    ));
    assert!(matches!(
        pipeline
            .join_quest(quest_id, Some("0xalice"), &contribution(quest_id, "0xmallory"))
            .await,
        Err(QuestError::Encoding(_))
    ));
    assert_eq!(chain.submitted().len(), 1);
    assert_eq!(pipeline.ledger().quest_info(quest_id).unwrap().current_participants, 0);
}

#[tokio::test]
async fn calls_target_the_configured_contract() {
    let address = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = SubmissionPipeline::new(
        ContributionEncoder::with_mock(),
        Arc::new(QuestRewardLedger::new(QuestConfig {
            contract_address: address.into(),
            ..QuestConfig::default()
        })),
        chain.clone(),
    );
    let (quest_id, _) = pipeline.create_quest(params(2, 1), &reward()).await.unwrap();
    pipeline
        .join_quest(quest_id, Some("0xalice"), &contribution(quest_id, "0xalice"))
        .await
        .unwrap();
    chain.fail_next("nonce too low");
    let pending = pipeline
        .complete_quest(quest_id, "0xalice", &report())
        .await
        .unwrap_err()
        .pending()
        .unwrap();
    pipeline.resubmit(pending).await.unwrap();

    let targets = chain.targets();
    assert_eq!(targets.len(), 3);
    assert!(targets.iter().all(|target| target == address));
}

/// Holds every submission until the gate opens.
#[derive(Default)]
struct GatedChain {
    gate: Notify,
}

impl ChainClient for GatedChain {
    fn submit<'a>(
        &'a self,
        _contract: &'a str,
        _call: &'a ContractCall,
    ) -> BoxFuture<'a, Result<TxHash, String>> {
        async move {
            self.gate.notified().await;
            Ok("0xlanded".to_string())
        }
        .boxed()
    }

    fn quest_info(&self, quest_id: QuestId) -> BoxFuture<'_, Result<QuestInfo, String>> {
        async move { Err(format!("quest {quest_id} not deployed")) }.boxed()
    }
}

#[tokio::test]
async fn in_flight_call_cannot_be_reconciled() {
    let chain = Arc::new(GatedChain::default());
    let pipeline = SubmissionPipeline::new(
        ContributionEncoder::with_mock(),
        Arc::new(QuestRewardLedger::default()),
        chain.clone(),
    );
    let quest_id = pipeline.ledger().create_quest(params(2, 1)).unwrap();

    let alice_contribution = contribution(quest_id, "0xalice");
    let (joined, _) = tokio::join!(
        pipeline.join_quest(quest_id, Some("0xalice"), &alice_contribution),
        async {
            let pending = loop {
                let ops = pipeline.ledger().pending_operations(quest_id).unwrap();
                if let Some(op) = ops.first() {
                    break op.id;
                }
                tokio::task::yield_now().await;
            };
            assert_eq!(
                pipeline.reconcile(pending, Resolution::Rollback),
                Err(QuestError::UnknownPending(pending))
            );
            chain.gate.notify_one();
        }
    );

    assert_eq!(joined.unwrap().tx_hash, "0xlanded");
    assert!(pipeline.ledger().pending_operations(quest_id).unwrap().is_empty());
    assert_eq!(
        pipeline.ledger().participant_status(quest_id, "0xalice").unwrap(),
        Some(ParticipantStatus::Joined)
    );
}

#[tokio::test]
async fn ledger_only_operation_is_not_reconciled_by_the_pipeline() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let quest_id = pipeline.ledger().create_quest(params(2, 1)).unwrap();
    let enc = ContributionEncoder::with_mock();
    let sealed = enc
        .encrypt_contribution(&contribution(quest_id, "0xalice"))
        .unwrap();
    let receipt = pipeline
        .ledger()
        .join(quest_id, Some("0xalice"), sealed)
        .unwrap();
    assert_eq!(
        pipeline.reconcile(receipt.pending, Resolution::Confirm("0xfeed".into())),
        Err(QuestError::UnknownPending(receipt.pending))
    );
    assert_eq!(pipeline.ledger().pending_operations(quest_id).unwrap().len(), 1);
}

struct DistrustfulCipher(MockCipher);

impl CipherBackend for DistrustfulCipher {
    fn encrypt(&self, plaintext: f64) -> Ciphertext {
        self.0.encrypt(plaintext)
    }

    fn prove(&self, domain: ProofDomain, plaintext: &[u8], ciphertext: &[u8]) -> Proof {
        self.0.prove(domain, plaintext, ciphertext)
    }

    fn verify(&self, _domain: ProofDomain, _ciphertext: &[u8], _proof: &Proof) -> bool {
        false
    }

    fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> sealed_quest::Result<Ciphertext> {
        self.0.add(lhs, rhs)
    }

    fn multiply(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> sealed_quest::Result<Ciphertext> {
        self.0.multiply(lhs, rhs)
    }

    fn name(&self) -> &'static str {
        "distrustful"
    }
}

#[tokio::test]
async fn rejected_proof_never_touches_the_ledger() {
    let chain = Arc::new(InMemoryChain::new());
    let ledger = Arc::new(QuestRewardLedger::default());
    let quest_id = ledger.create_quest(params(2, 1)).unwrap();
    let pipeline = SubmissionPipeline::new(
        ContributionEncoder::new(Arc::new(DistrustfulCipher(MockCipher::new()))),
        ledger.clone(),
        chain.clone(),
    );
    assert_eq!(
        pipeline
            .join_quest(quest_id, Some("0xalice"), &contribution(quest_id, "0xalice"))
            .await
            .unwrap_err(),
        QuestError::ProofRejected {
            backend: "distrustful"
        }
    );
    assert_eq!(ledger.quest_info(quest_id).unwrap().current_participants, 0);
    assert!(chain.submitted().is_empty());

    let lenient = SubmissionPipeline::new(
        ContributionEncoder::new(Arc::new(DistrustfulCipher(MockCipher::new()))),
        Arc::new(QuestRewardLedger::new(QuestConfig {
            verify_proofs: false,
            ..QuestConfig::default()
        })),
        chain.clone(),
    );
    let lenient_id = lenient.ledger().create_quest(params(2, 1)).unwrap();
    assert!(lenient
        .join_quest(lenient_id, Some("0xalice"), &contribution(lenient_id, "0xalice"))
        .await
        .is_ok());
}

#[tokio::test]
async fn chain_view_is_read_through_the_client() {
    let chain = Arc::new(InMemoryChain::new());
    let pipeline = pipeline_with(chain.clone());
    let (quest_id, _) = pipeline.create_quest(params(2, 1), &reward()).await.unwrap();
    assert!(matches!(
        pipeline.chain_quest_info(quest_id).await,
        Err(QuestError::SubmissionFailed {
            operation: "getQuestInfo",
            ..
        })
    ));
    chain.publish(pipeline.ledger().quest_info(quest_id).unwrap());
    let info = pipeline.chain_quest_info(quest_id).await.unwrap();
    assert_eq!(info.title, "The Forgotten Cipher");
}
