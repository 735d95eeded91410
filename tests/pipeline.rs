mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use transfer_risk_engine::accounts::{AccountGate, AccountStatus};
use transfer_risk_engine::metrics::EngineMetrics;
use transfer_risk_engine::pipeline::{TransferProcessor, HOLD_REASON};
use transfer_risk_engine::types::RawNumber;
use transfer_risk_engine::{
    Disposition, FeatureSchema, ModelTriple, RiskEngine, ThresholdPair, TransferReply,
    TransferRequest,
};

fn processor(engine: RiskEngine) -> TransferProcessor {
    TransferProcessor::new(
        Arc::new(engine),
        Arc::new(AccountGate::new()),
        Arc::new(EngineMetrics::new()),
    )
}

fn transfer(id: &str, sender: &str) -> TransferRequest {
    TransferRequest::new(id, sender, "2002", 900.0, 1.0)
}

#[tokio::test]
async fn test_block_holds_sender_and_rejects_followups() {
    let processor = processor(engine(0.9, 0.9, 0.9));

    let first = processor.process(&transfer("tx_1", "1001")).await;
    match &first.reply {
        TransferReply::Decided(decision) => assert_eq!(decision.disposition, Disposition::Block),
        other => panic!("unexpected reply {:?}", other),
    }
    let freeze = first.freeze.expect("BLOCK must emit a freeze");
    assert_eq!(freeze.account_id, "1001");
    assert_eq!(freeze.transaction_id, "tx_1");
    assert_eq!(
        processor.accounts().status("1001"),
        Some(AccountStatus::Hold)
    );

    let second = processor.process(&transfer("tx_2", "1001")).await;
    match &second.reply {
        TransferReply::Rejected {
            transaction_id,
            reason,
        } => {
            assert_eq!(transaction_id, "tx_2");
            assert_eq!(reason, HOLD_REASON);
        }
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(second.freeze.is_none());

    let metrics = processor.metrics();
    assert_eq!(metrics.blocked.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.freezes_issued.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.rejected.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_other_senders_are_unaffected_by_hold() {
    let processor = processor(engine(0.9, 0.9, 0.9));

    processor.process(&transfer("tx_1", "1001")).await;
    let other = processor.process(&transfer("tx_2", "3003")).await;

    assert!(matches!(other.reply, TransferReply::Decided(_)));
    assert!(other.freeze.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_from_one_sender_freeze_once() {
    let processor = processor(engine(0.9, 0.9, 0.9));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let processor = processor.clone();
            tokio::spawn(async move {
                processor
                    .process(&transfer(&format!("tx_{}", i), "1001"))
                    .await
            })
        })
        .collect();

    let mut decided = 0;
    let mut rejected = 0;
    let mut freezes = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        match outcome.reply {
            TransferReply::Decided(_) => decided += 1,
            TransferReply::Rejected { .. } => rejected += 1,
            TransferReply::Failed { .. } => panic!("scoring should not fail"),
        }
        if outcome.freeze.is_some() {
            freezes += 1;
        }
    }

    assert_eq!(decided, 1);
    assert_eq!(rejected, 7);
    assert_eq!(freezes, 1);
}

#[tokio::test]
async fn test_step_up_does_not_hold_sender() {
    let processor = processor(engine(0.2, 0.5, 0.5));

    for id in ["tx_1", "tx_2"] {
        let outcome = processor.process(&transfer(id, "1001")).await;
        match outcome.reply {
            TransferReply::Decided(decision) => {
                assert_eq!(decision.disposition, Disposition::StepUpVerification);
                assert!(!decision.explanation.unwrap().is_empty());
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(outcome.freeze.is_none());
    }
    assert_eq!(
        processor.accounts().status("1001"),
        Some(AccountStatus::Active)
    );
}

#[tokio::test]
async fn test_scoring_failure_is_reported() {
    let triple = ModelTriple::new(fixed("knn", 0.9), Arc::new(Broken), fixed("xgboost", 0.9));
    let processor = processor(engine_with(triple, 0.3));

    let outcome = processor.process(&transfer("tx_1", "1001")).await;
    match outcome.reply {
        TransferReply::Failed {
            transaction_id,
            error,
        } => {
            assert_eq!(transaction_id, "tx_1");
            assert!(error.contains("random_forest"));
        }
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(outcome.freeze.is_none());
    assert_eq!(processor.metrics().failures.load(Ordering::Relaxed), 1);
    assert_eq!(
        processor.accounts().status("1001"),
        Some(AccountStatus::Active)
    );
}

#[tokio::test]
async fn test_degraded_processing_never_freezes() {
    let processor = processor(RiskEngine::degraded(
        "artifact not found",
        FeatureSchema::default(),
        ThresholdPair::default(),
    ));

    let outcome = processor.process(&transfer("tx_1", "1001")).await;
    match outcome.reply {
        TransferReply::Decided(decision) => {
            assert_eq!(decision.disposition, Disposition::StepUpVerification);
            assert!(decision.degraded);
        }
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(outcome.freeze.is_none());
    assert_eq!(processor.metrics().degraded.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_hold_applies_to_every_spelling_of_the_sender() {
    let processor = processor(engine(0.9, 0.9, 0.9));

    let first = processor.process(&transfer("tx_1", "1001")).await;
    assert!(first.freeze.is_some());

    let mut numeric = transfer("tx_4", "0");
    numeric.sender_account = Some(RawNumber::Number(1001.0));
    let followups = [
        transfer("tx_2", "1001.0"),
        transfer("tx_3", "01001"),
        numeric,
    ];
    for request in &followups {
        let outcome = processor.process(request).await;
        assert!(
            matches!(outcome.reply, TransferReply::Rejected { .. }),
            "{:?} was not rejected",
            request.sender_account
        );
        assert!(outcome.freeze.is_none());
    }
    assert_eq!(processor.metrics().rejected.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn test_senderless_block_is_neither_gated_nor_frozen() {
    let processor = processor(engine(0.9, 0.9, 0.9));

    for id in ["tx_1", "tx_2"] {
        let mut request = transfer(id, "0");
        request.sender_account = None;
        let outcome = processor.process(&request).await;

        match outcome.reply {
            TransferReply::Decided(decision) => {
                assert_eq!(decision.disposition, Disposition::Block)
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(outcome.freeze.is_none());
    }

    assert!(processor.accounts().is_empty());
    assert_eq!(processor.metrics().rejected.load(Ordering::Relaxed), 0);
    assert_eq!(processor.metrics().freezes_issued.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_gate_forgets_active_senders() {
    let processor = processor(engine(0.1, 0.1, 0.1));

    for (i, sender) in ["1001", "2002", "3003", "4004"].iter().enumerate() {
        let outcome = processor
            .process(&transfer(&format!("tx_{}", i), sender))
            .await;
        assert!(matches!(outcome.reply, TransferReply::Decided(_)));
    }

    assert!(processor.accounts().is_empty());
}
