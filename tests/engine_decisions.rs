mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use transfer_risk_engine::engine::{DEGRADED_LABEL, DEGRADED_REASON, DEGRADED_SCORE};
use transfer_risk_engine::types::RawNumber;
use transfer_risk_engine::{
    Disposition, FeatureSchema, ModelTriple, RiskEngine, ScoringError, ThresholdPair,
    TransferRequest,
};

fn request() -> TransferRequest {
    TransferRequest::new("tx_100", "1001", "2002", 0.5, 1.0)
}

#[test]
fn test_low_scores_approve() {
    let engine = engine(0.1, 0.1, 0.1);
    let assessment = engine.assess(&request()).unwrap();

    assert!((assessment.decision.risk_score - 0.1).abs() < 1e-12);
    assert_eq!(assessment.decision.disposition, Disposition::Approve);
    assert!(assessment.freeze.is_none());
}

#[test]
fn test_high_scores_block() {
    let engine = engine(0.9, 0.9, 0.9);
    let assessment = engine.assess(&request()).unwrap();

    assert!((assessment.decision.risk_score - 0.9).abs() < 1e-12);
    assert_eq!(assessment.decision.disposition, Disposition::Block);
    assert!(assessment.freeze.is_some());
}

#[test]
fn test_mixed_scores_step_up() {
    let engine = engine(0.2, 0.5, 0.5);
    let assessment = engine.assess(&request()).unwrap();

    assert_eq!(
        assessment.decision.risk_score,
        (0.2 * 1.0 + 0.5 * 2.0 + 0.5 * 3.0) / 6.0
    );
    assert_eq!(
        assessment.decision.disposition,
        Disposition::StepUpVerification
    );
    assert!(assessment.freeze.is_none());
}

#[test]
fn test_insignificant_attributions_fall_back() {
    // constant models give all-zero attributions
    for (p, expected) in [
        (0.1, Disposition::Approve),
        (0.5, Disposition::StepUpVerification),
        (0.9, Disposition::Block),
    ] {
        let engine = engine(p, p, p);
        let assessment = engine.assess(&request().with_explanation()).unwrap();

        assert_eq!(assessment.decision.disposition, expected);
        assert_eq!(
            assessment.decision.explanation,
            Some(vec!["high risk profile".to_string()])
        );
        assert!(!assessment.explanation_fallback);
    }
}

#[test]
fn test_threshold_boundaries_fall_through() {
    let thresholds = ThresholdPair::with_step_up(0.3).unwrap();

    assert_eq!(Disposition::from_score(0.3, &thresholds), Disposition::Approve);
    assert_eq!(
        Disposition::from_score(0.7, &thresholds),
        Disposition::StepUpVerification
    );
    assert_eq!(
        Disposition::from_score(0.3 + f64::EPSILON, &thresholds),
        Disposition::StepUpVerification
    );
    assert_eq!(
        Disposition::from_score(0.7 + f64::EPSILON, &thresholds),
        Disposition::Block
    );
}

#[test]
fn test_explanation_names_driving_features() {
    // xgboost output: 0.1 + 0.8 * Weight + 0.3 * typeTrans = 0.8
    let triple = ModelTriple::new(
        fixed("knn", 0.9),
        fixed("random_forest", 0.9),
        Arc::new(Linear {
            bias: 0.1,
            weights: vec![0.0, 0.0, 0.8, 0.3],
        }),
    );
    let engine = engine_with(triple, 0.3);
    let assessment = engine
        .assess(&TransferRequest::new("tx_101", "1", "0", 0.5, 1.0))
        .unwrap();

    assert_eq!(assessment.decision.disposition, Disposition::Block);
    assert_eq!(
        assessment.decision.explanation,
        Some(vec![
            "Unusual transaction amount".to_string(),
            "High-risk transaction type".to_string(),
        ])
    );

    let freeze = assessment.freeze.unwrap();
    assert_eq!(freeze.account_id, "1");
    assert_eq!(freeze.reasons.len(), 2);
}

#[test]
fn test_explanation_has_at_most_three_reasons() {
    let triple = ModelTriple::new(
        fixed("knn", 0.5),
        fixed("random_forest", 0.5),
        Arc::new(Linear {
            bias: 0.0,
            weights: vec![0.1, 0.2, 0.3, 0.25],
        }),
    );
    let engine = engine_with(triple, 0.3);
    let assessment = engine
        .assess(&TransferRequest::new("tx_102", "1", "1", 1.0, 1.0))
        .unwrap();

    let reasons = assessment.decision.explanation.unwrap();
    assert_eq!(
        reasons,
        vec![
            "Unusual transaction amount".to_string(),
            "High-risk transaction type".to_string(),
            "Receiver account is linked to suspicious activity".to_string(),
        ]
    );
}

#[test]
fn test_missing_field_scores_as_zero() {
    let triple = ModelTriple::new(
        fixed("knn", 0.2),
        fixed("random_forest", 0.4),
        Arc::new(Linear {
            bias: 0.05,
            weights: vec![0.0001, 0.0002, 0.3, 0.1],
        }),
    );
    let engine = engine_with(triple, 0.3);

    let mut omitted = TransferRequest::new("tx_103", "1001", "2002", 0.7, 2.0);
    omitted.receiver_account = None;
    let mut zeroed = omitted.clone();
    zeroed.receiver_account = Some(RawNumber::Number(0.0));
    let mut garbage = omitted.clone();
    garbage.receiver_account = Some(RawNumber::Text("not-a-number".to_string()));

    let a = engine.score(&engine.extractor().extract(&omitted)).unwrap();
    let b = engine.score(&engine.extractor().extract(&zeroed)).unwrap();
    let c = engine.score(&engine.extractor().extract(&garbage)).unwrap();

    assert_eq!(a, b);
    assert_eq!(a, c);
}

#[test]
fn test_classifier_failure_is_not_decided() {
    let triple = ModelTriple::new(fixed("knn", 0.1), Arc::new(Broken), fixed("xgboost", 0.1));
    let engine = engine_with(triple, 0.3);

    let result = engine.assess(&request());
    assert!(matches!(result, Err(ScoringError::ShapeMismatch { .. })));
}

#[test]
fn test_out_of_range_probability_is_rejected() {
    let engine = engine(0.1, 1.5, 0.1);
    let result = engine.assess(&request());
    assert!(matches!(
        result,
        Err(ScoringError::InvalidProbability { .. })
    ));
}

#[test]
fn test_degraded_engine_escalates_everything() {
    let engine = RiskEngine::degraded(
        "artifact not found",
        FeatureSchema::default(),
        ThresholdPair::default(),
    );

    for req in [request(), request().with_explanation()] {
        let assessment = engine.assess(&req).unwrap();
        let decision = assessment.decision;
        assert_eq!(decision.disposition, Disposition::StepUpVerification);
        assert_eq!(decision.risk_score, DEGRADED_SCORE);
        assert_eq!(decision.model, DEGRADED_LABEL);
        assert_eq!(decision.explanation, Some(vec![DEGRADED_REASON.to_string()]));
        assert!(decision.degraded);
        assert!(assessment.freeze.is_none());
    }
}

#[test]
fn test_expired_explanation_budget_keeps_decision() {
    let triple = ModelTriple::new(
        fixed("knn", 0.9),
        fixed("random_forest", 0.9),
        Arc::new(Slow {
            prob: 0.9,
            delay: Duration::from_millis(5),
        }),
    );
    let engine = with_timeout(engine_with(triple, 0.3), Duration::from_millis(1));

    let assessment = engine.assess(&request()).unwrap();
    assert_eq!(assessment.decision.disposition, Disposition::Block);
    assert_eq!(
        assessment.decision.explanation,
        Some(vec!["high risk profile".to_string()])
    );
    assert!(assessment.explanation_fallback);
    assert!(assessment.freeze.is_some());
}

#[tokio::test]
async fn test_async_explanation_timeout_falls_back() {
    let triple = ModelTriple::new(
        fixed("knn", 0.5),
        fixed("random_forest", 0.5),
        Arc::new(Slow {
            prob: 0.5,
            delay: Duration::from_millis(20),
        }),
    );
    let engine = Arc::new(with_timeout(
        engine_with(triple, 0.3),
        Duration::from_millis(5),
    ));

    let assessment = engine.assess_async(&request()).await.unwrap();
    assert_eq!(
        assessment.decision.disposition,
        Disposition::StepUpVerification
    );
    assert_eq!(
        assessment.decision.explanation,
        Some(vec!["high risk profile".to_string()])
    );
}

#[test]
fn test_decision_serializes_for_the_wire() {
    let engine = engine(0.2, 0.5, 0.5);
    let assessment = engine.assess(&request()).unwrap();
    let value = serde_json::to_value(&assessment.decision).unwrap();

    assert_eq!(value["disposition"], "STEP_UP_VERIFICATION");
    assert_eq!(value["model"], "Ensemble AI v1");
    assert_eq!(value["degraded"], false);
    assert!(value["explanation"].is_array());
}
