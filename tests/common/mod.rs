#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use transfer_risk_engine::explain::{ExplanationRanker, KernelExplainer};
use transfer_risk_engine::models::ScoreCombiner;
use transfer_risk_engine::{
    Classifier, FeatureSchema, FeatureVector, ModelTriple, RiskEngine, ScoringError, ThresholdPair,
};

/// Always answers the same probability
pub struct Fixed {
    pub name: &'static str,
    pub prob: f64,
}

impl Classifier for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    fn predict_proba(&self, _features: &FeatureVector) -> Result<f64, ScoringError> {
        Ok(self.prob)
    }
}

/// `bias + sum(w_i * x_i)`, clamped to [0, 1]
pub struct Linear {
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl Classifier for Linear {
    fn name(&self) -> &str {
        "xgboost"
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        let raw = self.bias
            + features
                .values()
                .iter()
                .zip(&self.weights)
                .map(|(x, w)| x * w)
                .sum::<f64>();
        Ok(raw.clamp(0.0, 1.0))
    }
}

/// Fails every call like a model fed an incompatible tensor
pub struct Broken;

impl Classifier for Broken {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        Err(ScoringError::ShapeMismatch {
            model: "random_forest".to_string(),
            expected: 7,
            actual: features.len(),
        })
    }
}

/// Fixed probability after a delay
pub struct Slow {
    pub prob: f64,
    pub delay: Duration,
}

impl Classifier for Slow {
    fn name(&self) -> &str {
        "xgboost"
    }

    fn predict_proba(&self, _features: &FeatureVector) -> Result<f64, ScoringError> {
        std::thread::sleep(self.delay);
        Ok(self.prob)
    }
}

pub fn fixed(name: &'static str, prob: f64) -> Arc<dyn Classifier> {
    Arc::new(Fixed { name, prob })
}

pub fn triple(p_knn: f64, p_rf: f64, p_xgb: f64) -> ModelTriple {
    ModelTriple::new(
        fixed("knn", p_knn),
        fixed("random_forest", p_rf),
        fixed("xgboost", p_xgb),
    )
}

pub fn engine_with(triple: ModelTriple, step_up: f64) -> RiskEngine {
    RiskEngine::new(
        triple,
        FeatureSchema::default(),
        ThresholdPair::with_step_up(step_up).unwrap(),
        ScoreCombiner::default(),
        "Ensemble AI v1",
    )
}

pub fn engine(p_knn: f64, p_rf: f64, p_xgb: f64) -> RiskEngine {
    engine_with(triple(p_knn, p_rf, p_xgb), 0.3)
}

pub fn with_timeout(engine: RiskEngine, timeout: Duration) -> RiskEngine {
    engine.with_explanation(KernelExplainer::default(), ExplanationRanker::default(), timeout)
}
