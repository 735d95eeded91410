//! The model triple and the engine's model state

use crate::error::ScoringError;
use crate::feature_extractor::FeatureVector;
use crate::models::classifier::{checked_probability, Classifier};
use crate::types::decision::ModelScores;
use std::sync::Arc;
use tracing::debug;

/// Neighbor-based, random forest and gradient boosted classifiers trained on
/// one feature schema. Immutable after load.
#[derive(Clone)]
pub struct ModelTriple {
    knn: Arc<dyn Classifier>,
    random_forest: Arc<dyn Classifier>,
    xgboost: Arc<dyn Classifier>,
}

impl ModelTriple {
    pub fn new(
        knn: Arc<dyn Classifier>,
        random_forest: Arc<dyn Classifier>,
        xgboost: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            knn,
            random_forest,
            xgboost,
        }
    }

    /// Query every member. Any failure fails the whole score.
    pub fn score(&self, features: &FeatureVector) -> Result<ModelScores, ScoringError> {
        let scores = ModelScores {
            knn: Self::query(self.knn.as_ref(), features)?,
            random_forest: Self::query(self.random_forest.as_ref(), features)?,
            xgboost: Self::query(self.xgboost.as_ref(), features)?,
        };

        debug!(
            knn = scores.knn,
            random_forest = scores.random_forest,
            xgboost = scores.xgboost,
            "Model triple scored"
        );

        Ok(scores)
    }

    fn query(model: &dyn Classifier, features: &FeatureVector) -> Result<f64, ScoringError> {
        let prob = model.predict_proba(features)?;
        checked_probability(model.name(), prob)
    }

    /// The most trusted member; explanations are computed against it.
    pub fn xgboost(&self) -> &Arc<dyn Classifier> {
        &self.xgboost
    }

    pub fn model_names(&self) -> [&str; 3] {
        [self.knn.name(), self.random_forest.name(), self.xgboost.name()]
    }
}

/// Models available to the engine for the process lifetime.
#[derive(Clone)]
pub enum ModelState {
    Ready(ModelTriple),
    /// No usable artifact; decisions fall back to a fixed disposition.
    Degraded { reason: String },
}

impl ModelState {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ModelState::Degraded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::{FeatureMap, FeatureSchema};

    struct Fixed(&'static str, f64);

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn predict_proba(&self, _features: &FeatureVector) -> Result<f64, ScoringError> {
            Ok(self.1)
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn name(&self) -> &str {
            "random_forest"
        }

        fn predict_proba(&self, _features: &FeatureVector) -> Result<f64, ScoringError> {
            Err(ScoringError::Inference {
                model: "random_forest".to_string(),
                message: "incompatible shape".to_string(),
            })
        }
    }

    fn vector() -> FeatureVector {
        FeatureSchema::default().coerce(&FeatureMap::new())
    }

    #[test]
    fn test_triple_scores_in_order() {
        let triple = ModelTriple::new(
            Arc::new(Fixed("knn", 0.2)),
            Arc::new(Fixed("random_forest", 0.5)),
            Arc::new(Fixed("xgboost", 0.6)),
        );

        let scores = triple.score(&vector()).unwrap();
        assert_eq!(scores.as_array(), [0.2, 0.5, 0.6]);
        assert_eq!(triple.model_names(), ["knn", "random_forest", "xgboost"]);
    }

    #[test]
    fn test_failure_propagates() {
        let triple = ModelTriple::new(
            Arc::new(Fixed("knn", 0.2)),
            Arc::new(Broken),
            Arc::new(Fixed("xgboost", 0.6)),
        );

        assert!(matches!(
            triple.score(&vector()),
            Err(ScoringError::Inference { .. })
        ));
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        let triple = ModelTriple::new(
            Arc::new(Fixed("knn", 0.2)),
            Arc::new(Fixed("random_forest", 0.5)),
            Arc::new(Fixed("xgboost", 1.5)),
        );

        assert!(matches!(
            triple.score(&vector()),
            Err(ScoringError::InvalidProbability { .. })
        ));
    }
}
