//! Policy constants for combining scores and cutting dispositions.
//!
//! Downstream thresholds were tuned against the (1, 2, 3) ensemble weighting,
//! so these values are injected at startup rather than baked into the
//! combination code, and can be tested on their own.

use crate::error::PolicyError;
use serde::{Deserialize, Serialize};

/// Scores strictly above this are blocked and the sender frozen.
pub const BLOCK_THRESHOLD: f64 = 0.7;

/// Step-up threshold used when the artifact does not supply one.
pub const DEFAULT_STEP_UP_THRESHOLD: f64 = 0.3;

pub const KNN_WEIGHT: f64 = 1.0;
pub const RANDOM_FOREST_WEIGHT: f64 = 2.0;
pub const XGBOOST_WEIGHT: f64 = 3.0;

/// Fixed, unequal weights for the model triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub knn: f64,
    pub random_forest: f64,
    pub xgboost: f64,
}

impl EnsembleWeights {
    pub fn new(knn: f64, random_forest: f64, xgboost: f64) -> Result<Self, PolicyError> {
        let weights = Self {
            knn,
            random_forest,
            xgboost,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let all = [self.knn, self.random_forest, self.xgboost];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) || self.total() <= 0.0 {
            return Err(PolicyError::InvalidWeights);
        }
        Ok(())
    }

    /// Sum of weights, accumulated in model order.
    pub fn total(&self) -> f64 {
        self.knn + self.random_forest + self.xgboost
    }
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            knn: KNN_WEIGHT,
            random_forest: RANDOM_FOREST_WEIGHT,
            xgboost: XGBOOST_WEIGHT,
        }
    }
}

/// Block and step-up cutoffs. Invariant: `block > step_up`, both in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdPair {
    block: f64,
    step_up: f64,
}

impl ThresholdPair {
    pub fn new(block: f64, step_up: f64) -> Result<Self, PolicyError> {
        for (name, value) in [("block", block), ("step_up", step_up)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PolicyError::ThresholdOutOfRange { name, value });
            }
        }
        if block <= step_up {
            return Err(PolicyError::ThresholdOrder { block, step_up });
        }
        Ok(Self { block, step_up })
    }

    /// Policy block threshold with the artifact's step-up threshold.
    pub fn with_step_up(step_up: f64) -> Result<Self, PolicyError> {
        Self::new(BLOCK_THRESHOLD, step_up)
    }

    pub fn block(&self) -> f64 {
        self.block
    }

    pub fn step_up(&self) -> f64 {
        self.step_up
    }
}

impl Default for ThresholdPair {
    fn default() -> Self {
        Self {
            block: BLOCK_THRESHOLD,
            step_up: DEFAULT_STEP_UP_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let weights = EnsembleWeights::default();
        assert_eq!(weights.total(), 6.0);

        let thresholds = ThresholdPair::default();
        assert_eq!(thresholds.block(), 0.7);
        assert_eq!(thresholds.step_up(), 0.3);
    }

    #[test]
    fn test_threshold_order_enforced() {
        assert_eq!(
            ThresholdPair::new(0.5, 0.5),
            Err(PolicyError::ThresholdOrder {
                block: 0.5,
                step_up: 0.5
            })
        );
        assert!(ThresholdPair::with_step_up(0.8).is_err());
        assert!(ThresholdPair::with_step_up(0.69).is_ok());
    }

    #[test]
    fn test_threshold_range_enforced() {
        assert!(matches!(
            ThresholdPair::new(1.2, 0.3),
            Err(PolicyError::ThresholdOutOfRange { name: "block", .. })
        ));
        assert!(ThresholdPair::new(0.7, f64::NAN).is_err());
    }

    #[test]
    fn test_invalid_weights() {
        assert!(EnsembleWeights::new(0.0, 0.0, 0.0).is_err());
        assert!(EnsembleWeights::new(-1.0, 2.0, 3.0).is_err());
        assert!(EnsembleWeights::new(1.0, f64::INFINITY, 3.0).is_err());
        assert!(EnsembleWeights::new(0.0, 0.0, 1.0).is_ok());
    }
}
