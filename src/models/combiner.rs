//! Weighted score combination for the model triple

use crate::policy::EnsembleWeights;
use crate::types::decision::ModelScores;

/// Merges the three model probabilities into one risk score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreCombiner {
    weights: EnsembleWeights,
}

impl ScoreCombiner {
    pub fn new(weights: EnsembleWeights) -> Self {
        Self { weights }
    }

    /// Weighted average in model order.
    ///
    /// With default weights this is exactly `(p_knn*1 + p_rf*2 + p_xgb*3) / 6`,
    /// evaluated in the same order so results match the tuned thresholds bit
    /// for bit.
    pub fn combine(&self, scores: &ModelScores) -> f64 {
        let w = &self.weights;
        (scores.knn * w.knn + scores.random_forest * w.random_forest + scores.xgboost * w.xgboost)
            / w.total()
    }

    /// Population standard deviation of the three scores.
    pub fn spread(scores: &ModelScores) -> f64 {
        let all = scores.as_array();
        let mean = all.iter().sum::<f64>() / all.len() as f64;
        let variance = all.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / all.len() as f64;
        variance.sqrt()
    }

    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(knn: f64, random_forest: f64, xgboost: f64) -> ModelScores {
        ModelScores {
            knn,
            random_forest,
            xgboost,
        }
    }

    #[test]
    fn test_weighted_combination() {
        let combiner = ScoreCombiner::default();

        assert!((combiner.combine(&scores(0.1, 0.1, 0.1)) - 0.1).abs() < 1e-12);
        assert!((combiner.combine(&scores(0.9, 0.9, 0.9)) - 0.9).abs() < 1e-12);
        assert!((combiner.combine(&scores(0.2, 0.5, 0.5)) - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_matches_reference_formula_exactly() {
        let combiner = ScoreCombiner::default();
        let cases = [
            (0.2, 0.5, 0.5),
            (0.013, 0.771, 0.402),
            (1.0 / 3.0, 0.1, 0.7),
            (0.0, 1.0, 0.999),
        ];

        for (p_knn, p_rf, p_xgb) in cases {
            let reference = (p_knn * 1.0 + p_rf * 2.0 + p_xgb * 3.0) / 6.0;
            assert_eq!(
                combiner.combine(&scores(p_knn, p_rf, p_xgb)).to_bits(),
                reference.to_bits()
            );
        }
    }

    #[test]
    fn test_extremes() {
        let combiner = ScoreCombiner::default();
        assert_eq!(combiner.combine(&scores(0.0, 0.0, 0.0)), 0.0);
        assert_eq!(combiner.combine(&scores(1.0, 1.0, 1.0)), 1.0);
    }

    #[test]
    fn test_xgboost_dominates() {
        let combiner = ScoreCombiner::default();
        let only_knn = combiner.combine(&scores(1.0, 0.0, 0.0));
        let only_xgb = combiner.combine(&scores(0.0, 0.0, 1.0));
        assert!(only_xgb > only_knn);
        assert!((only_xgb - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_spread() {
        assert_eq!(ScoreCombiner::spread(&scores(0.4, 0.4, 0.4)), 0.0);
        assert!(ScoreCombiner::spread(&scores(0.0, 0.5, 1.0)) > 0.4);
    }
}
