//! Turns per-feature attributions into short reason strings

use super::kernel_shap::Attribution;

/// Returned when no feature clears the significance floor.
pub const FALLBACK_REASON: &str = "high risk profile";

pub const DEFAULT_SIGNIFICANCE_FLOOR: f64 = 0.01;
pub const DEFAULT_MAX_REASONS: usize = 3;

/// Human-readable reason for a schema column.
pub fn reason_for(feature: &str) -> String {
    match feature {
        "Source" => "Sender account has an unusual risk history".to_string(),
        "Target" => "Receiver account is linked to suspicious activity".to_string(),
        "Weight" => "Unusual transaction amount".to_string(),
        "typeTrans" => "High-risk transaction type".to_string(),
        other => format!("Unusual value for {}", other),
    }
}

#[derive(Debug, Clone)]
pub struct ExplanationRanker {
    significance_floor: f64,
    max_reasons: usize,
}

impl ExplanationRanker {
    pub fn new(significance_floor: f64, max_reasons: usize) -> Self {
        Self {
            significance_floor,
            max_reasons: max_reasons.max(1),
        }
    }

    /// Reasons for the strongest attributions, largest magnitude first.
    ///
    /// Never empty: falls back to [`FALLBACK_REASON`].
    pub fn rank(&self, attributions: &[Attribution]) -> Vec<String> {
        let mut significant: Vec<&Attribution> = attributions
            .iter()
            .filter(|a| a.value.is_finite() && a.value.abs() > self.significance_floor)
            .collect();

        significant.sort_by(|a, b| {
            b.value
                .abs()
                .partial_cmp(&a.value.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let reasons: Vec<String> = significant
            .into_iter()
            .take(self.max_reasons)
            .map(|a| reason_for(&a.feature))
            .collect();

        if reasons.is_empty() {
            vec![FALLBACK_REASON.to_string()]
        } else {
            reasons
        }
    }

    /// Explanation used when attribution could not be computed.
    pub fn fallback() -> Vec<String> {
        vec![FALLBACK_REASON.to_string()]
    }
}

impl Default for ExplanationRanker {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNIFICANCE_FLOOR, DEFAULT_MAX_REASONS)
    }
}
