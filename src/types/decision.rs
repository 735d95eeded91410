//! Decision, reply and freeze instruction data structures

use crate::policy::ThresholdPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome for a scored transfer, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Approve,
    StepUpVerification,
    Block,
}

impl Disposition {
    /// Map a combined score to a disposition.
    ///
    /// Comparisons are strict: a score equal to a threshold falls through to
    /// the next lower tier.
    pub fn from_score(score: f64, thresholds: &ThresholdPair) -> Self {
        if score > thresholds.block() {
            Disposition::Block
        } else if score > thresholds.step_up() {
            Disposition::StepUpVerification
        } else {
            Disposition::Approve
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Approve => "APPROVE",
            Disposition::StepUpVerification => "STEP_UP_VERIFICATION",
            Disposition::Block => "BLOCK",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability reported by each member of the triple
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScores {
    pub knn: f64,
    pub random_forest: f64,
    pub xgboost: f64,
}

impl ModelScores {
    pub fn as_array(&self) -> [f64; 3] {
        [self.knn, self.random_forest, self.xgboost]
    }
}

/// Decision returned to the caller for one transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub decision_id: String,
    pub transaction_id: String,
    pub disposition: Disposition,
    /// Combined risk score (0.0 - 1.0)
    pub risk_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Vec<String>>,
    /// Which model combination produced the result
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_scores: Option<ModelScores>,
    #[serde(default)]
    pub degraded: bool,
    pub decided_at: DateTime<Utc>,
}

impl DecisionResponse {
    pub fn new(
        transaction_id: String,
        disposition: Disposition,
        risk_score: f64,
        model: String,
    ) -> Self {
        Self {
            decision_id: uuid::Uuid::new_v4().to_string(),
            transaction_id,
            disposition,
            risk_score,
            explanation: None,
            model,
            model_scores: None,
            degraded: false,
            decided_at: Utc::now(),
        }
    }

    pub fn with_explanation(mut self, reasons: Vec<String>) -> Self {
        self.explanation = Some(reasons);
        self
    }

    pub fn with_model_scores(mut self, scores: ModelScores) -> Self {
        self.model_scores = Some(scores);
        self
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}

/// Instruction to put an account on hold, emitted once per BLOCK decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeInstruction {
    pub instruction_id: String,
    pub account_id: String,
    pub transaction_id: String,
    pub risk_score: f64,
    pub reasons: Vec<String>,
    pub issued_at: DateTime<Utc>,
}

impl FreezeInstruction {
    pub fn for_decision(account_id: String, decision: &DecisionResponse) -> Self {
        Self {
            instruction_id: uuid::Uuid::new_v4().to_string(),
            account_id,
            transaction_id: decision.transaction_id.clone(),
            risk_score: decision.risk_score,
            reasons: decision.explanation.clone().unwrap_or_default(),
            issued_at: Utc::now(),
        }
    }
}

/// Wire reply for a transfer request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferReply {
    /// Scored and decided
    Decided(DecisionResponse),
    /// Refused before scoring
    Rejected {
        transaction_id: String,
        reason: String,
    },
    /// Scoring failed; the caller chooses between deny and fail-open
    Failed {
        transaction_id: String,
        error: String,
    },
}

impl TransferReply {
    pub fn transaction_id(&self) -> &str {
        match self {
            TransferReply::Decided(decision) => &decision.transaction_id,
            TransferReply::Rejected { transaction_id, .. }
            | TransferReply::Failed { transaction_id, .. } => transaction_id,
        }
    }
}
