//! Per-transfer processing shared by the NATS loop and tests.

use crate::accounts::AccountGate;
use crate::engine::RiskEngine;
use crate::metrics::EngineMetrics;
use crate::types::decision::{Disposition, FreezeInstruction, TransferReply};
use crate::types::transfer::TransferRequest;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Reason given when the sending account is already on hold.
pub const HOLD_REASON: &str = "sender account is on hold";

/// Everything to publish for one transfer
#[derive(Debug, Clone)]
pub struct Outcome {
    pub reply: TransferReply,
    pub freeze: Option<FreezeInstruction>,
}

#[derive(Clone)]
pub struct TransferProcessor {
    engine: Arc<RiskEngine>,
    accounts: Arc<AccountGate>,
    metrics: Arc<EngineMetrics>,
}

impl TransferProcessor {
    pub fn new(engine: Arc<RiskEngine>, accounts: Arc<AccountGate>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            engine,
            accounts,
            metrics,
        }
    }

    pub fn engine(&self) -> &Arc<RiskEngine> {
        &self.engine
    }

    pub fn accounts(&self) -> &Arc<AccountGate> {
        &self.accounts
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Decide one transfer.
    ///
    /// Transfers from the same sender are processed one at a time. A BLOCK
    /// puts the sender on hold before the next transfer from it is looked at,
    /// and transfers from a held sender are rejected unscored. A transfer
    /// without an identifiable sender is scored but never gated or frozen.
    pub async fn process(&self, request: &TransferRequest) -> Outcome {
        let start = Instant::now();
        let tx_id = request.transaction_id.clone();
        let mut permit = match request.account_key() {
            Some(account_id) => Some(self.accounts.acquire(&account_id).await),
            None => {
                debug!(transaction_id = %tx_id, "Transfer has no identifiable sender");
                None
            }
        };

        if let Some(held) = permit.as_ref().filter(|p| p.is_held()) {
            self.metrics.record_rejection();
            info!(
                transaction_id = %tx_id,
                account_id = %held.account_id(),
                "Transfer rejected, sender account on hold"
            );
            return Outcome {
                reply: TransferReply::Rejected {
                    transaction_id: tx_id,
                    reason: HOLD_REASON.to_string(),
                },
                freeze: None,
            };
        }

        let assessment = match self.engine.clone().assess_async(request).await {
            Ok(assessment) => assessment,
            Err(e) => {
                self.metrics.record_failure();
                error!(transaction_id = %tx_id, error = %e, "Scoring failed");
                return Outcome {
                    reply: TransferReply::Failed {
                        transaction_id: tx_id,
                        error: e.to_string(),
                    },
                    freeze: None,
                };
            }
        };

        let decision = &assessment.decision;
        if decision.disposition == Disposition::Block {
            if let Some(permit) = permit.as_mut() {
                permit.hold();
            }
        }
        drop(permit);

        let elapsed = start.elapsed();
        self.metrics.record_decision(
            decision.disposition,
            decision.risk_score,
            elapsed,
            decision.degraded,
        );
        if let Some(scores) = &decision.model_scores {
            self.metrics.record_model_agreement(scores);
        }
        if assessment.freeze.is_some() {
            self.metrics.record_freeze();
        }
        if assessment.explanation_fallback {
            self.metrics.record_explanation_fallback();
        }

        match decision.disposition {
            Disposition::Approve => debug!(
                transaction_id = %tx_id,
                risk_score = decision.risk_score,
                processing_time_us = elapsed.as_micros() as u64,
                "Transfer approved"
            ),
            disposition if decision.degraded => warn!(
                transaction_id = %tx_id,
                disposition = %disposition,
                "Transfer decided without models"
            ),
            disposition => info!(
                transaction_id = %tx_id,
                risk_score = decision.risk_score,
                disposition = %disposition,
                reasons = ?decision.explanation,
                processing_time_us = elapsed.as_micros() as u64,
                "Transfer flagged"
            ),
        }

        Outcome {
            reply: TransferReply::Decided(assessment.decision),
            freeze: assessment.freeze,
        }
    }
}
