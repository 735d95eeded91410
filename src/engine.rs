//! Scoring, decision and explanation for one transfer.
//!
//! A [`RiskEngine`] is built once at startup and shared read-only behind an
//! `Arc` by every worker. It never touches account state: on BLOCK it only
//! hands back a [`FreezeInstruction`] for the caller to apply.

use crate::config::AppConfig;
use crate::error::{ArtifactError, ExplanationError, ScoringError};
use crate::explain::{ExplanationRanker, KernelExplainer};
use crate::feature_extractor::{FeatureExtractor, FeatureSchema, FeatureVector};
use crate::models::combiner::ScoreCombiner;
use crate::models::ensemble::{ModelState, ModelTriple};
use crate::models::loader::{ArtifactBundle, ModelLoader};
use crate::policy::ThresholdPair;
use crate::types::decision::{DecisionResponse, Disposition, FreezeInstruction, ModelScores};
use crate::types::transfer::TransferRequest;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Model label reported while no artifact is loaded.
pub const DEGRADED_LABEL: &str = "degraded";

/// Explanation reported while no artifact is loaded.
pub const DEGRADED_REASON: &str = "risk models unavailable";

/// Neutral score reported while no artifact is loaded.
pub const DEGRADED_SCORE: f64 = 0.5;

/// Every transfer is escalated, never approved, while no artifact is loaded.
pub const DEGRADED_DISPOSITION: Disposition = Disposition::StepUpVerification;

const DEFAULT_EXPLAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Combined score with the per-model inputs that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub model_scores: ModelScores,
    pub risk_score: f64,
}

/// Result of assessing one transfer
#[derive(Debug, Clone)]
pub struct Assessment {
    pub decision: DecisionResponse,
    /// Present exactly when the disposition is BLOCK and the sender is known
    pub freeze: Option<FreezeInstruction>,
    /// Attribution failed and the generic reason was used
    pub explanation_fallback: bool,
}

struct Explained {
    reasons: Vec<String>,
    fallback: bool,
}

impl Explained {
    fn from_result(transaction_id: &str, result: Result<Vec<String>, ExplanationError>) -> Self {
        match result {
            Ok(reasons) => Self {
                reasons,
                fallback: false,
            },
            Err(e) => {
                warn!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Explanation failed, using fallback reason"
                );
                Self {
                    reasons: ExplanationRanker::fallback(),
                    fallback: true,
                }
            }
        }
    }
}

pub struct RiskEngine {
    models: ModelState,
    extractor: FeatureExtractor,
    combiner: ScoreCombiner,
    thresholds: ThresholdPair,
    explainer: KernelExplainer,
    ranker: ExplanationRanker,
    explain_timeout: Duration,
    label: String,
}

impl RiskEngine {
    /// Engine backed by a loaded model triple.
    pub fn new(
        triple: ModelTriple,
        schema: FeatureSchema,
        thresholds: ThresholdPair,
        combiner: ScoreCombiner,
        label: impl Into<String>,
    ) -> Self {
        Self {
            models: ModelState::Ready(triple),
            extractor: FeatureExtractor::new(schema),
            combiner,
            thresholds,
            explainer: KernelExplainer::default(),
            ranker: ExplanationRanker::default(),
            explain_timeout: DEFAULT_EXPLAIN_TIMEOUT,
            label: label.into(),
        }
    }

    /// Engine without models. Every transfer gets [`DEGRADED_DISPOSITION`].
    pub fn degraded(reason: impl Into<String>, schema: FeatureSchema, thresholds: ThresholdPair) -> Self {
        Self {
            models: ModelState::Degraded {
                reason: reason.into(),
            },
            extractor: FeatureExtractor::new(schema),
            combiner: ScoreCombiner::default(),
            thresholds,
            explainer: KernelExplainer::default(),
            ranker: ExplanationRanker::default(),
            explain_timeout: DEFAULT_EXPLAIN_TIMEOUT,
            label: DEGRADED_LABEL.to_string(),
        }
    }

    pub fn with_explanation(
        mut self,
        explainer: KernelExplainer,
        ranker: ExplanationRanker,
        timeout: Duration,
    ) -> Self {
        self.explainer = explainer;
        self.ranker = ranker;
        self.explain_timeout = timeout;
        self
    }

    /// Load the artifact named in the configuration.
    ///
    /// Only an invalid policy is an error; an unusable artifact yields a
    /// degraded engine.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let loader = ModelLoader::new(config.models.onnx_threads, config.models.sessions_per_model);
        let loaded = loader.load_bundle(&config.models.artifact_dir, &config.models.manifest);
        Self::from_artifacts(loaded, config)
    }

    /// Build from a load result, falling back to degraded mode on failure.
    pub fn from_artifacts(
        loaded: Result<ArtifactBundle, ArtifactError>,
        config: &AppConfig,
    ) -> Result<Self> {
        let policy = &config.policy;
        let combiner = ScoreCombiner::new(policy.weights().context("Invalid ensemble weights")?);
        let fallback_thresholds = policy
            .thresholds(policy.default_step_up_threshold)
            .context("Invalid default thresholds")?;

        let engine = match loaded {
            Ok(bundle) => match policy.thresholds(bundle.step_up_threshold) {
                Ok(thresholds) => {
                    info!(
                        label = %bundle.label,
                        block_threshold = thresholds.block(),
                        step_up_threshold = thresholds.step_up(),
                        "Risk engine ready"
                    );
                    Self::new(bundle.triple, bundle.schema, thresholds, combiner, bundle.label)
                }
                Err(e) => {
                    error!(error = %e, "Artifact threshold conflicts with policy, running degraded");
                    Self::degraded(
                        format!("artifact threshold rejected: {}", e),
                        FeatureSchema::default(),
                        fallback_thresholds,
                    )
                }
            },
            Err(e) => {
                match &e {
                    ArtifactError::Missing(what) => {
                        warn!(missing = %what, "Model artifact not found, running degraded")
                    }
                    ArtifactError::Corrupt(what) => {
                        error!(detail = %what, "Model artifact is corrupt, running degraded")
                    }
                    ArtifactError::Incompatible(what) => {
                        error!(detail = %what, "Model artifact is incompatible, running degraded")
                    }
                }
                Self::degraded(e.to_string(), FeatureSchema::default(), fallback_thresholds)
            }
        };

        let explanation = &config.explanation;
        Ok(engine.with_explanation(
            KernelExplainer::new(explanation.max_exact_features, explanation.sample_budget),
            ExplanationRanker::new(explanation.significance_floor, explanation.max_reasons),
            explanation.timeout(),
        ))
    }

    pub fn is_degraded(&self) -> bool {
        self.models.is_degraded()
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match &self.models {
            ModelState::Degraded { reason } => Some(reason),
            ModelState::Ready(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn thresholds(&self) -> &ThresholdPair {
        &self.thresholds
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn explain_timeout(&self) -> Duration {
        self.explain_timeout
    }

    /// Combined fraud probability for a schema-conforming vector.
    pub fn score(&self, features: &FeatureVector) -> Result<ScoreBreakdown, ScoringError> {
        let triple = match &self.models {
            ModelState::Ready(triple) => triple,
            ModelState::Degraded { .. } => return Err(ScoringError::ModelsUnavailable),
        };

        let model_scores = triple.score(features)?;
        let risk_score = self.combiner.combine(&model_scores);
        Ok(ScoreBreakdown {
            model_scores,
            risk_score,
        })
    }

    pub fn decide(&self, risk_score: f64) -> Disposition {
        Disposition::from_score(risk_score, &self.thresholds)
    }

    /// Ranked reasons from kernel SHAP on the gradient boosted model.
    pub fn explain(
        &self,
        features: &FeatureVector,
        deadline: Option<Instant>,
    ) -> Result<Vec<String>, ExplanationError> {
        let triple = match &self.models {
            ModelState::Ready(triple) => triple,
            ModelState::Degraded { .. } => return Ok(vec![DEGRADED_REASON.to_string()]),
        };

        let baseline = features.baseline();
        let attributions =
            self.explainer
                .attribute(triple.xgboost().as_ref(), features, &baseline, deadline)?;
        Ok(self.ranker.rank(&attributions))
    }

    fn explain_checked(
        &self,
        transaction_id: &str,
        features: &FeatureVector,
        deadline: Option<Instant>,
    ) -> Explained {
        Explained::from_result(transaction_id, self.explain(features, deadline))
    }

    /// Whether reasons are computed for this outcome.
    pub fn needs_explanation(disposition: Disposition, requested: bool) -> bool {
        requested || disposition != Disposition::Approve
    }

    /// Assess a transfer on the current thread, bounding explanation time
    /// with a deadline.
    pub fn assess(&self, request: &TransferRequest) -> Result<Assessment, ScoringError> {
        if self.is_degraded() {
            return Ok(self.degraded_assessment(request));
        }

        let features = self.extractor.extract(request);
        let breakdown = self.score(&features)?;
        let disposition = self.decide(breakdown.risk_score);

        let explanation = Self::needs_explanation(disposition, request.explain).then(|| {
            let deadline = Instant::now() + self.explain_timeout;
            self.explain_checked(&request.transaction_id, &features, Some(deadline))
        });

        Ok(self.finish(request, breakdown, disposition, explanation))
    }

    /// Assess a transfer from async code. Scoring runs inline; explanation
    /// runs on the blocking pool under a timeout.
    pub async fn assess_async(
        self: Arc<Self>,
        request: &TransferRequest,
    ) -> Result<Assessment, ScoringError> {
        if self.is_degraded() {
            return Ok(self.degraded_assessment(request));
        }

        let features = self.extractor.extract(request);
        let breakdown = self.score(&features)?;
        let disposition = self.decide(breakdown.risk_score);

        let explanation = if Self::needs_explanation(disposition, request.explain) {
            Some(self.clone().explain_bounded(&request.transaction_id, features).await)
        } else {
            None
        };

        Ok(self.finish(request, breakdown, disposition, explanation))
    }

    async fn explain_bounded(self: Arc<Self>, transaction_id: &str, features: FeatureVector) -> Explained {
        let timeout = self.explain_timeout;
        let deadline = Instant::now() + timeout;
        let task = tokio::task::spawn_blocking(move || self.explain(&features, Some(deadline)));

        let outcome = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ExplanationError::Aborted(join_error.to_string())),
            Err(_) => Err(ExplanationError::TimedOut),
        };

        Explained::from_result(transaction_id, outcome)
    }

    fn finish(
        &self,
        request: &TransferRequest,
        breakdown: ScoreBreakdown,
        disposition: Disposition,
        explanation: Option<Explained>,
    ) -> Assessment {
        let mut decision = DecisionResponse::new(
            request.transaction_id.clone(),
            disposition,
            breakdown.risk_score,
            self.label.clone(),
        )
        .with_model_scores(breakdown.model_scores);
        let mut explanation_fallback = false;
        if let Some(explained) = explanation {
            explanation_fallback = explained.fallback;
            decision = decision.with_explanation(explained.reasons);
        }

        let freeze = match (disposition, request.account_key()) {
            (Disposition::Block, Some(account_id)) => {
                Some(FreezeInstruction::for_decision(account_id, &decision))
            }
            (Disposition::Block, None) => {
                warn!(
                    transaction_id = %decision.transaction_id,
                    "Blocked transfer has no identifiable sender, no freeze issued"
                );
                None
            }
            _ => None,
        };

        debug!(
            transaction_id = %decision.transaction_id,
            risk_score = decision.risk_score,
            disposition = %decision.disposition,
            "Transfer assessed"
        );

        Assessment {
            decision,
            freeze,
            explanation_fallback,
        }
    }

    fn degraded_assessment(&self, request: &TransferRequest) -> Assessment {
        let decision = DecisionResponse::new(
            request.transaction_id.clone(),
            DEGRADED_DISPOSITION,
            DEGRADED_SCORE,
            DEGRADED_LABEL.to_string(),
        )
        .with_explanation(vec![DEGRADED_REASON.to_string()])
        .degraded();

        Assessment {
            decision,
            freeze: None,
            explanation_fallback: false,
        }
    }
}
