//! Error types for the scoring and decision pipeline

use thiserror::Error;

/// A classifier could not produce a usable probability for one transaction.
///
/// Always scoped to a single transfer. The decision is never computed from a
/// partial score.
#[derive(Debug, Clone, Error)]
pub enum ScoringError {
    /// The underlying runtime rejected the input or failed during inference
    #[error("model '{model}' inference failed: {message}")]
    Inference { model: String, message: String },

    /// The model answered, but not with a probability
    #[error("model '{model}' returned invalid probability {value}")]
    InvalidProbability { model: String, value: f64 },

    /// Feature vector width does not match what the model was built for
    #[error("model '{model}' expects {expected} features, got {actual}")]
    ShapeMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    /// Engine is running without a model artifact
    #[error("risk models unavailable")]
    ModelsUnavailable,
}

/// Attribution could not be computed. Recovered locally with the generic reason.
#[derive(Debug, Clone, Error)]
pub enum ExplanationError {
    #[error("explanation timed out")]
    TimedOut,

    #[error("attribution system is degenerate: {0}")]
    Degenerate(String),

    #[error("explained model failed: {0}")]
    Model(#[from] ScoringError),

    #[error("explanation task aborted: {0}")]
    Aborted(String),
}

/// Trained artifact bundle could not be used. Puts the engine in degraded mode.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    Missing(String),

    #[error("artifact is corrupt: {0}")]
    Corrupt(String),

    #[error("artifact is incompatible: {0}")]
    Incompatible(String),
}

/// Invalid decision policy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("threshold {name}={value} is outside [0, 1]")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("block threshold {block} must be greater than step-up threshold {step_up}")]
    ThresholdOrder { block: f64, step_up: f64 },

    #[error("ensemble weights must be finite, non-negative and sum to a positive value")]
    InvalidWeights,
}
