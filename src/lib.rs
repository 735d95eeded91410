//! Transfer Risk Engine Library
//!
//! Scores proposed money transfers with a weighted ensemble of three fraud
//! classifiers, maps the score to APPROVE / STEP_UP_VERIFICATION / BLOCK,
//! and explains flagged transfers with kernel SHAP attributions.

pub mod accounts;
pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod explain;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod producer;
pub mod types;

pub use config::AppConfig;
pub use engine::{Assessment, RiskEngine};
pub use error::{ArtifactError, ExplanationError, PolicyError, ScoringError};
pub use feature_extractor::{FeatureExtractor, FeatureSchema, FeatureVector};
pub use models::{Classifier, ModelTriple};
pub use policy::ThresholdPair;
pub use types::{DecisionResponse, Disposition, FreezeInstruction, TransferReply, TransferRequest};
