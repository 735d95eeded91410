//! Configuration management for the transfer risk engine

use crate::error::PolicyError;
use crate::explain::kernel_shap::{DEFAULT_MAX_EXACT_FEATURES, DEFAULT_SAMPLE_BUDGET};
use crate::explain::ranker::{DEFAULT_MAX_REASONS, DEFAULT_SIGNIFICANCE_FLOOR};
use crate::policy::{
    EnsembleWeights, ThresholdPair, BLOCK_THRESHOLD, DEFAULT_STEP_UP_THRESHOLD, KNN_WEIGHT,
    RANDOM_FOREST_WEIGHT, XGBOOST_WEIGHT,
};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub explanation: ExplanationConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming transfer requests
    pub transfer_subject: String,
    /// Subject every decision is published on
    pub decision_subject: String,
    /// Subject for account freeze instructions
    pub freeze_subject: String,
}

/// Trained artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing the manifest and ONNX files
    pub artifact_dir: String,
    /// Manifest file name inside `artifact_dir`
    #[serde(default = "default_manifest")]
    pub manifest: String,
    /// Number of threads for ONNX inference per session (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Concurrent inference sessions per model
    #[serde(default = "default_sessions_per_model")]
    pub sessions_per_model: usize,
}

fn default_manifest() -> String {
    "manifest.json".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

fn default_sessions_per_model() -> usize {
    4
}

/// Score combination weights and decision cutoffs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub block_threshold: f64,
    /// Used only when the artifact cannot be loaded
    pub default_step_up_threshold: f64,
    pub knn_weight: f64,
    pub random_forest_weight: f64,
    pub xgboost_weight: f64,
}

impl PolicyConfig {
    pub fn weights(&self) -> Result<EnsembleWeights, PolicyError> {
        EnsembleWeights::new(self.knn_weight, self.random_forest_weight, self.xgboost_weight)
    }

    pub fn thresholds(&self, step_up: f64) -> Result<ThresholdPair, PolicyError> {
        ThresholdPair::new(self.block_threshold, step_up)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        self.weights()?;
        self.thresholds(self.default_step_up_threshold)?;
        Ok(())
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            block_threshold: BLOCK_THRESHOLD,
            default_step_up_threshold: DEFAULT_STEP_UP_THRESHOLD,
            knn_weight: KNN_WEIGHT,
            random_forest_weight: RANDOM_FOREST_WEIGHT,
            xgboost_weight: XGBOOST_WEIGHT,
        }
    }
}

/// Explanation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    /// Minimum absolute attribution for a feature to be reported
    pub significance_floor: f64,
    pub max_reasons: usize,
    /// Upper bound on attribution time per transfer
    pub timeout_ms: u64,
    /// Enumerate all coalitions up to this many features
    pub max_exact_features: usize,
    /// Sampled coalitions for wider schemas
    pub sample_budget: usize,
}

impl ExplanationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            significance_floor: DEFAULT_SIGNIFICANCE_FLOOR,
            max_reasons: DEFAULT_MAX_REASONS,
            timeout_ms: 250,
            max_exact_features: DEFAULT_MAX_EXACT_FEATURES,
            sample_budget: DEFAULT_SAMPLE_BUDGET,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of transfers processed concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `RISK__SECTION__KEY`
    /// environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("RISK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.policy.validate().context("Invalid decision policy")?;
        anyhow::ensure!(self.pipeline.workers > 0, "pipeline.workers must be positive");
        anyhow::ensure!(
            self.explanation.significance_floor >= 0.0,
            "explanation.significance_floor must not be negative"
        );
        anyhow::ensure!(
            (1..=DEFAULT_MAX_REASONS).contains(&self.explanation.max_reasons),
            "explanation.max_reasons must be between 1 and {}",
            DEFAULT_MAX_REASONS
        );
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                transfer_subject: "transfers.requests".to_string(),
                decision_subject: "transfers.decisions".to_string(),
                freeze_subject: "accounts.freeze".to_string(),
            },
            models: ModelsConfig {
                artifact_dir: "models".to_string(),
                manifest: default_manifest(),
                onnx_threads: default_onnx_threads(),
                sessions_per_model: default_sessions_per_model(),
            },
            policy: PolicyConfig::default(),
            explanation: ExplanationConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: default_metrics_interval(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}
