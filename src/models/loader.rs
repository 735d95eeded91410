//! Trained artifact loader: manifest plus three ONNX models

use crate::error::ArtifactError;
use crate::feature_extractor::FeatureSchema;
use crate::models::classifier::OnnxClassifier;
use crate::models::ensemble::ModelTriple;
use crate::policy::DEFAULT_STEP_UP_THRESHOLD;
use anyhow::Context;
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Manifest format this loader understands.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

pub const DEFAULT_MODEL_LABEL: &str = "Ensemble AI v1";

/// `manifest.json` written next to the exported models at training time.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactManifest {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default = "default_label")]
    pub label: String,
    /// Feature columns in training order
    pub columns: Vec<String>,
    /// Step-up verification threshold tuned for this ensemble
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub models: ManifestModels,
}

/// Model file names, relative to the artifact directory
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestModels {
    pub knn: Option<String>,
    pub random_forest: Option<String>,
    pub xgboost: Option<String>,
}

fn default_format_version() -> u32 {
    SUPPORTED_FORMAT_VERSION
}

fn default_label() -> String {
    DEFAULT_MODEL_LABEL.to_string()
}

fn default_threshold() -> f64 {
    DEFAULT_STEP_UP_THRESHOLD
}

impl ArtifactManifest {
    /// Read and validate a manifest file.
    pub fn read(path: &Path) -> Result<Self, ArtifactError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ArtifactError::Missing(path.display().to_string()),
            _ => ArtifactError::Corrupt(format!("{}: {}", path.display(), e)),
        })?;

        let manifest: ArtifactManifest = serde_json::from_str(&raw)
            .map_err(|e| ArtifactError::Corrupt(format!("{}: {}", path.display(), e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ArtifactError::Incompatible(format!(
                "format version {} (supported: {})",
                self.format_version, SUPPORTED_FORMAT_VERSION
            )));
        }
        if self.columns.is_empty() {
            return Err(ArtifactError::Incompatible("empty feature schema".to_string()));
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(ArtifactError::Incompatible(format!(
                "threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        Ok(())
    }

    /// (name, file) for each member of the triple, in combination order.
    pub fn model_files(&self) -> Result<[(&'static str, &str); 3], ArtifactError> {
        fn entry<'a>(
            name: &'static str,
            file: &'a Option<String>,
        ) -> Result<(&'static str, &'a str), ArtifactError> {
            file.as_deref()
                .map(|file| (name, file))
                .ok_or_else(|| ArtifactError::Incompatible(format!("no '{}' model entry", name)))
        }
        Ok([
            entry("knn", &self.models.knn)?,
            entry("random_forest", &self.models.random_forest)?,
            entry("xgboost", &self.models.xgboost)?,
        ])
    }
}

/// Everything loaded from a trained artifact directory.
pub struct ArtifactBundle {
    pub triple: ModelTriple,
    pub schema: FeatureSchema,
    pub step_up_threshold: f64,
    pub label: String,
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
    /// Sessions created per model
    sessions_per_model: usize,
}

impl ModelLoader {
    pub fn new(onnx_threads: usize, sessions_per_model: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
            sessions_per_model: sessions_per_model.max(1),
        }
    }

    /// Load the manifest and the model triple it names.
    pub fn load_bundle<P: AsRef<Path>>(
        &self,
        artifact_dir: P,
        manifest_name: &str,
    ) -> Result<ArtifactBundle, ArtifactError> {
        let artifact_dir = artifact_dir.as_ref();
        let manifest = ArtifactManifest::read(&artifact_dir.join(manifest_name))?;

        let files = manifest.model_files()?;
        let paths: Vec<(&'static str, PathBuf)> = files
            .iter()
            .map(|(name, file)| (*name, artifact_dir.join(file)))
            .collect();
        if let Some((name, path)) = paths.iter().find(|(_, path)| !path.exists()) {
            return Err(ArtifactError::Missing(format!(
                "{} model at {}",
                name,
                path.display()
            )));
        }

        ort::init()
            .commit()
            .map_err(|e| ArtifactError::Incompatible(format!("ONNX Runtime unavailable: {}", e)))?;
        info!(onnx_threads = self.onnx_threads, "ONNX Runtime initialized");

        let width = manifest.columns.len();
        let mut loaded = Vec::with_capacity(paths.len());
        for (name, path) in &paths {
            loaded.push(Arc::new(self.load_model(path, name, width)?));
        }
        let [knn, random_forest, xgboost]: [Arc<OnnxClassifier>; 3] = loaded
            .try_into()
            .map_err(|_| ArtifactError::Incompatible("expected three models".to_string()))?;

        info!(
            label = %manifest.label,
            columns = ?manifest.columns,
            threshold = manifest.threshold,
            "Model artifact loaded"
        );

        Ok(ArtifactBundle {
            triple: ModelTriple::new(knn, random_forest, xgboost),
            schema: FeatureSchema::new(manifest.columns),
            step_up_threshold: manifest.threshold,
            label: manifest.label,
        })
    }

    fn build_session(&self, path: &Path) -> anyhow::Result<Session> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;
        Ok(session)
    }

    /// Load a single ONNX model from file
    pub fn load_model(
        &self,
        path: &Path,
        name: &str,
        input_width: usize,
    ) -> Result<OnnxClassifier, ArtifactError> {
        info!(
            model = %name,
            path = %path.display(),
            threads = self.onnx_threads,
            sessions = self.sessions_per_model,
            "Loading ONNX model"
        );

        let mut sessions = Vec::with_capacity(self.sessions_per_model);
        for _ in 0..self.sessions_per_model {
            let session = self
                .build_session(path)
                .map_err(|e| ArtifactError::Corrupt(format!("{}: {:#}", path.display(), e)))?;
            sessions.push(session);
        }

        let (input_name, output_name) = sessions
            .first()
            .map(io_names)
            .ok_or_else(|| ArtifactError::Corrupt(format!("{}: no session", path.display())))?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(OnnxClassifier::new(
            name.to_string(),
            sessions,
            input_name,
            output_name,
            Some(input_width),
        ))
    }
}

/// Input name and the output most likely to carry probabilities.
fn io_names(session: &Session) -> (String, String) {
    let input_name = session
        .inputs
        .first()
        .map(|i| i.name.clone())
        .unwrap_or_else(|| "float_input".to_string());

    let output_name = session
        .outputs
        .iter()
        .find(|o| o.name.contains("prob"))
        .or_else(|| session.outputs.last())
        .map(|o| o.name.clone())
        .unwrap_or_else(|| "probabilities".to_string());

    (input_name, output_name)
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new(1, 1)
    }
}
