//! Binary classifier seam and its ONNX Runtime implementation

use crate::error::ScoringError;
use crate::feature_extractor::FeatureVector;
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::Session;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Anything that can estimate P(fraud | features).
///
/// Implementations must be read-only: the same vector always yields the same
/// probability and no call affects another.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Probability of the positive (fraud) class.
    fn predict_proba(&self, features: &FeatureVector) -> Result<f64, ScoringError>;
}

/// Reject anything that is not a probability.
pub fn checked_probability(model: &str, value: f64) -> Result<f64, ScoringError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ScoringError::InvalidProbability {
            model: model.to_string(),
            value,
        })
    }
}

/// ONNX model exported from a trained classifier.
///
/// `Session::run` needs exclusive access, so each classifier keeps a small
/// pool of sessions and hands out whichever is free.
pub struct OnnxClassifier {
    name: String,
    sessions: Vec<Mutex<Session>>,
    next: AtomicUsize,
    input_name: String,
    output_name: String,
    input_width: Option<usize>,
}

impl OnnxClassifier {
    pub fn new(
        name: String,
        sessions: Vec<Session>,
        input_name: String,
        output_name: String,
        input_width: Option<usize>,
    ) -> Self {
        Self {
            name,
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
            input_name,
            output_name,
            input_width,
        }
    }

    fn run(&self, session: &mut Session, features: &[f32]) -> Result<f64> {
        use ort::value::Tensor;

        // Prepare input tensor - shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .context("Failed to create input tensor")?;

        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        self.extract_probability(&outputs)
    }

    /// Find the fraud-class probability in the session outputs.
    ///
    /// Gradient boosted exports usually give a `[1, 2]` tensor; scikit-learn
    /// KNN and forest exports give `seq(map(int64, float))`.
    fn extract_probability(&self, outputs: &ort::session::SessionOutputs) -> Result<f64> {
        if let Some(output) = outputs.get(&self.output_name) {
            if let Some(prob) = self.extract_from_value(&output)? {
                return Ok(prob);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(prob) = self.extract_from_value(&output)? {
                debug!(model = %self.name, output = %name, prob, "Extracted from fallback output");
                return Ok(prob);
            }
        }

        anyhow::bail!("no probability output found")
    }

    fn extract_from_value(&self, output: &ort::value::DynValue) -> Result<Option<f64>> {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return Ok(fraud_prob_from_tensor(&dims, data));
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return self.extract_from_sequence_map(output).map(Some);
        }

        Ok(None)
    }

    fn extract_from_sequence_map(&self, output: &ort::value::DynValue) -> Result<f64> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;
        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

        // batch size is always 1
        let map_value = maps
            .first()
            .ok_or_else(|| anyhow::anyhow!("Empty sequence"))?;
        let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;

        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 1) {
            return Ok(*prob as f64);
        }
        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 0) {
            return Ok(1.0 - *prob as f64);
        }

        anyhow::bail!("No probability found in map")
    }
}

/// Fraud-class probability from a dense probability tensor.
///
/// `None` when the tensor is not shaped like class probabilities.
fn fraud_prob_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = match dims {
        [_, classes] | [classes] => *classes,
        _ => return None,
    };
    match classes {
        c if c >= 2 => data.get(1).map(|&p| p as f64),
        1 => data.first().map(|&p| p as f64),
        _ => None,
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        if let Some(expected) = self.input_width {
            if expected != features.len() {
                return Err(ScoringError::ShapeMismatch {
                    model: self.name.clone(),
                    expected,
                    actual: features.len(),
                });
            }
        }

        if self.sessions.is_empty() {
            return Err(ScoringError::Inference {
                model: self.name.clone(),
                message: "no inference session".to_string(),
            });
        }

        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let slot = (0..self.sessions.len())
            .map(|offset| (start + offset) % self.sessions.len())
            .find_map(|index| self.sessions[index].try_lock());
        let mut session = match slot {
            Some(guard) => guard,
            None => self.sessions[start].lock(),
        };

        let prob = self
            .run(&mut session, &features.to_f32())
            .map_err(|e| ScoringError::Inference {
                model: self.name.clone(),
                message: format!("{:#}", e),
            })?;

        checked_probability(&self.name, prob)
    }
}
