//! Feature extraction for transfer risk model inference.
//!
//! Requests are first turned into a named feature map, then coerced onto the
//! ordered column schema the classifiers were trained on. Columns absent from
//! the map are filled with 0.0 instead of failing.

use crate::types::transfer::{RawNumber, TransferRequest};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Column names used when the artifact does not provide a schema.
pub const DEFAULT_COLUMNS: [&str; 4] = ["Source", "Target", "Weight", "typeTrans"];

/// Value used for any absent or non-numeric field.
pub const MISSING_VALUE: f64 = 0.0;

/// Ordered column names the model triple expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    columns: Arc<[String]>,
}

impl FeatureSchema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(String::as_str)
    }

    /// Reindex a feature map onto this schema, filling gaps with 0.0.
    ///
    /// Keys not in the schema are ignored.
    pub fn coerce(&self, features: &FeatureMap) -> FeatureVector {
        let values = self
            .columns
            .iter()
            .map(|column| match features.get(column) {
                Some(value) => *value,
                None => {
                    debug!(column = %column, "Feature absent, using default");
                    MISSING_VALUE
                }
            })
            .collect();

        FeatureVector {
            schema: self.clone(),
            values,
        }
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMNS)
    }
}

/// Named numeric features for one transfer, before schema coercion.
pub type FeatureMap = BTreeMap<String, f64>;

/// Values in exact schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema: FeatureSchema,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Single precision copy for ONNX input tensors.
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }

    /// Same schema, different values. Used for perturbed evaluations.
    pub fn with_values(&self, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.values.len());
        Self {
            schema: self.schema.clone(),
            values,
        }
    }

    /// All-zero reference point on the same schema.
    pub fn baseline(&self) -> Self {
        self.with_values(vec![MISSING_VALUE; self.values.len()])
    }
}

/// Turns transfer requests into schema-conforming feature vectors.
pub struct FeatureExtractor {
    schema: FeatureSchema,
}

impl FeatureExtractor {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        self.schema.len()
    }

    /// Named features for a transfer.
    ///
    /// Fields that cannot be read as a number are left out and end up as
    /// 0.0 after coercion.
    pub fn feature_map(&self, tx: &TransferRequest) -> FeatureMap {
        let fields = [
            ("Source", &tx.sender_account),
            ("Target", &tx.receiver_account),
            ("Weight", &tx.amount),
            ("typeTrans", &tx.transaction_type),
        ];

        let mut features = FeatureMap::new();
        for (column, raw) in fields {
            match raw.as_ref().map(RawNumber::as_f64) {
                Some(Some(value)) => {
                    features.insert(column.to_string(), value);
                }
                Some(None) => {
                    debug!(
                        transaction_id = %tx.transaction_id,
                        column,
                        "Feature not coercible to a number, using default"
                    );
                }
                None => {}
            }
        }
        features
    }

    /// Extract the ordered feature vector for a transfer.
    pub fn extract(&self, tx: &TransferRequest) -> FeatureVector {
        self.schema.coerce(&self.feature_map(tx))
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureSchema::default())
    }
}
