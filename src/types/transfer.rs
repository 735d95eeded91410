//! Transfer request data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A numeric input that may arrive as a JSON number or a numeric string.
///
/// Account numbers usually travel as strings but the models consume them as
/// real numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    /// Interpret as a real number, `None` when it cannot be coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Number(v) => Some(*v).filter(|v| v.is_finite()),
            RawNumber::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        RawNumber::Number(value)
    }
}

impl From<&str> for RawNumber {
    fn from(value: &str) -> Self {
        RawNumber::Text(value.to_string())
    }
}

/// A proposed money transfer to be scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Unique transfer identifier
    #[serde(default = "new_transaction_id")]
    pub transaction_id: String,

    /// Sending account identifier
    #[serde(default, alias = "Source")]
    pub sender_account: Option<RawNumber>,

    /// Receiving account identifier
    #[serde(default, alias = "Target")]
    pub receiver_account: Option<RawNumber>,

    /// Transfer amount
    #[serde(default, alias = "Weight")]
    pub amount: Option<RawNumber>,

    /// Transaction type code (1 = transfer, 2 = cash out, ...)
    #[serde(default, alias = "typeTrans")]
    pub transaction_type: Option<RawNumber>,

    /// Caller wants reasons even for an approved transfer
    #[serde(default)]
    pub explain: bool,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn new_transaction_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl TransferRequest {
    /// Create a request with every attribute set
    pub fn new(
        transaction_id: impl Into<String>,
        sender_account: impl Into<RawNumber>,
        receiver_account: impl Into<RawNumber>,
        amount: f64,
        transaction_type: f64,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            sender_account: Some(sender_account.into()),
            receiver_account: Some(receiver_account.into()),
            amount: Some(RawNumber::Number(amount)),
            transaction_type: Some(RawNumber::Number(transaction_type)),
            explain: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_explanation(mut self) -> Self {
        self.explain = true;
        self
    }

    /// Key used to serialize and freeze the sending account.
    ///
    /// Numeric senders are keyed by the value the models see, so `"1001"`,
    /// `"01001"`, `"1001.0"` and `1001` are one account. `None` when the
    /// sender is absent or blank.
    pub fn account_key(&self) -> Option<String> {
        let raw = self.sender_account.as_ref()?;
        if let Some(value) = raw.as_f64() {
            // + 0.0 folds -0 into 0
            return Some((value + 0.0).to_string());
        }
        match raw {
            RawNumber::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }
}
