//! NATS subscription for incoming transfer requests

use crate::types::transfer::TransferRequest;
use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use tracing::info;

/// Consumer for transfer requests published by the payment front end
pub struct TransferConsumer {
    client: Client,
    subject: String,
}

impl TransferConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the transfer subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", self.subject))?;
        info!(subject = %self.subject, "Subscribed to transfer subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Parse a message payload into a transfer request.
pub fn parse_request(payload: &[u8]) -> Result<TransferRequest> {
    serde_json::from_slice(payload).context("Malformed transfer request")
}
