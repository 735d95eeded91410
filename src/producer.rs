//! NATS publishers for transfer replies and account freeze instructions

use crate::types::decision::{FreezeInstruction, TransferReply};
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes every transfer outcome, and answers the requester when the
/// request carried a reply subject
#[derive(Clone)]
pub struct ReplyProducer {
    client: Client,
    subject: String,
}

impl ReplyProducer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a reply on the decision subject and, if given, the
    /// requester's inbox.
    pub async fn publish(&self, reply: &TransferReply, reply_to: Option<Subject>) -> Result<()> {
        let payload = serde_json::to_vec(reply)?;

        if let Some(inbox) = reply_to {
            self.client.publish(inbox, payload.clone().into()).await?;
        }

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            transaction_id = %reply.transaction_id(),
            subject = %self.subject,
            "Published transfer reply"
        );

        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Publishes account hold instructions for blocked transfers
#[derive(Clone)]
pub struct FreezeProducer {
    client: Client,
    subject: String,
}

impl FreezeProducer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    pub async fn publish(&self, instruction: &FreezeInstruction) -> Result<()> {
        let payload = serde_json::to_vec(instruction)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            instruction_id = %instruction.instruction_id,
            account_id = %instruction.account_id,
            transaction_id = %instruction.transaction_id,
            "Published freeze instruction"
        );

        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
