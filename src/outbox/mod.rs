//! # Outbox Store
//!
//! Durable staging for outbound messages, drained by the background
//! [`OutboxProcessor`](processor::OutboxProcessor). Writing to the outbox
//! inside the receive's unit of work is what gives sends at-least-once
//! delivery aligned with the business transaction: the row and the business
//! state commit or roll back together, and a crash between commit and
//! transport send only ever delays the message, never loses it.
//!
//! `processed_at` stays `None` until the processor successfully hands the
//! message to the infrastructure dispatcher; once set, the row is eligible
//! for cleanup under a retention policy. `batch_id` groups the rows written
//! within one unit of work so they can be drained together.

pub mod memory;
pub mod processor;

use crate::context::TransactionContext;
use crate::message::OutboundBrokeredMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors from outbox store operations.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("outbox write failed: {0}")]
    Write(String),

    #[error("outbox read failed: {0}")]
    Read(String),

    #[error("outbox message not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    UnitOfWork(#[from] crate::uow::UowError),
}

/// A staged outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    /// Message id, carried through to the brokered message.
    pub message_id: String,
    /// Destination path the message will be dispatched to.
    pub destination: String,
    /// Opaque body bytes.
    pub body: Vec<u8>,
    /// Content type of the body.
    pub content_type: String,
    /// Application properties serialized alongside the body.
    pub serialized_context: HashMap<String, Value>,
    /// When the message was staged.
    pub sent_at: DateTime<Utc>,
    /// When the message was handed to the transport. `None` while pending.
    pub processed_at: Option<DateTime<Utc>>,
    /// Groups messages staged within one unit of work.
    pub batch_id: Uuid,
}

impl OutboxMessage {
    /// Stage an outbound message under a transaction's batch id.
    pub fn from_outbound(message: &OutboundBrokeredMessage, batch_id: Uuid) -> Self {
        Self {
            message_id: message.message_id.clone(),
            destination: message.destination.clone(),
            body: message.body.clone(),
            content_type: message.content_type.clone(),
            serialized_context: message.application_properties.clone(),
            sent_at: Utc::now(),
            processed_at: None,
            batch_id,
        }
    }

    /// Rebuild the brokered message for dispatch.
    pub fn to_outbound(&self) -> OutboundBrokeredMessage {
        OutboundBrokeredMessage {
            message_id: self.message_id.clone(),
            destination: self.destination.clone(),
            body: self.body.clone(),
            application_properties: self.serialized_context.clone(),
            content_type: self.content_type.clone(),
        }
    }

    /// Whether the message is still waiting to be dispatched.
    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }
}

/// Outcome of marking a message processed.
///
/// Concurrent drains of a shared outbox may race on the same row; the loser
/// observes [`MarkOutcome::AlreadyProcessed`] and skips, it does not fail the
/// batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Processed,
    AlreadyProcessed,
}

/// Port for outbox persistence.
///
/// Durable implementations must join the ambient transaction carried by the
/// [`TransactionContext`] so outbox inserts commit with the business write.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Stage messages for later dispatch, inside the ambient unit of work
    /// when one is active.
    async fn send_to_outbox(
        &self,
        messages: Vec<OutboxMessage>,
        tx: &TransactionContext,
    ) -> Result<(), OutboxError>;

    /// All messages not yet dispatched, oldest first.
    async fn unprocessed_messages(&self) -> Result<Vec<OutboxMessage>, OutboxError>;

    /// Pending messages staged under one batch, oldest first.
    async fn unprocessed_batch(&self, batch_id: Uuid) -> Result<Vec<OutboxMessage>, OutboxError>;

    /// Record that a message was handed to the transport.
    async fn mark_processed(&self, message_id: &str) -> Result<MarkOutcome, OutboxError>;

    /// Mark a batch of messages processed; already-processed rows are
    /// skipped. Returns the number of rows actually transitioned.
    async fn mark_batch_processed(&self, message_ids: &[String]) -> Result<usize, OutboxError> {
        let mut transitioned = 0;
        for id in message_ids {
            if self.mark_processed(id).await? == MarkOutcome::Processed {
                transitioned += 1;
            }
        }
        Ok(transitioned)
    }
}
