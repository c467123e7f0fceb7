//! # Infrastructure Ports
//!
//! Traits implemented by concrete broker adapters (queue/topic clients) and
//! consumed by the core. The core never touches a wire protocol; everything
//! transport-specific lives behind [`MessagingInfrastructureReceiver`] and
//! [`MessagingInfrastructureDispatcher`].
//!
//! Every port exposes exactly one async signature set.

use crate::context::{TransactionContext, TransactionMode};
use crate::message::{InboundBrokeredMessage, OutboundBrokeredMessage};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by infrastructure adapters.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    /// Transient condition: the same operation may succeed if retried.
    #[error("transient infrastructure failure: {0}")]
    Transient(String),

    /// Terminal condition: retrying the same operation will not help.
    #[error("infrastructure failure: {0}")]
    Terminal(String),

    /// The adapter was asked to operate before initialization.
    #[error("infrastructure not initialized for receiver '{0}'")]
    NotInitialized(String),
}

impl InfrastructureError {
    /// Whether this failure is transient and eligible for retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, InfrastructureError::Transient(_))
    }
}

/// Configuration surface for one receiver.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    /// Path (queue/subscription) messages are received from.
    pub message_receiver_path: String,
    /// Default path outbound messages are sent to, if any.
    pub sending_path: Option<String>,
    /// Error queue failed messages are forwarded to once retries are
    /// exhausted. `None` falls back to the transport's native dead-letter.
    pub error_queue_path: Option<String>,
    /// Transaction mode for this receiver.
    pub transaction_mode: TransactionMode,
    /// Name of the infrastructure plugin serving this receiver.
    pub infrastructure_type: String,
}

impl ReceiverOptions {
    pub fn new(message_receiver_path: impl Into<String>) -> Self {
        Self {
            message_receiver_path: message_receiver_path.into(),
            sending_path: None,
            error_queue_path: None,
            transaction_mode: TransactionMode::default(),
            infrastructure_type: "in-memory".to_string(),
        }
    }

    pub fn with_sending_path(mut self, path: impl Into<String>) -> Self {
        self.sending_path = Some(path.into());
        self
    }

    pub fn with_error_queue_path(mut self, path: impl Into<String>) -> Self {
        self.error_queue_path = Some(path.into());
        self
    }

    pub fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    pub fn with_infrastructure_type(mut self, infrastructure_type: impl Into<String>) -> Self {
        self.infrastructure_type = infrastructure_type.into();
        self
    }
}

/// Receive side of a broker adapter.
#[async_trait]
pub trait MessagingInfrastructureReceiver: Send + Sync {
    /// Prepare the adapter for a receiver (create clients, sessions, links).
    async fn initialize(&self, options: &ReceiverOptions) -> Result<(), InfrastructureError>;

    /// Wait up to `timeout` for the next message. `Ok(None)` means the wait
    /// elapsed without a message.
    async fn receive(
        &self,
        tx: &TransactionContext,
        timeout: Duration,
    ) -> Result<Option<InboundBrokeredMessage>, InfrastructureError>;

    /// Settle a message as successfully processed.
    async fn ack(
        &self,
        message: &InboundBrokeredMessage,
        tx: &TransactionContext,
    ) -> Result<(), InfrastructureError>;

    /// Release a message back to the transport for redelivery.
    async fn nack(
        &self,
        message: &InboundBrokeredMessage,
        tx: &TransactionContext,
    ) -> Result<(), InfrastructureError>;

    /// Move a message to the transport's native dead-letter destination.
    async fn dead_letter(
        &self,
        message: &InboundBrokeredMessage,
        tx: &TransactionContext,
        reason: &str,
        description: &str,
    ) -> Result<(), InfrastructureError>;

    /// How many times the transport has delivered this message.
    async fn delivery_count(
        &self,
        message: &InboundBrokeredMessage,
    ) -> Result<u32, InfrastructureError>;
}

/// Send side of a broker adapter.
#[async_trait]
pub trait MessagingInfrastructureDispatcher: Send + Sync {
    /// Dispatch one message to its destination.
    async fn dispatch(
        &self,
        message: OutboundBrokeredMessage,
        tx: &TransactionContext,
    ) -> Result<(), InfrastructureError>;

    /// Dispatch a batch; default implementation dispatches sequentially and
    /// stops at the first failure.
    async fn dispatch_batch(
        &self,
        messages: Vec<OutboundBrokeredMessage>,
        tx: &TransactionContext,
    ) -> Result<(), InfrastructureError> {
        for message in messages {
            self.dispatch(message, tx).await?;
        }
        Ok(())
    }
}
