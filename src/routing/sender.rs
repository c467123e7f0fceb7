//! Handler-facing send operations.
//!
//! Handlers emit messages during processing without touching the transport:
//! the sender resolves the destination, then hands the message to the
//! [`RouterDispatcher`] wired at startup, so a send made inside a receive
//! goes through the outbox when the deployment routes through one.
//!
//! Destination resolution, in order: the explicit argument, the message's
//! own destination, the receiver's configured sending path. A send with no
//! destination from any source fails validation before any I/O.

use super::{RouterDispatcher, RoutingError};
use crate::context::TransactionContext;
use crate::message::OutboundBrokeredMessage;
use crate::port::ReceiverOptions;
use std::sync::Arc;

/// Sends and publishes messages on behalf of a handler.
pub struct BrokeredMessageSender {
    dispatcher: Arc<dyn RouterDispatcher>,
    default_sending_path: Option<String>,
}

impl BrokeredMessageSender {
    pub fn new(dispatcher: Arc<dyn RouterDispatcher>) -> Self {
        Self {
            dispatcher,
            default_sending_path: None,
        }
    }

    /// Sender bound to a receiver's configured sending path.
    pub fn for_receiver(dispatcher: Arc<dyn RouterDispatcher>, options: &ReceiverOptions) -> Self {
        Self {
            dispatcher,
            default_sending_path: options.sending_path.clone(),
        }
    }

    pub fn with_default_sending_path(mut self, path: impl Into<String>) -> Self {
        self.default_sending_path = Some(path.into());
        self
    }

    fn resolve(
        &self,
        message: &OutboundBrokeredMessage,
        destination: Option<&str>,
    ) -> Result<String, RoutingError> {
        if let Some(destination) = destination.filter(|d| !d.is_empty()) {
            return Ok(destination.to_string());
        }
        if !message.destination.is_empty() {
            return Ok(message.destination.clone());
        }
        if let Some(path) = &self.default_sending_path {
            return Ok(path.clone());
        }
        Err(RoutingError::Validation(
            "send requires a destination: none given, none on the message, no sending path configured"
                .into(),
        ))
    }

    /// Send a message to a queue-style destination.
    pub async fn send(
        &self,
        mut message: OutboundBrokeredMessage,
        destination: Option<&str>,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError> {
        message.destination = self.resolve(&message, destination)?;
        tracing::debug!(
            message_id = %message.message_id,
            destination = %message.destination,
            "sending message"
        );
        self.dispatcher.dispatch(message, tx).await
    }

    /// Publish a message to a topic-style destination. Fan-out to
    /// subscribers is the transport's concern; the core path is the same as
    /// [`BrokeredMessageSender::send`].
    pub async fn publish(
        &self,
        message: OutboundBrokeredMessage,
        topic: Option<&str>,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError> {
        self.send(message, topic, tx).await
    }
}
