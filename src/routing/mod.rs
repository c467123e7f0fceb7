//! # Message Routers
//!
//! All routers share one shape: given an inbound message, a transaction
//! context and a destination-bearing context, build an
//! [`OutboundBrokeredMessage`] and dispatch it through a [`RouterDispatcher`].
//!
//! The dispatcher is the deployment-time choice between direct-to-transport
//! dispatch ([`InfrastructureRouterDispatcher`]) and outbox-mediated dispatch
//! ([`OutboxRouterDispatcher`]). Callers never choose per-message; wiring one
//! or the other at startup is what preserves (or trades away) the
//! outbox-aligned at-least-once guarantee.

pub mod compensate;
pub mod forward;
pub mod reply;
pub mod sender;
pub mod slip;

use crate::context::TransactionContext;
use crate::message::OutboundBrokeredMessage;
use crate::outbox::{OutboxError, OutboxMessage, OutboxStore};
use crate::port::{InfrastructureError, MessagingInfrastructureDispatcher};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors from routing operations.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A destination context failed validation. Fails fast, before any I/O,
    /// and is never retried.
    #[error("routing validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Slip(#[from] slip::RoutingSlipError),

    #[error(transparent)]
    Outbox(#[from] OutboxError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

/// Terminal dispatch for routed messages.
#[async_trait]
pub trait RouterDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        message: OutboundBrokeredMessage,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError>;
}

/// Dispatches routed messages straight to the broker infrastructure.
pub struct InfrastructureRouterDispatcher {
    dispatcher: Arc<dyn MessagingInfrastructureDispatcher>,
}

impl InfrastructureRouterDispatcher {
    pub fn new(dispatcher: Arc<dyn MessagingInfrastructureDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl RouterDispatcher for InfrastructureRouterDispatcher {
    async fn dispatch(
        &self,
        message: OutboundBrokeredMessage,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError> {
        self.dispatcher.dispatch(message, tx).await?;
        Ok(())
    }
}

/// Stages routed messages in the outbox under the transaction's batch id;
/// the background processor dispatches them after the unit of work commits.
pub struct OutboxRouterDispatcher {
    store: Arc<dyn OutboxStore>,
}

impl OutboxRouterDispatcher {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RouterDispatcher for OutboxRouterDispatcher {
    async fn dispatch(
        &self,
        message: OutboundBrokeredMessage,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError> {
        let staged = OutboxMessage::from_outbound(&message, tx.batch_id);
        self.store.send_to_outbox(vec![staged], tx).await?;
        Ok(())
    }
}
