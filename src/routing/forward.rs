//! Forward and next-destination routing.

use super::{RouterDispatcher, RoutingError};
use crate::context::{NextDestinationContext, TransactionContext};
use crate::message::{InboundBrokeredMessage, OutboundBrokeredMessage};
use std::sync::Arc;

/// Routes a copy of an inbound message to a new destination, preserving the
/// correlation id. An empty destination is a no-op, not an error.
pub struct ForwardRouter {
    dispatcher: Arc<dyn RouterDispatcher>,
}

impl ForwardRouter {
    pub fn new(dispatcher: Arc<dyn RouterDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn route(
        &self,
        inbound: &InboundBrokeredMessage,
        destination: &str,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError> {
        if destination.is_empty() {
            tracing::debug!(
                message_id = %inbound.message_id,
                "no forward destination, skipping"
            );
            return Ok(());
        }
        let forwarded = OutboundBrokeredMessage::forward_from(inbound, destination);
        self.dispatcher.dispatch(forwarded, tx).await
    }
}

/// Routes to the fixed next hop configured for a receiver.
///
/// Distinct from a routing slip: the hop is a single deployment-time
/// destination, not an itinerary carried by the message.
pub struct NextDestinationRouter {
    forward: ForwardRouter,
}

impl NextDestinationRouter {
    pub fn new(dispatcher: Arc<dyn RouterDispatcher>) -> Self {
        Self {
            forward: ForwardRouter::new(dispatcher),
        }
    }

    pub async fn route(
        &self,
        inbound: &InboundBrokeredMessage,
        next: &NextDestinationContext,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError> {
        self.forward.route(inbound, &next.destination, tx).await
    }
}
