//! # Receive-Scoped Contexts
//!
//! Two context objects travel with every message receive:
//!
//! - [`TransactionContext`]: the ambient transactional scope — which receiver
//!   owns the operation, the transaction mode negotiated with the
//!   infrastructure, the active [`UnitOfWork`] and the batch id grouping all
//!   outbox writes staged during this receive.
//! - [`ExchangeContext`]: the cross-cutting concerns a handler or pipeline
//!   stage registers during processing, as named optional fields (reply
//!   destination, next hop, compensation details, routing slip, saga state,
//!   failure details). Fields are explicit rather than a type-keyed bag so
//!   every concern the pipeline can act on is visible in one place.
//!
//! Both are scoped to exactly one receive operation and are never shared
//! across concurrent receives.

use crate::routing::slip::RoutingSlip;
use crate::saga::SagaContext;
use crate::uow::UnitOfWork;
use std::sync::Arc;
use uuid::Uuid;

/// How the receive operation coordinates with transport and persistence
/// transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TransactionMode {
    /// No transactional coordination.
    None,
    /// The receive itself is transactional (settle on completion); sends are
    /// coordinated through the outbox.
    #[default]
    ReceiveOnly,
    /// Receive and send share one infrastructure-native transaction.
    FullAtomicityViaInfrastructure,
}

/// Ambient transactional scope for one message receive.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    /// Path of the receiver that owns this operation.
    pub receiver: String,
    /// Negotiated transaction mode.
    pub mode: TransactionMode,
    /// Groups all outbox messages staged during this receive so they can be
    /// drained together.
    pub batch_id: Uuid,
    /// Active unit of work, if a transactional stage has opened one.
    pub uow: Option<Arc<UnitOfWork>>,
}

impl TransactionContext {
    /// New context for a receiver, with a fresh batch id and no unit of work.
    pub fn new(receiver: impl Into<String>, mode: TransactionMode) -> Self {
        Self {
            receiver: receiver.into(),
            mode,
            batch_id: Uuid::new_v4(),
            uow: None,
        }
    }

    /// The active unit of work, if any.
    pub fn unit_of_work(&self) -> Option<&Arc<UnitOfWork>> {
        self.uow.as_ref()
    }
}

/// Reply destination registered during handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyContext {
    /// Destination the reply is routed to.
    pub destination: String,
    /// Session/group id stamped on the reply so the requester can correlate.
    pub reply_to_group_id: Option<String>,
}

impl ReplyContext {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            reply_to_group_id: None,
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.reply_to_group_id = Some(group_id.into());
        self
    }
}

/// Fixed next hop configured for a receiver in a multi-step pipeline.
///
/// Distinct from a routing slip: the next destination is a single hop chosen
/// at deployment time, not an itinerary carried by the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextDestinationContext {
    pub destination: String,
}

impl NextDestinationContext {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
        }
    }
}

/// Compensation details registered during handling.
///
/// Both `reason` and `description` must be non-empty; the compensate router
/// rejects the context otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensateContext {
    /// Destination the compensating message is routed to.
    pub destination: String,
    /// Machine-oriented reason for compensating.
    pub reason: String,
    /// Human-oriented description of what went wrong.
    pub description: String,
}

impl CompensateContext {
    pub fn new(
        destination: impl Into<String>,
        reason: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            reason: reason.into(),
            description: description.into(),
        }
    }
}

/// Failure details captured when handling raised an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub details: String,
    pub description: String,
}

impl ErrorContext {
    pub fn new(details: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            details: details.into(),
            description: description.into(),
        }
    }
}

/// Cross-cutting concerns accumulated while one message is handled.
///
/// Every field is an explicitly named, optional concern the dispatch pipeline
/// knows how to act on after the business handler returns.
#[derive(Debug, Clone, Default)]
pub struct ExchangeContext {
    /// Reply routing requested by the handler.
    pub reply: Option<ReplyContext>,
    /// Fixed next-destination hop for this receiver.
    pub next: Option<NextDestinationContext>,
    /// Compensation to route if dispatch fails.
    pub compensate: Option<CompensateContext>,
    /// Routing slip parsed from the inbound message, if it carried one.
    pub routing_slip: Option<RoutingSlip>,
    /// Saga state loaded or created for this message.
    pub saga: Option<SagaContext>,
    /// Failure details recorded during handling.
    pub error: Option<ErrorContext>,
}

impl ExchangeContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_context_gets_fresh_batch_id() {
        let a = TransactionContext::new("queue-a", TransactionMode::ReceiveOnly);
        let b = TransactionContext::new("queue-a", TransactionMode::ReceiveOnly);

        assert_ne!(a.batch_id, b.batch_id);
        assert!(a.unit_of_work().is_none());
    }

    #[test]
    fn exchange_context_starts_empty() {
        let exchange = ExchangeContext::new();

        assert!(exchange.reply.is_none());
        assert!(exchange.next.is_none());
        assert!(exchange.compensate.is_none());
        assert!(exchange.routing_slip.is_none());
        assert!(exchange.saga.is_none());
        assert!(exchange.error.is_none());
    }
}
