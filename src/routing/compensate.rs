//! Compensation routing.
//!
//! When handling fails after earlier steps already committed side effects,
//! a compensating message carries the failure details to the destination
//! responsible for undoing them. The strategy deciding *how* to compensate
//! is pluggable; the default simply routes a compensating message to the
//! configured compensation destination.

use super::{RouterDispatcher, RoutingError};
use crate::context::{CompensateContext, TransactionContext};
use crate::message::{FailureDetails, InboundBrokeredMessage, OutboundBrokeredMessage};
use async_trait::async_trait;
use std::sync::Arc;

/// Pluggable compensation behavior.
#[async_trait]
pub trait CompensationStrategy: Send + Sync {
    async fn compensate(
        &self,
        inbound: &InboundBrokeredMessage,
        context: &CompensateContext,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError>;
}

/// Default strategy: dispatch a compensating copy of the message to the
/// compensation destination.
pub struct RoutingCompensationStrategy {
    dispatcher: Arc<dyn RouterDispatcher>,
}

impl RoutingCompensationStrategy {
    pub fn new(dispatcher: Arc<dyn RouterDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl CompensationStrategy for RoutingCompensationStrategy {
    async fn compensate(
        &self,
        inbound: &InboundBrokeredMessage,
        context: &CompensateContext,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError> {
        let message = OutboundBrokeredMessage::forward_from(inbound, &context.destination);
        self.dispatcher.dispatch(message, tx).await
    }
}

/// Validates the compensate context, marks the inbound message errored and
/// delegates to the configured [`CompensationStrategy`].
pub struct CompensateRouter {
    strategy: Arc<dyn CompensationStrategy>,
}

impl CompensateRouter {
    pub fn new(strategy: Arc<dyn CompensationStrategy>) -> Self {
        Self { strategy }
    }

    /// Router with the default routing strategy.
    pub fn with_dispatcher(dispatcher: Arc<dyn RouterDispatcher>) -> Self {
        Self::new(Arc::new(RoutingCompensationStrategy::new(dispatcher)))
    }

    pub async fn route(
        &self,
        inbound: &mut InboundBrokeredMessage,
        context: &CompensateContext,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError> {
        if context.reason.trim().is_empty() {
            return Err(RoutingError::Validation(
                "compensation requires a non-empty reason".into(),
            ));
        }
        if context.description.trim().is_empty() {
            return Err(RoutingError::Validation(
                "compensation requires a non-empty description".into(),
            ));
        }

        inbound.mark_error(FailureDetails {
            details: context.reason.clone(),
            description: context.description.clone(),
        });
        tracing::warn!(
            message_id = %inbound.message_id,
            destination = %context.destination,
            reason = %context.reason,
            "routing compensation"
        );
        self.strategy.compensate(inbound, context, tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransactionMode;
    use crate::message::properties;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingRouterDispatcher {
        dispatched: Mutex<Vec<OutboundBrokeredMessage>>,
    }

    #[async_trait]
    impl RouterDispatcher for RecordingRouterDispatcher {
        async fn dispatch(
            &self,
            message: OutboundBrokeredMessage,
            _tx: &TransactionContext,
        ) -> Result<(), RoutingError> {
            self.dispatched.lock().push(message);
            Ok(())
        }
    }

    fn context() -> CompensateContext {
        CompensateContext::new("queue-undo", "order-rejected", "inventory was insufficient")
    }

    #[tokio::test]
    async fn routes_compensation_and_marks_inbound_errored() {
        let dispatcher = Arc::new(RecordingRouterDispatcher::default());
        let router = CompensateRouter::with_dispatcher(dispatcher.clone());
        let tx = TransactionContext::new("queue-a", TransactionMode::ReceiveOnly);
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a");

        router.route(&mut inbound, &context(), &tx).await.unwrap();

        assert!(inbound.is_error());
        let dispatched = dispatcher.dispatched.lock();
        assert_eq!(dispatched[0].destination, "queue-undo");
        assert_eq!(
            dispatched[0].string_property(properties::FAILURE_DETAILS),
            Some("order-rejected")
        );
    }

    #[tokio::test]
    async fn empty_reason_fails_fast_without_dispatch() {
        let dispatcher = Arc::new(RecordingRouterDispatcher::default());
        let router = CompensateRouter::with_dispatcher(dispatcher.clone());
        let tx = TransactionContext::new("queue-a", TransactionMode::ReceiveOnly);
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a");
        let context = CompensateContext::new("queue-undo", "  ", "a description");

        let result = router.route(&mut inbound, &context, &tx).await;

        assert!(matches!(result, Err(RoutingError::Validation(_))));
        assert!(dispatcher.dispatched.lock().is_empty());
        assert!(!inbound.is_error());
    }

    #[tokio::test]
    async fn empty_description_fails_fast() {
        let dispatcher = Arc::new(RecordingRouterDispatcher::default());
        let router = CompensateRouter::with_dispatcher(dispatcher.clone());
        let tx = TransactionContext::new("queue-a", TransactionMode::ReceiveOnly);
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a");
        let context = CompensateContext::new("queue-undo", "a reason", "");

        assert!(matches!(
            router.route(&mut inbound, &context, &tx).await,
            Err(RoutingError::Validation(_))
        ));
    }
}
