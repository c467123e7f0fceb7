//! # Dispatch Pipeline
//!
//! The business dispatch (a black box behind [`MessageDispatcher`]) is
//! wrapped by an explicit, statically-ordered list of [`DispatchStage`]s
//! fixed at startup. Each stage has a pre/post contract around the rest of
//! the pipeline; the standard order, outermost first:
//!
//! 1. [`UnitOfWorkStage`] — begin a unit of work, commit on success, roll
//!    back and rethrow on failure.
//! 2. [`InboxDedupStage`] — skip messages already recorded in the inbox;
//!    record the id only after everything inside succeeded.
//! 3. [`RoutingSlipStage`] — parse the slip, advance and forward on success,
//!    flip to compensation mode on failure before rethrowing.
//! 4. [`AtomicRoutingStage`] — route reply/next-destination after success;
//!    route compensation instead of propagating when a compensate context
//!    was registered.

use crate::context::{ErrorContext, ExchangeContext, TransactionContext};
use crate::inbox::{InboxError, InboxReceiveError, InboxStore};
use crate::message::InboundBrokeredMessage;
use crate::routing::compensate::CompensateRouter;
use crate::routing::forward::{ForwardRouter, NextDestinationRouter};
use crate::routing::reply::ReplyRouter;
use crate::routing::slip::RoutingSlip;
use crate::routing::{RouterDispatcher, RoutingError};
use crate::uow::{UnitOfWork, UowError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the dispatch pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The business handler failed.
    #[error("message handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Inbox(#[from] InboxError),

    #[error(transparent)]
    UnitOfWork(#[from] UowError),

    #[error(transparent)]
    Codec(#[from] crate::codec::CodecError),

    #[error(transparent)]
    Saga(#[from] crate::saga::SagaError),
}

impl DispatchError {
    /// Wrap a business-handler error.
    pub fn handler(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        DispatchError::Handler(Box::new(error))
    }

    /// Whether this failure must skip the retry pipeline entirely: poisoned
    /// bodies and validation failures go straight to dead-letter.
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            DispatchError::Codec(codec) => codec.is_poisoned(),
            DispatchError::Routing(RoutingError::Validation(_)) => true,
            _ => false,
        }
    }
}

/// Everything one message receive carries through the pipeline.
#[derive(Debug)]
pub struct HandlingContext {
    pub inbound: InboundBrokeredMessage,
    pub tx: TransactionContext,
    pub exchange: ExchangeContext,
}

impl HandlingContext {
    pub fn new(inbound: InboundBrokeredMessage, tx: TransactionContext) -> Self {
        Self {
            inbound,
            tx,
            exchange: ExchangeContext::new(),
        }
    }
}

/// Terminal business dispatch. External collaborator; the pipeline treats it
/// as a black box.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    async fn dispatch(&self, ctx: &mut HandlingContext) -> Result<(), DispatchError>;
}

/// One stage of the pipeline, wrapping everything after it.
#[async_trait]
pub trait DispatchStage: Send + Sync {
    async fn handle(&self, ctx: &mut HandlingContext, next: Next<'_>) -> Result<(), DispatchError>;
}

/// The remainder of the pipeline from a stage's point of view.
pub struct Next<'a> {
    stages: &'a [Arc<dyn DispatchStage>],
    terminal: &'a dyn MessageDispatcher,
}

impl<'a> Next<'a> {
    /// Run the rest of the pipeline.
    pub async fn run(self, ctx: &mut HandlingContext) -> Result<(), DispatchError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(
                        ctx,
                        Next {
                            stages: rest,
                            terminal: self.terminal,
                        },
                    )
                    .await
            }
            None => self.terminal.dispatch(ctx).await,
        }
    }
}

/// Statically-ordered dispatch pipeline configured at startup.
pub struct DispatchPipeline {
    stages: Vec<Arc<dyn DispatchStage>>,
    terminal: Arc<dyn MessageDispatcher>,
}

impl DispatchPipeline {
    pub fn builder(terminal: Arc<dyn MessageDispatcher>) -> DispatchPipelineBuilder {
        DispatchPipelineBuilder {
            stages: Vec::new(),
            terminal,
        }
    }

    /// The standard stage order: unit of work, inbox dedup, routing slip,
    /// atomic routing.
    pub fn standard(
        inbox: Arc<dyn InboxStore>,
        router_dispatcher: Arc<dyn RouterDispatcher>,
        terminal: Arc<dyn MessageDispatcher>,
    ) -> Self {
        Self::builder(terminal)
            .with_stage(Arc::new(UnitOfWorkStage))
            .with_stage(Arc::new(InboxDedupStage::new(inbox)))
            .with_stage(Arc::new(RoutingSlipStage::new(router_dispatcher.clone())))
            .with_stage(Arc::new(AtomicRoutingStage::new(router_dispatcher)))
            .build()
    }

    /// Dispatch one message through every stage in order.
    pub async fn dispatch(&self, ctx: &mut HandlingContext) -> Result<(), DispatchError> {
        Next {
            stages: &self.stages,
            terminal: self.terminal.as_ref(),
        }
        .run(ctx)
        .await
    }
}

/// Builder fixing the stage order at startup.
pub struct DispatchPipelineBuilder {
    stages: Vec<Arc<dyn DispatchStage>>,
    terminal: Arc<dyn MessageDispatcher>,
}

impl DispatchPipelineBuilder {
    pub fn with_stage(mut self, stage: Arc<dyn DispatchStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> DispatchPipeline {
        DispatchPipeline {
            stages: self.stages,
            terminal: self.terminal,
        }
    }
}

/// Opens a [`UnitOfWork`] around the rest of the pipeline: commit on
/// success (business writes and reliability writes together), rollback and
/// rethrow on any failure.
pub struct UnitOfWorkStage;

#[async_trait]
impl DispatchStage for UnitOfWorkStage {
    async fn handle(&self, ctx: &mut HandlingContext, next: Next<'_>) -> Result<(), DispatchError> {
        let uow = Arc::new(UnitOfWork::new());
        ctx.tx.uow = Some(uow.clone());
        match next.run(ctx).await {
            Ok(()) => {
                uow.commit()?;
                Ok(())
            }
            Err(error) => {
                if let Err(rollback_error) = uow.rollback() {
                    tracing::error!(
                        message_id = %ctx.inbound.message_id,
                        %rollback_error,
                        "rollback failed after dispatch error"
                    );
                }
                Err(error)
            }
        }
    }
}

/// Couples business dispatch with inbox marking: a message id already in the
/// inbox is never redispatched to business logic, regardless of outer
/// retries.
pub struct InboxDedupStage {
    inbox: Arc<dyn InboxStore>,
}

impl InboxDedupStage {
    pub fn new(inbox: Arc<dyn InboxStore>) -> Self {
        Self { inbox }
    }
}

#[async_trait]
impl DispatchStage for InboxDedupStage {
    async fn handle(&self, ctx: &mut HandlingContext, next: Next<'_>) -> Result<(), DispatchError> {
        let message_id = ctx.inbound.message_id.clone();
        let tx = ctx.tx.clone();
        let outcome =
            crate::inbox::receive_via_inbox(self.inbox.as_ref(), &message_id, &tx, || {
                next.run(ctx)
            })
            .await;
        match outcome {
            Ok(crate::inbox::InboxOutcome::AlreadyReceived) => {
                tracing::debug!(%message_id, "duplicate delivery, skipping dispatch");
                Ok(())
            }
            Ok(crate::inbox::InboxOutcome::Handled) => Ok(()),
            Err(InboxReceiveError::Store(error)) => Err(error.into()),
            Err(InboxReceiveError::Handler(error)) => Err(error),
        }
    }
}

/// Parses a routing slip off the message, advances it after a successful
/// handle and forwards to the next hop; on failure flips the slip into
/// compensation mode before rethrowing.
///
/// A receive that returned `Ok` but registered a compensate or error context
/// (an inner stage swallowed the failure after routing compensation) still
/// counts as a failure for the itinerary: the slip flips and the forward is
/// skipped. A slip never advances and compensates in the same receive.
pub struct RoutingSlipStage {
    forward: ForwardRouter,
}

impl RoutingSlipStage {
    pub fn new(dispatcher: Arc<dyn RouterDispatcher>) -> Self {
        Self {
            forward: ForwardRouter::new(dispatcher),
        }
    }

    fn flip_to_compensation(ctx: &mut HandlingContext) {
        if let Some(slip) = ctx.exchange.routing_slip.as_mut() {
            slip.compensate();
            let compensating = slip.clone();
            if let Err(slip_error) = compensating.apply_to_inbound(&mut ctx.inbound) {
                tracing::error!(
                    message_id = %ctx.inbound.message_id,
                    %slip_error,
                    "failed to store compensating slip"
                );
            }
        }
    }
}

#[async_trait]
impl DispatchStage for RoutingSlipStage {
    async fn handle(&self, ctx: &mut HandlingContext, next: Next<'_>) -> Result<(), DispatchError> {
        ctx.exchange.routing_slip =
            RoutingSlip::from_properties(&ctx.inbound).map_err(RoutingError::from)?;

        match next.run(ctx).await {
            Ok(()) => {
                if ctx.exchange.error.is_some() || ctx.exchange.compensate.is_some() {
                    tracing::warn!(
                        message_id = %ctx.inbound.message_id,
                        "handling compensated, itinerary will not advance"
                    );
                    Self::flip_to_compensation(ctx);
                    return Ok(());
                }
                let advanced = ctx.exchange.routing_slip.as_mut().and_then(|slip| {
                    slip.route_to_next_step()
                        .map(|destination| (destination, slip.clone()))
                });
                if let Some((destination, slip)) = advanced {
                    slip.apply_to_inbound(&mut ctx.inbound)
                        .map_err(RoutingError::from)?;
                    self.forward
                        .route(&ctx.inbound, &destination, &ctx.tx)
                        .await?;
                }
                Ok(())
            }
            Err(error) => {
                Self::flip_to_compensation(ctx);
                Err(error)
            }
        }
    }
}

/// After a successful dispatch, routes the reply and next-destination
/// contexts accumulated during handling. On failure, routes a compensation
/// message instead of propagating — but only when a compensate context was
/// registered; otherwise the error rethrows untouched.
pub struct AtomicRoutingStage {
    reply: ReplyRouter,
    next_destination: NextDestinationRouter,
    compensate: CompensateRouter,
}

impl AtomicRoutingStage {
    pub fn new(dispatcher: Arc<dyn RouterDispatcher>) -> Self {
        Self {
            reply: ReplyRouter::new(dispatcher.clone()),
            next_destination: NextDestinationRouter::new(dispatcher.clone()),
            compensate: CompensateRouter::with_dispatcher(dispatcher),
        }
    }
}

#[async_trait]
impl DispatchStage for AtomicRoutingStage {
    async fn handle(&self, ctx: &mut HandlingContext, next: Next<'_>) -> Result<(), DispatchError> {
        match next.run(ctx).await {
            Ok(()) => {
                if let Some(reply) = ctx.exchange.reply.clone() {
                    self.reply.route(&mut ctx.inbound, &reply, &ctx.tx).await?;
                }
                if let Some(next_destination) = ctx.exchange.next.clone() {
                    self.next_destination
                        .route(&ctx.inbound, &next_destination, &ctx.tx)
                        .await?;
                }
                Ok(())
            }
            Err(error) => match ctx.exchange.compensate.clone() {
                Some(compensate) => {
                    self.compensate
                        .route(&mut ctx.inbound, &compensate, &ctx.tx)
                        .await?;
                    ctx.exchange.error =
                        Some(ErrorContext::new(error.to_string(), compensate.description));
                    tracing::warn!(
                        message_id = %ctx.inbound.message_id,
                        %error,
                        "dispatch failed, compensation routed"
                    );
                    Ok(())
                }
                None => Err(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CompensateContext, NextDestinationContext, ReplyContext, TransactionMode};
    use crate::inbox::InMemoryInbox;
    use crate::message::{properties, OutboundBrokeredMessage};
    use crate::routing::slip::RoutingStep;
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Debug, Error)]
    #[error("handler exploded")]
    struct HandlerFault;

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

    struct StubDispatcher {
        fail: bool,
        invocations: Mutex<u32>,
        on_dispatch: Option<Box<dyn Fn(&mut ExchangeContext) + Send + Sync>>,
    }

    impl StubDispatcher {
        fn succeeding() -> Self {
            Self {
                fail: false,
                invocations: Mutex::new(0),
                on_dispatch: None,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                invocations: Mutex::new(0),
                on_dispatch: None,
            }
        }

        fn with_exchange(mut self, f: impl Fn(&mut ExchangeContext) + Send + Sync + 'static) -> Self {
            self.on_dispatch = Some(Box::new(f));
            self
        }
    }

    #[async_trait]
    impl MessageDispatcher for StubDispatcher {
        async fn dispatch(&self, ctx: &mut HandlingContext) -> Result<(), DispatchError> {
            *self.invocations.lock() += 1;
            if let Some(f) = &self.on_dispatch {
                f(&mut ctx.exchange);
            }
            if self.fail {
                return Err(DispatchError::handler(HandlerFault));
            }
            Ok(())
        }
    }

    fn handling_context(inbound: InboundBrokeredMessage) -> HandlingContext {
        HandlingContext::new(
            inbound,
            TransactionContext::new("queue-a", TransactionMode::ReceiveOnly),
        )
    }

    struct NamedStage {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl DispatchStage for NamedStage {
        async fn handle(
            &self,
            ctx: &mut HandlingContext,
            next: Next<'_>,
        ) -> Result<(), DispatchError> {
            self.order.lock().push(self.name);
            next.run(ctx).await
        }
    }

    #[tokio::test]
    async fn stages_run_in_configured_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = DispatchPipeline::builder(Arc::new(StubDispatcher::succeeding()))
            .with_stage(Arc::new(NamedStage {
                name: "first",
                order: order.clone(),
            }))
            .with_stage(Arc::new(NamedStage {
                name: "second",
                order: order.clone(),
            }))
            .build();
        let mut ctx =
            handling_context(InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a"));

        pipeline.dispatch(&mut ctx).await.unwrap();

        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn unit_of_work_commits_on_success_and_rolls_back_on_failure() {
        let ok = DispatchPipeline::builder(Arc::new(StubDispatcher::succeeding()))
            .with_stage(Arc::new(UnitOfWorkStage))
            .build();
        let mut ctx =
            handling_context(InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a"));
        ok.dispatch(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.tx.uow.as_ref().unwrap().status(),
            crate::uow::UowStatus::Committed
        );

        let failing = DispatchPipeline::builder(Arc::new(StubDispatcher::failing()))
            .with_stage(Arc::new(UnitOfWorkStage))
            .build();
        let mut ctx =
            handling_context(InboundBrokeredMessage::new("msg-2", b"{}".to_vec(), "queue-a"));
        assert!(failing.dispatch(&mut ctx).await.is_err());
        assert_eq!(
            ctx.tx.uow.as_ref().unwrap().status(),
            crate::uow::UowStatus::RolledBack
        );
    }

    #[tokio::test]
    async fn duplicate_delivery_skips_business_dispatch() {
        let inbox = Arc::new(InMemoryInbox::new());
        let terminal = Arc::new(StubDispatcher::succeeding());
        let pipeline = DispatchPipeline::builder(terminal.clone())
            .with_stage(Arc::new(InboxDedupStage::new(inbox)))
            .build();

        for _ in 0..2 {
            let mut ctx = handling_context(InboundBrokeredMessage::new(
                "msg-1",
                b"{}".to_vec(),
                "queue-a",
            ));
            pipeline.dispatch(&mut ctx).await.unwrap();
        }

        assert_eq!(*terminal.invocations.lock(), 1);
    }

    #[tokio::test]
    async fn slip_is_advanced_and_forwarded_on_success() {
        let router = Arc::new(RecordingRouterDispatcher::default());
        let pipeline = DispatchPipeline::builder(Arc::new(StubDispatcher::succeeding()))
            .with_stage(Arc::new(RoutingSlipStage::new(router.clone())))
            .build();
        let slip = RoutingSlip::builder(Uuid::new_v4())
            .with_step(RoutingStep::to("svcB").with_compensating_step("svcB-undo"))
            .with_step(RoutingStep::to("svcC"))
            .build();
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a");
        slip.apply_to_inbound(&mut inbound).unwrap();
        let mut ctx = handling_context(inbound);

        pipeline.dispatch(&mut ctx).await.unwrap();

        let dispatched = router.dispatched.lock();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].destination, "svcB");

        let carried: RoutingSlip = serde_json::from_value(
            dispatched[0]
                .application_properties
                .get(properties::ROUTING_SLIP)
                .unwrap()
                .clone(),
        )
        .unwrap();
        assert_eq!(carried.visited.len(), 1);
        assert_eq!(carried.route.len(), 1);
        assert_eq!(carried.route[0].destination_path, "svcC");
    }

    #[tokio::test]
    async fn slip_flips_to_compensation_on_failure() {
        let router = Arc::new(RecordingRouterDispatcher::default());
        let pipeline = DispatchPipeline::builder(Arc::new(StubDispatcher::failing()))
            .with_stage(Arc::new(RoutingSlipStage::new(router.clone())))
            .build();
        let mut slip = RoutingSlip::builder(Uuid::new_v4())
            .with_step(RoutingStep::to("svcB").with_compensating_step("svcB-undo"))
            .with_step(RoutingStep::to("svcC"))
            .build();
        // svcB already ran on a previous hop.
        slip.route_to_next_step();
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a");
        slip.apply_to_inbound(&mut inbound).unwrap();
        let mut ctx = handling_context(inbound);

        let result = pipeline.dispatch(&mut ctx).await;

        assert!(result.is_err());
        let slip = ctx.exchange.routing_slip.unwrap();
        assert!(slip.compensating);
        assert_eq!(slip.route[0].destination_path, "svcB-undo");
        // Nothing was forwarded; the error propagates to recovery.
        assert!(router.dispatched.lock().is_empty());
    }

    #[tokio::test]
    async fn compensated_handling_never_advances_the_slip() {
        let router = Arc::new(RecordingRouterDispatcher::default());
        // Inner stage routes compensation and swallows the handler error.
        let terminal = Arc::new(StubDispatcher::failing().with_exchange(|exchange| {
            exchange.compensate = Some(CompensateContext::new(
                "queue-undo",
                "step-failed",
                "downstream rejected the order",
            ));
        }));
        let pipeline = DispatchPipeline::builder(terminal)
            .with_stage(Arc::new(RoutingSlipStage::new(router.clone())))
            .with_stage(Arc::new(AtomicRoutingStage::new(router.clone())))
            .build();
        let mut slip = RoutingSlip::builder(Uuid::new_v4())
            .with_step(RoutingStep::to("svcB").with_compensating_step("svcB-undo"))
            .with_step(RoutingStep::to("svcC"))
            .build();
        // svcB already ran on a previous hop.
        slip.route_to_next_step();
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a");
        slip.apply_to_inbound(&mut inbound).unwrap();
        let mut ctx = handling_context(inbound);

        pipeline.dispatch(&mut ctx).await.unwrap();

        // Only the compensation was routed; the itinerary did not continue
        // to svcC.
        let destinations: Vec<String> = router
            .dispatched
            .lock()
            .iter()
            .map(|m| m.destination.clone())
            .collect();
        assert_eq!(destinations, vec!["queue-undo"]);
        let slip = ctx.exchange.routing_slip.unwrap();
        assert!(slip.compensating);
        assert_eq!(slip.route[0].destination_path, "svcB-undo");
    }

    #[tokio::test]
    async fn message_without_slip_passes_through() {
        let router = Arc::new(RecordingRouterDispatcher::default());
        let pipeline = DispatchPipeline::builder(Arc::new(StubDispatcher::succeeding()))
            .with_stage(Arc::new(RoutingSlipStage::new(router.clone())))
            .build();
        let mut ctx =
            handling_context(InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a"));

        pipeline.dispatch(&mut ctx).await.unwrap();

        assert!(ctx.exchange.routing_slip.is_none());
        assert!(router.dispatched.lock().is_empty());
    }

    #[tokio::test]
    async fn reply_and_next_destination_route_after_success() {
        let router = Arc::new(RecordingRouterDispatcher::default());
        let terminal = Arc::new(StubDispatcher::succeeding().with_exchange(|exchange| {
            exchange.reply = Some(ReplyContext::new("queue-replies"));
            exchange.next = Some(NextDestinationContext::new("queue-next"));
        }));
        let pipeline = DispatchPipeline::builder(terminal)
            .with_stage(Arc::new(AtomicRoutingStage::new(router.clone())))
            .build();
        let mut ctx =
            handling_context(InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a"));

        pipeline.dispatch(&mut ctx).await.unwrap();

        let destinations: Vec<String> = router
            .dispatched
            .lock()
            .iter()
            .map(|m| m.destination.clone())
            .collect();
        assert_eq!(destinations, vec!["queue-replies", "queue-next"]);
    }

    #[tokio::test]
    async fn failure_with_compensate_context_swallows_and_routes_compensation() {
        let router = Arc::new(RecordingRouterDispatcher::default());
        let terminal = Arc::new(StubDispatcher::failing().with_exchange(|exchange| {
            exchange.compensate = Some(CompensateContext::new(
                "queue-undo",
                "step-failed",
                "downstream rejected the order",
            ));
        }));
        let pipeline = DispatchPipeline::builder(terminal)
            .with_stage(Arc::new(AtomicRoutingStage::new(router.clone())))
            .build();
        let mut ctx =
            handling_context(InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a"));

        pipeline.dispatch(&mut ctx).await.unwrap();

        assert_eq!(router.dispatched.lock()[0].destination, "queue-undo");
        assert!(ctx.exchange.error.is_some());
    }

    #[tokio::test]
    async fn failure_without_compensate_context_rethrows() {
        let router = Arc::new(RecordingRouterDispatcher::default());
        let pipeline = DispatchPipeline::builder(Arc::new(StubDispatcher::failing()))
            .with_stage(Arc::new(AtomicRoutingStage::new(router.clone())))
            .build();
        let mut ctx =
            handling_context(InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a"));

        let result = pipeline.dispatch(&mut ctx).await;

        assert!(matches!(result, Err(DispatchError::Handler(_))));
        assert!(router.dispatched.lock().is_empty());
    }

    #[tokio::test]
    async fn unrecoverable_classification() {
        let poisoned = DispatchError::Codec(crate::codec::CodecError::PoisonedMessage {
            content_type: "application/json".into(),
            reason: "bad".into(),
        });
        let validation =
            DispatchError::Routing(RoutingError::Validation("missing destination".into()));
        let handler = DispatchError::handler(HandlerFault);

        assert!(poisoned.is_unrecoverable());
        assert!(validation.is_unrecoverable());
        assert!(!handler.is_unrecoverable());
    }
}
