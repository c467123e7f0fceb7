//! # broker-relay
//!
//! Broker-agnostic reliability core for message-driven services: the pieces
//! between business handlers and a message transport that make delivery
//! dependable without the transport's help.
//!
//! ## Architecture
//!
//! The core never talks to a wire protocol. Concrete broker adapters sit
//! behind the ports in [`port`]; everything else composes around the
//! receive pipeline: a message arrives, flows through the statically-ordered
//! [`dispatch::DispatchPipeline`], and is settled according to the outcome,
//! with the [`recovery::RecoveryEngine`] deciding retry vs. error queue vs.
//! dead-letter.
//!
//! ## Modules
//!
//! - [`message`]: brokered message envelopes and well-known properties
//! - [`codec`]: body converters keyed by content type
//! - [`context`]: transaction and exchange context for one receive
//! - [`port`]: infrastructure receiver/dispatcher ports
//! - [`uow`]: unit of work with enlisted operations
//! - [`outbox`]: transactional outbox store and background processor
//! - [`inbox`]: idempotent receive via inbox deduplication
//! - [`circuit`]: per-operation-class circuit breaker
//! - [`recovery`]: retry/recovery engine and error classification
//! - [`routing`]: forward, reply, compensate and routing-slip routers
//! - [`dispatch`]: the dispatch pipeline and its stages
//! - [`saga`]: saga orchestration and persistence
//! - [`receiver`]: the worker loop tying receive, dispatch and settlement
//!   together

pub mod circuit;
pub mod codec;
pub mod context;
pub mod dispatch;
pub mod inbox;
pub mod message;
pub mod outbox;
pub mod port;
pub mod receiver;
pub mod recovery;
pub mod routing;
pub mod saga;
pub mod uow;

pub use circuit::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerResult, CircuitBreakerSnapshot,
    CircuitState, CriticalFailureEvent, CriticalFailureNotifier, CriticalFailureWatcher,
    LoggingCriticalFailureNotifier,
};
pub use codec::{
    BodyConverter, BodyConverterRegistry, CodecError, JsonBodyConverter, APPLICATION_JSON,
};
pub use context::{
    CompensateContext, ErrorContext, ExchangeContext, NextDestinationContext, ReplyContext,
    TransactionContext, TransactionMode,
};
pub use dispatch::{
    AtomicRoutingStage, DispatchError, DispatchPipeline, DispatchPipelineBuilder, DispatchStage,
    HandlingContext, InboxDedupStage, MessageDispatcher, Next, RoutingSlipStage, UnitOfWorkStage,
};
pub use inbox::{
    receive_via_inbox, InMemoryInbox, InboxError, InboxOutcome, InboxReceiveError, InboxStore,
};
pub use message::{properties, FailureDetails, InboundBrokeredMessage, OutboundBrokeredMessage};
pub use outbox::memory::InMemoryOutbox;
pub use outbox::processor::{
    OutboxProcessor, OutboxProcessorConfig, ProcessResult, ProcessorMetrics,
};
pub use outbox::{MarkOutcome, OutboxError, OutboxMessage, OutboxStore};
pub use port::{
    InfrastructureError, MessagingInfrastructureDispatcher, MessagingInfrastructureReceiver,
    ReceiverOptions,
};
pub use receiver::{BrokeredMessageReceiver, ReceiverConfig};
pub use recovery::classification::ErrorClassifier;
pub use recovery::{
    DelayStrategy, ErrorQueueForwarder, FailureContext, RecoveryAction, RecoveryConfig,
    RecoveryEngine, RecoveryError, RecoveryState,
};
pub use routing::compensate::{CompensateRouter, CompensationStrategy, RoutingCompensationStrategy};
pub use routing::forward::{ForwardRouter, NextDestinationRouter};
pub use routing::reply::ReplyRouter;
pub use routing::sender::BrokeredMessageSender;
pub use routing::slip::{RoutingSlip, RoutingSlipBuilder, RoutingSlipError, RoutingStep};
pub use routing::{
    InfrastructureRouterDispatcher, OutboxRouterDispatcher, RouterDispatcher, RoutingError,
};
pub use saga::persister::{InMemorySagaPersister, SagaPersister, SagaPersisterError};
pub use saga::{SagaContext, SagaError, SagaOrchestrator, SagaStatus, SagaStepHandler};
pub use uow::{UnitOfWork, UowError, UowStatus};
