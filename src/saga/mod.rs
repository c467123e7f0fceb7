//! # Saga Orchestration
//!
//! A saga is a stateful, multi-step workflow coordinated across multiple
//! message exchanges, with its own success/failure lifecycle independent of
//! any single message. The orchestrator loads or creates saga state keyed by
//! the saga id carried in message properties, drives each step through the
//! routers, and persists state after every step.
//!
//! Status is one-directional toward a terminal state:
//!
//! ```text
//! NotStarted → InProgress → {Success | Failed | Cancelled}
//! ```
//!
//! `InProgress` may recur any number of times; terminal states absorb.

pub mod persister;

pub use persister::{InMemorySagaPersister, SagaPersister, SagaPersisterError};

use crate::context::{ExchangeContext, TransactionContext};
use crate::message::{properties, InboundBrokeredMessage, OutboundBrokeredMessage};
use crate::routing::{RouterDispatcher, RoutingError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors from saga orchestration.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("saga not found: {0}")]
    NotFound(String),

    #[error("invalid saga status transition: {from} -> {to}")]
    InvalidTransition { from: SagaStatus, to: SagaStatus },

    #[error("saga step handler failed: {0}")]
    Handler(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Persistence(#[from] SagaPersisterError),
}

/// Lifecycle status of a saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    NotStarted,
    InProgress,
    Success,
    Failed,
    Cancelled,
}

impl SagaStatus {
    /// Whether this status is terminal (absorbing).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Success | SagaStatus::Failed | SagaStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaStatus::NotStarted => write!(f, "not-started"),
            SagaStatus::InProgress => write!(f, "in-progress"),
            SagaStatus::Success => write!(f, "success"),
            SagaStatus::Failed => write!(f, "failed"),
            SagaStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Persistent state of one saga instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaContext {
    pub saga_id: String,
    pub status: SagaStatus,
    /// Why the saga reached its current status, for Failed/Cancelled.
    pub reason: Option<String>,
    /// Receiver path the saga is coordinated from.
    pub receiver_path: String,
    /// Destination the saga's messages are routed to.
    pub destination_path: String,
    /// When the state was last persisted.
    pub last_updated: DateTime<Utc>,
}

impl SagaContext {
    pub fn new(
        saga_id: impl Into<String>,
        receiver_path: impl Into<String>,
        destination_path: impl Into<String>,
    ) -> Self {
        Self {
            saga_id: saga_id.into(),
            status: SagaStatus::NotStarted,
            reason: None,
            receiver_path: receiver_path.into(),
            destination_path: destination_path.into(),
            last_updated: Utc::now(),
        }
    }

    /// Move to a new status, enforcing one-directional transitions.
    ///
    /// Terminal states absorb; `InProgress` may recur.
    pub fn transition(&mut self, status: SagaStatus, reason: Option<String>) -> Result<(), SagaError> {
        let allowed = match (self.status, status) {
            (from, to) if from == to && to == SagaStatus::InProgress => true,
            (from, _) if from.is_terminal() => false,
            (SagaStatus::NotStarted, SagaStatus::InProgress) => true,
            (SagaStatus::InProgress, to) if to.is_terminal() => true,
            (SagaStatus::NotStarted, to) if to.is_terminal() => true,
            _ => false,
        };
        if !allowed {
            return Err(SagaError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.reason = reason;
        Ok(())
    }
}

/// Handler invoked for a single saga step.
#[async_trait]
pub trait SagaStepHandler: Send + Sync {
    async fn handle(
        &self,
        inbound: &InboundBrokeredMessage,
        exchange: &mut ExchangeContext,
    ) -> Result<(), SagaError>;
}

/// Drives saga instances through their steps, persisting after each one.
pub struct SagaOrchestrator {
    persister: Arc<dyn SagaPersister>,
    dispatcher: Arc<dyn RouterDispatcher>,
}

impl SagaOrchestrator {
    pub fn new(persister: Arc<dyn SagaPersister>, dispatcher: Arc<dyn RouterDispatcher>) -> Self {
        Self {
            persister,
            dispatcher,
        }
    }

    fn saga_id_of(inbound: &InboundBrokeredMessage) -> String {
        inbound
            .string_property(properties::SAGA_ID)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    fn stamp(inbound: &mut InboundBrokeredMessage, saga: &SagaContext) {
        inbound.set_property(properties::SAGA_ID, Value::String(saga.saga_id.clone()));
        inbound.set_property(
            properties::SAGA_STATUS,
            Value::String(saga.status.to_string()),
        );
    }

    /// Start (or resume) a saga: load state by the saga id carried on the
    /// message, falling back to creating new state, route the saga's first
    /// message to `destination`, mark in-progress and persist.
    pub async fn start(
        &self,
        destination: &str,
        inbound: &mut InboundBrokeredMessage,
        exchange: &mut ExchangeContext,
        tx: &TransactionContext,
    ) -> Result<SagaContext, SagaError> {
        let saga_id = Self::saga_id_of(inbound);
        let mut saga = match self.persister.get_by_id(&saga_id).await? {
            Some(existing) => existing,
            None => SagaContext::new(&saga_id, &inbound.receiver_path, destination),
        };

        saga.transition(SagaStatus::InProgress, None)?;
        Self::stamp(inbound, &saga);

        let mut first = OutboundBrokeredMessage::forward_from(inbound, destination);
        first.set_property(properties::SAGA_ID, Value::String(saga_id.clone()));
        first.set_property(
            properties::SAGA_STATUS,
            Value::String(saga.status.to_string()),
        );
        self.dispatcher.dispatch(first, tx).await?;

        self.persister.persist(&saga, tx).await?;
        tracing::info!(saga_id = %saga.saga_id, destination, "saga started");
        exchange.saga = Some(saga.clone());
        Ok(saga)
    }

    /// Invoke one saga step: load state, run the handler if one is
    /// registered, keep the saga in progress, stamp the message context with
    /// the saga status and persist.
    pub async fn invoke_step(
        &self,
        handler: Option<&dyn SagaStepHandler>,
        inbound: &mut InboundBrokeredMessage,
        exchange: &mut ExchangeContext,
        tx: &TransactionContext,
    ) -> Result<SagaContext, SagaError> {
        let saga_id = Self::saga_id_of(inbound);
        let mut saga = self
            .persister
            .get_by_id(&saga_id)
            .await?
            .ok_or_else(|| SagaError::NotFound(saga_id.clone()))?;

        if let Some(handler) = handler {
            handler.handle(inbound, exchange).await?;
        }

        saga.transition(SagaStatus::InProgress, None)?;
        Self::stamp(inbound, &saga);
        self.persister.persist(&saga, tx).await?;
        exchange.saga = Some(saga.clone());
        Ok(saga)
    }

    /// Complete a saga: load state, run the completing handler, then decide
    /// Failed vs Success from the error/compensate context accumulated
    /// during handling, and persist the terminal status.
    pub async fn complete(
        &self,
        handler: Option<&dyn SagaStepHandler>,
        inbound: &mut InboundBrokeredMessage,
        exchange: &mut ExchangeContext,
        tx: &TransactionContext,
    ) -> Result<SagaContext, SagaError> {
        let saga_id = Self::saga_id_of(inbound);
        let mut saga = self
            .persister
            .get_by_id(&saga_id)
            .await?
            .ok_or_else(|| SagaError::NotFound(saga_id.clone()))?;

        if let Some(handler) = handler {
            handler.handle(inbound, exchange).await?;
        }

        if let Some(error) = &exchange.error {
            saga.transition(SagaStatus::Failed, Some(error.description.clone()))?;
        } else if let Some(compensate) = &exchange.compensate {
            saga.transition(SagaStatus::Failed, Some(compensate.reason.clone()))?;
        } else {
            saga.transition(SagaStatus::Success, None)?;
        }

        Self::stamp(inbound, &saga);
        self.persister.persist(&saga, tx).await?;
        tracing::info!(saga_id = %saga.saga_id, status = %saga.status, "saga completed");
        exchange.saga = Some(saga.clone());
        Ok(saga)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CompensateContext, ErrorContext, TransactionMode};
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

    fn orchestrator() -> (
        SagaOrchestrator,
        Arc<InMemorySagaPersister>,
        Arc<RecordingRouterDispatcher>,
    ) {
        let persister = Arc::new(InMemorySagaPersister::new(std::time::Duration::from_secs(
            3600,
        )));
        let dispatcher = Arc::new(RecordingRouterDispatcher::default());
        (
            SagaOrchestrator::new(persister.clone(), dispatcher.clone()),
            persister,
            dispatcher,
        )
    }

    fn tx() -> TransactionContext {
        TransactionContext::new("queue-saga", TransactionMode::ReceiveOnly)
    }

    #[tokio::test]
    async fn start_creates_state_routes_first_message_and_persists() {
        let (orchestrator, persister, dispatcher) = orchestrator();
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-saga");
        let mut exchange = ExchangeContext::new();

        let saga = orchestrator
            .start("queue-step-1", &mut inbound, &mut exchange, &tx())
            .await
            .unwrap();

        assert_eq!(saga.status, SagaStatus::InProgress);
        assert_eq!(dispatcher.dispatched.lock()[0].destination, "queue-step-1");
        assert!(persister.get_by_id(&saga.saga_id).await.unwrap().is_some());
        assert_eq!(
            inbound.string_property(properties::SAGA_ID),
            Some(saga.saga_id.as_str())
        );
    }

    #[tokio::test]
    async fn invoke_step_keeps_saga_in_progress() {
        let (orchestrator, _persister, _dispatcher) = orchestrator();
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-saga");
        let mut exchange = ExchangeContext::new();
        let started = orchestrator
            .start("queue-step-1", &mut inbound, &mut exchange, &tx())
            .await
            .unwrap();

        let saga = orchestrator
            .invoke_step(None, &mut inbound, &mut exchange, &tx())
            .await
            .unwrap();

        assert_eq!(saga.saga_id, started.saga_id);
        assert_eq!(saga.status, SagaStatus::InProgress);
        assert_eq!(
            inbound.string_property(properties::SAGA_STATUS),
            Some("in-progress")
        );
    }

    #[tokio::test]
    async fn complete_without_errors_succeeds() {
        let (orchestrator, persister, _dispatcher) = orchestrator();
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-saga");
        let mut exchange = ExchangeContext::new();
        orchestrator
            .start("queue-step-1", &mut inbound, &mut exchange, &tx())
            .await
            .unwrap();

        let saga = orchestrator
            .complete(None, &mut inbound, &mut exchange, &tx())
            .await
            .unwrap();

        assert_eq!(saga.status, SagaStatus::Success);
        assert_eq!(
            persister
                .get_by_id(&saga.saga_id)
                .await
                .unwrap()
                .unwrap()
                .status,
            SagaStatus::Success
        );
    }

    #[tokio::test]
    async fn complete_with_error_context_fails_the_saga() {
        let (orchestrator, _persister, _dispatcher) = orchestrator();
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-saga");
        let mut exchange = ExchangeContext::new();
        orchestrator
            .start("queue-step-1", &mut inbound, &mut exchange, &tx())
            .await
            .unwrap();
        exchange.error = Some(ErrorContext::new("boom", "step 2 failed"));

        let saga = orchestrator
            .complete(None, &mut inbound, &mut exchange, &tx())
            .await
            .unwrap();

        assert_eq!(saga.status, SagaStatus::Failed);
        assert_eq!(saga.reason.as_deref(), Some("step 2 failed"));
    }

    #[tokio::test]
    async fn complete_with_compensate_context_fails_the_saga() {
        let (orchestrator, _persister, _dispatcher) = orchestrator();
        let mut inbound = InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-saga");
        let mut exchange = ExchangeContext::new();
        orchestrator
            .start("queue-step-1", &mut inbound, &mut exchange, &tx())
            .await
            .unwrap();
        exchange.compensate = Some(CompensateContext::new(
            "queue-undo",
            "rejected",
            "inventory short",
        ));

        let saga = orchestrator
            .complete(None, &mut inbound, &mut exchange, &tx())
            .await
            .unwrap();

        assert_eq!(saga.status, SagaStatus::Failed);
    }

    #[test]
    fn terminal_status_absorbs() {
        let mut saga = SagaContext::new("saga-1", "queue-saga", "queue-step-1");
        saga.transition(SagaStatus::InProgress, None).unwrap();
        saga.transition(SagaStatus::Success, None).unwrap();

        assert!(saga.transition(SagaStatus::InProgress, None).is_err());
        assert!(saga
            .transition(SagaStatus::Failed, Some("late".into()))
            .is_err());
        assert_eq!(saga.status, SagaStatus::Success);
    }

    #[test]
    fn in_progress_may_recur() {
        let mut saga = SagaContext::new("saga-1", "queue-saga", "queue-step-1");
        saga.transition(SagaStatus::InProgress, None).unwrap();
        saga.transition(SagaStatus::InProgress, None).unwrap();
        saga.transition(SagaStatus::InProgress, None).unwrap();

        assert_eq!(saga.status, SagaStatus::InProgress);
    }
}
