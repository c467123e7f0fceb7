//! # Retry / Recovery Engine
//!
//! Decides what happens to a message that failed to process: delay and let
//! the transport redeliver ([`RecoveryState::Retrying`]), forward to the
//! configured error queue ([`RecoveryState::RecoveryActionExecuted`]), or
//! fall back to the transport's native dead-letter
//! ([`RecoveryState::DeadLetter`]).
//!
//! The delay is awaited, never busy-waited, and is applied before the
//! decision so every path backs off a flaky downstream.

pub mod classification;

use crate::context::TransactionContext;
use crate::message::{properties, InboundBrokeredMessage, OutboundBrokeredMessage};
use crate::port::MessagingInfrastructureDispatcher;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from recovery operations.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("recovery action failed: {0}")]
    ActionFailed(String),

    #[error(transparent)]
    Infrastructure(#[from] crate::port::InfrastructureError),
}

/// Outcome of running recovery for a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Retry budget remains; the caller should nack so the transport
    /// redelivers.
    Retrying,
    /// Retries exhausted and the recovery action ran (message forwarded to
    /// the error queue); the caller should ack.
    RecoveryActionExecuted,
    /// Retries exhausted and no error queue is configured; the caller should
    /// use the transport's native dead-letter.
    DeadLetter,
}

/// Delay applied before the next delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayStrategy {
    /// Same delay for every attempt.
    Constant(Duration),
    /// Halved exponential backoff in whole seconds, capped at `max`:
    /// attempt 1 waits nothing, attempt n waits `2^(n-1)` seconds.
    Exponential { max: Duration },
}

impl Default for DelayStrategy {
    fn default() -> Self {
        DelayStrategy::Exponential {
            max: Duration::from_secs(1024),
        }
    }
}

impl DelayStrategy {
    /// Delay before the next attempt, given how many deliveries have been
    /// attempted so far.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        match self {
            DelayStrategy::Constant(delay) => *delay,
            DelayStrategy::Exponential { max } => {
                let seconds = if attempts <= 1 {
                    0
                } else {
                    1u64 << (attempts - 1).min(62)
                };
                Duration::from_secs(seconds).min(*max)
            }
        }
    }
}

/// Everything known about a failed receive, consumed by the recovery engine
/// and the critical-failure notifier.
#[derive(Debug, Clone)]
pub struct FailureContext {
    /// The message that failed.
    pub inbound: InboundBrokeredMessage,
    /// Machine-oriented error details.
    pub error_details: String,
    /// Human-oriented error description.
    pub error_description: String,
    /// Error queue for this receiver, if one is configured.
    pub error_queue: Option<String>,
    /// How many times the transport has delivered this message.
    pub delivery_count: u32,
}

/// Action executed once the retry budget is exhausted.
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    async fn execute(
        &self,
        failure: &FailureContext,
        tx: &TransactionContext,
    ) -> Result<(), RecoveryError>;
}

/// Default recovery action: forward the failed message to the error queue
/// with its failure details stamped on.
pub struct ErrorQueueForwarder {
    dispatcher: Arc<dyn MessagingInfrastructureDispatcher>,
}

impl ErrorQueueForwarder {
    pub fn new(dispatcher: Arc<dyn MessagingInfrastructureDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl RecoveryAction for ErrorQueueForwarder {
    async fn execute(
        &self,
        failure: &FailureContext,
        tx: &TransactionContext,
    ) -> Result<(), RecoveryError> {
        let error_queue = failure
            .error_queue
            .as_deref()
            .ok_or_else(|| RecoveryError::ActionFailed("no error queue configured".into()))?;

        let mut forwarded =
            OutboundBrokeredMessage::forward_from(&failure.inbound, error_queue);
        forwarded.set_property(properties::IS_ERROR, Value::Bool(true));
        forwarded.set_property(
            properties::FAILURE_DETAILS,
            Value::String(failure.error_details.clone()),
        );
        forwarded.set_property(
            properties::FAILURE_DESCRIPTION,
            Value::String(failure.error_description.clone()),
        );

        tracing::warn!(
            message_id = %failure.inbound.message_id,
            error_queue,
            delivery_count = failure.delivery_count,
            "retries exhausted, forwarding to error queue"
        );
        self.dispatcher.dispatch(forwarded, tx).await?;
        Ok(())
    }
}

/// Recovery engine configuration.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Delivery attempts before the recovery action runs.
    pub max_retry_attempts: u32,
    /// Delay strategy applied before each decision.
    pub delay: DelayStrategy,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 10,
            delay: DelayStrategy::default(),
        }
    }
}

impl RecoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_delay(mut self, delay: DelayStrategy) -> Self {
        self.delay = delay;
        self
    }
}

/// Decides retry vs. recovery action vs. dead-letter for failed deliveries.
pub struct RecoveryEngine {
    config: RecoveryConfig,
    action: Arc<dyn RecoveryAction>,
}

impl RecoveryEngine {
    pub fn new(config: RecoveryConfig, action: Arc<dyn RecoveryAction>) -> Self {
        Self { config, action }
    }

    /// Apply the configured delay, then decide.
    pub async fn execute(
        &self,
        failure: &FailureContext,
        tx: &TransactionContext,
    ) -> Result<RecoveryState, RecoveryError> {
        let delay = self.config.delay.delay_for(failure.delivery_count);
        if !delay.is_zero() {
            tracing::debug!(
                message_id = %failure.inbound.message_id,
                delay_secs = delay.as_secs(),
                "delaying before next attempt"
            );
            tokio::time::sleep(delay).await;
        }

        if failure.delivery_count < self.config.max_retry_attempts {
            return Ok(RecoveryState::Retrying);
        }

        if failure.error_queue.is_none() {
            // Infrastructure applies its native dead-letter mechanism.
            return Ok(RecoveryState::DeadLetter);
        }
        self.action.execute(failure, tx).await?;
        Ok(RecoveryState::RecoveryActionExecuted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransactionMode;
    use crate::port::InfrastructureError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        dispatched: Mutex<Vec<OutboundBrokeredMessage>>,
    }

    #[async_trait]
    impl MessagingInfrastructureDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            message: OutboundBrokeredMessage,
            _tx: &TransactionContext,
        ) -> Result<(), InfrastructureError> {
            self.dispatched.lock().push(message);
            Ok(())
        }
    }

    fn failure(delivery_count: u32, error_queue: Option<&str>) -> FailureContext {
        FailureContext {
            inbound: InboundBrokeredMessage::new("msg-1", b"{}".to_vec(), "queue-a"),
            error_details: "dispatch timeout".into(),
            error_description: "handler failed after timeout".into(),
            error_queue: error_queue.map(str::to_string),
            delivery_count,
        }
    }

    fn engine(max_attempts: u32, dispatcher: Arc<RecordingDispatcher>) -> RecoveryEngine {
        RecoveryEngine::new(
            RecoveryConfig::new()
                .with_max_retry_attempts(max_attempts)
                .with_delay(DelayStrategy::Constant(Duration::ZERO)),
            Arc::new(ErrorQueueForwarder::new(dispatcher)),
        )
    }

    #[test]
    fn exponential_delay_sequence() {
        let strategy = DelayStrategy::default();
        let seconds: Vec<u64> = (1..=7).map(|n| strategy.delay_for(n).as_secs()).collect();

        assert_eq!(seconds, vec![0, 2, 4, 8, 16, 32, 64]);
    }

    #[test]
    fn exponential_delay_never_exceeds_max() {
        let strategy = DelayStrategy::Exponential {
            max: Duration::from_secs(1024),
        };

        assert_eq!(strategy.delay_for(11).as_secs(), 1024);
        assert_eq!(strategy.delay_for(40).as_secs(), 1024);
        assert_eq!(strategy.delay_for(u32::MAX).as_secs(), 1024);
    }

    #[tokio::test]
    async fn under_budget_retries() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let engine = engine(5, dispatcher.clone());
        let tx = TransactionContext::new("queue-a", TransactionMode::ReceiveOnly);

        let state = engine
            .execute(&failure(4, Some("queue-a-error")), &tx)
            .await
            .unwrap();

        assert_eq!(state, RecoveryState::Retrying);
        assert!(dispatcher.dispatched.lock().is_empty());
    }

    #[tokio::test]
    async fn exhausted_budget_forwards_to_error_queue() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let engine = engine(5, dispatcher.clone());
        let tx = TransactionContext::new("queue-a", TransactionMode::ReceiveOnly);

        let state = engine
            .execute(&failure(5, Some("queue-a-error")), &tx)
            .await
            .unwrap();

        assert_eq!(state, RecoveryState::RecoveryActionExecuted);
        let dispatched = dispatcher.dispatched.lock();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].destination, "queue-a-error");
        assert_eq!(
            dispatched[0].string_property(properties::FAILURE_DETAILS),
            Some("dispatch timeout")
        );
    }

    #[tokio::test]
    async fn exhausted_budget_without_error_queue_dead_letters() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let engine = engine(5, dispatcher.clone());
        let tx = TransactionContext::new("queue-a", TransactionMode::ReceiveOnly);

        let state = engine.execute(&failure(5, None), &tx).await.unwrap();

        assert_eq!(state, RecoveryState::DeadLetter);
        assert!(dispatcher.dispatched.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_awaited_before_decision() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let engine = RecoveryEngine::new(
            RecoveryConfig::new().with_max_retry_attempts(5),
            Arc::new(ErrorQueueForwarder::new(dispatcher)),
        );
        let tx = TransactionContext::new("queue-a", TransactionMode::ReceiveOnly);

        let started = tokio::time::Instant::now();
        let state = engine
            .execute(&failure(3, Some("queue-a-error")), &tx)
            .await
            .unwrap();

        // Attempt 3 of the default exponential strategy waits 4 seconds.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert_eq!(state, RecoveryState::Retrying);
    }
}
