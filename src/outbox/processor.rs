//! # Outbox Processor
//!
//! Background drain loop for the outbox: on every poll tick it loads the
//! pending rows oldest-first, dispatches each through the circuit breaker,
//! and marks the row processed only after the transport accepted it. A crash
//! between dispatch and mark re-dispatches the row on the next pass, which is
//! exactly the at-least-once contract; receivers dedup via the inbox.
//!
//! When the breaker rejects a dispatch the pass stops immediately: if the
//! transport is down for one row it is down for the rest, and retrying them
//! this tick would only burn the failure budget.

use super::{MarkOutcome, OutboxStore};
use crate::circuit::CircuitBreaker;
use crate::context::{TransactionContext, TransactionMode};
use crate::port::MessagingInfrastructureDispatcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Outbox processor configuration.
#[derive(Debug, Clone)]
pub struct OutboxProcessorConfig {
    /// How often the processor polls for pending messages.
    pub poll_interval: Duration,
}

impl Default for OutboxProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl OutboxProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    /// Pending rows loaded at the start of the pass.
    pub pending: usize,
    /// Rows handed to the transport and marked processed.
    pub dispatched: usize,
    /// Rows whose dispatch failed; they stay pending for the next pass.
    pub failed: usize,
    /// Rows skipped: breaker rejections plus rows another drain already
    /// marked processed.
    pub skipped: usize,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
}

/// Cumulative counters across passes.
#[derive(Debug, Clone, Default)]
pub struct ProcessorMetrics {
    pub passes: u64,
    pub dispatched: u64,
    pub failed: u64,
}

/// Drains the outbox to the infrastructure dispatcher under circuit
/// protection.
pub struct OutboxProcessor {
    outbox: Arc<dyn OutboxStore>,
    dispatcher: Arc<dyn MessagingInfrastructureDispatcher>,
    breaker: Arc<CircuitBreaker>,
    config: OutboxProcessorConfig,
    passes: AtomicU64,
    dispatched_total: AtomicU64,
    failed_total: AtomicU64,
}

impl OutboxProcessor {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        dispatcher: Arc<dyn MessagingInfrastructureDispatcher>,
        breaker: Arc<CircuitBreaker>,
        config: OutboxProcessorConfig,
    ) -> Self {
        Self {
            outbox,
            dispatcher,
            breaker,
            config,
            passes: AtomicU64::new(0),
            dispatched_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
        }
    }

    pub fn metrics(&self) -> ProcessorMetrics {
        ProcessorMetrics {
            passes: self.passes.load(Ordering::Relaxed),
            dispatched: self.dispatched_total.load(Ordering::Relaxed),
            failed: self.failed_total.load(Ordering::Relaxed),
        }
    }

    /// Poll loop; runs until the shutdown channel fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "outbox processor started"
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("outbox processor stopping");
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    let result = self.process_pass().await;
                    if result.dispatched > 0 || result.failed > 0 {
                        tracing::debug!(
                            pending = result.pending,
                            dispatched = result.dispatched,
                            failed = result.failed,
                            skipped = result.skipped,
                            duration_ms = result.duration.as_millis() as u64,
                            "outbox pass complete"
                        );
                    }
                }
            }
        }
    }

    /// One drain pass over everything currently pending.
    pub async fn process_pass(&self) -> ProcessResult {
        let started = std::time::Instant::now();
        self.passes.fetch_add(1, Ordering::Relaxed);
        let mut result = ProcessResult::default();

        let pending = match self.outbox.unprocessed_messages().await {
            Ok(pending) => pending,
            Err(error) => {
                tracing::error!(%error, "failed to load pending outbox messages");
                result.duration = started.elapsed();
                return result;
            }
        };
        result.pending = pending.len();

        // Dispatch runs outside any receive transaction.
        let tx = TransactionContext::new("outbox-processor", TransactionMode::None);

        for (index, staged) in pending.iter().enumerate() {
            let dispatch = self
                .breaker
                .execute(|| self.dispatcher.dispatch(staged.to_outbound(), &tx))
                .await;
            match dispatch {
                Ok(outcome) if outcome.is_rejected() => {
                    // Transport is considered down; leave the rest pending.
                    result.skipped += pending.len() - index;
                    tracing::warn!(
                        circuit = self.breaker.name(),
                        remaining = pending.len() - index,
                        "circuit open, outbox pass aborted"
                    );
                    break;
                }
                Ok(_) => match self.outbox.mark_processed(&staged.message_id).await {
                    Ok(MarkOutcome::Processed) => result.dispatched += 1,
                    Ok(MarkOutcome::AlreadyProcessed) => result.skipped += 1,
                    Err(error) => {
                        // The message went out but the row stays pending; the
                        // next pass re-dispatches and the inbox dedups.
                        result.failed += 1;
                        tracing::error!(
                            message_id = %staged.message_id,
                            %error,
                            "failed to mark outbox message processed"
                        );
                    }
                },
                Err(error) => {
                    result.failed += 1;
                    tracing::warn!(
                        message_id = %staged.message_id,
                        destination = %staged.destination,
                        %error,
                        "outbox dispatch failed, message stays pending"
                    );
                }
            }
        }

        self.dispatched_total
            .fetch_add(result.dispatched as u64, Ordering::Relaxed);
        self.failed_total
            .fetch_add(result.failed as u64, Ordering::Relaxed);
        result.duration = started.elapsed();
        result
    }
}
