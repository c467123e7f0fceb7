//! # Brokered Message Receiver
//!
//! The worker loop that ties the core together: receive from the
//! infrastructure adapter, run the dispatch pipeline, then settle the
//! message. Settlement is driven entirely by the outcome:
//!
//! - pipeline success: ack.
//! - unrecoverable failure (poisoned body, validation): dead-letter
//!   immediately, retrying cannot help.
//! - anything else: hand the failure to the recovery engine and settle per
//!   its decision (nack to redeliver, ack after the recovery action ran, or
//!   dead-letter when no error queue exists).

use crate::context::TransactionContext;
use crate::dispatch::{DispatchPipeline, HandlingContext};
use crate::message::InboundBrokeredMessage;
use crate::port::{MessagingInfrastructureReceiver, ReceiverOptions};
use crate::recovery::{FailureContext, RecoveryEngine, RecoveryState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Receiver worker configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// How long one receive call waits for a message.
    pub receive_timeout: Duration,
    /// Backoff after an infrastructure receive failure.
    pub receive_error_backoff: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(5),
            receive_error_backoff: Duration::from_secs(1),
        }
    }
}

impl ReceiverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_receive_error_backoff(mut self, backoff: Duration) -> Self {
        self.receive_error_backoff = backoff;
        self
    }
}

/// One receiver worker bound to one receive path.
pub struct BrokeredMessageReceiver {
    options: ReceiverOptions,
    config: ReceiverConfig,
    infrastructure: Arc<dyn MessagingInfrastructureReceiver>,
    pipeline: Arc<DispatchPipeline>,
    recovery: Arc<RecoveryEngine>,
}

impl BrokeredMessageReceiver {
    pub fn new(
        options: ReceiverOptions,
        config: ReceiverConfig,
        infrastructure: Arc<dyn MessagingInfrastructureReceiver>,
        pipeline: Arc<DispatchPipeline>,
        recovery: Arc<RecoveryEngine>,
    ) -> Self {
        Self {
            options,
            config,
            infrastructure,
            pipeline,
            recovery,
        }
    }

    /// Initialize the adapter, then receive until the shutdown channel fires.
    pub async fn run(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), crate::port::InfrastructureError> {
        self.infrastructure.initialize(&self.options).await?;
        tracing::info!(
            receiver = %self.options.message_receiver_path,
            infrastructure = %self.options.infrastructure_type,
            "receiver started"
        );

        loop {
            let tx = TransactionContext::new(
                &self.options.message_receiver_path,
                self.options.transaction_mode,
            );
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(
                        receiver = %self.options.message_receiver_path,
                        "receiver stopping"
                    );
                    return Ok(());
                }
                received = self.infrastructure.receive(&tx, self.config.receive_timeout) => {
                    match received {
                        Ok(Some(inbound)) => self.handle(inbound, tx).await,
                        Ok(None) => {}
                        Err(error) => {
                            tracing::error!(
                                receiver = %self.options.message_receiver_path,
                                %error,
                                "receive failed"
                            );
                            tokio::time::sleep(self.config.receive_error_backoff).await;
                        }
                    }
                }
            }
        }
    }

    /// Dispatch one message and settle it.
    pub async fn handle(&self, mut inbound: InboundBrokeredMessage, tx: TransactionContext) {
        inbound.record_via(&self.options.message_receiver_path);
        inbound.transaction_mode = tx.mode;
        let message_id = inbound.message_id.clone();
        let mut ctx = HandlingContext::new(inbound, tx);

        match self.pipeline.dispatch(&mut ctx).await {
            Ok(()) => {
                if let Err(error) = self.infrastructure.ack(&ctx.inbound, &ctx.tx).await {
                    tracing::error!(message_id = %message_id, %error, "ack failed");
                }
            }
            Err(error) if error.is_unrecoverable() => {
                tracing::warn!(
                    message_id = %message_id,
                    %error,
                    "unrecoverable failure, dead-lettering"
                );
                if let Err(settle_error) = self
                    .infrastructure
                    .dead_letter(
                        &ctx.inbound,
                        &ctx.tx,
                        &error.to_string(),
                        "message cannot be processed and retrying will not help",
                    )
                    .await
                {
                    tracing::error!(message_id = %message_id, %settle_error, "dead-letter failed");
                }
            }
            Err(error) => self.recover(ctx, error).await,
        }
    }

    async fn recover(&self, ctx: HandlingContext, error: crate::dispatch::DispatchError) {
        let message_id = ctx.inbound.message_id.clone();
        let delivery_count = match self.infrastructure.delivery_count(&ctx.inbound).await {
            Ok(count) => count,
            Err(count_error) => {
                tracing::error!(
                    message_id = %message_id,
                    %count_error,
                    "delivery count unavailable, assuming first delivery"
                );
                1
            }
        };
        let failure = FailureContext {
            inbound: ctx.inbound.clone(),
            error_details: error.to_string(),
            error_description: format!(
                "dispatch failed on receiver '{}'",
                self.options.message_receiver_path
            ),
            error_queue: self.options.error_queue_path.clone(),
            delivery_count,
        };

        let settle = match self.recovery.execute(&failure, &ctx.tx).await {
            Ok(RecoveryState::Retrying) => self.infrastructure.nack(&ctx.inbound, &ctx.tx).await,
            Ok(RecoveryState::RecoveryActionExecuted) => {
                self.infrastructure.ack(&ctx.inbound, &ctx.tx).await
            }
            Ok(RecoveryState::DeadLetter) => {
                self.infrastructure
                    .dead_letter(
                        &ctx.inbound,
                        &ctx.tx,
                        &failure.error_details,
                        &failure.error_description,
                    )
                    .await
            }
            Err(recovery_error) => {
                // Recovery itself failed; release the message so the
                // transport redelivers and recovery gets another chance.
                tracing::error!(
                    message_id = %message_id,
                    %recovery_error,
                    "recovery failed, releasing message"
                );
                self.infrastructure.nack(&ctx.inbound, &ctx.tx).await
            }
        };
        if let Err(settle_error) = settle {
            tracing::error!(message_id = %message_id, %settle_error, "settlement failed");
        }
    }
}
