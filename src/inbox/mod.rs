//! # Inbox Deduplication
//!
//! The inbox is a durable set of processed message ids. At-least-once
//! transports redeliver; recording each id after successful handling and
//! checking it before handling again is what makes the receive idempotent.
//!
//! The id is recorded *inside the same unit of work* as the handler's
//! business writes. If the handler fails, nothing is recorded and the
//! message can be retried; if the unit of work rolls back after the handler
//! succeeded, the id is rolled back with it.

use crate::context::TransactionContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Errors from inbox store operations.
#[derive(Debug, Error)]
pub enum InboxError {
    #[error("inbox read failed: {0}")]
    Read(String),

    #[error("inbox write failed: {0}")]
    Write(String),

    #[error(transparent)]
    UnitOfWork(#[from] crate::uow::UowError),
}

/// Outcome of a deduplicated receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxOutcome {
    /// The handler ran and the id was recorded.
    Handled,
    /// The id was already recorded; the handler was not invoked.
    AlreadyReceived,
}

/// Port for the processed-message-id set.
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Whether a message id has already been recorded.
    async fn is_recorded(&self, message_id: &str) -> Result<bool, InboxError>;

    /// Record a message id, inside the ambient unit of work when one is
    /// active.
    async fn record(&self, message_id: &str, tx: &TransactionContext) -> Result<(), InboxError>;
}

/// Errors from a deduplicated receive: either the store failed or the
/// handler did.
#[derive(Debug, Error)]
pub enum InboxReceiveError<E> {
    #[error(transparent)]
    Store(#[from] InboxError),

    #[error("handler failed: {0}")]
    Handler(#[source] E),
}

/// Run `handler` at most once for a message id.
///
/// If the id is already recorded this is a no-op returning
/// [`InboxOutcome::AlreadyReceived`]. Otherwise the handler runs and, only on
/// success, the id is recorded (staged in the ambient unit of work). A
/// handler failure records nothing, so the message stays retryable.
pub async fn receive_via_inbox<F, Fut, E>(
    inbox: &dyn InboxStore,
    message_id: &str,
    tx: &TransactionContext,
    handler: F,
) -> Result<InboxOutcome, InboxReceiveError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::error::Error,
{
    if inbox.is_recorded(message_id).await? {
        tracing::debug!(message_id, "message already received, skipping handler");
        return Ok(InboxOutcome::AlreadyReceived);
    }
    handler().await.map_err(InboxReceiveError::Handler)?;
    inbox.record(message_id, tx).await?;
    Ok(InboxOutcome::Handled)
}

/// In-memory [`InboxStore`]. Process-lifetime durability only.
#[derive(Debug, Default, Clone)]
pub struct InMemoryInbox {
    rows: Arc<DashMap<String, DateTime<Utc>>>,
}

impl InMemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// When a message id was recorded, if it was.
    pub fn received_at(&self, message_id: &str) -> Option<DateTime<Utc>> {
        self.rows.get(message_id).map(|r| *r)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl InboxStore for InMemoryInbox {
    async fn is_recorded(&self, message_id: &str) -> Result<bool, InboxError> {
        Ok(self.rows.contains_key(message_id))
    }

    async fn record(&self, message_id: &str, tx: &TransactionContext) -> Result<(), InboxError> {
        let rows = self.rows.clone();
        let id = message_id.to_string();
        match tx.unit_of_work() {
            Some(uow) => uow.enlist(move || {
                rows.insert(id, Utc::now());
            })?,
            None => {
                rows.insert(id, Utc::now());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransactionMode;
    use crate::uow::UnitOfWork;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Error)]
    #[error("handler exploded")]
    struct HandlerError;

    fn tx() -> TransactionContext {
        TransactionContext::new("queue-a", TransactionMode::ReceiveOnly)
    }

    #[tokio::test]
    async fn handler_runs_exactly_once_per_message_id() {
        let inbox = InMemoryInbox::new();
        let tx = tx();
        let invocations = AtomicUsize::new(0);

        let first = receive_via_inbox(&inbox, "msg-1", &tx, || async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<(), HandlerError>(())
        })
        .await
        .unwrap();
        let second = receive_via_inbox(&inbox, "msg-1", &tx, || async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<(), HandlerError>(())
        })
        .await
        .unwrap();

        assert_eq!(first, InboxOutcome::Handled);
        assert_eq!(second, InboxOutcome::AlreadyReceived);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_handler_records_nothing() {
        let inbox = InMemoryInbox::new();
        let tx = tx();

        let result = receive_via_inbox(&inbox, "msg-1", &tx, || async {
            Err::<(), HandlerError>(HandlerError)
        })
        .await;

        assert!(matches!(result, Err(InboxReceiveError::Handler(_))));
        assert!(!inbox.is_recorded("msg-1").await.unwrap());
    }

    #[tokio::test]
    async fn record_is_staged_in_unit_of_work() {
        let inbox = InMemoryInbox::new();
        let mut tx = tx();
        let uow = Arc::new(UnitOfWork::new());
        tx.uow = Some(uow.clone());

        receive_via_inbox(&inbox, "msg-1", &tx, || async {
            Ok::<(), HandlerError>(())
        })
        .await
        .unwrap();
        assert!(!inbox.is_recorded("msg-1").await.unwrap());

        uow.commit().unwrap();
        assert!(inbox.is_recorded("msg-1").await.unwrap());
    }

    #[tokio::test]
    async fn rolled_back_record_stays_retryable() {
        let inbox = InMemoryInbox::new();
        let mut tx = tx();
        let uow = Arc::new(UnitOfWork::new());
        tx.uow = Some(uow.clone());

        receive_via_inbox(&inbox, "msg-1", &tx, || async {
            Ok::<(), HandlerError>(())
        })
        .await
        .unwrap();
        uow.rollback().unwrap();

        assert!(!inbox.is_recorded("msg-1").await.unwrap());
    }
}
