//! Reply routing.

use super::{RouterDispatcher, RoutingError};
use crate::context::{ReplyContext, TransactionContext};
use crate::message::{properties, InboundBrokeredMessage, OutboundBrokeredMessage};
use serde_json::Value;
use std::sync::Arc;

/// Routes a reply back toward the requester.
///
/// The reply destination comes from the registered [`ReplyContext`], falling
/// back to the inbound message's reply-to property. After dispatch the
/// inbound message's reply-to properties are cleared so a retried delivery
/// cannot loop replies.
pub struct ReplyRouter {
    dispatcher: Arc<dyn RouterDispatcher>,
}

impl ReplyRouter {
    pub fn new(dispatcher: Arc<dyn RouterDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn route(
        &self,
        inbound: &mut InboundBrokeredMessage,
        reply: &ReplyContext,
        tx: &TransactionContext,
    ) -> Result<(), RoutingError> {
        let destination = if reply.destination.is_empty() {
            inbound.reply_to().unwrap_or_default().to_string()
        } else {
            reply.destination.clone()
        };
        if destination.is_empty() {
            tracing::debug!(
                message_id = %inbound.message_id,
                "no reply destination, skipping"
            );
            return Ok(());
        }

        let mut message = OutboundBrokeredMessage::reply_from(inbound, destination);
        if let Some(group_id) = &reply.reply_to_group_id {
            message.set_property(
                properties::REPLY_TO_GROUP_ID,
                Value::String(group_id.clone()),
            );
        }
        self.dispatcher.dispatch(message, tx).await?;

        inbound.clear_reply_to();
        Ok(())
    }
}
