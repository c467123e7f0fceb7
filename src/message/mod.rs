//! # Brokered Message Envelopes
//!
//! Transport-agnostic envelopes for messages flowing through the core.
//! [`InboundBrokeredMessage`] is owned exclusively by the receive pipeline
//! for the duration of one receive; [`OutboundBrokeredMessage`] is built
//! fresh or derived from an inbound message when forwarding or replying.
//!
//! Routing metadata rides in the application-property map under the
//! well-known keys in [`properties`]; the body stays opaque bytes until a
//! registered body converter decodes it.

pub mod properties {
    //! Well-known application-property keys.

    pub const CONTENT_TYPE: &str = "broker.content-type";
    pub const CORRELATION_ID: &str = "broker.correlation-id";
    pub const REPLY_TO: &str = "broker.reply-to";
    pub const REPLY_TO_GROUP_ID: &str = "broker.reply-to-group-id";
    pub const GROUP_ID: &str = "broker.group-id";
    pub const VIA: &str = "broker.via";
    pub const IS_ERROR: &str = "broker.is-error";
    pub const FAILURE_DETAILS: &str = "broker.failure-details";
    pub const FAILURE_DESCRIPTION: &str = "broker.failure-description";
    pub const ROUTING_SLIP: &str = "broker.routing-slip";
    pub const SAGA_ID: &str = "broker.saga-id";
    pub const SAGA_STATUS: &str = "broker.saga-status";
}

use crate::codec::APPLICATION_JSON;
use crate::context::TransactionMode;
use serde_json::Value;
use std::collections::HashMap;

/// Failure details attached to an errored message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FailureDetails {
    /// Machine-oriented error details (exception text, error code).
    pub details: String,
    /// Human-oriented description of the failure.
    pub description: String,
}

/// Immutable envelope handed to the core by the infrastructure receiver,
/// plus the mutable audit fields the pipeline maintains during one receive.
#[derive(Debug, Clone)]
pub struct InboundBrokeredMessage {
    /// Broker-assigned or sender-assigned message id. Deduplication key.
    pub message_id: String,
    /// Opaque body bytes; decode through the converter named by the
    /// content-type property.
    pub body: Vec<u8>,
    /// Application properties carried alongside the body.
    pub application_properties: HashMap<String, Value>,
    /// Path of the receiver this message arrived on.
    pub receiver_path: String,
    /// Correlation id linking this message to a conversation.
    pub correlation_id: Option<String>,
    /// Transaction mode the message was received under.
    pub transaction_mode: TransactionMode,
}

impl InboundBrokeredMessage {
    pub fn new(
        message_id: impl Into<String>,
        body: Vec<u8>,
        receiver_path: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            body,
            application_properties: HashMap::new(),
            receiver_path: receiver_path.into(),
            correlation_id: None,
            transaction_mode: TransactionMode::default(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.application_properties.insert(key.into(), value);
        self
    }

    /// Look up an application property.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.application_properties.get(key)
    }

    /// Look up a string-valued application property.
    pub fn string_property(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(Value::as_str)
    }

    /// Set an application property.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.application_properties.insert(key.into(), value);
    }

    /// Content type declared by the sender, defaulting to JSON.
    pub fn content_type(&self) -> &str {
        self.string_property(properties::CONTENT_TYPE)
            .unwrap_or(APPLICATION_JSON)
    }

    /// Destination a reply should be routed to, if the sender asked for one.
    pub fn reply_to(&self) -> Option<&str> {
        self.string_property(properties::REPLY_TO)
    }

    /// Append a receiver to the `Via` audit trail.
    pub fn record_via(&mut self, receiver: &str) {
        let via = self
            .application_properties
            .entry(properties::VIA.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(entries) = via {
            entries.push(Value::String(receiver.to_string()));
        }
    }

    /// The receivers this message has visited, oldest first.
    pub fn via(&self) -> Vec<String> {
        self.property(properties::VIA)
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark the message as errored, attaching failure details.
    pub fn mark_error(&mut self, failure: FailureDetails) {
        self.set_property(properties::IS_ERROR, Value::Bool(true));
        self.set_property(
            properties::FAILURE_DETAILS,
            Value::String(failure.details),
        );
        self.set_property(
            properties::FAILURE_DESCRIPTION,
            Value::String(failure.description),
        );
    }

    /// Whether a failure has been recorded on this message.
    pub fn is_error(&self) -> bool {
        self.property(properties::IS_ERROR)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Failure details, when the message is marked errored.
    pub fn failure_details(&self) -> Option<FailureDetails> {
        if !self.is_error() {
            return None;
        }
        Some(FailureDetails {
            details: self
                .string_property(properties::FAILURE_DETAILS)
                .unwrap_or_default()
                .to_string(),
            description: self
                .string_property(properties::FAILURE_DESCRIPTION)
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// Remove reply-to properties so a retried delivery cannot loop replies.
    pub fn clear_reply_to(&mut self) {
        self.application_properties.remove(properties::REPLY_TO);
        self.application_properties
            .remove(properties::REPLY_TO_GROUP_ID);
    }
}

/// Outbound envelope handed to the infrastructure dispatcher or staged in
/// the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundBrokeredMessage {
    pub message_id: String,
    pub destination: String,
    pub body: Vec<u8>,
    pub application_properties: HashMap<String, Value>,
    pub content_type: String,
}

impl OutboundBrokeredMessage {
    /// A fresh outbound message with a generated id.
    pub fn new(destination: impl Into<String>, body: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            destination: destination.into(),
            body,
            application_properties: HashMap::new(),
            content_type: content_type.into(),
        }
    }

    /// Derive a forwarded message: body and properties copied to a new
    /// destination, correlation id preserved.
    pub fn forward_from(inbound: &InboundBrokeredMessage, destination: impl Into<String>) -> Self {
        let mut message = Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            destination: destination.into(),
            body: inbound.body.clone(),
            application_properties: inbound.application_properties.clone(),
            content_type: inbound.content_type().to_string(),
        };
        if let Some(correlation_id) = &inbound.correlation_id {
            message.application_properties.insert(
                properties::CORRELATION_ID.to_string(),
                Value::String(correlation_id.clone()),
            );
        }
        message
    }

    /// Derive a reply: forwarded shape plus the reply-to-group id stamp taken
    /// from the inbound message's group property.
    pub fn reply_from(inbound: &InboundBrokeredMessage, destination: impl Into<String>) -> Self {
        let mut message = Self::forward_from(inbound, destination);
        if let Some(group_id) = inbound.string_property(properties::GROUP_ID) {
            message.application_properties.insert(
                properties::REPLY_TO_GROUP_ID.to_string(),
                Value::String(group_id.to_string()),
            );
        }
        // A reply must not itself ask for a reply.
        message.application_properties.remove(properties::REPLY_TO);
        message
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.application_properties.insert(key.into(), value);
        self
    }

    /// Set an application property.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.application_properties.insert(key.into(), value);
    }

    /// Look up a string-valued application property.
    pub fn string_property(&self, key: &str) -> Option<&str> {
        self.application_properties.get(key).and_then(Value::as_str)
    }
}
