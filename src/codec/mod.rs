//! # Body Converters
//!
//! Pluggable serialization for brokered message bodies. Converters are
//! registered by content-type string in a [`BodyConverterRegistry`]; the
//! receive pipeline looks up the converter named by the envelope's
//! content-type property and never assumes a wire format.
//!
//! A body that cannot be decoded by its declared converter is a *poisoned
//! message* ([`CodecError::PoisonedMessage`]): the delivery attempt is fatal
//! and callers should dead-letter instead of spending retry budget on it.
//!
//! The pipeline itself keeps bodies opaque; decoding happens at the edges —
//! business handlers and adapters call
//! [`BodyConverterRegistry::decode_body`] (or look up a converter directly)
//! and let the poisoned error propagate so the receiver dead-letters.

use crate::message::InboundBrokeredMessage;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Content type handled by the default JSON converter.
pub const APPLICATION_JSON: &str = "application/json";

/// Errors from body conversion and converter lookup.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The body could not be decoded into the expected shape. Not retryable:
    /// re-deserializing the same bytes will fail again.
    #[error("poisoned message: body with content type '{content_type}' could not be decoded: {reason}")]
    PoisonedMessage {
        content_type: String,
        reason: String,
    },

    #[error("encoding failed for content type '{content_type}': {reason}")]
    Encode {
        content_type: String,
        reason: String,
    },

    #[error("no body converter registered for content type '{0}'")]
    UnknownContentType(String),
}

impl CodecError {
    /// Whether this error marks the message as poisoned (dead-letter, never retry).
    pub fn is_poisoned(&self) -> bool {
        matches!(self, CodecError::PoisonedMessage { .. })
    }
}

/// Converts message bodies between raw bytes and a structured value.
pub trait BodyConverter: Send + Sync {
    /// Content type string this converter is registered under.
    fn content_type(&self) -> &str;

    /// Encode a structured value into body bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Decode body bytes into a structured value.
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    /// Human-readable rendering of a body, for logs and failure details.
    fn stringify(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// JSON body converter. Registered by default under `application/json`.
#[derive(Debug, Default, Clone)]
pub struct JsonBodyConverter;

impl BodyConverter for JsonBodyConverter {
    fn content_type(&self) -> &str {
        APPLICATION_JSON
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            content_type: APPLICATION_JSON.to_string(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::PoisonedMessage {
            content_type: APPLICATION_JSON.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Registry mapping content-type strings to body converters.
#[derive(Clone)]
pub struct BodyConverterRegistry {
    converters: HashMap<String, Arc<dyn BodyConverter>>,
}

impl Default for BodyConverterRegistry {
    fn default() -> Self {
        let mut registry = Self {
            converters: HashMap::new(),
        };
        registry.register(Arc::new(JsonBodyConverter));
        registry
    }
}

impl BodyConverterRegistry {
    /// Registry with the JSON converter pre-registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter under its own content type, replacing any
    /// previous registration for that type.
    pub fn register(&mut self, converter: Arc<dyn BodyConverter>) {
        self.converters
            .insert(converter.content_type().to_string(), converter);
    }

    /// Look up the converter for a content type.
    pub fn get(&self, content_type: &str) -> Result<Arc<dyn BodyConverter>, CodecError> {
        self.converters
            .get(content_type)
            .cloned()
            .ok_or_else(|| CodecError::UnknownContentType(content_type.to_string()))
    }

    /// Decode a message's body through the converter named by its
    /// content-type property.
    pub fn decode_body(&self, message: &InboundBrokeredMessage) -> Result<Value, CodecError> {
        self.get(message.content_type())?.decode(&message.body)
    }
}

impl std::fmt::Debug for BodyConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyConverterRegistry")
            .field("content_types", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}
