//! Payload codecs for job arguments.
//!
//! Job arguments travel as a serialized mapping of argument name to value.
//! The codec used for a message is recorded in its `ContentType` attribute so
//! the receiving side always decodes with the codec the sender chose, never a
//! statically assumed one.

use crate::error::WorkerError;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
#[path = "codecs_tests.rs"]
mod tests;

/// Decoded job arguments: argument name to JSON-compatible value
pub type JobKwargs = serde_json::Map<String, Value>;

/// A payload codec identified by a content-type tag.
///
/// Round-trip law: `deserialize(serialize(kwargs)) == kwargs` for any mapping
/// of codec-supported value types.
pub trait Codec: Send + Sync + std::fmt::Debug {
    /// Content-type tag recorded in the message attributes
    fn content_type(&self) -> &'static str;

    /// Serialize job arguments to bytes
    fn serialize(&self, kwargs: &JobKwargs) -> Result<Bytes, WorkerError>;

    /// Deserialize job arguments from bytes
    fn deserialize(&self, body: &[u8]) -> Result<JobKwargs, WorkerError>;
}

/// JSON codec (human-readable, the default)
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, kwargs: &JobKwargs) -> Result<Bytes, WorkerError> {
        let bytes =
            serde_json::to_vec(&Value::Object(kwargs.clone())).map_err(|err| {
                WorkerError::EncodeFailure {
                    content_type: self.content_type().to_string(),
                    message: err.to_string(),
                }
            })?;
        Ok(Bytes::from(bytes))
    }

    fn deserialize(&self, body: &[u8]) -> Result<JobKwargs, WorkerError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|err| WorkerError::DecodeFailure {
                content_type: self.content_type().to_string(),
                message: err.to_string(),
            })?;
        into_kwargs(self.content_type(), value)
    }
}

/// MessagePack codec (compact binary)
#[derive(Debug, Clone, Copy)]
pub struct MessagePackCodec;

impl Codec for MessagePackCodec {
    fn content_type(&self) -> &'static str {
        "msgpack"
    }

    fn serialize(&self, kwargs: &JobKwargs) -> Result<Bytes, WorkerError> {
        let bytes = rmp_serde::to_vec_named(&Value::Object(kwargs.clone())).map_err(|err| {
            WorkerError::EncodeFailure {
                content_type: self.content_type().to_string(),
                message: err.to_string(),
            }
        })?;
        Ok(Bytes::from(bytes))
    }

    fn deserialize(&self, body: &[u8]) -> Result<JobKwargs, WorkerError> {
        let value: Value =
            rmp_serde::from_slice(body).map_err(|err| WorkerError::DecodeFailure {
                content_type: self.content_type().to_string(),
                message: err.to_string(),
            })?;
        into_kwargs(self.content_type(), value)
    }
}

/// Decoded payloads must be mappings; anything else is a malformed message
fn into_kwargs(content_type: &str, value: Value) -> Result<JobKwargs, WorkerError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(WorkerError::DecodeFailure {
            content_type: content_type.to_string(),
            message: format!("expected a mapping, got {}", value_kind(&other)),
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

/// Registry of available codecs keyed by content-type tag
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
    default_content_type: String,
}

impl CodecRegistry {
    /// Create a registry with the built-in codecs, JSON as default
    pub fn new() -> Self {
        let mut registry = Self {
            codecs: HashMap::new(),
            default_content_type: JsonCodec.content_type().to_string(),
        };
        registry.register(Arc::new(JsonCodec));
        registry.register(Arc::new(MessagePackCodec));
        registry
    }

    /// Register a codec, replacing any codec with the same tag
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs
            .insert(codec.content_type().to_string(), codec);
    }

    /// Look up a codec by content-type tag
    pub fn get(&self, content_type: &str) -> Result<Arc<dyn Codec>, WorkerError> {
        self.codecs
            .get(content_type)
            .cloned()
            .ok_or_else(|| WorkerError::UnsupportedCodec {
                content_type: content_type.to_string(),
            })
    }

    /// The codec used when a send names no content type
    pub fn default_codec(&self) -> Result<Arc<dyn Codec>, WorkerError> {
        self.get(&self.default_content_type)
    }

    /// Default content-type tag
    pub fn default_content_type(&self) -> &str {
        &self.default_content_type
    }

    /// Change the default codec; the tag must already be registered
    pub fn set_default(&mut self, content_type: &str) -> Result<(), WorkerError> {
        if !self.codecs.contains_key(content_type) {
            return Err(WorkerError::UnsupportedCodec {
                content_type: content_type.to_string(),
            });
        }
        self.default_content_type = content_type.to_string();
        Ok(())
    }

    /// List registered content-type tags
    pub fn available(&self) -> Vec<String> {
        self.codecs.keys().cloned().collect()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
