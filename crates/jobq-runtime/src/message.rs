//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Reserved name suffix identifying FIFO queues.
///
/// The suffix is part of the queue name itself (mirroring the managed
/// provider's convention) so that callers cannot accidentally address a FIFO
/// queue through a standard name or vice versa.
pub const FIFO_QUEUE_SUFFIX: &str = ".fifo";

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name with length and character restrictions.
///
/// Names ending in [`FIFO_QUEUE_SUFFIX`] address FIFO queues; all other names
/// address standard queues.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        let base = name.strip_suffix(FIFO_QUEUE_SUFFIX).unwrap_or(&name);

        // Validate length (suffix included in the limit, as the provider does)
        if base.is_empty() || name.len() > 80 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-80 characters".to_string(),
            });
        }

        // Validate characters (ASCII alphanumeric, hyphens, underscores)
        if !base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Check whether this name addresses a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.0.ends_with(FIFO_QUEUE_SUFFIX)
    }

    /// Derive the FIFO counterpart of this name
    pub fn with_fifo_suffix(&self) -> Result<Self, ValidationError> {
        if self.is_fifo() {
            return Ok(self.clone());
        }
        Self::new(format!("{}{}", self.0, FIFO_QUEUE_SUFFIX))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Identifier grouping related messages for ordered FIFO processing.
///
/// Within one group id, delivery order is enqueue order and at most one
/// message is in flight at any instant. Distinct groups are isolated from
/// each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    /// Create new group ID with validation
    pub fn new(id: String) -> Result<Self, ValidationError> {
        validate_token("group_id", &id)?;
        Ok(Self(id))
    }

    /// The implicit group used for FIFO sends that name no group
    pub fn default_group() -> Self {
        Self("default".to_string())
    }

    /// Get group ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Explicit deduplication key for FIFO queues.
///
/// Two sends sharing a deduplication id within the store's dedup window
/// collapse to a single stored message; the first send wins. Orthogonal to
/// [`GroupId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeduplicationId(String);

impl DeduplicationId {
    /// Create new deduplication ID with validation
    pub fn new(id: String) -> Result<Self, ValidationError> {
        validate_token("deduplication_id", &id)?;
        Ok(Self(id))
    }

    /// Get deduplication ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeduplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeduplicationId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Shared validation for group and deduplication tokens
fn validate_token(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 128 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: "maximum 128 characters".to_string(),
        });
    }

    // Validate ASCII printable characters only
    if !value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "only ASCII printable characters allowed".to_string(),
        });
    }

    Ok(())
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp offset into the future by a span, saturating on overflow
    pub fn saturating_add(&self, span: Duration) -> Self {
        match chrono::Duration::from_std(span) {
            Ok(delta) => Self(
                self.0
                    .checked_add_signed(delta)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            Err(_) => Self(DateTime::<Utc>::MAX_UTC),
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be sent through the queue system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "bytes_serde")]
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

impl Message {
    /// Create new message with body
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            attributes: HashMap::new(),
        }
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: String, value: String) -> Self {
        self.attributes.insert(key, value);
        self
    }

    /// Get attribute value by key
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Configuration options for sending a message to a queue
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Delay before the message first becomes visible
    pub delay: Option<Duration>,
    /// Explicit deduplication key (FIFO queues only)
    pub deduplication_id: Option<DeduplicationId>,
    /// Ordering group (FIFO queues only)
    pub group_id: Option<GroupId>,
}

impl SendOptions {
    /// Create new send options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay first visibility by the given span
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set explicit deduplication ID
    pub fn with_deduplication_id(mut self, id: DeduplicationId) -> Self {
        self.deduplication_id = Some(id);
        self
    }

    /// Set ordering group ID
    pub fn with_group_id(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }
}

/// A message received from a queue with delivery metadata
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
    pub group_id: Option<GroupId>,
    pub receipt_handle: ReceiptHandle,
    pub receive_count: u32,
    pub enqueued_at: Timestamp,
    pub delivered_at: Timestamp,
}

impl ReceivedMessage {
    /// Convert back to Message (for forwarding/replaying)
    pub fn message(&self) -> Message {
        Message {
            body: self.body.clone(),
            attributes: self.attributes.clone(),
        }
    }

    /// Get attribute value by key
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Opaque token identifying one delivery of one message.
///
/// A fresh handle is minted every time a message is delivered; the previous
/// handle is invalidated as soon as the lease lapses or the message is
/// redelivered. Operations presented with a stale handle fail with
/// `ReceiptExpired` and never touch another message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Mint a new unique receipt handle
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get handle token as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
