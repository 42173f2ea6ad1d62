//! Message ingestion: load, validate, normalize, and batch-insert.
//!
//! Raw input is JSON, either a single message object or an array of them.
//! Each record is validated independently; invalid records are logged and
//! skipped so one bad message never aborts a batch.
//!
//! ```text
//! load(json) → [Value] → validate → normalize → Message → gateway.add_messages
//! ```

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{RagError, Result};
use crate::gateway::IndexGateway;
use crate::models::{Message, MessageMetadata};

/// Fields every message record must carry as non-empty strings.
pub const REQUIRED_FIELDS: [&str; 5] = ["message_id", "url", "author", "timestamp", "content"];

/// Parse raw input into a list of records.
///
/// Accepts a single JSON object or an array. Anything else is a
/// [`RagError::Format`].
pub fn load(raw: &str) -> Result<Vec<Value>> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| RagError::Format(format!("invalid JSON: {e}")))?;
    records_from_value(value)
}

/// Split an already-parsed document into records.
pub fn records_from_value(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![value]),
        other => Err(RagError::Format(format!(
            "expected a message object or an array of messages, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check a record's required fields, returning the reason it is invalid.
pub fn check(record: &Value) -> std::result::Result<(), RagError> {
    let Some(obj) = record.as_object() else {
        return Err(RagError::Validation("record is not an object".to_string()));
    };

    for field in REQUIRED_FIELDS {
        match obj.get(field) {
            None | Some(Value::Null) => {
                return Err(RagError::Validation(format!("missing field `{field}`")))
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(RagError::Validation(format!("empty field `{field}`")))
            }
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err(RagError::Validation(format!("field `{field}` must be a string")))
            }
        }
    }
    Ok(())
}

/// Whether a record can be ingested. Rejections are logged at warn level.
pub fn validate(record: &Value) -> bool {
    match check(record) {
        Ok(()) => true,
        Err(e) => {
            let id = record
                .get("message_id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>");
            warn!(message_id = id, reason = %e, "skipping invalid message");
            false
        }
    }
}

/// Convert a validated record into a [`Message`].
///
/// Missing metadata falls back to channel `"unknown"` and no tags. Tags are
/// de-duplicated, keeping first occurrence order.
pub fn normalize(record: &Value) -> Result<Message> {
    check(record)?;

    let field = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let mut metadata = MessageMetadata::default();
    if let Some(meta) = record.get("metadata").and_then(Value::as_object) {
        if let Some(channel) = meta.get("channel").and_then(Value::as_str) {
            if !channel.trim().is_empty() {
                metadata.channel = channel.to_string();
            }
        }
        if let Some(tags) = meta.get("tags").and_then(Value::as_array) {
            for tag in tags.iter().filter_map(Value::as_str) {
                if !metadata.tags.iter().any(|t| t == tag) {
                    metadata.tags.push(tag.to_string());
                }
            }
        }
    }

    Ok(Message {
        id: field("message_id"),
        url: field("url"),
        author: field("author"),
        timestamp: field("timestamp"),
        content: field("content"),
        metadata,
    })
}

/// Validate every record and insert the valid ones in one bulk call.
///
/// Returns the number of accepted records.
pub async fn ingest_batch(gateway: &IndexGateway, records: &[Value]) -> Result<usize> {
    let messages: Vec<Message> = records
        .iter()
        .filter(|r| validate(r))
        .filter_map(|r| normalize(r).ok())
        .collect();

    let skipped = records.len() - messages.len();
    let accepted = gateway.add_messages(&messages).await?;
    info!(accepted, skipped, "ingested messages");
    Ok(accepted)
}
