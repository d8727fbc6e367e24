//! JSON hub wire codec for the realtime session transport.
//!
//! The session hub speaks a SignalR-style protocol over one WebSocket: a
//! JSON handshake record, then 0x1E-separated JSON records where `type`
//! selects invocation (1), ping (6), or close (7). Payloads stay
//! `serde_json::Value` at this layer; typing happens in [`crate::events`].
//!
//! Decoding fails soft: empty, malformed, and unknown-type records are
//! skipped so one bad record cannot take down the stream.

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;

use serde_json::{Value, json};

/// Record separator terminating every hub protocol record.
pub const RECORD_SEPARATOR: char = '\u{1e}';

const TYPE_INVOCATION: u64 = 1;
const TYPE_PING: u64 = 6;
const TYPE_CLOSE: u64 = 7;

/// Error returned by [`parse_handshake_response`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("handshake response is not valid JSON: {0}")]
    InvalidHandshake(#[from] serde_json::Error),
    #[error("handshake rejected by server: {0}")]
    HandshakeRejected(String),
}

/// One decoded message off the hub wire.
#[derive(Clone, Debug, PartialEq)]
pub enum HubMessage {
    /// A named server event with its raw arguments.
    Invocation {
        target: String,
        arguments: Vec<Value>,
    },
    /// Keepalive; no payload.
    Ping,
    /// Server-initiated close, optionally carrying an error description.
    Close { error: Option<String> },
}

/// The client handshake record selecting the JSON protocol.
#[must_use]
pub fn encode_handshake() -> String {
    format!("{}{RECORD_SEPARATOR}", json!({"protocol": "json", "version": 1}))
}

/// Validate the server's handshake response record.
///
/// An empty object means accepted; an `error` field carries the rejection
/// reason.
///
/// # Errors
///
/// [`CodecError::InvalidHandshake`] for non-JSON input,
/// [`CodecError::HandshakeRejected`] when the server refused the protocol.
pub fn parse_handshake_response(record: &str) -> Result<(), CodecError> {
    let trimmed = record.trim_end_matches(RECORD_SEPARATOR);
    let value: Value = serde_json::from_str(trimmed)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(CodecError::HandshakeRejected(error.to_owned()));
    }
    Ok(())
}

/// Encode a fire-and-forget invocation record.
#[must_use]
pub fn encode_invocation(target: &str, arguments: &[Value]) -> String {
    format!(
        "{}{RECORD_SEPARATOR}",
        json!({
            "type": TYPE_INVOCATION,
            "target": target,
            "arguments": arguments,
        })
    )
}

/// Encode a keepalive record.
#[must_use]
pub fn encode_ping() -> String {
    format!("{}{RECORD_SEPARATOR}", json!({"type": TYPE_PING}))
}

/// Decode a text frame into hub messages, splitting on the record
/// separator. Unknown or malformed records are dropped.
#[must_use]
pub fn decode(text: &str) -> Vec<HubMessage> {
    text.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .filter_map(decode_record)
        .collect()
}

fn decode_record(record: &str) -> Option<HubMessage> {
    let value: Value = serde_json::from_str(record).ok()?;
    match value.get("type").and_then(Value::as_u64)? {
        TYPE_INVOCATION => Some(HubMessage::Invocation {
            target: value.get("target")?.as_str()?.to_owned(),
            arguments: value
                .get("arguments")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }),
        TYPE_PING => Some(HubMessage::Ping),
        TYPE_CLOSE => Some(HubMessage::Close {
            error: value
                .get("error")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        }),
        _ => None,
    }
}
