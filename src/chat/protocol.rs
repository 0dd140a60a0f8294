//! SignalR JSON hub protocol framing.
//!
//! Every record is a JSON object terminated by the 0x1E record separator; one
//! WebSocket text message may carry several records.

use serde_json::{json, Value};

pub const RECORD_SEPARATOR: char = '\u{1e}';

const TYPE_INVOCATION: i64 = 1;
const TYPE_COMPLETION: i64 = 3;
const TYPE_PING: i64 = 6;
const TYPE_CLOSE: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    Invocation { target: String, arguments: Vec<Value> },
    Completion { invocation_id: Option<String>, error: Option<String> },
    Ping,
    Close { error: Option<String> },
    Other(i64),
}

pub fn handshake_request() -> String {
    format!("{}{}", json!({ "protocol": "json", "version": 1 }), RECORD_SEPARATOR)
}

pub fn encode_invocation(target: &str, arguments: &[Value]) -> String {
    format!(
        "{}{}",
        json!({ "type": TYPE_INVOCATION, "target": target, "arguments": arguments }),
        RECORD_SEPARATOR
    )
}

pub fn encode_ping() -> String {
    format!("{}{}", json!({ "type": TYPE_PING }), RECORD_SEPARATOR)
}

/// Splits a handshake reply into the handshake result and any records that
/// arrived in the same message.
pub fn parse_handshake(text: &str) -> Result<Vec<HubFrame>, String> {
    let mut records = text.split(RECORD_SEPARATOR).filter(|r| !r.trim().is_empty());
    let first = records.next().ok_or_else(|| "empty handshake response".to_string())?;
    let reply: Value = serde_json::from_str(first).map_err(|e| format!("bad handshake response: {e}"))?;
    if let Some(err) = reply.get("error").and_then(Value::as_str) {
        return Err(err.to_string());
    }
    Ok(records.filter_map(|r| parse_record(r).ok()).collect())
}

pub fn parse_frames(text: &str) -> Vec<Result<HubFrame, String>> {
    text.split(RECORD_SEPARATOR)
        .filter(|r| !r.trim().is_empty())
        .map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Result<HubFrame, String> {
    let value: Value = serde_json::from_str(record).map_err(|e| format!("bad hub record: {e}"))?;
    let kind = value.get("type").and_then(Value::as_i64).ok_or("hub record without type")?;
    let error = value.get("error").and_then(Value::as_str).map(str::to_string);
    Ok(match kind {
        TYPE_INVOCATION => HubFrame::Invocation {
            target: value
                .get("target")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            arguments: value
                .get("arguments")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        },
        TYPE_COMPLETION => HubFrame::Completion {
            invocation_id: value
                .get("invocationId")
                .and_then(Value::as_str)
                .map(str::to_string),
            error,
        },
        TYPE_PING => HubFrame::Ping,
        TYPE_CLOSE => HubFrame::Close { error },
        other => HubFrame::Other(other),
    })
}
