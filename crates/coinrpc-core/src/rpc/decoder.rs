//! Classification of inbound payloads from a persistent connection.
//!
//! JSON-RPC 1.0 notifications are requests with a null id; anything with a
//! non-null id is a response to one of our calls.

use std::fmt;

use serde::Deserialize;

use super::future::Reply;
use super::protocol::JsonRpcResponse;

/// One message decoded from the wire.
#[derive(Debug)]
pub(crate) enum Inbound {
    Notification {
        method: String,
        params: Vec<serde_json::Value>,
    },
    Response {
        id: u64,
        reply: Reply,
    },
}

/// Why an inbound payload was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Not JSON, or fields of the wrong type.
    Malformed(String),
    /// Notification without a method name.
    MissingMethod,
    /// Notification with absent or null params. An empty list is valid.
    MissingParams,
    /// Response id that is negative or has a fractional part.
    InvalidId(String),
    /// Response for a request that is not pending.
    UnknownId(u64),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed message: {e}"),
            Self::MissingMethod => f.write_str("notification without method"),
            Self::MissingParams => f.write_str("notification without params"),
            Self::InvalidId(id) => write!(f, "invalid response id {id}"),
            Self::UnknownId(id) => write!(f, "no pending request with id {id}"),
        }
    }
}

/// Union of notification and response fields, decoded in one pass.
#[derive(Deserialize)]
struct InMessage {
    #[serde(default)]
    id: Option<serde_json::Number>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

pub(crate) fn decode(msg: &[u8]) -> Result<Inbound, DropReason> {
    let in_msg: InMessage =
        serde_json::from_slice(msg).map_err(|e| DropReason::Malformed(e.to_string()))?;

    let Some(id) = in_msg.id else {
        let method = in_msg
            .method
            .filter(|m| !m.is_empty())
            .ok_or(DropReason::MissingMethod)?;
        let params = in_msg.params.ok_or(DropReason::MissingParams)?;
        return Ok(Inbound::Notification { method, params });
    };

    let id = response_id(&id)?;
    let response = JsonRpcResponse {
        result: in_msg.result,
        error: in_msg.error,
    };
    Ok(Inbound::Response {
        id,
        reply: response.into_result(),
    })
}

/// IDs come from our own unsigned counter, so only non-negative integral
/// values can match. `7.0` is accepted as 7.
fn response_id(id: &serde_json::Number) -> Result<u64, DropReason> {
    if let Some(n) = id.as_u64() {
        return Ok(n);
    }
    match id.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        _ => Err(DropReason::InvalidId(id.to_string())),
    }
}
