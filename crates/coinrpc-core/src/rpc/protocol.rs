use crate::error::{CoreError, RpcError};

/// Version tag written into every outbound envelope. Bitcoin-family nodes
/// speak JSON-RPC 1.0.
pub(crate) const JSONRPC_VERSION: &str = "1.0";

#[derive(serde::Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    pub(crate) jsonrpc: &'static str,
    pub(crate) method: &'a str,
    pub(crate) params: &'a [serde_json::Value],
    pub(crate) id: u64,
}

/// A partially decoded reply. Valid JSON-RPC 1.0 responses carry both
/// fields; a missing field is treated as null.
#[derive(serde::Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub(crate) result: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) error: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// A non-null `error` wins over `result`.
    pub(crate) fn into_result(self) -> Result<serde_json::Value, CoreError> {
        if let Some(err) = self.error {
            return Err(parse_jsonrpc_error(err));
        }
        Ok(self.result.unwrap_or(serde_json::Value::Null))
    }
}

pub(crate) fn marshal_request(
    id: u64,
    method: &str,
    params: &[serde_json::Value],
) -> Result<Vec<u8>, CoreError> {
    let req = JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION,
        method,
        params,
        id,
    };
    serde_json::to_vec(&req)
        .map_err(|e| CoreError::InvalidCommand(format!("marshal `{method}`: {e}")))
}

/// Parse a JSON-RPC error value into a structured `CoreError`.
///
/// JSON-RPC errors are `{"code": <int>, "message": <string>}`.
/// If the error value matches that shape, we produce a `ServerError`;
/// otherwise we fall back to `InvalidResponse` with the raw JSON.
pub(crate) fn parse_jsonrpc_error(err: serde_json::Value) -> CoreError {
    #[derive(serde::Deserialize)]
    struct JsonRpcError {
        code: i64,
        message: String,
    }

    match serde_json::from_value::<JsonRpcError>(err.clone()) {
        Ok(parsed) => RpcError::ServerError {
            code: parsed.code,
            message: parsed.message,
        }
        .into(),
        Err(_) => RpcError::InvalidResponse(format!("non-standard JSON-RPC error: {err}")).into(),
    }
}
