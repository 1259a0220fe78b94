//! The command capability every call is built from.

use serde::Serialize;

use crate::error::CoreError;

/// Something that can be sent as a JSON-RPC call: it names its method and
/// marshals its positional parameters.
pub trait Command {
    fn method(&self) -> &str;

    fn params(&self) -> Result<Vec<serde_json::Value>, CoreError>;
}

/// A command assembled at runtime from a method name and JSON parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand {
    method: String,
    params: Vec<serde_json::Value>,
}

impl RawCommand {
    pub fn new(method: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Build from any serializable parameter list. `params` must serialize
    /// to a JSON array.
    pub fn from_serializable<P: Serialize>(
        method: impl Into<String>,
        params: &P,
    ) -> Result<Self, CoreError> {
        let method = method.into();
        let value = serde_json::to_value(params)
            .map_err(|e| CoreError::InvalidCommand(format!("marshal `{method}` params: {e}")))?;
        match value {
            serde_json::Value::Array(params) => Ok(Self { method, params }),
            other => Err(CoreError::InvalidCommand(format!(
                "params for `{method}` must be a JSON array, got {other}"
            ))),
        }
    }
}

impl Command for RawCommand {
    fn method(&self) -> &str {
        &self.method
    }

    fn params(&self) -> Result<Vec<serde_json::Value>, CoreError> {
        Ok(self.params.clone())
    }
}
