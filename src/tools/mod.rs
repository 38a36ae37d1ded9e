/// Tools Module
///
/// This module contains all MCP tool implementations. Each tool is implemented
/// as a separate module that exports a `register` function to add the tool to
/// the registry during server initialization.

pub mod client;
pub mod party_info;
pub mod search;

use serde_json::Value;

use crate::core::error::ApiClientError;

/// Shape an API outcome as the `{"status": ...}` object both tools return.
pub fn status_result(outcome: Result<Value, ApiClientError>) -> Value {
    match outcome {
        Ok(data) => serde_json::json!({ "status": "success", "data": data }),
        Err(e) => status_error(e.to_string()),
    }
}

pub fn status_error(message: impl Into<String>) -> Value {
    serde_json::json!({ "status": "error", "message": message.into() })
}
