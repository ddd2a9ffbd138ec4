//! JSON-RPC 2.0 envelope types shared by the stdio bridge and the daemon's
//! `/mcp` endpoint (§4.6).

use crate::error::{ContextdError, ErrorData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn default_jsonrpc_version() -> String {
    "2.0".to_string()
}

#[derive(Debug, Serialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
    pub data: ErrorData,
}

/// The tool result/error envelopes from §4.6, serialized verbatim.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JsonRpcResponse {
    Success {
        jsonrpc: &'static str,
        id: Value,
        result: Value,
    },
    Error {
        jsonrpc: &'static str,
        id: Value,
        error: JsonRpcErrorBody,
    },
}

impl JsonRpcResponse {
    /// Builds the success envelope: `content: [{type: "text", text}]`, plus
    /// an optional `prefetch` block.
    pub fn success(id: Value, content_text: String, prefetch: Option<Value>) -> Self {
        let mut result = serde_json::json!({
            "content": [{ "type": "text", "text": content_text }],
        });
        if let Some(prefetch) = prefetch {
            result["prefetch"] = prefetch;
        }
        JsonRpcResponse::Success {
            jsonrpc: "2.0",
            id,
            result,
        }
    }

    pub fn raw_success(id: Value, result: Value) -> Self {
        JsonRpcResponse::Success {
            jsonrpc: "2.0",
            id,
            result,
        }
    }

    pub fn from_error(id: Value, error: &ContextdError) -> Self {
        JsonRpcResponse::Error {
            jsonrpc: "2.0",
            id,
            error: JsonRpcErrorBody {
                code: error.json_rpc_code(),
                message: error.message(),
                data: error.error_data(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_jsonrpc_version_and_params() {
        let req: JsonRpcRequest = serde_json::from_str(r#"{"method":"status"}"#).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.params, Value::Null);
    }

    #[test]
    fn success_envelope_carries_prefetch_when_present() {
        let response = JsonRpcResponse::success(
            Value::from(1),
            "ok".to_string(),
            Some(serde_json::json!({"checkpoint_search": []})),
        );
        let rendered = serde_json::to_value(&response).unwrap();
        assert!(rendered["result"]["prefetch"].is_object());
    }

    #[test]
    fn error_envelope_shape_matches_spec() {
        let err = ContextdError::NotFound("checkpoint 'x' not found".into());
        let response = JsonRpcResponse::from_error(Value::from(2), &err);
        let rendered = serde_json::to_value(&response).unwrap();
        assert_eq!(rendered["error"]["code"], -32003);
        assert!(rendered["error"]["data"]["trace_id"].is_string());
    }
}
