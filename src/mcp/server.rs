//! The JSON-RPC request handler shared by the `/mcp` HTTP route and the
//! stdio bridge: `initialize`, `tools/list`, `tools/call`.

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use super::registry::all_tools;
use super::{dispatch, DispatchOutcome};
use crate::auth::middleware::AuthContext;
use crate::error::ContextdError;
use crate::state::AppState;
use rmcp::model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use serde_json::{json, Value};

/// Handle one decoded JSON-RPC request, returning the full envelope ready
/// to serialize back to the caller.
pub async fn handle_request(state: &AppState, auth: &AuthContext, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();
    match request.method.as_str() {
        "initialize" => JsonRpcResponse::raw_success(id, initialize_result()),
        "tools/list" => match all_tools() {
            Ok(tools) => JsonRpcResponse::raw_success(id, json!({ "tools": tools })),
            Err(error) => {
                let err = ContextdError::Internal(error.to_string());
                JsonRpcResponse::from_error(id, &err)
            }
        },
        "tools/call" => handle_tools_call(state, auth, id, request.params).await,
        other => JsonRpcResponse::from_error(
            id,
            &ContextdError::InvalidInput(format!("unknown method '{other}'")),
        ),
    }
}

async fn handle_tools_call(state: &AppState, auth: &AuthContext, id: Value, params: Value) -> JsonRpcResponse {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return JsonRpcResponse::from_error(
            id,
            &ContextdError::InvalidInput("tools/call params missing 'name'".into()),
        );
    };
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    match dispatch(state, auth, name, arguments).await {
        Ok(DispatchOutcome { content_text, prefetch }) => {
            JsonRpcResponse::success(id, content_text, prefetch)
        }
        Err(error) => JsonRpcResponse::from_error(id, &error),
    }
}

fn initialize_result() -> Value {
    let info = ServerInfo {
        protocol_version: ProtocolVersion::V_2024_11_05,
        capabilities: ServerCapabilities::builder().enable_tools().build(),
        server_info: Implementation {
            name: "contextd".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        },
        instructions: Some(
            "Multi-tenant session-context daemon: checkpoint save/search/resume, error \
             remediation knowledge base, and a five-step troubleshooting diagnosis pipeline."
                .to_string(),
        ),
    };
    serde_json::to_value(info).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use crate::embed::HashEmbedder;
    use crate::services::{CheckpointService, RemediationService, TroubleshootingService};
    use crate::store::InMemoryStore;
    use std::sync::Arc;
    use std::time::Instant;

    fn state() -> AppState {
        let store = Arc::new(InMemoryStore::new(Arc::new(HashEmbedder::new(32))));
        AppState {
            checkpoint: Arc::new(CheckpointService::new(store.clone())),
            remediation: Arc::new(RemediationService::new(store.clone())),
            troubleshooting: Arc::new(TroubleshootingService::new(store)),
            prefetch_config: Some(crate::prefetch::Config::default()),
            started_at: Instant::now(),
        }
    }

    fn auth() -> AuthContext {
        AuthContext {
            claims: Claims {
                sub: "user-1".into(),
                iat: 0,
                exp: 0,
                org_id: Some("acme".into()),
                team_id: None,
                project_id: None,
            },
            owner_id: "x".repeat(64),
        }
    }

    #[tokio::test]
    async fn tools_list_returns_sixteen_tools() {
        let state = state();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::from(1),
            method: "tools/list".to_string(),
            params: Value::Null,
        };
        let response = handle_request(&state, &auth(), request).await;
        let rendered = serde_json::to_value(&response).unwrap();
        assert_eq!(rendered["result"]["tools"].as_array().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn tools_call_dispatches_status() {
        let state = state();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::from(2),
            method: "tools/call".to_string(),
            params: json!({ "name": "status", "arguments": {} }),
        };
        let response = handle_request(&state, &auth(), request).await;
        let rendered = serde_json::to_value(&response).unwrap();
        assert!(rendered["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn unknown_method_is_an_error_response() {
        let state = state();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::from(3),
            method: "bogus".to_string(),
            params: Value::Null,
        };
        let response = handle_request(&state, &auth(), request).await;
        let rendered = serde_json::to_value(&response).unwrap();
        assert!(rendered["error"]["code"].is_i64());
    }
}
