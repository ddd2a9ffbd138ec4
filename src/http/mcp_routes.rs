//! The `/mcp` JSON-RPC endpoint and its stdio-bridge support routes
//! (§4.6.2): single-request dispatch, progress streaming, and operation
//! status polling.

use crate::auth::middleware::AuthUser;
use crate::error::ContextdError;
use crate::mcp::protocol::JsonRpcRequest;
use crate::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

/// `POST /mcp` — one JSON-RPC 2.0 request per call. Per the JSON-RPC
/// convention the HTTP status is always 200; success/failure is carried in
/// the envelope body, not the status line.
pub async fn handle_jsonrpc(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Json(request): Json<JsonRpcRequest>,
) -> Json<Value> {
    let response = crate::mcp::handle_request(&state, &auth, request).await;
    Json(serde_json::to_value(response).unwrap_or(Value::Null))
}

/// `GET /mcp/sse` — streaming notification channel (§4.6.1). Every tool
/// this daemon exposes completes synchronously within the `/mcp` call
/// itself (no handler ever returns `status:"pending"`), so there is never
/// a progress notification to emit; the endpoint stays wired for forward
/// compatibility and immediately reports readiness before closing.
pub async fn handle_sse() -> impl IntoResponse {
    let body = "event: ready\ndata: {\"message\":\"connected; no pending operations\"}\n\n";
    (
        [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
}

/// `POST /mcp/status` — the stdio bridge's poll target for asynchronous
/// tool calls. No tool call in this daemon is ever asynchronous, so no
/// `operation_id` this endpoint is asked about was ever minted; it always
/// reports `NotFound` rather than maintaining an operation registry with
/// nothing to track.
pub async fn handle_status(Json(_body): Json<Value>) -> Response {
    ContextdError::NotFound("no such operation: this daemon has no asynchronous tool calls".into())
        .into_response()
}
