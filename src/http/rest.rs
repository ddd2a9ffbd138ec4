//! REST mirror of the JSON-RPC tool set (§6.2), mounted under both
//! `/api/v1/...` and `/mcp/...`. Every handler is a thin adapter over
//! [`crate::mcp::dispatch::dispatch`] — the same tool-name + params path
//! the JSON-RPC `/mcp` endpoint and the stdio bridge use — so the two
//! transports can never drift in behaviour, only in envelope shape.

use super::envelope;
use crate::auth::middleware::AuthUser;
use crate::mcp::dispatch;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Calls `dispatch` and renders its outcome as the §6.2 success envelope,
/// or lets the error's own `IntoResponse` impl render the error envelope.
async fn invoke(state: &AppState, auth: &crate::auth::middleware::AuthContext, tool: &str, params: Value) -> Response {
    match dispatch::dispatch(state, auth, tool, params).await {
        Ok(outcome) => {
            let data: Value =
                serde_json::from_str(&outcome.content_text).unwrap_or(Value::String(outcome.content_text));
            let meta = outcome.prefetch.map(|prefetch| json!({ "prefetch": prefetch }));
            envelope::success(data, meta)
        }
        Err(err) => err.into_response(),
    }
}

/// Best-effort coercion of query-string values into JSON types, so numeric
/// and boolean tool args (`limit`, `auto_only`, ...) round-trip the same
/// way whether they arrived as a JSON body or a query string.
fn query_to_value(query: HashMap<String, String>) -> Value {
    let mut map = serde_json::Map::new();
    for (key, value) in query {
        let coerced = if let Ok(i) = value.parse::<i64>() {
            json!(i)
        } else if let Ok(f) = value.parse::<f64>() {
            json!(f)
        } else if let Ok(b) = value.parse::<bool>() {
            json!(b)
        } else {
            json!(value)
        };
        map.insert(key, coerced);
    }
    Value::Object(map)
}

fn with_id(id: String, extra: Value) -> Value {
    let mut map = match extra {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    map.insert("id".to_string(), json!(id));
    Value::Object(map)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", domain_routes())
        .nest("/mcp", domain_routes())
}

fn domain_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/checkpoint/save", post(checkpoint_save))
        .route("/checkpoint/search", post(checkpoint_search))
        .route("/checkpoint/list", get(checkpoint_list))
        .route("/checkpoint/resume", post(checkpoint_resume))
        .route("/checkpoint/{id}", get(checkpoint_get))
        .route("/checkpoint/{id}", delete(checkpoint_delete))
        .route("/remediation/save", post(remediation_save))
        .route("/remediation/search", post(remediation_search))
        .route("/remediation/list", get(remediation_list))
        .route("/remediation/{id}", get(remediation_get))
        .route("/remediation/{id}", delete(remediation_delete))
        .route("/remediation/{id}/feedback", post(remediation_feedback))
        .route("/troubleshoot", post(troubleshoot))
        .route("/troubleshoot/patterns", get(list_patterns))
        .route("/troubleshoot/patterns", post(save_pattern))
}

async fn status(State(state): State<AppState>, AuthUser(auth): AuthUser) -> Response {
    invoke(&state, &auth, "status", Value::Null).await
}

async fn checkpoint_save(State(state): State<AppState>, AuthUser(auth): AuthUser, Json(params): Json<Value>) -> Response {
    invoke(&state, &auth, "checkpoint_save", params).await
}

async fn checkpoint_search(State(state): State<AppState>, AuthUser(auth): AuthUser, Json(params): Json<Value>) -> Response {
    invoke(&state, &auth, "checkpoint_search", params).await
}

async fn checkpoint_list(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    invoke(&state, &auth, "checkpoint_list", query_to_value(query)).await
}

async fn checkpoint_resume(State(state): State<AppState>, AuthUser(auth): AuthUser, Json(params): Json<Value>) -> Response {
    invoke(&state, &auth, "checkpoint_resume", params).await
}

async fn checkpoint_get(State(state): State<AppState>, AuthUser(auth): AuthUser, Path(id): Path<String>) -> Response {
    invoke(&state, &auth, "checkpoint_get", json!({ "id": id })).await
}

async fn checkpoint_delete(State(state): State<AppState>, AuthUser(auth): AuthUser, Path(id): Path<String>) -> Response {
    invoke(&state, &auth, "checkpoint_delete", json!({ "id": id })).await
}

async fn remediation_save(State(state): State<AppState>, AuthUser(auth): AuthUser, Json(params): Json<Value>) -> Response {
    invoke(&state, &auth, "remediation_save", params).await
}

async fn remediation_search(State(state): State<AppState>, AuthUser(auth): AuthUser, Json(params): Json<Value>) -> Response {
    invoke(&state, &auth, "remediation_search", params).await
}

async fn remediation_list(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    invoke(&state, &auth, "remediation_list", query_to_value(query)).await
}

async fn remediation_get(State(state): State<AppState>, AuthUser(auth): AuthUser, Path(id): Path<String>) -> Response {
    invoke(&state, &auth, "remediation_get", json!({ "id": id })).await
}

async fn remediation_delete(State(state): State<AppState>, AuthUser(auth): AuthUser, Path(id): Path<String>) -> Response {
    invoke(&state, &auth, "remediation_delete", json!({ "id": id })).await
}

async fn remediation_feedback(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(id): Path<String>,
    Json(params): Json<Value>,
) -> Response {
    invoke(&state, &auth, "remediation_feedback", with_id(id, params)).await
}

async fn troubleshoot(State(state): State<AppState>, AuthUser(auth): AuthUser, Json(params): Json<Value>) -> Response {
    invoke(&state, &auth, "troubleshoot", params).await
}

async fn list_patterns(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    invoke(&state, &auth, "list_patterns", query_to_value(query)).await
}

async fn save_pattern(State(state): State<AppState>, AuthUser(auth): AuthUser, Json(params): Json<Value>) -> Response {
    invoke(&state, &auth, "save_pattern", params).await
}
