//! The §6.2 REST success envelope. Error bodies need no helper here —
//! `ContextdError`'s `IntoResponse` impl (`src/error.rs`) already produces
//! the matching `{success:false, error:{...}}` shape.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// Wraps a successful result as `{success:true, data, meta}`. `meta` is
/// omitted when `None` — most calls carry none, the pre-fetch-bearing ones
/// attach `{"prefetch": ...}`.
pub fn success(data: Value, meta: Option<Value>) -> Response {
    let mut body = json!({ "success": true, "data": data });
    if let Some(meta) = meta {
        body["meta"] = meta;
    }
    (axum::http::StatusCode::OK, Json(body)).into_response()
}
