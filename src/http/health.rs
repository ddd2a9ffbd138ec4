//! `GET /health` — unauthenticated liveness probe (§4.6: `{status, version,
//! uptime}`).

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.uptime_seconds(),
    }))
}
