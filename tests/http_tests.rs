//! Integration tests for the HTTP daemon surface: health, JSON-RPC `/mcp`,
//! and the REST mirror, exercised end to end against an in-memory `Store`
//! (no external services required, same spirit as the teacher's
//! `tests/api_tests.rs` but without needing database/LLM mocks — this
//! daemon's default backends are already in-process).

use axum::Router;
use axum_test::TestServer;
use contextd::auth::{AuthService, Claims};
use contextd::embed::HashEmbedder;
use contextd::prefetch;
use contextd::services::{CheckpointService, RemediationService, TroubleshootingService};
use contextd::state::AppState;
use contextd::store::InMemoryStore;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

const JWT_SECRET: &str = "test-secret-key-at-least-32-characters-long";

fn sign_token(sub: &str, org_id: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        iat: 0,
        exp: 9_999_999_999,
        org_id: Some(org_id.to_string()),
        team_id: None,
        project_id: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn test_server() -> TestServer {
    let store = Arc::new(InMemoryStore::new(Arc::new(HashEmbedder::new(32))));
    let state = AppState {
        checkpoint: Arc::new(CheckpointService::new(store.clone())),
        remediation: Arc::new(RemediationService::new(store.clone())),
        troubleshooting: Arc::new(TroubleshootingService::new(store)),
        prefetch_config: Some(prefetch::Config::default()),
        started_at: Instant::now(),
    };
    let auth_service = Arc::new(AuthService::new(JWT_SECRET.to_string()));
    let app: Router = contextd::http::build_router(state, auth_service);
    TestServer::new(app).expect("failed to build test server")
}

#[tokio::test]
async fn health_check_requires_no_auth() {
    let server = test_server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn protected_routes_reject_missing_bearer_token() {
    let server = test_server().await;
    let response = server.get("/api/v1/status").await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn jsonrpc_tools_list_returns_sixteen_tools() {
    let server = test_server().await;
    let token = sign_token("user-1", "acme");
    let response = server
        .post("/mcp")
        .authorization_bearer(&token)
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {} }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 16);
}

#[tokio::test]
async fn rest_checkpoint_save_then_search_round_trips() {
    let server = test_server().await;
    let token = sign_token("user-1", "acme");

    let save = server
        .post("/api/v1/checkpoint/save")
        .authorization_bearer(&token)
        .json(&json!({
            "session_id": "s-1",
            "project_path": "/repo",
            "name": "before refactor",
            "summary": "Refactored the auth middleware",
        }))
        .await;
    save.assert_status_ok();
    let save_body: serde_json::Value = save.json();
    assert!(save_body["success"].as_bool().unwrap());
    assert!(save_body["data"]["checkpoint_id"].is_string());

    let search = server
        .post("/api/v1/checkpoint/search")
        .authorization_bearer(&token)
        .json(&json!({ "query": "auth middleware", "project_path": "/repo" }))
        .await;
    search.assert_status_ok();
    let search_body: serde_json::Value = search.json();
    assert!(search_body["success"].as_bool().unwrap());
    assert!(!search_body["data"]["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rest_mirror_is_reachable_under_mcp_prefix_too() {
    let server = test_server().await;
    let token = sign_token("user-1", "acme");
    let response = server
        .post("/mcp/checkpoint/save")
        .authorization_bearer(&token)
        .json(&json!({
            "session_id": "s-2",
            "project_path": "/repo",
            "name": "checkpoint",
            "summary": "summary text",
        }))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn rest_error_envelope_matches_taxonomy_shape() {
    let server = test_server().await;
    let token = sign_token("user-1", "acme");
    let response = server
        .get("/api/v1/checkpoint/nonexistent-id")
        .authorization_bearer(&token)
        .await;
    response.assert_status_not_found();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["details"]["error_type"], "NotFound");
}

#[tokio::test]
async fn mcp_status_reports_not_found_since_no_tool_is_asynchronous() {
    let server = test_server().await;
    let token = sign_token("user-1", "acme");
    let response = server
        .post("/mcp/status")
        .authorization_bearer(&token)
        .json(&json!({ "operation_id": "does-not-exist" }))
        .await;
    response.assert_status_not_found();
}
