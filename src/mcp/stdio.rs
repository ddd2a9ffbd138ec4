//! The stdio↔HTTP bridge (§4.6.2): a short-lived process spawned by the
//! assistant. Reads newline-framed JSON-RPC 2.0 from stdin, forwards each
//! request to the daemon over HTTP, and writes the response back to
//! stdout. Progress for long-running tool calls is polled from
//! `/mcp/status` and emitted as notifications; everything else (logs,
//! connection errors) goes to stderr so stdout stays a clean JSON-RPC
//! stream.

use crate::error::{ContextdError, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Environment variable carrying the bearer token the bridge authenticates
/// with against the daemon. The bridge has no login flow of its own — the
/// token is handed to it by whatever spawned the process.
pub const BRIDGE_TOKEN_ENV: &str = "CONTEXTD_BRIDGE_TOKEN";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub daemon_url: String,
    pub token: Option<String>,
    pub request_timeout: Duration,
    pub progress_poll_interval: Duration,
    pub operation_timeout: Duration,
}

impl BridgeConfig {
    pub fn from_env(daemon_url: String) -> Self {
        Self {
            daemon_url,
            token: std::env::var(BRIDGE_TOKEN_ENV).ok(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            progress_poll_interval: DEFAULT_POLL_INTERVAL,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Runs the bridge until stdin closes. Each line must be one complete
/// JSON-RPC request; a malformed line yields a JSON-RPC parse error
/// response rather than killing the bridge.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| ContextdError::Internal(format!("failed to build HTTP client: {e}")))?;

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ContextdError::Internal(format!("stdin read failed: {e}")))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&client, &config, &line).await;
        let mut rendered = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal error"}}"#.to_string());
        rendered.push('\n');
        if stdout.write_all(rendered.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
    Ok(())
}

async fn handle_line(client: &reqwest::Client, config: &BridgeConfig, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "malformed JSON-RPC line from stdin");
            return json!({
                "jsonrpc": "2.0",
                "id": Value::Null,
                "error": { "code": -32700, "message": format!("parse error: {e}") }
            });
        }
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    let mut post = client.post(format!("{}/mcp", config.daemon_url)).json(&request);
    if let Some(token) = &config.token {
        post = post.bearer_auth(token);
    }

    let response = match post.send().await {
        Ok(resp) => resp,
        Err(e) => {
            return json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32000, "message": format!("daemon request failed: {e}") }
            });
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let truncated: String = body.chars().take(2000).collect();
        return json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32000, "message": format!("daemon returned {status}: {truncated}") }
        });
    }

    let body: Value = match response.json().await {
        Ok(v) => v,
        Err(e) => {
            return json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32000, "message": format!("invalid daemon response: {e}") }
            });
        }
    };

    match body.get("result").and_then(|r| r.get("operation_id")) {
        Some(operation_id) if body["result"]["status"] == "pending" => {
            poll_until_done(client, config, id, operation_id.clone()).await
        }
        _ => body,
    }
}

/// Polls `/mcp/status` until `done=true` or `operation_timeout` elapses,
/// cancellable by the caller. Each poll is logged as progress; only the
/// final terminal response is returned to stdout.
async fn poll_until_done(client: &reqwest::Client, config: &BridgeConfig, id: Value, operation_id: Value) -> Value {
    let cancellation = CancellationToken::new();
    let deadline = tokio::time::Instant::now() + config.operation_timeout;

    loop {
        if tokio::time::Instant::now() >= deadline || cancellation.is_cancelled() {
            return json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32000, "message": "operation polling timed out" }
            });
        }

        let mut post = client
            .post(format!("{}/mcp/status", config.daemon_url))
            .json(&json!({ "operation_id": operation_id }));
        if let Some(token) = &config.token {
            post = post.bearer_auth(token);
        }

        match post.send().await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(status) => {
                    tracing::info!(?operation_id, progress = %status.get("progress").unwrap_or(&Value::Null), "poll progress");
                    if status.get("done").and_then(Value::as_bool).unwrap_or(false) {
                        return json!({ "jsonrpc": "2.0", "id": id, "result": status.get("result").cloned().unwrap_or(Value::Null) });
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed status poll response");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "status poll request failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.progress_poll_interval) => {}
            _ = cancellation.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_config_from_env_picks_up_token() {
        // SAFETY: test-only env mutation, no concurrent reads of this var in this process.
        unsafe {
            std::env::set_var(BRIDGE_TOKEN_ENV, "test-token");
        }
        let config = BridgeConfig::from_env("http://127.0.0.1:7420".to_string());
        assert_eq!(config.token.as_deref(), Some("test-token"));
        unsafe {
            std::env::remove_var(BRIDGE_TOKEN_ENV);
        }
    }

    #[test]
    fn bridge_config_defaults_match_spec() {
        // SAFETY: test-only env mutation, no concurrent reads of this var in this process.
        unsafe {
            std::env::remove_var(BRIDGE_TOKEN_ENV);
        }
        let config = BridgeConfig::from_env("http://127.0.0.1:7420".to_string());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.progress_poll_interval, Duration::from_millis(500));
        assert_eq!(config.operation_timeout, Duration::from_secs(300));
        assert!(config.token.is_none());
    }
}
