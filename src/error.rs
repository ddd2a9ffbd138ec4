//! The error taxonomy shared by every layer of contextd.
//!
//! Services and the store wrap lower-level failures with a `ContextdError`
//! kind; the transport layer (HTTP, JSON-RPC) maps each kind to a status
//! code. Internal details are logged, never handed back to a caller.

use chrono::Utc;
use serde::Serialize;

/// Application-wide error type. Variant names are the taxonomy's "kinds",
/// not wrappers around a specific dependency's error type.
#[derive(Debug, thiserror::Error)]
pub enum ContextdError {
    /// Field missing, length/format violation, or bad enum value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing or invalid authenticated owner identity.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Tenant mismatch on an access validation check.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Entity or collection missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Already-exists on create; usually swallowed to idempotency by callers.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient vector-store error that survived all retries.
    #[error("backend error: {0}")]
    Backend(String),

    /// Embedder failure.
    #[error("embed error: {0}")]
    Embed(String),

    /// Deadline exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Unclassified failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ContextdError {
    /// The taxonomy name used in logs, JSON-RPC `error.data.error_type`, and
    /// HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ContextdError::InvalidInput(_) => "InvalidInput",
            ContextdError::Unauthenticated(_) => "Unauthenticated",
            ContextdError::Forbidden(_) => "Forbidden",
            ContextdError::NotFound(_) => "NotFound",
            ContextdError::Conflict(_) => "Conflict",
            ContextdError::Backend(_) => "Backend",
            ContextdError::Embed(_) => "Embed",
            ContextdError::Timeout(_) => "Timeout",
            ContextdError::Internal(_) => "Internal",
        }
    }

    pub(crate) fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ContextdError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ContextdError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ContextdError::Forbidden(_) => StatusCode::FORBIDDEN,
            ContextdError::NotFound(_) => StatusCode::NOT_FOUND,
            ContextdError::Conflict(_) => StatusCode::CONFLICT,
            ContextdError::Backend(_) => StatusCode::BAD_GATEWAY,
            ContextdError::Embed(_) => StatusCode::BAD_GATEWAY,
            ContextdError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ContextdError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON-RPC 2.0 error code for the MCP transport. Reuses the standard
    /// `-32602 InvalidParams` code for bad input and a block of
    /// implementation-defined codes (`-32000..`) for the rest, per the
    /// JSON-RPC spec's reserved-range convention.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            ContextdError::InvalidInput(_) => -32602,
            ContextdError::Unauthenticated(_) => -32001,
            ContextdError::Forbidden(_) => -32002,
            ContextdError::NotFound(_) => -32003,
            ContextdError::Conflict(_) => -32004,
            ContextdError::Backend(_) => -32005,
            ContextdError::Embed(_) => -32006,
            ContextdError::Timeout(_) => -32007,
            ContextdError::Internal(_) => -32603,
        }
    }

    pub(crate) fn message(&self) -> String {
        self.to_string()
    }

    /// Builds this error's `ErrorData` block (`trace_id`, `error_type`,
    /// RFC-3339 `timestamp`), shared by the HTTP and JSON-RPC surfaces.
    pub fn error_data(&self) -> ErrorData {
        ErrorData::new(self.kind())
    }
}

/// Structured error data attached to both HTTP and JSON-RPC error bodies.
#[derive(Debug, Serialize)]
pub struct ErrorData {
    pub trace_id: String,
    pub error_type: String,
    pub timestamp: String,
}

impl ErrorData {
    pub(crate) fn new(error_type: &str) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            error_type: error_type.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl axum::response::IntoResponse for ContextdError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!(kind = self.kind(), "{}", self);
        let status = self.http_status();
        let data = ErrorData::new(self.kind());
        let body = serde_json::json!({
            "success": false,
            "error": {
                "code": status.as_u16(),
                "message": self.message(),
                "details": data,
            }
        });
        (status, axum::Json(body)).into_response()
    }
}

/// Result type used throughout contextd.
pub type Result<T> = std::result::Result<T, ContextdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_case_empty_error_message_is_invalid_input() {
        let err = ContextdError::InvalidInput("error_message must not be empty".into());
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn each_kind_maps_to_its_documented_status() {
        use axum::http::StatusCode;
        assert_eq!(
            ContextdError::InvalidInput("x".into()).http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ContextdError::Unauthenticated("x".into()).http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ContextdError::Forbidden("x".into()).http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ContextdError::NotFound("x".into()).http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ContextdError::Conflict("x".into()).http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ContextdError::Backend("x".into()).http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ContextdError::Embed("x".into()).http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ContextdError::Timeout("x".into()).http_status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ContextdError::Internal("x".into()).http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
