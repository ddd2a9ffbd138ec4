//! HTTP daemon surface (§4.6, §6.2): `/health`, the `/mcp` JSON-RPC
//! endpoint and its stdio-bridge support routes, and the `/api/v1`+`/mcp`
//! REST mirror of the tool set. Assembled the way the teacher's
//! `src/main.rs` builds its router — health check, nested API routes,
//! `SwaggerUi`, `CorsLayer`, `TraceLayer`, `with_state` — generalized to
//! this daemon's auth layer and dual transport surface.

mod envelope;
mod health;
mod mcp_routes;
mod rest;

use crate::auth::middleware::auth_middleware;
use crate::auth::AuthService;
use crate::state::AppState;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the full router: an unauthenticated `/health`, and the
/// bearer-authenticated `/mcp` + `/api/v1` + `/mcp/<domain>/<action>`
/// surfaces. Swagger UI is mounted only when the `swagger-ui` feature is
/// enabled, mirroring the teacher's optional-feature gating elsewhere.
pub fn build_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    let protected = Router::new()
        .route("/mcp", post(mcp_routes::handle_jsonrpc))
        .route("/mcp/sse", get(mcp_routes::handle_sse))
        .route("/mcp/status", post(mcp_routes::handle_status))
        .merge(rest::router())
        .route_layer(from_fn_with_state(auth_service, auth_middleware));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .merge(protected)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    #[cfg(feature = "swagger-ui")]
    let app = app.merge(swagger::router());

    app
}

#[cfg(feature = "swagger-ui")]
mod swagger {
    use axum::Router;
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    #[derive(OpenApi)]
    #[openapi(info(
        title = "contextd API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Multi-tenant session-context daemon: checkpoints, remediation knowledge, troubleshooting diagnosis."
    ))]
    struct ApiDoc;

    pub fn router() -> Router {
        SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()).into()
    }
}
