//! Bearer-token authentication for the HTTP daemon.
//!
//! # Module Structure
//!
//! - [`auth::jwt`](crate::auth::jwt) - JWT verification and owner-ID derivation
//! - [`auth::middleware`](crate::auth::middleware) - Axum layer and extractor
//!
//! # Security model
//!
//! `contextd` issues no tokens of its own: tokens are minted out of band
//! and verified here with HS256 (configured via `contextd.toml`'s
//! `[auth].jwt_secret`, or `CONTEXTD_JWT_SECRET`). The owner ID used to
//! scope every request is derived *only* from the verified token's
//! subject (§4.6) — never from a header, path segment, or query
//! parameter, even though the owner ID's textual format happens to
//! resemble something a client could forge in a header.
//!
//! ## Middleware
//!
//! ```ignore
//! use contextd::auth::middleware::auth_middleware;
//!
//! let app = Router::new()
//!     .route("/api/v1/checkpoint/save", post(handler))
//!     .route_layer(axum::middleware::from_fn_with_state(auth_service, auth_middleware));
//! ```
//!
//! ## Extracting the authenticated context in handlers
//!
//! ```ignore
//! use contextd::auth::middleware::AuthUser;
//!
//! async fn handler(AuthUser(ctx): AuthUser) -> impl IntoResponse {
//!     format!("owner: {}", ctx.owner_id)
//! }
//! ```

pub mod jwt;
pub mod middleware;

pub use jwt::{AuthService, Claims};
