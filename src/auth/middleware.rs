use crate::auth::jwt::{owner_id_from_principal, AuthService};
use crate::auth::Claims;
use crate::error::ContextdError;
use crate::tenant::Tenant;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Verifies the `Authorization: Bearer <token>` header and attaches the
/// authenticated context to the request's extensions. Every downstream
/// handler must read the owner ID through [`AuthUser`] — this is the only
/// place in the daemon that derives it, and it is derived from the
/// verified token's subject, never from the header text itself.
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = auth_service
        .verify_token(token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let owner_id = owner_id_from_principal(&claims.sub);
    req.extensions_mut().insert(AuthContext { claims, owner_id });

    Ok(next.run(req).await)
}

/// The authenticated request context: the verified claims plus the owner
/// ID derived from them.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub owner_id: String,
}

impl AuthContext {
    /// The tenant this request is scoped to, derived solely from the
    /// verified token. Fails closed (`ContextdError::Unauthenticated`) when
    /// the token carries no `org_id` — callers must not substitute a
    /// client-supplied tenant in that case.
    pub fn tenant(&self) -> crate::error::Result<Tenant> {
        self.claims.tenant().map_err(|_| {
            ContextdError::Unauthenticated("authenticated token carries no tenant".into())
        })
    }
}

/// Extractor for the authenticated request context. Handlers that need the
/// owner ID or tenant identity must extract `AuthUser`, not read headers
/// directly — there is no other sanctioned path to it.
pub struct AuthUser(pub AuthContext);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthUser)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
