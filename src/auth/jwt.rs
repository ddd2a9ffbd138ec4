use crate::error::{ContextdError, Result};
use crate::tenant::Tenant;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The claims this daemon expects on an inbound bearer token. Tokens are
/// minted out of band (by whatever issues credentials to the calling
/// assistant); this service only ever verifies them.
///
/// `org_id`/`team_id`/`project_id` are carried on the token itself rather
/// than accepted as request parameters: §3.1 requires tenant to "come from
/// authenticated credentials only", so a client cannot widen its own scope
/// by passing a different tenant in a tool call's arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated principal. This, and only this, is the input to
    /// owner-ID derivation.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl Claims {
    /// Builds the tenant this token is scoped to. Fails closed: a token
    /// with no `org_id` cannot be used for any tenant-scoped operation.
    pub fn tenant(&self) -> Result<Tenant> {
        let org_id = self
            .org_id
            .clone()
            .ok_or_else(|| ContextdError::Unauthenticated("token carries no org_id".into()))?;
        Ok(Tenant {
            org_id,
            team_id: self.team_id.clone(),
            project_id: self.project_id.clone(),
        })
    }
}

/// Verifies inbound bearer tokens and derives the owner ID from the
/// authenticated principal they carry. `contextd` has no user
/// registration or token-issuance surface of its own, so unlike the
/// teacher's `AuthService` this holds no password hashing or token
/// minting — only HS256 verification and the owner-ID hash.
pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    /// Verifies a JWT token and returns its claims. The returned
    /// `Claims::sub` is the only legitimate input to
    /// [`owner_id_from_principal`] (§4.6: owner ID comes solely from
    /// authenticated credentials, never from headers/path/query).
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| ContextdError::Unauthenticated(format!("invalid token: {e}")))
    }
}

/// SHA-256 of the authenticated principal, rendered as 64 lowercase hex
/// characters — the owner ID format required by §3.1 and used to build
/// `collection://owner_<hex>/...` URIs.
pub fn owner_id_from_principal(principal: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(principal.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sign(secret: &str, sub: &str, expires_in: i64) -> String {
        sign_with_org(secret, sub, expires_in, None)
    }

    fn sign_with_org(secret: &str, sub: &str, expires_in: i64, org_id: Option<&str>) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            iat: Utc::now().timestamp() as usize,
            exp: (Utc::now() + Duration::seconds(expires_in)).timestamp() as usize,
            org_id: org_id.map(str::to_string),
            team_id: None,
            project_id: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn tenant_fails_closed_without_org_id() {
        let claims = Claims {
            sub: "user-1".to_string(),
            iat: 0,
            exp: 0,
            org_id: None,
            team_id: None,
            project_id: None,
        };
        assert!(claims.tenant().is_err());
    }

    #[test]
    fn tenant_derives_from_claims_org_id() {
        let service = AuthService::new("test-secret-key-at-least-32-chars".to_string());
        let token = sign_with_org("test-secret-key-at-least-32-chars", "user-1", 900, Some("acme"));
        let claims = service.verify_token(&token).expect("should verify");
        let tenant = claims.tenant().expect("org_id present");
        assert_eq!(tenant.org_id, "acme");
    }

    #[test]
    fn verify_token_round_trips_subject() {
        let service = AuthService::new("test-secret-key-at-least-32-chars".to_string());
        let token = sign("test-secret-key-at-least-32-chars", "user-456", 900);
        let claims = service.verify_token(&token).expect("should verify");
        assert_eq!(claims.sub, "user-456");
    }

    #[test]
    fn verify_token_rejects_wrong_secret() {
        let service = AuthService::new("secret-one-that-is-32-chars-long".to_string());
        let token = sign("secret-two-that-is-32-chars-long", "user-789", 900);
        assert!(service.verify_token(&token).is_err());
    }

    #[test]
    fn verify_token_rejects_malformed_token() {
        let service = AuthService::new("test-secret-key-at-least-32-chars".to_string());
        assert!(service.verify_token("not.a.jwt").is_err());
    }

    #[test]
    fn owner_id_is_64_lowercase_hex_chars() {
        let id = owner_id_from_principal("user-456");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn owner_id_is_deterministic_and_collision_resistant() {
        assert_eq!(
            owner_id_from_principal("user-a"),
            owner_id_from_principal("user-a")
        );
        assert_ne!(
            owner_id_from_principal("user-a"),
            owner_id_from_principal("user-b")
        );
    }
}
