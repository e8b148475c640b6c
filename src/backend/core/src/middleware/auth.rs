//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs whose payload names the user id (`{ "id": 7 }`).
//! Signing them is somebody else's job; this module only verifies them and
//! resolves the user record behind them.
//!
//! # Example
//!
//! ```rust,ignore
//! use calendar_core::middleware::auth::AuthUser;
//!
//! async fn delete_event(user: AuthUser, Path(id): Path<i64>) -> Result<StatusCode> {
//!     // only reached with a valid token for an existing user
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::{CalendarError, Result};
use crate::store::{Collections, Record};

/// Role allowed to reach the admin endpoints.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Role assumed when a user record carries none.
pub const DEFAULT_ROLE: &str = "USER";

// ═══════════════════════════════════════════════════════════════════════════════
// Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub id: i64,
    /// Issued at (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Expiry (Unix seconds)
    pub exp: i64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticator
// ═══════════════════════════════════════════════════════════════════════════════

/// Verifies bearer tokens.
pub struct Authenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self::from_secret(&config.jwt_secret)
    }

    pub fn from_secret(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Decode and validate a token.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("JWT validation failed: {}", e);
            CalendarError::from(e)
        })?;
        Ok(data.claims)
    }

    /// Pull the bearer token out of the `Authorization` header.
    pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractor
// ═══════════════════════════════════════════════════════════════════════════════

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub role: String,
    pub record: Record,
}

impl AuthUser {
    pub fn from_record(id: i64, record: Record) -> Self {
        let role = record
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ROLE)
            .to_string();
        Self { id, role, record }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.eq_ignore_ascii_case(role)
    }

    /// Fail with 403 unless the caller holds `role`.
    pub fn require_role(&self, role: &str) -> Result<()> {
        if self.has_role(role) {
            Ok(())
        } else {
            counter!("calendar_auth_denied_total", "role" => role.to_string()).increment(1);
            Err(CalendarError::forbidden(
                "You do not have permission to perform this action",
            ))
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        self.require_role(ADMIN_ROLE)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<Authenticator>: FromRef<S>,
    Collections: FromRef<S>,
{
    type Rejection = CalendarError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let authenticator = Arc::<Authenticator>::from_ref(state);
        let token = Authenticator::extract_token(&parts.headers).ok_or_else(|| {
            CalendarError::unauthorized("You are not logged in. Please log in to get access")
        })?;
        let claims = authenticator.verify(token)?;

        let collections = Collections::from_ref(state);
        let record = collections.users.find_by_id(claims.id).await?.ok_or_else(|| {
            CalendarError::unauthorized("The user belonging to this token no longer exists")
        })?;

        Ok(AuthUser::from_record(claims.id, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    use crate::error::ErrorCode;

    fn token(secret: &str, id: i64, exp_offset: i64) -> String {
        let claims = Claims {
            id,
            iat: None,
            exp: chrono::Utc::now().timestamp() + exp_offset,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_valid_token() {
        let auth = Authenticator::from_secret("secret");
        let claims = auth.verify(&token("secret", 7, 3600)).unwrap();
        assert_eq!(claims.id, 7);
    }

    #[test]
    fn test_verify_wrong_secret() {
        let auth = Authenticator::from_secret("secret");
        let err = auth.verify(&token("other", 7, 3600)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[test]
    fn test_verify_expired() {
        let auth = Authenticator::from_secret("secret");
        let err = auth.verify(&token("secret", 7, -3600)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TokenExpired);
    }

    #[test]
    fn test_extract_token() {
        let mut headers = HeaderMap::new();
        assert!(Authenticator::extract_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(Authenticator::extract_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(Authenticator::extract_token(&headers), Some("abc.def"));
    }

    #[test]
    fn test_roles() {
        let mut record = Record::new();
        record.insert("role".into(), "ADMIN".into());
        let admin = AuthUser::from_record(1, record);
        assert!(admin.require_admin().is_ok());

        let user = AuthUser::from_record(2, Record::new());
        assert_eq!(user.role, DEFAULT_ROLE);
        assert_eq!(user.require_admin().unwrap_err().code(), ErrorCode::Forbidden);
    }
}
