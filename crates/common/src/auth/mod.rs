//! Authentication and authorization utilities
//!
//! Provides:
//! - Verification of bearer JWTs issued by the managed auth provider
//! - Request auth context extraction
//! - Owner checks for user-scoped endpoints

use crate::errors::{AppError, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Extracted authentication context available to handlers
///
/// `user_id` is `None` only when auth is disabled (local development) and the
/// request carried no token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated user ID (JWT subject)
    pub user_id: Option<Uuid>,

    /// Email claim, when present
    pub email: Option<String>,

    /// Request ID for tracing
    pub request_id: String,
}

impl AuthContext {
    /// Context for requests without a token when auth is not required
    pub fn anonymous(request_id: String) -> Self {
        Self {
            user_id: None,
            email: None,
            request_id,
        }
    }

    /// Require that the addressed user is the authenticated user
    pub fn ensure_user(&self, user_id: Uuid) -> Result<()> {
        match self.user_id {
            Some(authenticated) if authenticated != user_id => Err(AppError::UserMismatch),
            _ => Ok(()),
        }
    }
}

/// JWT claims structure (managed auth provider access token)
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// JWT token manager (HS256, shared secret with the auth provider)
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    audience: String,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, audience: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            audience: audience.to_string(),
        }
    }

    /// Generate a token. Used by tests and local tooling; production tokens
    /// come from the auth provider.
    pub fn generate_token(
        &self,
        user_id: Uuid,
        email: Option<String>,
        expiration_secs: i64,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(expiration_secs);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            email,
            aud: if self.audience.is_empty() {
                None
            } else {
                Some(self.audience.clone())
            },
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        if self.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&[&self.audience]);
        }

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::Unauthorized {
                    message: "Invalid bearer token".to_string(),
                },
            })
    }

    /// Validate a token and parse its subject as a user UUID
    pub fn authenticate(&self, token: &str, request_id: String) -> Result<AuthContext> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized {
            message: "Token subject is not a valid user id".to_string(),
        })?;

        Ok(AuthContext {
            user_id: Some(user_id),
            email: claims.email,
            request_id,
        })
    }
}

/// Extract a bearer token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Axum extractor for AuthContext
///
/// The gateway auth middleware validates the token and stores the context in
/// request extensions; this extractor surfaces it to handlers.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing authentication context".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(extract_bearer("abc.def.ghi"), None);
        assert_eq!(extract_bearer("Basic abc"), None);
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test_secret", "authenticated");

        let user_id = Uuid::new_v4();
        let token = manager
            .generate_token(user_id, Some("student@example.com".into()), 3600)
            .unwrap();
        let claims = manager.validate_token(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email.as_deref(), Some("student@example.com"));
        assert_eq!(claims.aud.as_deref(), Some("authenticated"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let manager = JwtManager::new("test_secret", "authenticated");
        let other = JwtManager::new("other_secret", "authenticated");

        let token = manager
            .generate_token(Uuid::new_v4(), None, 3600)
            .unwrap();
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new("test_secret", "authenticated");
        let token = manager
            .generate_token(Uuid::new_v4(), None, -120)
            .unwrap();
        match manager.validate_token(&token) {
            Err(AppError::ExpiredToken) => {}
            other => panic!("expected ExpiredToken, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_authenticate_parses_subject() {
        let manager = JwtManager::new("test_secret", "authenticated");
        let user_id = Uuid::new_v4();
        let token = manager.generate_token(user_id, None, 3600).unwrap();

        let ctx = manager.authenticate(&token, "req-1".into()).unwrap();
        assert_eq!(ctx.user_id, Some(user_id));
        assert_eq!(ctx.request_id, "req-1");
    }

    #[test]
    fn test_ensure_user() {
        let user_id = Uuid::new_v4();
        let ctx = AuthContext {
            user_id: Some(user_id),
            email: None,
            request_id: "req".into(),
        };
        assert!(ctx.ensure_user(user_id).is_ok());
        assert!(matches!(
            ctx.ensure_user(Uuid::new_v4()),
            Err(AppError::UserMismatch)
        ));

        // Anonymous context (auth disabled) never blocks
        let anon = AuthContext::anonymous("req".into());
        assert!(anon.ensure_user(user_id).is_ok());
    }
}
