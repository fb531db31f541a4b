//! Bearer-token authentication middleware
//!
//! Validates the Authorization header on /api routes and stores the
//! resulting AuthContext in request extensions, where the handler
//! extractor picks it up.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use studybuddy_common::auth::{extract_bearer, AuthContext};
use studybuddy_common::errors::{AppError, Result};
use uuid::Uuid;

use crate::AppState;

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer);

    let context = match (bearer, state.jwt.as_ref()) {
        (Some(token), Some(manager)) => manager.authenticate(token, request_id)?,
        (Some(_), None) if state.config.auth.require_auth => {
            return Err(AppError::Unauthorized {
                message: "Token verification is not configured".to_string(),
            })
        }
        (None, _) if state.config.auth.require_auth => {
            return Err(AppError::Unauthorized {
                message: "Missing bearer token".to_string(),
            })
        }
        _ => AuthContext::anonymous(request_id),
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
