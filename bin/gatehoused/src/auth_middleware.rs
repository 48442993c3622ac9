//! JWT authentication middleware.
//!
//! Extracts JWT from `Authorization: Bearer <token>`, validates it,
//! and injects the resulting [`Actor`] into request extensions for
//! module handlers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gatehouse_core::{Actor, Role};
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims payload. The role travels in its persisted string form
/// so tokens stay readable with standard tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: person id from the directory seed.
    pub sub: String,
    /// Display name.
    pub name: String,
    /// Role string ("student", "guard", "hod", ...).
    pub role: String,
    /// Department, for department-scoped roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

impl Claims {
    /// Build the request [`Actor`]. Fails on a role string this build
    /// does not know, which would otherwise bypass every role check.
    pub fn to_actor(&self) -> Result<Actor, AuthError> {
        let role = Role::from_str(&self.role)
            .ok_or_else(|| AuthError::InvalidToken(format!("unknown role '{}'", self.role)))?;
        Ok(Actor {
            id: self.sub.clone(),
            name: self.name.clone(),
            role,
            department: self.department.clone(),
        })
    }
}

/// Shared JWT configuration for the middleware.
#[derive(Clone)]
pub struct JwtState {
    pub decoding_key: DecodingKey,
    pub validation: Validation,
}

/// Error type for authentication failures.
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing authorization token".to_string()),
            AuthError::InvalidToken(e) => (StatusCode::UNAUTHORIZED, format!("invalid token: {}", e)),
        };
        let body = serde_json::json!({ "error": msg });
        (status, axum::Json(body)).into_response()
    }
}

/// Middleware that extracts and validates JWT from the Authorization header.
///
/// If the request path is in the public list, the middleware passes through.
/// Otherwise it requires a valid JWT and stores the Actor in request
/// extensions.
pub async fn auth_middleware(
    State(jwt_state): State<Arc<JwtState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let path = request.uri().path().to_string();

    // Public endpoints that don't require authentication.
    if is_public_path(&path) {
        return Ok(next.run(request).await);
    }

    // Extract Bearer token.
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)?;

    // Validate and decode JWT.
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &jwt_state.decoding_key,
        &jwt_state.validation,
    )
    .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    // Store the actor in request extensions for handlers to access.
    let actor = token_data.claims.to_actor()?;
    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}

/// Check if a request path is public (no auth required).
fn is_public_path(path: &str) -> bool {
    matches!(path, "/health" | "/version") || path.starts_with("/auth/login")
}
