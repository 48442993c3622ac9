//! Login endpoint — verifies a person's password against the argon2id
//! hash in the config seed, issues a JWT.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::auth_middleware::Claims;
use crate::bootstrap::verify_password;
use crate::routes::AppState;

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response body.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Register login routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login_handler))
}

/// Handle POST /auth/login.
///
/// Looks the username up in the configured people seed and verifies the
/// password. People without a configured hash cannot log in; the reply
/// is the same either way so the endpoint doesn't leak who exists.
async fn login_handler(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<LoginRequest>,
) -> axum::response::Response {
    let config = &state.server_config;

    let verified = config
        .find_person(&body.username)
        .and_then(|p| p.password_hash.as_deref().map(|h| (p, h)))
        .filter(|(_, hash)| verify_password(&body.password, hash));

    let Some((person, _)) = verified else {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({
                "error": "invalid credentials"
            })),
        )
            .into_response();
    };

    let now = chrono::Utc::now().timestamp();
    let expire_secs = config.jwt.expire_secs;

    let claims = Claims {
        sub: person.id.clone(),
        name: person.name.clone(),
        role: person.role.as_str().to_string(),
        department: person.department.clone(),
        iat: now,
        exp: now + expire_secs as i64,
    };

    let encoding_key = EncodingKey::from_secret(config.jwt.secret.as_bytes());
    match encode(&Header::default(), &claims, &encoding_key) {
        Ok(token) => {
            let response = LoginResponse {
                access_token: token,
                token_type: "Bearer".to_string(),
                expires_in: expire_secs,
            };
            (StatusCode::OK, axum::Json(serde_json::json!(response))).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to encode JWT: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({
                    "error": "internal server error"
                })),
            )
                .into_response()
        }
    }
}
