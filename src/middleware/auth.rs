use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::app_state::AppState;
use crate::db::models::user::normalize_username;
use crate::lifecycle::ActorContext;
use crate::utils::api_response::ApiResponse;

/// Trusted header carrying the caller when a fronting proxy authenticates.
pub const REMOTE_USER_HEADER: &str = "X-Remote-User";
pub const REMOTE_ROLE_HEADER: &str = "X-Remote-Role";

/// JWT Claims used for authentication.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Directory username of the caller
    pub sub: String,
    pub role: String,
    /// Expiration timestamp (UNIX TIME)
    pub exp: usize,
}

/// Authenticated caller, attached to every protected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub role: String,
    pub ip_address: Option<String>,
}

impl Identity {
    pub fn actor(&self) -> ActorContext {
        ActorContext::new(self.username.clone()).with_ip(self.ip_address.clone())
    }
}

/// Signs a token for `username`. Used by operators and tests to mint credentials.
pub fn sign_token(secret: &str, username: &str, role: &str, ttl_secs: i64) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: username.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + ttl_secs).max(0) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    let real_ip = || {
        headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };
    forwarded
        .or_else(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn unauthorized(message: &str) -> Response {
    ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, message, None).into_response()
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn bearer_identity(headers: &HeaderMap, secret: &str) -> Result<(String, String), Response> {
    let auth_header = headers.get("Authorization").ok_or_else(|| {
        debug!("missing Authorization header");
        unauthorized("Missing Authorization header")
    })?;

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            ApiResponse::<()>::error(
                StatusCode::BAD_REQUEST,
                "Invalid token format (missing 'Bearer ' prefix)",
                None,
            )
            .into_response()
        })?;

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map_err(|e| {
            warn!(error = %e, "JWT decoding failed");
            ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Invalid token", Some(json!({ "error": e.to_string() })))
                .into_response()
        })?;

    Ok((token_data.claims.sub, token_data.claims.role))
}

/// Resolves the caller into an [`Identity`]. With auth disabled the trusted
/// proxy headers are used instead of a bearer token.
pub async fn jwt_middleware(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Result<Response, Response> {
    let (username, role) = if state.config.auth_disabled {
        let username = header_value(req.headers(), REMOTE_USER_HEADER)
            .ok_or_else(|| unauthorized("Missing X-Remote-User header"))?
            .to_string();
        let role = header_value(req.headers(), REMOTE_ROLE_HEADER).unwrap_or("user").to_string();
        (username, role)
    } else {
        bearer_identity(req.headers(), &state.config.jwt_secret)?
    };

    let username = normalize_username(&username);
    if username.is_empty() {
        return Err(unauthorized("Empty username"));
    }

    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0);
    let identity = Identity {
        username,
        role,
        ip_address: client_ip(req.headers(), peer),
    };
    debug!(username = %identity.username, role = %identity.role, "caller authenticated");
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Only callers holding the configured approver role may close requests.
pub async fn require_approver(State(state): State<AppState>, req: Request<Body>, next: Next) -> Result<Response, Response> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .ok_or_else(|| unauthorized("Missing caller identity"))?;

    if !identity.role.eq_ignore_ascii_case(&state.config.approver_role) {
        warn!(username = %identity.username, role = %identity.role, "approval attempted without approver role");
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Approver role required",
            Some(json!({ "required_role": state.config.approver_role })),
        )
        .into_response());
    }

    Ok(next.run(req).await)
}
