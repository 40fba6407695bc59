//! services/api/src/auth/handlers.rs
//!
//! Authentication endpoints. Access tokens travel in response bodies;
//! refresh tokens travel only in an http-only cookie.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use quill_core::domain::{DeviceInfo, User};

use crate::config::Config;
use crate::error::ApiError;
use crate::web::state::AppState;

const REFRESH_COOKIE: &str = "refreshToken";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: Option<String>,
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Public view of an account. Never carries the password hash.
#[derive(Serialize)]
pub struct UserBody {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: &'static str,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserBody {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role.as_str(),
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub user: UserBody,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/register - Create a new account
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Validate the request shape
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("Name is required".to_string()));
    }
    if !valid_email(req.email.trim()) {
        return Err(ApiError::Validation("A valid email is required".to_string()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    // 2. Create the account; the verification email goes out in the background
    let user = state
        .sessions
        .register(&req.name, &req.email, &req.password)
        .await?;

    // 3. Respond with the public view of the account
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registered. Check your email to verify your account.",
            "user": UserBody::from(user),
        })),
    ))
}

/// POST /api/auth/login - Exchange credentials for a token pair
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Describe the device for the refresh record
    let device = DeviceInfo {
        ip: client_ip(&headers),
        user_agent: header_string(&headers, header::USER_AGENT),
        device_name: req.device_name,
    };

    // 2. Check credentials and mint the pair
    let session = state.sessions.login(&req.email, &req.password, device).await?;

    // 3. Set the refresh cookie and return the access token
    let cookie = refresh_cookie(
        &state.config,
        &session.refresh_token,
        session.refresh_expires_at,
    );
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse {
            access_token: session.access_token,
            user: UserBody::from(session.user),
        }),
    ))
}

/// POST /api/auth/refresh - Rotate the refresh token
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Redeem the cookie; rotation and reuse detection live in the manager
    let session = state
        .sessions
        .refresh(refresh_cookie_value(&headers))
        .await?;

    // 2. Replace the cookie with the successor token
    let cookie = refresh_cookie(
        &state.config,
        &session.refresh_token,
        session.refresh_expires_at,
    );
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse {
            access_token: session.access_token,
            user: UserBody::from(session.user),
        }),
    ))
}

/// POST /api/auth/logout - Revoke the refresh token and clear the cookie
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Revoke the record if a cookie came along (missing record is fine)
    state.sessions.logout(refresh_cookie_value(&headers)).await?;

    // 2. Clear the cookie unconditionally
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_refresh_cookie(&state.config))],
        Json(json!({ "message": "Logged out" })),
    ))
}

/// POST /api/auth/password-reset - Request a reset link
pub async fn password_reset_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.sessions.request_password_reset(&req.email).await?;
    Ok(Json(json!({ "message": message })))
}

//=========================================================================================
// Cookie and Header Helpers
//=========================================================================================

/// Builds the refresh cookie. Max-Age tracks the token's remaining
/// validity; Secure and Domain follow configuration.
fn refresh_cookie(config: &Config, token: &str, expires_at: DateTime<Utc>) -> String {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        REFRESH_COOKIE, token, max_age
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &config.cookie_domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

fn clear_refresh_cookie(config: &Config) -> String {
    let mut cookie = format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", REFRESH_COOKIE);
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &config.cookie_domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

/// Parses the refresh token out of the Cookie header, if present.
pub fn refresh_cookie_value(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("refreshToken="))
        .map(str::to_string)
}

/// First hop of X-Forwarded-For, when a proxy supplies it.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
        .is_match(email)
}
