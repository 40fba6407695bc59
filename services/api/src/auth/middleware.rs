//! services/api/src/auth/middleware.rs
//!
//! Route protection. `require_auth` turns a bearer access token into an
//! `AuthContext` extension; `authorize` gates a route on a role set.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use quill_core::domain::Role;

use crate::auth::tokens::AuthContext;
use crate::error::ApiError;
use crate::web::state::AppState;

/// Roles that clear the administrative gate.
pub const ADMIN_ROLES: &[Role] = &[Role::Admin, Role::Superadmin];

/// Middleware that validates the bearer access token and inserts the
/// verified identity into request extensions for handlers to use.
///
/// A missing header and a bad token are deliberately indistinguishable:
/// both produce the same 401.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the bearer token
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthenticated)?;

    // 2. Verify signature and expiry, recovering the caller's identity
    let ctx = state.tokens.verify_access(token)?;

    // 3. Insert the identity into request extensions
    req.extensions_mut().insert(ctx);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

/// Builds a middleware that admits only the given roles. Layered after
/// `require_auth`; a request that somehow arrives without an identity is
/// treated as unauthenticated rather than forbidden.
pub fn authorize(
    allowed: &'static [Role],
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Result<Response, ApiError>> + Send>>
       + Clone {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let ctx = req
                .extensions()
                .get::<AuthContext>()
                .copied()
                .ok_or(ApiError::Unauthenticated)?;
            if !allowed.contains(&ctx.role) {
                return Err(ApiError::Forbidden);
            }
            Ok(next.run(req).await)
        })
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_extracts_the_token() {
        let headers = headers_with_auth("Bearer abc.def.ghi");
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_token_requires_the_bearer_scheme() {
        let headers = headers_with_auth("Basic abc.def.ghi");
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn bearer_token_rejects_missing_and_empty_values() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
        let headers = headers_with_auth("Bearer    ");
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn admin_gate_admits_both_administrative_roles() {
        assert!(ADMIN_ROLES.contains(&Role::Admin));
        assert!(ADMIN_ROLES.contains(&Role::Superadmin));
        assert!(!ADMIN_ROLES.contains(&Role::User));
    }
}
