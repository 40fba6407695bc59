//! services/api/src/auth/tokens.rs
//!
//! Signing and verification for every token the service issues: short-lived
//! access tokens, store-tracked refresh tokens, and the one-shot tokens
//! embedded in email links. All HS256, with separate secrets for the access
//! and refresh families so one leaked key cannot forge the other.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quill_core::domain::Role;

use crate::config::Config;
use crate::error::ApiError;

/// Clock skew tolerated when validating `exp`, in seconds.
const LEEWAY_SECONDS: u64 = 60;

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by refresh and email-link tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// The verified identity behind a request, produced by `verify_access` and
/// inserted into request extensions by the auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    /// Owner-or-admin rule applied by every mutating content handler.
    pub fn can_modify(&self, owner_id: Uuid) -> bool {
        self.user_id == owner_id || self.role.is_admin()
    }
}

/// Signs and verifies tokens. Secrets and lifetimes are injected at
/// construction; nothing here reads the environment.
#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_minutes: i64,
    refresh_token_days: i64,
}

impl TokenCodec {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_token_minutes: i64,
        refresh_token_days: i64,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_token_minutes,
            refresh_token_days,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_access_secret,
            &config.jwt_refresh_secret,
            config.access_token_minutes,
            config.refresh_token_days,
        )
    }

    pub fn refresh_token_days(&self) -> i64 {
        self.refresh_token_days
    }

    /// Mints an access token carrying the user's id and role.
    pub fn sign_access(&self, user_id: Uuid, role: Role) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id,
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.access_token_minutes)).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.access_encoding,
        )
        .map_err(|e| ApiError::Internal(format!("Failed to sign access token: {}", e)))
    }

    /// Mints a refresh token. The caller is responsible for persisting the
    /// matching server-side record.
    pub fn sign_refresh(&self, user_id: Uuid) -> Result<String, ApiError> {
        self.sign_with_refresh_secret(user_id, Duration::days(self.refresh_token_days))
    }

    /// Mints a short-lived token for an email link (verification, password
    /// reset). Signed with the refresh secret; never store-tracked.
    pub fn sign_link_token(&self, user_id: Uuid, ttl: Duration) -> Result<String, ApiError> {
        self.sign_with_refresh_secret(user_id, ttl)
    }

    fn sign_with_refresh_secret(
        &self,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.refresh_encoding,
        )
        .map_err(|e| ApiError::Internal(format!("Failed to sign refresh token: {}", e)))
    }

    /// Validates signature and expiry of an access token. Malformed, forged,
    /// and expired tokens all collapse into `Unauthenticated`.
    pub fn verify_access(&self, token: &str) -> Result<AuthContext, ApiError> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &validation())
            .map_err(|_| ApiError::Unauthenticated)?;
        let role = Role::parse(&data.claims.role).ok_or(ApiError::Unauthenticated)?;
        Ok(AuthContext {
            user_id: data.claims.sub,
            role,
        })
    }

    /// Validates signature and expiry of a refresh token and returns its
    /// subject. Store-level checks are the session manager's job.
    pub fn verify_refresh(&self, token: &str) -> Result<Uuid, ApiError> {
        let data = decode::<RefreshClaims>(token, &self.refresh_decoding, &validation())
            .map_err(|_| ApiError::InvalidRefreshToken)?;
        Ok(data.claims.sub)
    }

    /// Reads the `exp` claim without checking the signature. Only used to
    /// size cookie and record lifetimes for tokens this codec just minted;
    /// never grants trust.
    pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
        let payload = token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
        DateTime::from_timestamp(value.get("exp")?.as_i64()?, 0)
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = LEEWAY_SECONDS;
    validation
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_SECRET: &str = "an access secret comfortably over 32 bytes";
    const REFRESH_SECRET: &str = "a refresh secret comfortably over 32 bytes";

    fn codec() -> TokenCodec {
        TokenCodec::new(ACCESS_SECRET, REFRESH_SECRET, 15, 30)
    }

    #[test]
    fn access_token_roundtrip_preserves_identity() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let token = codec.sign_access(user_id, Role::Admin).unwrap();
        let ctx = codec.verify_access(&token).unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.role, Role::Admin);
    }

    #[test]
    fn expired_access_token_is_rejected() {
        // Negative lifetime puts `exp` five minutes in the past, well
        // beyond the leeway window.
        let codec = TokenCodec::new(ACCESS_SECRET, REFRESH_SECRET, -5, 30);
        let token = codec.sign_access(Uuid::new_v4(), Role::User).unwrap();
        let err = codec.verify_access(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }

    #[test]
    fn access_token_from_another_secret_is_rejected() {
        let other = TokenCodec::new(
            "a completely different access secret!!",
            REFRESH_SECRET,
            15,
            30,
        );
        let token = other.sign_access(Uuid::new_v4(), Role::User).unwrap();
        assert!(codec().verify_access(&token).is_err());
    }

    #[test]
    fn refresh_token_roundtrip_preserves_subject() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let token = codec.sign_refresh(user_id).unwrap();
        assert_eq!(codec.verify_refresh(&token).unwrap(), user_id);
    }

    #[test]
    fn access_and_refresh_families_do_not_cross_verify() {
        let codec = codec();
        let refresh = codec.sign_refresh(Uuid::new_v4()).unwrap();
        assert!(codec.verify_access(&refresh).is_err());
    }

    #[test]
    fn decode_expiry_matches_the_configured_lifetime() {
        let codec = codec();
        let token = codec.sign_refresh(Uuid::new_v4()).unwrap();
        let exp = TokenCodec::decode_expiry(&token).unwrap();
        let expected = Utc::now() + Duration::days(30);
        assert!((exp - expected).num_seconds().abs() <= 5);
    }

    #[test]
    fn decode_expiry_on_garbage_is_none() {
        assert!(TokenCodec::decode_expiry("not-a-jwt").is_none());
        assert!(TokenCodec::decode_expiry("a.b.c").is_none());
    }

    #[test]
    fn can_modify_allows_owner_and_admins_only() {
        let owner = Uuid::new_v4();
        let as_owner = AuthContext {
            user_id: owner,
            role: Role::User,
        };
        let as_stranger = AuthContext {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };
        let as_admin = AuthContext {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let as_superadmin = AuthContext {
            user_id: Uuid::new_v4(),
            role: Role::Superadmin,
        };
        assert!(as_owner.can_modify(owner));
        assert!(!as_stranger.can_modify(owner));
        assert!(as_admin.can_modify(owner));
        assert!(as_superadmin.can_modify(owner));
    }
}
