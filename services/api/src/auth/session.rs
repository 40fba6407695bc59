//! services/api/src/auth/session.rs
//!
//! The session lifecycle: registration, login, refresh-token rotation with
//! reuse detection, logout, and password-reset requests.
//!
//! A refresh token moves through exactly one transition: issued, then either
//! rotated (its record deleted and a successor issued) or revoked (deleted
//! by logout or by invalidation). Presenting a token whose record is gone is
//! the reuse signal.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

use quill_core::domain::{DeviceInfo, NewUser, RefreshTokenRecord, Role, User};
use quill_core::ports::{ContentStore, Mailer, PortError};

use crate::auth::password::{hash_password, verify_password};
use crate::auth::tokens::TokenCodec;
use crate::error::ApiError;

/// A freshly issued token pair plus the account it belongs to.
#[derive(Debug)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn ContentStore>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenCodec,
    frontend_url: String,
}

impl SessionManager {
    /// The password-reset reply, identical whether or not the email is
    /// registered.
    pub const RESET_MESSAGE: &'static str =
        "If that email is registered, a password reset link has been sent";

    pub fn new(
        store: Arc<dyn ContentStore>,
        mailer: Arc<dyn Mailer>,
        tokens: TokenCodec,
        frontend_url: String,
    ) -> Self {
        Self {
            store,
            mailer,
            tokens,
            frontend_url,
        }
    }

    /// Creates an account and kicks off the verification email.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        let email = email.trim().to_lowercase();

        // Checked up front for a friendly error; the unique index still
        // backstops a registration race.
        match self.store.find_user_by_email(&email).await {
            Ok(_) => return Err(ApiError::EmailInUse),
            Err(PortError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let password_hash = hash_password(password)?;
        let user = self
            .store
            .insert_user(NewUser {
                name: name.trim().to_string(),
                email,
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(|e| match e {
                PortError::Conflict(_) => ApiError::EmailInUse,
                other => other.into(),
            })?;

        match self.tokens.sign_link_token(user.id, Duration::days(1)) {
            Ok(token) => {
                let link = format!("{}/verify-email?token={}", self.frontend_url, token);
                self.send_in_background(
                    user.email.clone(),
                    "Verify your email".to_string(),
                    format!(
                        "<p>Welcome, {}! Please <a href=\"{}\">verify your email</a>. \
                         The link expires in 24 hours.</p>",
                        user.name, link
                    ),
                );
            }
            Err(e) => warn!("failed to sign verification token: {}", e),
        }

        Ok(user)
    }

    /// Checks credentials and issues a token pair.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: DeviceInfo,
    ) -> Result<Session, ApiError> {
        let email = email.trim().to_lowercase();

        // Unknown email and wrong password take the same exit so the
        // response cannot be used to probe for accounts.
        let user = match self.store.find_user_by_email(&email).await {
            Ok(user) => user,
            Err(PortError::NotFound(_)) => return Err(ApiError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };
        if !verify_password(password, &user.password_hash) {
            return Err(ApiError::InvalidCredentials);
        }

        self.issue(user, Some(device)).await
    }

    /// Redeems a refresh token for a new pair, rotating the record.
    pub async fn refresh(&self, presented: Option<String>) -> Result<Session, ApiError> {
        // 1. No cookie at all.
        let presented = presented.ok_or(ApiError::NoRefreshToken)?;

        // 2. Exact-match store lookup. A token with no record was rotated,
        //    revoked, or is being replayed.
        let record = match self.store.find_refresh_token(&presented).await {
            Ok(record) => record,
            Err(PortError::NotFound(_)) => {
                warn!("refresh token presented with no server-side record");
                return Err(ApiError::RevokedToken);
            }
            Err(e) => return Err(e.into()),
        };

        // 3. Cryptographic check. A stored but expired or forged token is
        //    discarded so it cannot be presented again.
        let user_id = match self.tokens.verify_refresh(&presented) {
            Ok(user_id) => user_id,
            Err(_) => {
                self.discard(&presented).await;
                return Err(ApiError::InvalidRefreshToken);
            }
        };

        // 4. The subject must still exist.
        let user = match self.store.find_user_by_id(user_id).await {
            Ok(user) => user,
            Err(PortError::NotFound(_)) => {
                self.discard(&presented).await;
                return Err(ApiError::InvalidRefreshToken);
            }
            Err(e) => return Err(e.into()),
        };

        // 5. Retire the old token BEFORE minting its successor. The delete
        //    also arbitrates between concurrent redeemers: only the caller
        //    that actually removed the row may continue.
        if !self.store.delete_refresh_token(&presented).await? {
            return Err(ApiError::RevokedToken);
        }

        // 6. Issue the successor, carrying the device descriptor forward.
        self.issue(user, record.device).await
    }

    /// Revokes the presented refresh token. Idempotent: a missing record is
    /// success, and the handler clears the cookie either way.
    pub async fn logout(&self, presented: Option<String>) -> Result<(), ApiError> {
        if let Some(token) = presented {
            self.store.delete_refresh_token(&token).await?;
        }
        Ok(())
    }

    /// Sends a reset link if the email is registered. The reply is the same
    /// either way; only the mailer traffic differs.
    pub async fn request_password_reset(&self, email: &str) -> Result<&'static str, ApiError> {
        let email = email.trim().to_lowercase();
        match self.store.find_user_by_email(&email).await {
            Ok(user) => match self.tokens.sign_link_token(user.id, Duration::hours(1)) {
                Ok(token) => {
                    let link =
                        format!("{}/reset-password?token={}", self.frontend_url, token);
                    self.send_in_background(
                        user.email,
                        "Reset your password".to_string(),
                        format!(
                            "<p><a href=\"{}\">Reset your password</a>. \
                             The link expires in one hour.</p>",
                            link
                        ),
                    );
                }
                Err(e) => warn!("failed to sign reset token: {}", e),
            },
            Err(PortError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self::RESET_MESSAGE)
    }

    /// Mints an access/refresh pair and persists the refresh record.
    async fn issue(&self, user: User, device: Option<DeviceInfo>) -> Result<Session, ApiError> {
        let access_token = self.tokens.sign_access(user.id, user.role)?;
        let refresh_token = self.tokens.sign_refresh(user.id)?;
        let refresh_expires_at = TokenCodec::decode_expiry(&refresh_token)
            .unwrap_or_else(|| Utc::now() + Duration::days(self.tokens.refresh_token_days()));

        self.store
            .insert_refresh_token(RefreshTokenRecord {
                token: refresh_token.clone(),
                user_id: user.id,
                created_at: Utc::now(),
                expires_at: refresh_expires_at,
                device,
            })
            .await?;

        Ok(Session {
            access_token,
            refresh_token,
            refresh_expires_at,
            user,
        })
    }

    /// Best-effort removal on a path that is already failing; the response
    /// must not change if this delete fails too.
    async fn discard(&self, token: &str) {
        if let Err(e) = self.store.delete_refresh_token(token).await {
            warn!("failed to discard refresh token: {}", e);
        }
    }

    /// Email delivery happens off the request path; failures are logged and
    /// swallowed.
    fn send_in_background(&self, to: String, subject: String, html_body: String) {
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&to, &subject, &html_body).await {
                warn!("failed to send '{}' email to {}: {}", subject, to, e);
            }
        });
    }

    /// Used by handlers that need the codec (cookie lifetimes, gate checks).
    pub fn codec(&self) -> &TokenCodec {
        &self.tokens
    }
}
