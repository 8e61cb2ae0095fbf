//! Session orchestration: registration, login, refresh rotation, logout, and
//! bearer authentication.
//!
//! The token-version counter in the fast store is the single global
//! invalidation mechanism: every login and logout bumps it, and an access
//! token is only accepted while its embedded version matches the live
//! counter.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;

use crate::models::{SanitizedUser, User};
use crate::services::audit::{AuditDraft, AuditTrail};
use crate::services::jwt::JwtService;
use crate::services::token_store::{RefreshTokenPair, TokenStore};
use crate::services::ServiceError;
use crate::utils::{hash_password, verify_password, Password};

/// Token pair returned by login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    store: Arc<dyn TokenStore>,
    jwt: JwtService,
    refresh_token_ttl: Duration,
}

impl AuthService {
    pub fn new(
        pool: PgPool,
        store: Arc<dyn TokenStore>,
        jwt: JwtService,
        refresh_token_expiry_days: i64,
    ) -> Self {
        Self {
            pool,
            store,
            jwt,
            refresh_token_ttl: Duration::from_secs(refresh_token_expiry_days as u64 * 86_400),
        }
    }

    /// Resolve a bearer credential to an active user.
    ///
    /// Check order is fixed: credential presence, signature/claims, version
    /// against the live counter, then user state. A token that fails the
    /// version check is reported as expired even if its own `exp` claim is
    /// still in the future — it was superseded by a login or logout.
    pub async fn authenticate(
        &self,
        bearer: Option<&str>,
        trail: &AuditTrail,
    ) -> Result<User, ServiceError> {
        let token = match bearer {
            Some(t) if !t.is_empty() => t,
            _ => {
                trail.record(AuditDraft::new("auth.bearer_required").deny(401));
                return Err(ServiceError::BearerRequired);
            }
        };

        let payload = match self.jwt.decode_access_token(token) {
            Ok(payload) => payload,
            Err(_) => {
                trail.record(AuditDraft::new("auth.access_token_invalid").deny(401));
                return Err(ServiceError::AccessTokenInvalid);
            }
        };

        let current_version = self
            .store
            .token_version(payload.user_id)
            .await
            .map_err(ServiceError::Store)?;
        if payload.token_version != current_version {
            trail.record(
                AuditDraft::new("auth.access_token_expired")
                    .deny(401)
                    .meta(json!({ "user_id": payload.user_id })),
            );
            return Err(ServiceError::AccessTokenExpired);
        }

        let user = self.find_user_by_id(payload.user_id).await?;
        let Some(user) = user.filter(|u| u.is_active) else {
            trail.record(
                AuditDraft::new("auth.user_inactive")
                    .deny(401)
                    .meta(json!({ "user_id": payload.user_id })),
            );
            return Err(ServiceError::UserInactive);
        };

        // Downstream audit events attribute to this user from here on.
        trail.set_actor(user.id);
        Ok(user)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        trail: &AuditTrail,
    ) -> Result<SanitizedUser, ServiceError> {
        let password_hash = hash_password(&Password::new(password.to_string()))?;

        let inserted: Result<User, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(password_hash.as_str())
        .fetch_one(&self.pool)
        .await;

        let user = match inserted {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                trail.record(
                    AuditDraft::new("auth.register")
                        .deny(409)
                        .meta(json!({ "reason": "email_taken", "email": email })),
                );
                return Err(ServiceError::EmailTaken);
            }
            Err(e) => return Err(e.into()),
        };

        trail.record(
            AuditDraft::new("auth.register")
                .actor(user.id)
                .meta(json!({ "user_id": user.id, "email": user.email })),
        );
        Ok(SanitizedUser::from(&user))
    }

    /// Verify credentials and issue a fresh token pair.
    ///
    /// The version bump happens first and intentionally invalidates every
    /// outstanding access token for this user — login is a full session
    /// rotation, not an addition.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        trail: &AuditTrail,
    ) -> Result<TokenResponse, ServiceError> {
        let deny = || {
            trail.record(
                AuditDraft::new("auth.login")
                    .deny(401)
                    .meta(json!({ "email": email })),
            );
        };

        let user = self.find_user_by_email(email).await?;
        let Some(user) = user.filter(|u| u.is_active) else {
            deny();
            return Err(ServiceError::CredentialsInvalid);
        };
        if !verify_password(&Password::new(password.to_string()), &user.password_hash) {
            deny();
            return Err(ServiceError::CredentialsInvalid);
        }

        let token_version = self
            .store
            .bump_token_version(user.id)
            .await
            .map_err(ServiceError::Store)?;

        let response = self.issue_tokens(user.id, token_version).await?;

        trail.record(
            AuditDraft::new("auth.login")
                .actor(user.id)
                .meta(json!({ "user_id": user.id })),
        );
        Ok(response)
    }

    /// Exchange a refresh token for a new pair, consuming it in the process.
    ///
    /// Consumption is atomic in the store; the version re-check afterwards
    /// rejects refresh pairs minted before the most recent login/logout.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        trail: &AuditTrail,
    ) -> Result<TokenResponse, ServiceError> {
        let pair = match RefreshTokenPair::unpack(refresh_token) {
            Ok(pair) => pair,
            Err(_) => {
                trail.record(
                    AuditDraft::new("auth.refresh")
                        .deny(401)
                        .meta(json!({ "reason": "bad_format" })),
                );
                return Err(ServiceError::RefreshTokenInvalid);
            }
        };

        let consumed = self
            .store
            .consume_refresh(&pair)
            .await
            .map_err(ServiceError::Store)?;
        let Some(consumed) = consumed else {
            trail.record(
                AuditDraft::new("auth.refresh")
                    .deny(401)
                    .meta(json!({ "reason": "not_found_or_mismatch" })),
            );
            return Err(ServiceError::RefreshTokenInvalid);
        };

        let current_version = self
            .store
            .token_version(consumed.user_id)
            .await
            .map_err(ServiceError::Store)?;
        if consumed.token_version != current_version {
            trail.record(
                AuditDraft::new("auth.refresh")
                    .deny(401)
                    .meta(json!({ "reason": "tokenver_mismatch", "user_id": consumed.user_id })),
            );
            return Err(ServiceError::RefreshTokenExpired);
        }

        let user = self.find_user_by_id(consumed.user_id).await?;
        if user.filter(|u| u.is_active).is_none() {
            trail.record(
                AuditDraft::new("auth.refresh")
                    .deny(401)
                    .meta(json!({ "reason": "user_inactive", "user_id": consumed.user_id })),
            );
            return Err(ServiceError::UserInactive);
        }

        // Same version on the new pair: refresh rotates material, not the
        // session generation.
        let response = self
            .issue_tokens(consumed.user_id, consumed.token_version)
            .await?;

        trail.record(
            AuditDraft::new("auth.refresh")
                .actor(consumed.user_id)
                .meta(json!({ "user_id": consumed.user_id })),
        );
        Ok(response)
    }

    /// Terminate the user's sessions: best-effort revoke of the presented
    /// refresh pair, then an unconditional version bump. A garbled refresh
    /// token never blocks logout.
    pub async fn logout(
        &self,
        refresh_token: &str,
        user: &User,
        trail: &AuditTrail,
    ) -> Result<(), ServiceError> {
        match RefreshTokenPair::unpack(refresh_token) {
            Ok(pair) => {
                if let Err(e) = self.store.revoke_refresh(&pair.rid).await {
                    tracing::warn!(error = %e, "refresh revoke failed during logout");
                }
            }
            Err(_) => {
                tracing::debug!("malformed refresh token presented at logout");
            }
        }

        self.store
            .bump_token_version(user.id)
            .await
            .map_err(ServiceError::Store)?;

        trail.record(AuditDraft::new("auth.logout").meta(json!({ "user_id": user.id })));
        Ok(())
    }

    async fn issue_tokens(
        &self,
        user_id: i64,
        token_version: i64,
    ) -> Result<TokenResponse, ServiceError> {
        let access_token = self.jwt.create_access_token(user_id, token_version)?;

        let pair = RefreshTokenPair::mint();
        // If the store cannot persist the entry with its TTL, the pair is
        // dropped here and the client never sees it (fail closed).
        self.store
            .store_refresh(&pair, user_id, token_version, self.refresh_token_ttl)
            .await
            .map_err(ServiceError::Store)?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            refresh_token: pair.pack(),
        })
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
