//! Closed error taxonomy for the identity core.
//!
//! Every domain failure has a stable string code and a fixed HTTP status;
//! infrastructure failures (database, token store) are kept distinct from
//! domain denials so a Redis outage is never reported as a bad token.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Missing bearer token")]
    BearerRequired,

    #[error("Invalid access token")]
    AccessTokenInvalid,

    #[error("Token expired")]
    AccessTokenExpired,

    #[error("User disabled or not found")]
    UserInactive,

    #[error("Invalid credentials")]
    CredentialsInvalid,

    #[error("Email already exists")]
    EmailTaken,

    #[error("Invalid refresh token")]
    RefreshTokenInvalid,

    #[error("Refresh expired")]
    RefreshTokenExpired,

    #[error("No role at scope {scope_key}")]
    RoleRequired { scope_key: String },

    #[error("Missing permissions at scope {scope_key}")]
    PermissionMissing {
        scope_key: String,
        missing: Vec<String>,
    },

    #[error("Role not found")]
    RoleNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid scope key")]
    ScopeKeyInvalid,

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Too many requests")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Token store error: {0}")]
    Store(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable machine-readable code, shared with the audit trail.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BearerRequired => "auth.bearer_required",
            Self::AccessTokenInvalid => "auth.access_token_invalid",
            Self::AccessTokenExpired => "auth.access_token_expired",
            Self::UserInactive => "auth.user_inactive",
            Self::CredentialsInvalid => "auth.credentials_invalid",
            Self::EmailTaken => "auth.email_taken",
            Self::RefreshTokenInvalid => "auth.refresh_token_invalid",
            Self::RefreshTokenExpired => "auth.refresh_token_expired",
            Self::RoleRequired { .. } => "rbac.role_required",
            Self::PermissionMissing { .. } => "rbac.permission_missing",
            Self::RoleNotFound => "admin.role_not_found",
            Self::UserNotFound => "admin.user_not_found",
            Self::ScopeKeyInvalid | Self::Validation(_) => "error.validation_failed",
            Self::RateLimited => "error.rate_limited",
            Self::Database(_) => "storage.db_error",
            Self::Store(_) => "storage.redis_error",
            Self::Internal(_) => "error.internal",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::BearerRequired
            | Self::AccessTokenInvalid
            | Self::AccessTokenExpired
            | Self::UserInactive
            | Self::CredentialsInvalid
            | Self::RefreshTokenInvalid
            | Self::RefreshTokenExpired => StatusCode::UNAUTHORIZED,
            Self::RoleRequired { .. } | Self::PermissionMissing { .. } => StatusCode::FORBIDDEN,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::RoleNotFound | Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::ScopeKeyInvalid | Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(_) | Self::Store(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.http_status();

        // Infra details go to the log, not to the client.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }

        let missing = match &self {
            Self::PermissionMissing { missing, .. } => Some(missing.clone()),
            _ => None,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            code: self.code().to_string(),
            message,
            missing,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::BearerRequired.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::RoleRequired {
                scope_key: "global".into()
            }
            .http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ServiceError::EmailTaken.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ServiceError::RoleNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Store(anyhow::anyhow!("redis down")).http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validator_failures_map_to_422() {
        use validator::Validate;

        #[derive(Validate)]
        struct Payload {
            #[validate(length(min = 8))]
            password: String,
        }

        let errors = Payload {
            password: "short".to_string(),
        }
        .validate()
        .unwrap_err();

        let err = ServiceError::from(errors);
        assert_eq!(err.code(), "error.validation_failed");
        assert_eq!(err.http_status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_store_failure_is_not_a_token_error() {
        let err = ServiceError::Store(anyhow::anyhow!("connection refused"));
        assert_eq!(err.code(), "storage.redis_error");
        assert_ne!(err.code(), ServiceError::RefreshTokenInvalid.code());
    }
}
