//! Stateless access-token codec.
//!
//! Access tokens are short-lived HS256 JWTs carrying the user id and the
//! token version that was live when they were issued. The codec only checks
//! signature and claim shape; the version cross-check against the live
//! counter happens in the authentication middleware.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::services::ServiceError;

pub const TOKEN_TYPE_ACCESS: &str = "access";

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user ID, decimal string)
    pub sub: String,
    /// Token version at issue time
    pub ver: i64,
    /// Token type tag, always "access"
    pub typ: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Decoded identity of a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPayload {
    pub user_id: i64,
    pub token_version: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry_minutes: i64,
    leeway_seconds: u64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            leeway_seconds: config.leeway_seconds,
        }
    }

    /// Issue an access token for a user at the given token version.
    pub fn create_access_token(
        &self,
        user_id: i64,
        token_version: i64,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            ver: token_version,
            typ: TOKEN_TYPE_ACCESS.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("failed to encode token: {e}")))
    }

    /// Verify and decode an access token.
    ///
    /// Every failure mode (bad signature, wrong issuer, missing claims,
    /// wrong type tag, non-integer subject) collapses into the single
    /// `AccessTokenInvalid` kind so callers cannot probe which check failed.
    pub fn decode_access_token(&self, token: &str) -> Result<TokenPayload, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = self.leeway_seconds;

        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| ServiceError::AccessTokenInvalid)?;
        let claims = data.claims;

        if claims.typ != TOKEN_TYPE_ACCESS {
            return Err(ServiceError::AccessTokenInvalid);
        }
        if claims.iat <= 0 {
            return Err(ServiceError::AccessTokenInvalid);
        }
        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| ServiceError::AccessTokenInvalid)?;

        Ok(TokenPayload {
            user_id,
            token_version: claims.ver,
        })
    }

    /// Access token lifetime in seconds (reported to clients).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret-which-is-long-enough".to_string(),
            issuer: "identity-service".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 14,
            leeway_seconds: 30,
        })
    }

    #[test]
    fn test_round_trip() {
        let jwt = test_service();
        let token = jwt.create_access_token(42, 3).unwrap();
        let payload = jwt.decode_access_token(&token).unwrap();
        assert_eq!(payload.user_id, 42);
        assert_eq!(payload.token_version, 3);
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let jwt = test_service();
        let other = JwtService::new(&JwtConfig {
            secret: "a-completely-different-secret!!!".to_string(),
            issuer: "identity-service".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 14,
            leeway_seconds: 30,
        });

        let token = other.create_access_token(1, 0).unwrap();
        assert!(matches!(
            jwt.decode_access_token(&token),
            Err(ServiceError::AccessTokenInvalid)
        ));
    }

    #[test]
    fn test_rejects_wrong_issuer() {
        let jwt = test_service();
        let other = JwtService::new(&JwtConfig {
            secret: "test-secret-which-is-long-enough".to_string(),
            issuer: "someone-else".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 14,
            leeway_seconds: 30,
        });

        let token = other.create_access_token(1, 0).unwrap();
        assert!(matches!(
            jwt.decode_access_token(&token),
            Err(ServiceError::AccessTokenInvalid)
        ));
    }

    #[test]
    fn test_rejects_wrong_type_tag() {
        let jwt = test_service();
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            iss: "identity-service".to_string(),
            sub: "1".to_string(),
            ver: 0,
            typ: "refresh".to_string(),
            iat: now,
            exp: now + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret-which-is-long-enough"),
        )
        .unwrap();

        assert!(matches!(
            jwt.decode_access_token(&token),
            Err(ServiceError::AccessTokenInvalid)
        ));
    }

    #[test]
    fn test_rejects_non_integer_subject() {
        let jwt = test_service();
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            iss: "identity-service".to_string(),
            sub: "not-a-number".to_string(),
            ver: 0,
            typ: TOKEN_TYPE_ACCESS.to_string(),
            iat: now,
            exp: now + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret-which-is-long-enough"),
        )
        .unwrap();

        assert!(matches!(
            jwt.decode_access_token(&token),
            Err(ServiceError::AccessTokenInvalid)
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let jwt = test_service();
        assert!(jwt.decode_access_token("not.a.jwt").is_err());
        assert!(jwt.decode_access_token("").is_err());
    }
}
