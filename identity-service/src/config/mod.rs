use std::env;

use serde::Deserialize;

use crate::services::ServiceError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    /// Push the role/permission catalog into the database at startup.
    pub auto_sync_authz: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub connect_timeout_seconds: u64,
    pub op_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub leeway_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth_attempts: u32,
    pub auth_window_seconds: u64,
}

impl AppConfig {
    /// Load configuration from the environment. In prod every variable
    /// without a default is required; in dev missing secrets fail too, but
    /// operational knobs fall back to their defaults.
    pub fn from_env() -> Result<Self, ServiceError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| ServiceError::Internal(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let config = AppConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: parse_env("PORT", Some("8080"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DB_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DB_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
                connect_timeout_seconds: parse_env("REDIS_CONNECT_TIMEOUT_SECONDS", Some("2"), is_prod)?,
                op_timeout_seconds: parse_env("REDIS_OP_TIMEOUT_SECONDS", Some("2"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                issuer: get_env("JWT_ISSUER", Some("identity-service"), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "ACCESS_TOKEN_EXPIRE_MINUTES",
                    Some("30"),
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "REFRESH_TOKEN_EXPIRE_DAYS",
                    Some("14"),
                    is_prod,
                )?,
                leeway_seconds: parse_env("JWT_LEEWAY_SECONDS", Some("30"), is_prod)?,
            },
            rate_limit: RateLimitConfig {
                enabled: parse_env("RATE_LIMIT_ENABLED", Some("true"), is_prod)?,
                auth_attempts: parse_env("AUTH_RATE_LIMIT_ATTEMPTS", Some("10"), is_prod)?,
                auth_window_seconds: parse_env(
                    "AUTH_RATE_LIMIT_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
            },
            auto_sync_authz: parse_env("AUTO_SYNC_AUTHZ", Some("true"), is_prod)?,
        };

        Ok(config)
    }
}

/// Read an environment variable, falling back to `default` when one exists.
/// Variables without a default are required regardless of environment.
fn get_env(name: &str, default: Option<&str>, is_prod: bool) -> Result<String, ServiceError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => match default {
            Some(value) if !is_prod || !value.is_empty() => Ok(value.to_string()),
            _ => Err(ServiceError::Internal(anyhow::anyhow!(
                "missing required environment variable: {name}"
            ))),
        },
    }
}

fn parse_env<T>(name: &str, default: Option<&str>, is_prod: bool) -> Result<T, ServiceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(name, default, is_prod)?;
    raw.parse::<T>().map_err(|e| {
        ServiceError::Internal(anyhow::anyhow!("invalid value for {name}: {e}"))
    })
}
