//! Services layer: the identity core's business logic.
//!
//! Handlers stay thin; everything with a decision in it lives here.

pub mod admin;
pub mod audit;
pub mod auth;
pub mod authz;
pub mod error;
pub mod jwt;
pub mod scope;
pub mod seed;
pub mod token_store;

pub use admin::AdminService;
pub use audit::{AuditDraft, AuditStatus, AuditTrail};
pub use auth::{AuthService, TokenResponse};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, TokenPayload};
pub use scope::{ScopeKey, ScopeKeyError};
pub use token_store::{
    ConsumedRefresh, MemoryTokenStore, RedisTokenStore, RefreshTokenPair, TokenStore,
};
