pub mod admin;
pub mod auth;

pub use admin::{GrantRequest, ListGrantsParams, RevokeParams};
pub use auth::{LoginRequest, LogoutRequest, MessageResponse, RefreshRequest, RegisterRequest};
