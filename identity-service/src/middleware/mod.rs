pub mod audit;
pub mod auth;
pub mod context;
pub mod rate_limit;

pub use audit::audit_flush_middleware;
pub use auth::{auth_middleware, AuthUser};
pub use context::request_context_middleware;
pub use rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter};
