pub mod grant;
pub mod role;
pub mod user;

pub use grant::{GrantRow, UserRoleGrant};
pub use role::{Permission, Role};
pub use user::{SanitizedUser, User};
