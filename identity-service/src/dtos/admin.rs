use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct GrantRequest {
    pub user_id: i64,

    #[validate(length(min = 1, max = 64, message = "Role name is required"))]
    pub role_name: String,

    #[validate(length(min = 1, max = 128, message = "Scope key is required"))]
    pub scope_key: String,
}

/// Query parameters for revoking a grant.
#[derive(Debug, Deserialize)]
pub struct RevokeParams {
    pub user_id: i64,
    pub role_name: String,
    pub scope_key: String,
}

/// Optional filters for listing grants.
#[derive(Debug, Deserialize)]
pub struct ListGrantsParams {
    pub user_id: Option<i64>,
    pub scope_key: Option<String>,
}
