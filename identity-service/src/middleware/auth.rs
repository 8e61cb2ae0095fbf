use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::models::User;
use crate::services::{AuditTrail, ServiceError};
use crate::AppState;

/// Middleware to require authentication on a route group.
///
/// The resolved user lands in request extensions; handlers pick it up via
/// [`AuthUser`]. Denials are recorded on the trail by the auth service before
/// the error is returned.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let trail = req
        .extensions()
        .get::<AuditTrail>()
        .cloned()
        .unwrap_or_else(AuditTrail::detached);

    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let user = state.auth.authenticate(bearer, &trail).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Extractor for the authenticated user on protected routes.
pub struct AuthUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<User>()
            .cloned()
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!(
                "authenticated user missing from request extensions"
            )))?;
        Ok(AuthUser(user))
    }
}

/// Extractor for the request's audit trail; falls back to a detached trail
/// when the context middleware did not run (direct handler tests).
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuditTrail
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuditTrail>()
            .cloned()
            .unwrap_or_else(AuditTrail::detached))
    }
}
