//! Response-side audit flush.
//!
//! Runs inside the context middleware, so the trail already exists when the
//! request reaches it. After the handler finishes, the trail is drained and
//! the batch is persisted in one transaction. A request that produced an
//! error response without recording anything gets a synthesized `http.error`
//! event so failures are never invisible in the audit log.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::services::audit::persist_events;
use crate::services::AuditTrail;
use crate::AppState;

pub async fn audit_flush_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let trail = req
        .extensions()
        .get::<AuditTrail>()
        .cloned()
        .unwrap_or_else(AuditTrail::detached);
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let status = response.status().as_u16();

    let mut events = trail.pop_all();
    if events.is_empty() && status >= 400 {
        events.push(trail.synthesize_http_error(status, &method, &path));
    }

    if !events.is_empty() {
        if let Err(e) = persist_events(&state.pool, &events, status).await {
            // The response has already been decided; losing the batch is a
            // telemetry problem, not a client problem.
            tracing::error!(
                error = %e,
                request_id = trail.request_id().unwrap_or("-"),
                count = events.len(),
                "failed to persist audit events"
            );
        }
    }

    response
}
