use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Liveness/readiness probe covering both backing stores.
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = crate::db::health_check(&state.pool).await.is_ok();
    let store_ok = state.store.health_check().await.is_ok();

    let healthy = db_ok && store_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "service": state.config.service_name,
            "checks": {
                "database": db_ok,
                "token_store": store_ok,
            },
        })),
    )
}
