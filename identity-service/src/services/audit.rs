//! Per-request audit trail.
//!
//! Every notable action appends an event to an in-memory buffer owned by the
//! request that produced it. The buffer is drained and persisted exactly once
//! when the response is ready (`middleware::audit`); nothing here writes to
//! the database on the hot path. Recording is infallible from the caller's
//! point of view — a failed audit append must never break the request.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use sqlx::PgPool;

use crate::utils::redact::redact_value;

/// Outcome classification of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Ok,
    Deny,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Deny => "deny",
            Self::Error => "error",
        }
    }

    /// Classify an HTTP status: auth/authz/throttle rejections are denials,
    /// any other 4xx/5xx is an error.
    pub fn classify(http_status: u16) -> Self {
        match http_status {
            401 | 403 | 429 => Self::Deny,
            s if s >= 400 => Self::Error,
            _ => Self::Ok,
        }
    }
}

/// A not-yet-recorded event, built where the action happens.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub action: String,
    pub status: AuditStatus,
    pub http_status: Option<i32>,
    pub scope_key: Option<String>,
    pub resource_type: Option<String>,
    pub resource_ref_id: Option<i64>,
    /// Explicit actor override; ambient actor is used when absent.
    pub actor_user_id: Option<i64>,
    pub meta: Option<Value>,
    pub error_code: Option<String>,
}

impl AuditDraft {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: AuditStatus::Ok,
            http_status: None,
            scope_key: None,
            resource_type: None,
            resource_ref_id: None,
            actor_user_id: None,
            meta: None,
            error_code: None,
        }
    }

    pub fn deny(mut self, http_status: i32) -> Self {
        self.status = AuditStatus::Deny;
        self.http_status = Some(http_status);
        self
    }

    pub fn error(mut self, http_status: i32) -> Self {
        self.status = AuditStatus::Error;
        self.http_status = Some(http_status);
        self
    }

    pub fn scope(mut self, scope_key: impl Into<String>) -> Self {
        self.scope_key = Some(scope_key.into());
        self
    }

    pub fn actor(mut self, user_id: i64) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }
}

/// A finalized event sitting in the buffer, ambient fields filled in and
/// metadata already redacted.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub request_id: Option<String>,
    pub actor_user_id: Option<i64>,
    pub action: String,
    pub scope_key: Option<String>,
    pub resource_type: Option<String>,
    pub resource_ref_id: Option<i64>,
    pub status: AuditStatus,
    pub http_status: Option<i32>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub meta: Option<Value>,
}

struct TrailInner {
    request_id: Option<String>,
    ip: Option<String>,
    user_agent: Option<String>,
    actor: Mutex<Option<i64>>,
    events: Mutex<Vec<AuditEvent>>,
}

/// Cheap-clone handle to the request's audit buffer. Each request gets its
/// own; handles are never shared across requests.
#[derive(Clone)]
pub struct AuditTrail {
    inner: Arc<TrailInner>,
}

impl AuditTrail {
    pub fn new(
        request_id: Option<String>,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(TrailInner {
                request_id,
                ip,
                user_agent,
                actor: Mutex::new(None),
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Detached trail for contexts without an inbound request (tests, jobs).
    pub fn detached() -> Self {
        Self::new(None, None, None)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.inner.request_id.as_deref()
    }

    /// Bind the authenticated user as the ambient actor for later events.
    pub fn set_actor(&self, user_id: i64) {
        if let Ok(mut actor) = self.inner.actor.lock() {
            *actor = Some(user_id);
        }
    }

    pub fn actor(&self) -> Option<i64> {
        self.inner.actor.lock().ok().and_then(|a| *a)
    }

    /// Append an event. Ambient request id/actor/ip/user-agent are captured
    /// here; metadata is redacted before it ever reaches the buffer.
    pub fn record(&self, draft: AuditDraft) {
        let meta = finalize_meta(draft.meta, draft.error_code);
        let event = AuditEvent {
            request_id: self.inner.request_id.clone(),
            actor_user_id: draft.actor_user_id.or_else(|| self.actor()),
            action: draft.action,
            scope_key: draft.scope_key,
            resource_type: draft.resource_type,
            resource_ref_id: draft.resource_ref_id,
            status: draft.status,
            http_status: draft.http_status,
            ip: self.inner.ip.clone(),
            user_agent: self.inner.user_agent.clone(),
            meta,
        };
        if let Ok(mut events) = self.inner.events.lock() {
            events.push(event);
        }
    }

    /// Drain the buffer. The flush middleware is the only caller in request
    /// handling; after this the trail is empty regardless of what happens to
    /// the drained events.
    pub fn pop_all(&self) -> Vec<AuditEvent> {
        match self.inner.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => Vec::new(),
        }
    }

    /// The synthesized event for requests that errored without recording
    /// anything themselves.
    pub fn synthesize_http_error(&self, http_status: u16, method: &str, path: &str) -> AuditEvent {
        AuditEvent {
            request_id: self.inner.request_id.clone(),
            actor_user_id: self.actor(),
            action: "http.error".to_string(),
            scope_key: None,
            resource_type: None,
            resource_ref_id: None,
            status: AuditStatus::classify(http_status),
            http_status: Some(i32::from(http_status)),
            ip: self.inner.ip.clone(),
            user_agent: self.inner.user_agent.clone(),
            meta: Some(json!({ "method": method, "path": path })),
        }
    }
}

/// Normalize metadata to an object, inject the error code, redact.
fn finalize_meta(meta: Option<Value>, error_code: Option<String>) -> Option<Value> {
    let meta = match meta {
        None => None,
        Some(Value::Object(map)) => Some(Value::Object(map)),
        Some(other) => Some(json!({ "value": other })),
    };

    let merged = match (meta, error_code) {
        (None, None) => return None,
        (None, Some(code)) => json!({ "error_code": code }),
        (Some(m), None) => m,
        (Some(Value::Object(mut map)), Some(code)) => {
            map.entry("error_code".to_string())
                .or_insert_with(|| Value::String(code));
            Value::Object(map)
        }
        (Some(other), Some(_)) => other,
    };

    Some(redact_value(merged))
}

/// Persist a batch of events in a single transaction. Callers treat a
/// failure as a logging concern, never as a request failure.
pub async fn persist_events(
    pool: &PgPool,
    events: &[AuditEvent],
    response_status: u16,
) -> Result<(), sqlx::Error> {
    if events.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for event in events {
        let http_status = event
            .http_status
            .unwrap_or_else(|| i32::from(response_status));
        sqlx::query(
            r#"
            INSERT INTO audit_events
                (request_id, actor_user_id, action, scope_key,
                 resource_type, resource_ref_id, status, http_status,
                 ip, user_agent, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&event.request_id)
        .bind(event.actor_user_id)
        .bind(&event.action)
        .bind(&event.scope_key)
        .bind(&event.resource_type)
        .bind(event.resource_ref_id)
        .bind(event.status.as_str())
        .bind(http_status)
        .bind(&event.ip)
        .bind(&event.user_agent)
        .bind(&event.meta)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}
