//! Operator REST endpoints: health, policies, contacts, messages, logs.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use tracing::error;

use crate::error::{DatabaseError, PipelineError};
use crate::pipeline::types::Job;
use crate::pipeline::{ManualSender, PolicyEngine};
use crate::store::Database;
use crate::store::models::{ReplyPolicy, Segment};
use crate::worker::JobQueue;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Shared state for admin routes.
#[derive(Clone)]
pub struct AdminState {
    pub db: Arc<dyn Database>,
    pub policy: Arc<PolicyEngine>,
    pub manual: Arc<ManualSender>,
    pub queue: JobQueue<Job>,
}

/// Build the admin REST routes.
pub fn admin_routes(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/policies", get(list_policies))
        .route("/api/policies/{segment}", put(update_policy))
        .route("/api/contacts/{sender_id}", get(get_contact))
        .route("/api/contacts/{sender_id}/segment", put(set_segment))
        .route("/api/messages", get(list_messages))
        .route("/api/messages/{id}/send", post(send_message))
        .route("/api/delivery-logs", get(list_delivery_logs))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

fn internal_error(e: DatabaseError) -> Response {
    error!(error = %e, "Admin request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

fn parse_segment(raw: &str) -> Result<Segment, Response> {
    raw.parse::<Segment>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AdminState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "queue": {
            "in_flight": state.queue.in_flight(),
            "pending": state.queue.pending(),
        }
    }))
}

// ── Policies ────────────────────────────────────────────────────────────

async fn list_policies(State(state): State<AdminState>) -> Response {
    match state.policy.list_policies().await {
        Ok(policies) => Json(policies).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct PolicyUpdate {
    auto_send: bool,
    require_human_approval: bool,
    #[serde(default)]
    template: Option<String>,
}

/// PUT /api/policies/{segment}
async fn update_policy(
    Path(segment): Path<String>,
    State(state): State<AdminState>,
    Json(update): Json<PolicyUpdate>,
) -> Response {
    let segment = match parse_segment(&segment) {
        Ok(segment) => segment,
        Err(resp) => return resp,
    };
    let policy = ReplyPolicy {
        segment,
        auto_send: update.auto_send,
        require_human_approval: update.require_human_approval,
        template: update.template.filter(|t| !t.trim().is_empty()),
    };
    match state.policy.update_policy(&policy).await {
        Ok(()) => Json(policy).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Contacts ────────────────────────────────────────────────────────────

async fn get_contact(Path(sender_id): Path<String>, State(state): State<AdminState>) -> Response {
    match state.db.get_contact(&sender_id).await {
        Ok(Some(contact)) => Json(contact).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("contact {sender_id} not found")),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct SegmentUpdate {
    segment: String,
}

/// PUT /api/contacts/{sender_id}/segment
async fn set_segment(
    Path(sender_id): Path<String>,
    State(state): State<AdminState>,
    Json(update): Json<SegmentUpdate>,
) -> Response {
    let segment = match parse_segment(&update.segment) {
        Ok(segment) => segment,
        Err(resp) => return resp,
    };
    match state.policy.assign_segment(&sender_id, segment).await {
        Ok(contact) => Json(contact).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Messages ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
    message_id: Option<String>,
}

async fn list_messages(
    State(state): State<AdminState>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.db.list_recent_messages(clamp_limit(query.limit)).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SendRequest {
    text: Option<String>,
}

/// POST /api/messages/{id}/send
///
/// Body `{text?}` is optional; without it the stored suggestion is sent.
async fn send_message(
    Path(id): Path<String>,
    State(state): State<AdminState>,
    body: Bytes,
) -> Response {
    let request: SendRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SendRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid body: {e}")),
        }
    };

    match state.manual.send_manual(&id, request.text.as_deref()).await {
        Ok(result) => Json(result).into_response(),
        Err(e @ PipelineError::MessageNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e @ PipelineError::NoReplyText(_)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(PipelineError::Delivery(e)) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
        Err(PipelineError::Database(e)) => internal_error(e),
        Err(e) => {
            error!(error = %e, "Manual send failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ── Delivery logs ───────────────────────────────────────────────────────

async fn list_delivery_logs(
    State(state): State<AdminState>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state
        .db
        .list_delivery_logs(query.message_id.as_deref(), clamp_limit(query.limit))
        .await
    {
        Ok(logs) => Json(logs).into_response(),
        Err(e) => internal_error(e),
    }
}
