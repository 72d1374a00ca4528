//! Webhook endpoints: subscription handshake and event ingestion.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::normalize::normalize;
use super::signature::verify_signature;
use crate::pipeline::types::Job;
use crate::worker::JobQueue;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Shared state for webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub queue: JobQueue<Job>,
    pub app_secret: SecretString,
    /// `None` rejects every handshake.
    pub verify_token: Option<String>,
}

/// Build the webhook routes.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook/{platform}", get(verify_subscription).post(receive_events))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct HandshakeQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook/{platform}
///
/// Echoes `hub.challenge` when the mode is `subscribe` and the token matches.
async fn verify_subscription(
    Path(platform): Path<String>,
    State(state): State<WebhookState>,
    Query(query): Query<HandshakeQuery>,
) -> impl IntoResponse {
    let token_matches = match (&state.verify_token, &query.verify_token) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    };

    match (query.mode.as_deref(), query.challenge) {
        (Some("subscribe"), Some(challenge)) if token_matches => {
            info!(platform = %platform, "Webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            warn!(platform = %platform, "Webhook subscription rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook/{platform}
///
/// Verifies the signature over the raw bytes, enqueues every derived job,
/// and acknowledges before any processing happens.
async fn receive_events(
    Path(platform): Path<String>,
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !verify_signature(&body, header, state.app_secret.expose_secret().as_bytes()) {
        warn!(platform = %platform, "Rejected webhook with invalid signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "invalid signature"})),
        );
    }

    let jobs = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(payload) => normalize(&platform, Arc::new(payload)),
        Err(e) => {
            warn!(platform = %platform, error = %e, "Webhook body is not valid JSON");
            Vec::new()
        }
    };

    let count = jobs.len();
    for job in jobs {
        state.queue.enqueue(job);
    }
    debug!(platform = %platform, jobs = count, "Webhook accepted");

    (StatusCode::OK, Json(serde_json::json!({"ok": true})))
}
