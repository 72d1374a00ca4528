//! Flatten one webhook delivery into zero or more `Job`s.
//!
//! A delivery bundles entries, each with a `messaging` array. Events
//! missing a message id or sender id are dropped without error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::pipeline::types::Job;

/// Extract jobs from a parsed webhook body.
pub fn normalize(platform: &str, payload: Arc<Value>) -> Vec<Job> {
    let Some(entries) = payload.get("entry").and_then(Value::as_array) else {
        debug!(platform, "Webhook payload has no entry array");
        return Vec::new();
    };

    let mut jobs = Vec::new();
    for entry in entries {
        let entry_id = id_field(entry.get("id")).unwrap_or_default();
        let Some(events) = entry.get("messaging").and_then(Value::as_array) else {
            continue;
        };
        for event in events {
            match normalize_event(platform, &entry_id, event, &payload) {
                Some(job) => jobs.push(job),
                None => debug!(platform, entry_id = %entry_id, "Dropping event without message or sender id"),
            }
        }
    }
    jobs
}

fn normalize_event(
    platform: &str,
    entry_id: &str,
    event: &Value,
    payload: &Arc<Value>,
) -> Option<Job> {
    let message = event.get("message")?;
    let message_id = non_empty(message.get("mid"))?;
    let sender_id = id_field(event.get("sender").and_then(|s| s.get("id")))?;
    let recipient_id = id_field(event.get("recipient").and_then(|r| r.get("id")));

    let thread_id = id_field(event.get("conversation").and_then(|c| c.get("id")))
        .unwrap_or_else(|| format!("{entry_id}_{sender_id}"));

    let is_echo = message
        .get("is_echo")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let is_loop = recipient_id.as_deref() == Some(sender_id.as_str());

    Some(Job {
        message_id,
        thread_id,
        recipient_id,
        text: message
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        timestamp: parse_timestamp(event.get("timestamp")).unwrap_or_else(Utc::now),
        is_from_self_or_system: is_echo || is_loop,
        platform: platform.to_string(),
        raw_payload: Arc::clone(payload),
        sender_id,
    })
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Ids arrive as strings, occasionally as numbers.
fn id_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        other => non_empty(Some(other)),
    }
}

/// Epoch milliseconds, as a number or numeric string.
fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let millis = match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if millis <= 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}
