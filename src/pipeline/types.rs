//! Shared types for the message processing pipeline.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Job ─────────────────────────────────────────────────────────────

/// One inbound message event, ready for processing.
///
/// Built by the webhook normalizer; only exists when both the platform
/// message id and the sender id were present in the payload.
#[derive(Debug, Clone)]
pub struct Job {
    /// Platform-unique message id: the dedupe key.
    pub message_id: String,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    /// Conversation id, or `{entry_id}_{sender_id}` when the platform omits it.
    pub thread_id: String,
    /// Message body; may be empty.
    pub text: String,
    /// Platform timestamp, or ingestion time when missing/invalid.
    pub timestamp: DateTime<Utc>,
    /// Echo of our own send, or a sender == recipient loop.
    pub is_from_self_or_system: bool,
    /// Route segment the delivery arrived on (e.g. "instagram").
    pub platform: String,
    /// The whole webhook delivery this job was extracted from.
    pub raw_payload: Arc<serde_json::Value>,
}

// ── Intent ──────────────────────────────────────────────────────────

/// Closed set of intents a draft can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    GeneralQuestion,
    Pricing,
    OrderSupport,
    Shipping,
    Refund,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralQuestion => "general_question",
            Self::Pricing => "pricing",
            Self::OrderSupport => "order_support",
            Self::Shipping => "shipping",
            Self::Refund => "refund",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored intent; unrecognised values map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "general_question" => Self::GeneralQuestion,
            "pricing" => Self::Pricing,
            "order_support" => Self::OrderSupport,
            "shipping" => Self::Shipping,
            "refund" => Self::Refund,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Draft ───────────────────────────────────────────────────────────

/// Reply sent when classification could not produce a usable draft.
pub const FALLBACK_REPLY: &str =
    "Thanks for your message! A member of our team will review it and get back to you shortly.";

/// A candidate reply produced by the rules or the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub intent: Intent,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub reply: String,
    pub needs_human_approval: bool,
}

impl Draft {
    /// The fail-closed draft: never passes the approval guardrail.
    pub fn fallback() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            reply: FALLBACK_REPLY.to_string(),
            needs_human_approval: true,
        }
    }
}
