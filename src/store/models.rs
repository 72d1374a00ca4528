//! Persisted record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::types::Intent;

// ── Segment ─────────────────────────────────────────────────────────

/// Audience bucket a sender belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Segment {
    Friend,
    Known,
    #[default]
    Stranger,
    Vip,
}

impl Segment {
    pub const ALL: [Segment; 4] = [
        Segment::Friend,
        Segment::Known,
        Segment::Stranger,
        Segment::Vip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Friend => "FRIEND",
            Self::Known => "KNOWN",
            Self::Stranger => "STRANGER",
            Self::Vip => "VIP",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FRIEND" => Ok(Self::Friend),
            "KNOWN" => Ok(Self::Known),
            "STRANGER" => Ok(Self::Stranger),
            "VIP" => Ok(Self::Vip),
            other => Err(format!("unknown segment '{other}'")),
        }
    }
}

// ── Reply policy ────────────────────────────────────────────────────

/// Automation permissions for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPolicy {
    pub segment: Segment,
    pub auto_send: bool,
    pub require_human_approval: bool,
    /// Fixed reply text sent instead of the draft when set.
    pub template: Option<String>,
}

impl ReplyPolicy {
    /// The built-in policy for a segment.
    pub fn default_for(segment: Segment) -> Self {
        let (auto_send, require_human_approval) = match segment {
            Segment::Friend => (false, true),
            Segment::Known => (true, false),
            Segment::Stranger => (true, false),
            Segment::Vip => (false, true),
        };
        Self {
            segment,
            auto_send,
            require_human_approval,
            template: None,
        }
    }

    /// Template text, ignoring blank templates.
    pub fn template_text(&self) -> Option<&str> {
        self.template.as_deref().filter(|t| !t.trim().is_empty())
    }
}

// ── Contact ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub sender_id: String,
    pub segment: Segment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Messages ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "OUT" { Self::Out } else { Self::In }
    }
}

/// A message about to be inserted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub platform_message_id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub direction: Direction,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// A persisted inbound or outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub platform_message_id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub direction: Direction,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub intent: Option<Intent>,
    pub confidence: Option<f32>,
    pub suggested_reply: Option<String>,
    pub needs_human_approval: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// Result of a unique-create.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(StoredMessage),
    /// The uniqueness constraint already holds a row for this id.
    Duplicate,
}

// ── Delivery log ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Skipped,
    Error,
    SentManual,
    ErrorManual,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Skipped => "SKIPPED",
            Self::Error => "ERROR",
            Self::SentManual => "SENT_MANUAL",
            Self::ErrorManual => "ERROR_MANUAL",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(Self::Sent),
            "SKIPPED" => Ok(Self::Skipped),
            "ERROR" => Ok(Self::Error),
            "SENT_MANUAL" => Ok(Self::SentManual),
            "ERROR_MANUAL" => Ok(Self::ErrorManual),
            other => Err(format!("unknown delivery status '{other}'")),
        }
    }
}

/// A log entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewDeliveryLog {
    /// System id of the inbound message.
    pub message_id: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub latency_ms: Option<u64>,
}

impl NewDeliveryLog {
    pub fn skipped(message_id: &str, reason: impl Into<String>) -> Self {
        Self {
            message_id: message_id.to_string(),
            status: DeliveryStatus::Skipped,
            error: Some(reason.into()),
            latency_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLog {
    pub id: String,
    pub message_id: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub latency_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}
