//! Outbound delivery: sending replies back to the platform.

pub mod graph;

pub use graph::GraphSender;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DeliveryError;

/// Maximum text length the messaging API accepts.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Cut `text` to what the platform will deliver. Callers store the result,
/// so the recorded outbound text matches what was sent.
pub fn fit_message(text: &str) -> String {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => {
            warn!(
                chars = text.chars().count(),
                limit = MAX_MESSAGE_CHARS,
                "Reply truncated to platform limit"
            );
            text[..cut].to_string()
        }
        None => text.to_string(),
    }
}

/// Acknowledgement of a successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Platform id of the message we sent.
    pub message_id: String,
    /// Wall-clock time the send took.
    pub latency_ms: u64,
}

/// Delivery collaborator: pure I/O, no business logic.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send `text` to `recipient_id`. Errors on transport failure or a
    /// non-success status.
    async fn send_message(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> Result<SendReceipt, DeliveryError>;
}
