//! Operator-initiated sends.
//!
//! Unlike the automatic path these are never deduplicated: an operator may
//! send to the same inbound message more than once.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::channels::{MessageSender, fit_message};
use crate::error::PipelineError;
use crate::pipeline::processor::record_outbound;
use crate::store::Database;
use crate::store::models::{DeliveryStatus, Direction, NewDeliveryLog};

/// Result of a successful manual send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualSendResult {
    pub message_id: String,
    pub outbound_message_id: String,
    pub text: String,
    pub latency_ms: u64,
}

pub struct ManualSender {
    db: Arc<dyn Database>,
    sender: Arc<dyn MessageSender>,
    business_account_id: String,
}

impl ManualSender {
    pub fn new(
        db: Arc<dyn Database>,
        sender: Arc<dyn MessageSender>,
        business_account_id: impl Into<String>,
    ) -> Self {
        Self {
            db,
            sender,
            business_account_id: business_account_id.into(),
        }
    }

    /// Send `text_override`, or the stored suggested reply, to the author
    /// of inbound message `message_id`.
    pub async fn send_manual(
        &self,
        message_id: &str,
        text_override: Option<&str>,
    ) -> Result<ManualSendResult, PipelineError> {
        let inbound = self
            .db
            .get_message(message_id)
            .await?
            .filter(|m| m.direction == Direction::In)
            .ok_or_else(|| PipelineError::MessageNotFound(message_id.to_string()))?;

        let text = text_override
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| {
                inbound
                    .suggested_reply
                    .clone()
                    .filter(|r| !r.trim().is_empty())
            })
            .ok_or_else(|| PipelineError::NoReplyText(message_id.to_string()))?;
        let text = fit_message(&text);

        match self.sender.send_message(&inbound.sender_id, &text).await {
            Ok(receipt) => {
                record_outbound(
                    self.db.as_ref(),
                    &inbound,
                    &self.business_account_id,
                    &receipt.message_id,
                    &text,
                )
                .await?;
                self.db
                    .append_delivery_log(&NewDeliveryLog {
                        message_id: inbound.id.clone(),
                        status: DeliveryStatus::SentManual,
                        error: None,
                        latency_ms: Some(receipt.latency_ms),
                    })
                    .await?;
                info!(message_id, latency_ms = receipt.latency_ms, "Manual reply sent");
                Ok(ManualSendResult {
                    message_id: inbound.id,
                    outbound_message_id: receipt.message_id,
                    text,
                    latency_ms: receipt.latency_ms,
                })
            }
            Err(e) => {
                self.db
                    .append_delivery_log(&NewDeliveryLog {
                        message_id: inbound.id.clone(),
                        status: DeliveryStatus::ErrorManual,
                        error: Some(e.to_string()),
                        latency_ms: None,
                    })
                    .await?;
                warn!(message_id, error = %e, "Manual reply failed");
                Err(e.into())
            }
        }
    }
}
