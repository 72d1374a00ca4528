//! Message processor: the per-job state machine.
//!
//! Flow for one inbound job:
//! 1. Raw-persist the webhook payload
//! 2. Dedupe on the platform message id
//! 3. Thread upsert, inbound persist (uniqueness hit = duplicate)
//! 4. Guardrails: empty text, self/system
//! 5. Classify and record the draft
//! 6. Guardrails: confidence / approval, segment policy
//! 7. Send, then log SENT or ERROR
//!
//! Every guardrail writes exactly one SKIPPED delivery log entry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channels::{MessageSender, fit_message};
use crate::config::ProcessorConfig;
use crate::error::{Error, PipelineError};
use crate::pipeline::classifier::ClassificationPipeline;
use crate::pipeline::policy::PolicyEngine;
use crate::pipeline::types::Job;
use crate::store::Database;
use crate::store::models::{
    DeliveryStatus, Direction, InsertOutcome, NewDeliveryLog, NewMessage, StoredMessage,
};
use crate::worker::JobWorker;

pub const SKIP_EMPTY_TEXT: &str = "empty message text";
pub const SKIP_SELF_OR_SYSTEM: &str = "self/system message";
pub const SKIP_LOW_CONFIDENCE: &str = "low confidence or human approval required";

/// Terminal result of processing one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Already seen; nothing was written.
    Duplicate,
    Skipped {
        message_id: String,
        reason: String,
    },
    Sent {
        message_id: String,
        outbound_message_id: String,
        latency_ms: u64,
    },
    DeliveryFailed {
        message_id: String,
        error: String,
    },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Skipped { .. } => "skipped",
            Self::Sent { .. } => "sent",
            Self::DeliveryFailed { .. } => "delivery_failed",
        }
    }
}

pub struct MessageProcessor {
    db: Arc<dyn Database>,
    classifier: Arc<ClassificationPipeline>,
    policy: PolicyEngine,
    sender: Arc<dyn MessageSender>,
    config: ProcessorConfig,
}

impl MessageProcessor {
    pub fn new(
        db: Arc<dyn Database>,
        classifier: Arc<ClassificationPipeline>,
        sender: Arc<dyn MessageSender>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            policy: PolicyEngine::new(Arc::clone(&db)),
            db,
            classifier,
            sender,
            config,
        }
    }

    /// Run one job through the state machine.
    ///
    /// Storage failures propagate; delivery failures are logged and returned
    /// as `JobOutcome::DeliveryFailed`.
    pub async fn process(&self, job: &Job) -> Result<JobOutcome, PipelineError> {
        debug!(
            message_id = %job.message_id,
            sender_id = %job.sender_id,
            platform = %job.platform,
            "Processing job"
        );

        self.db
            .upsert_raw_event(&job.message_id, &job.platform, &job.raw_payload)
            .await?;

        if self.db.find_inbound_message(&job.message_id).await?.is_some() {
            debug!(message_id = %job.message_id, "Duplicate delivery, ignoring");
            return Ok(JobOutcome::Duplicate);
        }

        self.db
            .upsert_thread(&job.thread_id, &job.platform, &job.sender_id)
            .await?;

        let inbound = NewMessage {
            platform_message_id: job.message_id.clone(),
            thread_id: job.thread_id.clone(),
            sender_id: job.sender_id.clone(),
            direction: Direction::In,
            text: job.text.clone(),
            received_at: job.timestamp,
        };
        let stored = match self.db.insert_message(&inbound).await? {
            InsertOutcome::Inserted(stored) => stored,
            InsertOutcome::Duplicate => {
                debug!(message_id = %job.message_id, "Lost insert race, treating as duplicate");
                return Ok(JobOutcome::Duplicate);
            }
        };

        if job.text.trim().is_empty() {
            return self.skip(&stored, SKIP_EMPTY_TEXT).await;
        }
        if job.is_from_self_or_system {
            return self.skip(&stored, SKIP_SELF_OR_SYSTEM).await;
        }

        let draft = self.classifier.classify(&job.text).await;
        self.db.record_classification(&stored.id, &draft).await?;
        debug!(
            message_id = %job.message_id,
            intent = %draft.intent,
            confidence = draft.confidence,
            needs_human_approval = draft.needs_human_approval,
            "Draft recorded"
        );

        if draft.confidence < self.config.confidence_threshold || draft.needs_human_approval {
            return self.skip(&stored, SKIP_LOW_CONFIDENCE).await;
        }

        let segment = self.policy.resolve_segment(&job.sender_id).await?;
        let policy = self.policy.resolve_policy(segment).await?;
        if !policy.auto_send {
            return self
                .skip(&stored, format!("auto-send disabled for segment {segment}"))
                .await;
        }

        let reply = fit_message(policy.template_text().unwrap_or(&draft.reply));
        match self.sender.send_message(&job.sender_id, &reply).await {
            Ok(receipt) => {
                record_outbound(
                    self.db.as_ref(),
                    &stored,
                    &self.config.business_account_id,
                    &receipt.message_id,
                    &reply,
                )
                .await?;
                self.db
                    .append_delivery_log(&NewDeliveryLog {
                        message_id: stored.id.clone(),
                        status: DeliveryStatus::Sent,
                        error: None,
                        latency_ms: Some(receipt.latency_ms),
                    })
                    .await?;
                info!(
                    message_id = %job.message_id,
                    segment = %segment,
                    latency_ms = receipt.latency_ms,
                    "Auto-reply sent"
                );
                Ok(JobOutcome::Sent {
                    message_id: stored.id,
                    outbound_message_id: receipt.message_id,
                    latency_ms: receipt.latency_ms,
                })
            }
            Err(e) => {
                let error = e.to_string();
                self.db
                    .append_delivery_log(&NewDeliveryLog {
                        message_id: stored.id.clone(),
                        status: DeliveryStatus::Error,
                        error: Some(error.clone()),
                        latency_ms: None,
                    })
                    .await?;
                warn!(message_id = %job.message_id, error = %error, "Auto-reply failed");
                Ok(JobOutcome::DeliveryFailed {
                    message_id: stored.id,
                    error,
                })
            }
        }
    }

    async fn skip(
        &self,
        stored: &StoredMessage,
        reason: impl Into<String>,
    ) -> Result<JobOutcome, PipelineError> {
        let reason = reason.into();
        self.db
            .append_delivery_log(&NewDeliveryLog::skipped(&stored.id, reason.clone()))
            .await?;
        info!(
            message_id = %stored.platform_message_id,
            reason = %reason,
            "Auto-reply skipped"
        );
        Ok(JobOutcome::Skipped {
            message_id: stored.id.clone(),
            reason,
        })
    }
}

#[async_trait]
impl JobWorker<Job> for MessageProcessor {
    async fn handle(&self, job: Job) -> Result<(), Error> {
        let outcome = self.process(&job).await?;
        debug!(message_id = %job.message_id, outcome = outcome.label(), "Job finished");
        Ok(())
    }
}

/// Persist an outbound message sent in reply to `inbound`.
pub(crate) async fn record_outbound(
    db: &dyn Database,
    inbound: &StoredMessage,
    business_account_id: &str,
    platform_message_id: &str,
    text: &str,
) -> Result<(), PipelineError> {
    let outbound = NewMessage {
        platform_message_id: platform_message_id.to_string(),
        thread_id: inbound.thread_id.clone(),
        sender_id: business_account_id.to_string(),
        direction: Direction::Out,
        text: text.to_string(),
        received_at: Utc::now(),
    };
    if let InsertOutcome::Duplicate = db.insert_message(&outbound).await? {
        warn!(platform_message_id, "Outbound message id already recorded");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::channels::SendReceipt;
    use crate::error::DeliveryError;
    use crate::pipeline::classifier::DraftModel;
    use crate::pipeline::rules::RulesEngine;
    use crate::pipeline::types::{Draft, Intent};
    use crate::store::LibSqlBackend;
    use crate::store::models::{ReplyPolicy, Segment};

    /// Records every send; fails when `fail` is set.
    pub(crate) struct RecordingSender {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl RecordingSender {
        pub fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }

        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_message(
            &self,
            recipient_id: &str,
            text: &str,
        ) -> Result<SendReceipt, DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Rejected {
                    recipient: recipient_id.to_string(),
                    status: 500,
                    body: "upstream down".into(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((recipient_id.to_string(), text.to_string()));
            Ok(SendReceipt {
                message_id: format!("out_{}", sent.len()),
                latency_ms: 12,
            })
        }
    }

    struct FailingModel;

    #[async_trait]
    impl DraftModel for FailingModel {
        async fn generate_draft(&self, _text: &str) -> Result<Draft, PipelineError> {
            Err(PipelineError::Classification("model offline".into()))
        }
    }

    struct ConfidentModel;

    #[async_trait]
    impl DraftModel for ConfidentModel {
        async fn generate_draft(&self, _text: &str) -> Result<Draft, PipelineError> {
            Ok(Draft {
                intent: Intent::GeneralQuestion,
                confidence: 0.8,
                reply: "We open at 9.".into(),
                needs_human_approval: false,
            })
        }
    }

    pub(crate) fn job(message_id: &str, sender_id: &str, text: &str) -> Job {
        Job {
            message_id: message_id.to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: Some("biz_1".into()),
            thread_id: format!("entry_{sender_id}"),
            text: text.to_string(),
            timestamp: Utc::now(),
            is_from_self_or_system: false,
            platform: "instagram".into(),
            raw_payload: Arc::new(serde_json::json!({"object": "instagram"})),
        }
    }

    struct Harness {
        db: Arc<LibSqlBackend>,
        sender: Arc<RecordingSender>,
        processor: MessageProcessor,
    }

    async fn harness(model: Option<Arc<dyn DraftModel>>, fail_send: bool) -> Harness {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sender = RecordingSender::new(fail_send);
        let classifier = Arc::new(ClassificationPipeline::new(RulesEngine::default_rules(), model));
        let processor = MessageProcessor::new(
            db.clone(),
            classifier,
            sender.clone(),
            ProcessorConfig::new("biz_1"),
        );
        Harness {
            db,
            sender,
            processor,
        }
    }

    async fn logs_for(h: &Harness, platform_id: &str) -> Vec<crate::store::models::DeliveryLog> {
        let stored = h.db.find_inbound_message(platform_id).await.unwrap().unwrap();
        h.db.list_delivery_logs(Some(&stored.id), 10).await.unwrap()
    }

    #[tokio::test]
    async fn whitespace_text_is_skipped() {
        let h = harness(None, false).await;
        let outcome = h.processor.process(&job("m1", "u1", "   \n")).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Skipped { ref reason, .. } if reason == SKIP_EMPTY_TEXT));
        assert!(h.sender.sent().is_empty());
        let logs = logs_for(&h, "m1").await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::Skipped);
        assert_eq!(logs[0].error.as_deref(), Some(SKIP_EMPTY_TEXT));
    }

    #[tokio::test]
    async fn self_messages_are_skipped() {
        let h = harness(None, false).await;
        let mut echo = job("m1", "u1", "What's the price?");
        echo.is_from_self_or_system = true;
        let outcome = h.processor.process(&echo).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Skipped { ref reason, .. } if reason == SKIP_SELF_OR_SYSTEM));
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn stranger_rule_match_is_sent() {
        let h = harness(None, false).await;
        let outcome = h
            .processor
            .process(&job("m1", "u1", "How much is the blue one?"))
            .await
            .unwrap();

        assert!(matches!(outcome, JobOutcome::Sent { ref outbound_message_id, latency_ms: 12, .. } if outbound_message_id == "out_1"));
        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "u1");

        let inbound = h.db.find_inbound_message("m1").await.unwrap().unwrap();
        assert_eq!(inbound.intent, Some(Intent::Pricing));
        assert!((inbound.confidence.unwrap() - 0.91).abs() < 0.001);
        assert_eq!(inbound.suggested_reply.as_deref(), Some(sent[0].1.as_str()));

        let logs = logs_for(&h, "m1").await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::Sent);
        assert_eq!(logs[0].latency_ms, Some(12));

        let messages = h.db.list_recent_messages(10).await.unwrap();
        let outbound: Vec<_> = messages
            .iter()
            .filter(|m| m.direction == Direction::Out)
            .collect();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].sender_id, "biz_1");
        assert_eq!(outbound[0].platform_message_id, "out_1");
        assert_eq!(outbound[0].thread_id, inbound.thread_id);
    }

    #[tokio::test]
    async fn friend_segment_is_not_auto_sent() {
        let h = harness(None, false).await;
        h.db.set_contact_segment("u1", Segment::Friend).await.unwrap();
        let outcome = h
            .processor
            .process(&job("m1", "u1", "How much is it?"))
            .await
            .unwrap();

        assert!(matches!(outcome, JobOutcome::Skipped { ref reason, .. } if reason == "auto-send disabled for segment FRIEND"));
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn classifier_error_falls_back_and_skips() {
        let h = harness(Some(Arc::new(FailingModel)), false).await;
        let outcome = h
            .processor
            .process(&job("m1", "u1", "Do you like cats?"))
            .await
            .unwrap();

        assert!(matches!(outcome, JobOutcome::Skipped { ref reason, .. } if reason == SKIP_LOW_CONFIDENCE));
        assert!(h.sender.sent().is_empty());
        let inbound = h.db.find_inbound_message("m1").await.unwrap().unwrap();
        assert_eq!(inbound.intent, Some(Intent::Unknown));
        assert_eq!(inbound.needs_human_approval, Some(true));
    }

    #[tokio::test]
    async fn model_draft_above_threshold_is_sent() {
        let h = harness(Some(Arc::new(ConfidentModel)), false).await;
        let outcome = h
            .processor
            .process(&job("m1", "u1", "When do you open?"))
            .await
            .unwrap();
        assert_eq!(outcome.label(), "sent");
        assert_eq!(h.sender.sent()[0].1, "We open at 9.");
    }

    #[tokio::test]
    async fn repeated_delivery_is_idempotent() {
        let h = harness(None, false).await;
        let first = h.processor.process(&job("m1", "u1", "refund please")).await.unwrap();
        let second = h.processor.process(&job("m1", "u1", "refund please")).await.unwrap();

        assert_eq!(first.label(), "sent");
        assert_eq!(second, JobOutcome::Duplicate);
        assert_eq!(h.sender.sent().len(), 1);
        assert_eq!(logs_for(&h, "m1").await.len(), 1);
        let inbound: Vec<_> = h
            .db
            .list_recent_messages(10)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.direction == Direction::In)
            .collect();
        assert_eq!(inbound.len(), 1);
    }

    #[tokio::test]
    async fn send_failure_is_logged_as_error() {
        let h = harness(None, true).await;
        let outcome = h
            .processor
            .process(&job("m1", "u1", "where is my order"))
            .await
            .unwrap();

        assert!(matches!(outcome, JobOutcome::DeliveryFailed { ref error, .. } if error.contains("upstream down")));
        let logs = logs_for(&h, "m1").await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::Error);
        assert!(logs[0].error.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn policy_template_overrides_draft() {
        let h = harness(None, false).await;
        let mut policy = ReplyPolicy::default_for(Segment::Stranger);
        policy.template = Some("Thanks! We'll DM you a price list.".into());
        h.db.update_policy(&policy).await.unwrap();

        h.processor
            .process(&job("m1", "u1", "price?"))
            .await
            .unwrap();
        assert_eq!(h.sender.sent()[0].1, "Thanks! We'll DM you a price list.");
    }

    #[tokio::test]
    async fn oversized_reply_is_stored_as_sent() {
        let h = harness(None, false).await;
        let mut policy = ReplyPolicy::default_for(Segment::Stranger);
        policy.template = Some("a".repeat(1500));
        h.db.update_policy(&policy).await.unwrap();

        h.processor.process(&job("m1", "u1", "price?")).await.unwrap();
        let sent = h.sender.sent();
        assert_eq!(sent[0].1.chars().count(), crate::channels::MAX_MESSAGE_CHARS);

        let messages = h.db.list_recent_messages(10).await.unwrap();
        let outbound = messages
            .iter()
            .find(|m| m.direction == Direction::Out)
            .unwrap();
        assert_eq!(outbound.text, sent[0].1);
    }

    #[tokio::test]
    async fn policy_gate_is_auto_send_only() {
        let h = harness(None, false).await;
        let mut policy = ReplyPolicy::default_for(Segment::Vip);
        policy.auto_send = true;
        h.db.update_policy(&policy).await.unwrap();
        h.db.set_contact_segment("u1", Segment::Vip).await.unwrap();

        assert!(policy.require_human_approval);

        let outcome = h.processor.process(&job("m1", "u1", "price?")).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Sent { .. }));
        assert_eq!(h.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn unseen_sender_becomes_stranger_contact() {
        let h = harness(None, false).await;
        h.processor.process(&job("m1", "new_user", "shipping time?")).await.unwrap();
        let contact = h.db.get_contact("new_user").await.unwrap().unwrap();
        assert_eq!(contact.segment, Segment::Stranger);
    }

    #[tokio::test]
    async fn worker_reports_success() {
        let h = harness(None, false).await;
        h.processor.handle(job("m1", "u1", "hello")).await.unwrap();
        assert_eq!(logs_for(&h, "m1").await.len(), 1);
    }
}
