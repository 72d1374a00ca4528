//! Unified `Database` trait: single async interface for all persistence.
//!
//! Create-if-absent operations must be atomic at the storage layer so that
//! concurrent jobs never duplicate a row. The message insert is a
//! unique-create: a constraint hit is reported as `InsertOutcome::Duplicate`.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::pipeline::types::Draft;
use crate::store::models::{
    Contact, DeliveryLog, InsertOutcome, NewDeliveryLog, NewMessage, ReplyPolicy, Segment,
    StoredMessage,
};

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Raw events & threads ────────────────────────────────────────

    /// Store the raw payload for a message id. No-op if already stored.
    async fn upsert_raw_event(
        &self,
        message_id: &str,
        platform: &str,
        payload: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Create the thread if it doesn't exist.
    async fn upsert_thread(
        &self,
        thread_id: &str,
        platform: &str,
        sender_id: &str,
    ) -> Result<(), DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Insert a message, honouring the `(platform_message_id, direction)`
    /// uniqueness constraint.
    async fn insert_message(&self, message: &NewMessage) -> Result<InsertOutcome, DatabaseError>;

    /// Look up an inbound message by its platform id.
    async fn find_inbound_message(
        &self,
        platform_message_id: &str,
    ) -> Result<Option<StoredMessage>, DatabaseError>;

    /// Get a message by system id.
    async fn get_message(&self, id: &str) -> Result<Option<StoredMessage>, DatabaseError>;

    /// Attach classification results to an inbound message.
    async fn record_classification(&self, id: &str, draft: &Draft) -> Result<(), DatabaseError>;

    /// Most recent messages first.
    async fn list_recent_messages(&self, limit: usize)
    -> Result<Vec<StoredMessage>, DatabaseError>;

    // ── Contacts & policies ─────────────────────────────────────────

    /// Get the contact, creating it as STRANGER if unseen.
    async fn get_or_create_contact(&self, sender_id: &str) -> Result<Contact, DatabaseError>;

    /// Get a contact without creating it.
    async fn get_contact(&self, sender_id: &str) -> Result<Option<Contact>, DatabaseError>;

    /// Set a contact's segment, creating the contact if needed.
    async fn set_contact_segment(
        &self,
        sender_id: &str,
        segment: Segment,
    ) -> Result<Contact, DatabaseError>;

    /// Get the policy for a segment, creating it from the defaults if absent.
    async fn get_or_create_policy(&self, segment: Segment) -> Result<ReplyPolicy, DatabaseError>;

    /// Overwrite a segment's policy.
    async fn update_policy(&self, policy: &ReplyPolicy) -> Result<(), DatabaseError>;

    // ── Delivery log ────────────────────────────────────────────────

    /// Append a delivery log entry.
    async fn append_delivery_log(&self, entry: &NewDeliveryLog)
    -> Result<DeliveryLog, DatabaseError>;

    /// Delivery logs, newest first, optionally for one inbound message.
    async fn list_delivery_logs(
        &self,
        message_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DeliveryLog>, DatabaseError>;
}
