//! Policy engine: maps a sender's segment to automation permissions.
//!
//! Contacts and policies are created lazily on first access. Storage-level
//! create-if-absent makes concurrent lookups safe.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::Database;
use crate::store::models::{Contact, ReplyPolicy, Segment};

pub struct PolicyEngine {
    db: Arc<dyn Database>,
}

impl PolicyEngine {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Segment for a sender; unseen senders become STRANGER.
    pub async fn resolve_segment(&self, sender_id: &str) -> Result<Segment, DatabaseError> {
        let contact = self.db.get_or_create_contact(sender_id).await?;
        debug!(sender_id, segment = %contact.segment, "Resolved segment");
        Ok(contact.segment)
    }

    /// Policy for a segment, created from the default table if absent.
    pub async fn resolve_policy(&self, segment: Segment) -> Result<ReplyPolicy, DatabaseError> {
        self.db.get_or_create_policy(segment).await
    }

    /// Operator action: move a sender into a segment.
    pub async fn assign_segment(
        &self,
        sender_id: &str,
        segment: Segment,
    ) -> Result<Contact, DatabaseError> {
        let contact = self.db.set_contact_segment(sender_id, segment).await?;
        info!(sender_id, segment = %segment, "Contact segment assigned");
        Ok(contact)
    }

    /// Operator action: replace a segment's policy.
    pub async fn update_policy(&self, policy: &ReplyPolicy) -> Result<(), DatabaseError> {
        self.db.update_policy(policy).await?;
        info!(
            segment = %policy.segment,
            auto_send = policy.auto_send,
            require_human_approval = policy.require_human_approval,
            has_template = policy.template_text().is_some(),
            "Reply policy updated"
        );
        Ok(())
    }

    /// All four policies, creating any that are missing.
    pub async fn list_policies(&self) -> Result<Vec<ReplyPolicy>, DatabaseError> {
        let mut policies = Vec::with_capacity(Segment::ALL.len());
        for segment in Segment::ALL {
            policies.push(self.resolve_policy(segment).await?);
        }
        Ok(policies)
    }
}
