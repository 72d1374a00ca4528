//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Create-if-absent paths use
//! `INSERT OR IGNORE` followed by a read, so concurrent callers converge on
//! the same row.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::{Draft, Intent};
use crate::store::migrations;
use crate::store::models::{
    Contact, DeliveryLog, DeliveryStatus, Direction, InsertOutcome, NewDeliveryLog, NewMessage,
    ReplyPolicy, Segment, StoredMessage,
};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_one<T>(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
        map: fn(&libsql::Row) -> Result<T, libsql::Error>,
    ) -> Result<Option<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value =
                    map(&row).map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    async fn query_all<T>(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
        map: fn(&libsql::Row) -> Result<T, libsql::Error>,
    ) -> Result<Vec<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            out.push(map(&row).map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?);
        }
        Ok(out)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_integer(n: Option<u64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n as i64),
        None => libsql::Value::Null,
    }
}

const MESSAGE_COLUMNS: &str = "id, platform_message_id, thread_id, sender_id, direction, text, received_at, intent, confidence, suggested_reply, needs_human_approval, created_at";

const DELIVERY_LOG_COLUMNS: &str = "id, message_id, status, error, latency_ms, created_at";

/// Map a libsql Row to a StoredMessage. Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let direction: String = row.get(4)?;
    let received_str: String = row.get(6)?;
    let intent: Option<String> = row.get(7).ok();
    let confidence: Option<f64> = row.get(8).ok();
    let needs_approval: Option<i64> = row.get(10).ok();
    let created_str: String = row.get(11)?;

    Ok(StoredMessage {
        id: row.get(0)?,
        platform_message_id: row.get(1)?,
        thread_id: row.get(2)?,
        sender_id: row.get(3)?,
        direction: Direction::parse(&direction),
        text: row.get(5)?,
        received_at: parse_datetime(&received_str),
        intent: intent.as_deref().map(Intent::parse),
        confidence: confidence.map(|c| c as f32),
        suggested_reply: row.get(9).ok(),
        needs_human_approval: needs_approval.map(|n| n != 0),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_contact(row: &libsql::Row) -> Result<Contact, libsql::Error> {
    let segment: String = row.get(1)?;
    let created_str: String = row.get(2)?;
    let updated_str: String = row.get(3)?;
    Ok(Contact {
        sender_id: row.get(0)?,
        segment: segment.parse().unwrap_or_default(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_policy(row: &libsql::Row) -> Result<ReplyPolicy, libsql::Error> {
    let segment: String = row.get(0)?;
    let auto_send: i64 = row.get(1)?;
    let require_human_approval: i64 = row.get(2)?;
    Ok(ReplyPolicy {
        segment: segment.parse().unwrap_or_default(),
        auto_send: auto_send != 0,
        require_human_approval: require_human_approval != 0,
        template: row.get(3).ok(),
    })
}

/// Column order matches DELIVERY_LOG_COLUMNS. Unknown statuses read as ERROR.
fn row_to_delivery_log(row: &libsql::Row) -> Result<DeliveryLog, libsql::Error> {
    let status: String = row.get(2)?;
    let latency: Option<i64> = row.get(4).ok();
    let created_str: String = row.get(5)?;
    Ok(DeliveryLog {
        id: row.get(0)?,
        message_id: row.get(1)?,
        status: status.parse().unwrap_or(DeliveryStatus::Error),
        error: row.get(3).ok(),
        latency_ms: latency.map(|l| l.max(0) as u64),
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Raw events & threads ────────────────────────────────────────

    async fn upsert_raw_event(
        &self,
        message_id: &str,
        platform: &str,
        payload: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| DatabaseError::Serialization(format!("raw event payload: {e}")))?;
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO raw_events (message_id, platform, payload, received_at) VALUES (?1, ?2, ?3, ?4)",
                params![message_id, platform, payload, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_raw_event: {e}")))?;
        Ok(())
    }

    async fn upsert_thread(
        &self,
        thread_id: &str,
        platform: &str,
        sender_id: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO threads (id, platform, sender_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![thread_id, platform, sender_id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_thread: {e}")))?;
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn insert_message(&self, message: &NewMessage) -> Result<InsertOutcome, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let affected = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO messages (id, platform_message_id, thread_id, sender_id, direction, text, received_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.clone(),
                    message.platform_message_id.clone(),
                    message.thread_id.clone(),
                    message.sender_id.clone(),
                    message.direction.as_str(),
                    message.text.clone(),
                    message.received_at.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;

        if affected == 0 {
            debug!(
                platform_message_id = %message.platform_message_id,
                direction = message.direction.as_str(),
                "Message already stored"
            );
            return Ok(InsertOutcome::Duplicate);
        }

        Ok(InsertOutcome::Inserted(StoredMessage {
            id,
            platform_message_id: message.platform_message_id.clone(),
            thread_id: message.thread_id.clone(),
            sender_id: message.sender_id.clone(),
            direction: message.direction,
            text: message.text.clone(),
            received_at: message.received_at,
            intent: None,
            confidence: None,
            suggested_reply: None,
            needs_human_approval: None,
            created_at: now,
        }))
    }

    async fn find_inbound_message(
        &self,
        platform_message_id: &str,
    ) -> Result<Option<StoredMessage>, DatabaseError> {
        self.query_one(
            "find_inbound_message",
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE platform_message_id = ?1 AND direction = 'IN'"
            ),
            params![platform_message_id],
            row_to_message,
        )
        .await
    }

    async fn get_message(&self, id: &str) -> Result<Option<StoredMessage>, DatabaseError> {
        self.query_one(
            "get_message",
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            params![id],
            row_to_message,
        )
        .await
    }

    async fn record_classification(&self, id: &str, draft: &Draft) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE messages SET intent = ?1, confidence = ?2, suggested_reply = ?3, needs_human_approval = ?4 WHERE id = ?5",
                params![
                    draft.intent.as_str(),
                    draft.confidence as f64,
                    draft.reply.clone(),
                    draft.needs_human_approval as i64,
                    id,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_classification: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "message".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_recent_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        self.query_all(
            "list_recent_messages",
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at DESC, rowid DESC LIMIT ?1"
            ),
            params![limit as i64],
            row_to_message,
        )
        .await
    }

    // ── Contacts & policies ─────────────────────────────────────────

    async fn get_or_create_contact(&self, sender_id: &str) -> Result<Contact, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO contacts (sender_id, segment, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![sender_id, Segment::default().as_str(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_or_create_contact: {e}")))?;

        self.get_contact(sender_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "contact".into(),
                id: sender_id.to_string(),
            })
    }

    async fn get_contact(&self, sender_id: &str) -> Result<Option<Contact>, DatabaseError> {
        self.query_one(
            "get_contact",
            "SELECT sender_id, segment, created_at, updated_at FROM contacts WHERE sender_id = ?1",
            params![sender_id],
            row_to_contact,
        )
        .await
    }

    async fn set_contact_segment(
        &self,
        sender_id: &str,
        segment: Segment,
    ) -> Result<Contact, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO contacts (sender_id, segment, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(sender_id) DO UPDATE SET segment = excluded.segment, updated_at = excluded.updated_at",
                params![sender_id, segment.as_str(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_contact_segment: {e}")))?;

        self.get_contact(sender_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "contact".into(),
                id: sender_id.to_string(),
            })
    }

    async fn get_or_create_policy(&self, segment: Segment) -> Result<ReplyPolicy, DatabaseError> {
        let defaults = ReplyPolicy::default_for(segment);
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO reply_policies (segment, auto_send, require_human_approval, template, updated_at) VALUES (?1, ?2, ?3, NULL, ?4)",
                params![
                    segment.as_str(),
                    defaults.auto_send as i64,
                    defaults.require_human_approval as i64,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_or_create_policy: {e}")))?;

        self.query_one(
            "get_or_create_policy",
            "SELECT segment, auto_send, require_human_approval, template FROM reply_policies WHERE segment = ?1",
            params![segment.as_str()],
            row_to_policy,
        )
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "reply_policy".into(),
            id: segment.to_string(),
        })
    }

    async fn update_policy(&self, policy: &ReplyPolicy) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO reply_policies (segment, auto_send, require_human_approval, template, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(segment) DO UPDATE SET auto_send = excluded.auto_send, require_human_approval = excluded.require_human_approval, template = excluded.template, updated_at = excluded.updated_at",
                params![
                    policy.segment.as_str(),
                    policy.auto_send as i64,
                    policy.require_human_approval as i64,
                    opt_text(policy.template.as_deref()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_policy: {e}")))?;
        Ok(())
    }

    // ── Delivery log ────────────────────────────────────────────────

    async fn append_delivery_log(
        &self,
        entry: &NewDeliveryLog,
    ) -> Result<DeliveryLog, DatabaseError> {
        let log = DeliveryLog {
            id: Uuid::new_v4().to_string(),
            message_id: entry.message_id.clone(),
            status: entry.status,
            error: entry.error.clone(),
            latency_ms: entry.latency_ms,
            created_at: Utc::now(),
        };

        self.conn()
            .execute(
                "INSERT INTO delivery_logs (id, message_id, status, error, latency_ms, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    log.id.clone(),
                    log.message_id.clone(),
                    log.status.as_str(),
                    opt_text(log.error.as_deref()),
                    opt_integer(log.latency_ms),
                    log.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_delivery_log: {e}")))?;

        debug!(message_id = %log.message_id, status = log.status.as_str(), "Delivery logged");
        Ok(log)
    }

    async fn list_delivery_logs(
        &self,
        message_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DeliveryLog>, DatabaseError> {
        match message_id {
            Some(message_id) => {
                self.query_all(
                    "list_delivery_logs",
                    &format!(
                        "SELECT {DELIVERY_LOG_COLUMNS} FROM delivery_logs WHERE message_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                    ),
                    params![message_id, limit as i64],
                    row_to_delivery_log,
                )
                .await
            }
            None => {
                self.query_all(
                    "list_delivery_logs",
                    &format!(
                        "SELECT {DELIVERY_LOG_COLUMNS} FROM delivery_logs ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                    ),
                    params![limit as i64],
                    row_to_delivery_log,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn inbound(pmid: &str) -> NewMessage {
        NewMessage {
            platform_message_id: pmid.to_string(),
            thread_id: "t1".into(),
            sender_id: "u1".into(),
            direction: Direction::In,
            text: "hello".into(),
            received_at: Utc::now(),
        }
    }

    async fn insert(db: &LibSqlBackend, message: &NewMessage) -> StoredMessage {
        db.upsert_thread(&message.thread_id, "instagram", &message.sender_id)
            .await
            .unwrap();
        match db.insert_message(message).await.unwrap() {
            InsertOutcome::Inserted(stored) => stored,
            InsertOutcome::Duplicate => panic!("unexpected duplicate"),
        }
    }

    // ── Messages ────────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_find_inbound() {
        let db = test_db().await;
        let stored = insert(&db, &inbound("mid_1")).await;

        let found = db.find_inbound_message("mid_1").await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
        assert_eq!(found.direction, Direction::In);
        assert!(found.intent.is_none());
        assert!(db.find_inbound_message("mid_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_reported() {
        let db = test_db().await;
        insert(&db, &inbound("mid_1")).await;

        let outcome = db.insert_message(&inbound("mid_1")).await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Duplicate));
        assert_eq!(db.list_recent_messages(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_platform_id_allowed_per_direction() {
        let db = test_db().await;
        insert(&db, &inbound("mid_1")).await;

        let mut outbound = inbound("mid_1");
        outbound.direction = Direction::Out;
        let outcome = db.insert_message(&outbound).await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn concurrent_inserts_store_one_row() {
        let db = Arc::new(test_db().await);
        db.upsert_thread("t1", "instagram", "u1").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                db.insert_message(&inbound("mid_race")).await.unwrap()
            }));
        }
        let mut inserted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), InsertOutcome::Inserted(_)) {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn classification_is_recorded() {
        let db = test_db().await;
        let stored = insert(&db, &inbound("mid_1")).await;

        let draft = Draft {
            intent: Intent::Shipping,
            confidence: 0.9,
            reply: "Ships tomorrow.".into(),
            needs_human_approval: false,
        };
        db.record_classification(&stored.id, &draft).await.unwrap();

        let fetched = db.get_message(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.intent, Some(Intent::Shipping));
        assert!((fetched.confidence.unwrap() - 0.9).abs() < 0.001);
        assert_eq!(fetched.suggested_reply.as_deref(), Some("Ships tomorrow."));
        assert_eq!(fetched.needs_human_approval, Some(false));
    }

    #[tokio::test]
    async fn classification_of_missing_message_fails() {
        let db = test_db().await;
        let err = db
            .record_classification("nope", &Draft::fallback())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn raw_event_and_thread_upserts_are_idempotent() {
        let db = test_db().await;
        let payload = serde_json::json!({"object": "instagram"});
        db.upsert_raw_event("mid_1", "instagram", &payload).await.unwrap();
        db.upsert_raw_event("mid_1", "instagram", &payload).await.unwrap();
        db.upsert_thread("t1", "instagram", "u1").await.unwrap();
        db.upsert_thread("t1", "instagram", "u1").await.unwrap();

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM raw_events", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    // ── Contacts & policies ─────────────────────────────────────────

    #[tokio::test]
    async fn contact_created_as_stranger_once() {
        let db = test_db().await;
        assert!(db.get_contact("u1").await.unwrap().is_none());

        let first = db.get_or_create_contact("u1").await.unwrap();
        let second = db.get_or_create_contact("u1").await.unwrap();
        assert_eq!(first.segment, Segment::Stranger);
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn set_segment_upserts_contact() {
        let db = test_db().await;
        let contact = db.set_contact_segment("u9", Segment::Friend).await.unwrap();
        assert_eq!(contact.segment, Segment::Friend);

        let contact = db.set_contact_segment("u9", Segment::Known).await.unwrap();
        assert_eq!(contact.segment, Segment::Known);
        assert_eq!(db.get_or_create_contact("u9").await.unwrap().segment, Segment::Known);
    }

    #[tokio::test]
    async fn policy_defaults_then_update() {
        let db = test_db().await;
        let vip = db.get_or_create_policy(Segment::Vip).await.unwrap();
        assert_eq!(vip, ReplyPolicy::default_for(Segment::Vip));

        let mut updated = vip.clone();
        updated.auto_send = true;
        updated.template = Some("VIP line".into());
        db.update_policy(&updated).await.unwrap();

        assert_eq!(db.get_or_create_policy(Segment::Vip).await.unwrap(), updated);

        updated.template = None;
        db.update_policy(&updated).await.unwrap();
        assert!(db.get_or_create_policy(Segment::Vip).await.unwrap().template.is_none());
    }

    // ── Delivery log ────────────────────────────────────────────────

    #[tokio::test]
    async fn delivery_logs_newest_first_and_filtered() {
        let db = test_db().await;
        let a = insert(&db, &inbound("mid_a")).await;
        let b = insert(&db, &inbound("mid_b")).await;

        db.append_delivery_log(&NewDeliveryLog::skipped(&a.id, "empty message text"))
            .await
            .unwrap();
        db.append_delivery_log(&NewDeliveryLog {
            message_id: b.id.clone(),
            status: DeliveryStatus::Sent,
            error: None,
            latency_ms: Some(42),
        })
        .await
        .unwrap();
        db.append_delivery_log(&NewDeliveryLog {
            message_id: a.id.clone(),
            status: DeliveryStatus::SentManual,
            error: None,
            latency_ms: Some(7),
        })
        .await
        .unwrap();

        let all = db.list_delivery_logs(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].status, DeliveryStatus::SentManual);
        assert_eq!(all[2].status, DeliveryStatus::Skipped);
        assert_eq!(all[2].error.as_deref(), Some("empty message text"));

        let for_b = db.list_delivery_logs(Some(&b.id), 10).await.unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].latency_ms, Some(42));

        assert_eq!(db.list_delivery_logs(None, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.set_contact_segment("u1", Segment::Vip).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(db.get_contact("u1").await.unwrap().unwrap().segment, Segment::Vip);
    }

    #[test]
    fn parse_datetime_formats() {
        let dt = parse_datetime("2026-03-01T12:00:00+00:00");
        assert_eq!(dt.to_rfc3339(), "2026-03-01T12:00:00+00:00");
        let dt = parse_datetime("2026-03-01 12:00:00");
        assert_eq!(dt.to_rfc3339(), "2026-03-01T12:00:00+00:00");
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }
}
