//! libSQL backend: implements the message, destination and filter stores.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::message::{Destination, DestinationStatus, FilterRule, ListKind, Message, MessageType};
use crate::store::migrations;
use crate::store::traits::{DestinationStore, FilterStore, MessageStore};

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
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
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

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Apply pending schema migrations.
    pub async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn upsert_message(
        &self,
        message: &Message,
        message_type: MessageType,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO messages (uuid, body, from_address, to_address, message_type,
                    retries, sent_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(uuid) DO UPDATE SET
                    body = excluded.body,
                    from_address = excluded.from_address,
                    to_address = excluded.to_address,
                    message_type = excluded.message_type,
                    retries = excluded.retries,
                    sent_at = excluded.sent_at,
                    updated_at = excluded.updated_at",
                params![
                    message.uuid.as_str(),
                    message.body.as_str(),
                    message.from.as_str(),
                    opt_text(message.to.as_deref()),
                    message_type.as_str(),
                    i64::from(message.retries),
                    message.sent_at.to_rfc3339(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_message: {e}")))?;

        debug!(uuid = %message.uuid, message_type = %message_type, "Message stored");
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
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

const MESSAGE_COLUMNS: &str =
    "uuid, body, from_address, to_address, message_type, retries, sent_at";

const DESTINATION_COLUMNS: &str = "id, title, url, secret, keywords, keyword_filter, status";

/// Map a libsql Row to a Message. Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<Message, libsql::Error> {
    let type_str: String = row.get(4)?;
    let retries: i64 = row.get(5)?;
    let sent_str: String = row.get(6)?;

    Ok(Message {
        uuid: row.get(0)?,
        body: row.get(1)?,
        from: row.get(2)?,
        to: row.get::<String>(3).ok(),
        message_type: type_str.parse().unwrap_or(MessageType::Pending),
        retries: u32::try_from(retries).unwrap_or(0),
        sent_at: parse_datetime(&sent_str),
    })
}

/// Map a libsql Row to a Destination. Column order matches DESTINATION_COLUMNS.
fn row_to_destination(row: &libsql::Row) -> Result<Destination, libsql::Error> {
    let keyword_filter: i64 = row.get(5)?;
    let status_str: String = row.get(6)?;

    Ok(Destination {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        secret: row.get::<String>(3).ok(),
        keywords: row.get(4)?,
        keyword_filter: keyword_filter != 0,
        status: status_str.parse().unwrap_or(DestinationStatus::Disabled),
    })
}

fn row_to_filter(row: &libsql::Row) -> Result<Option<FilterRule>, libsql::Error> {
    let kind_str: String = row.get(2)?;
    let Ok(kind) = kind_str.parse::<ListKind>() else {
        return Ok(None);
    };
    Ok(Some(FilterRule {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        kind,
    }))
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl MessageStore for LibSqlBackend {
    async fn enqueue(&self, message: &Message) -> Result<(), DatabaseError> {
        self.upsert_message(message, MessageType::Pending).await
    }

    async fn save(&self, message: &Message) -> Result<(), DatabaseError> {
        self.upsert_message(message, message.message_type).await
    }

    async fn fetch_by_uuid(&self, uuid: &str) -> Result<Option<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE uuid = ?1"),
                params![uuid],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fetch_by_uuid: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("fetch_by_uuid: {e}")))?
        {
            Some(row) => row_to_message(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Serialization(format!("fetch_by_uuid: {e}"))),
            None => Ok(None),
        }
    }

    async fn fetch_all_by_type(
        &self,
        message_type: MessageType,
    ) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_type = ?1
                     ORDER BY sent_at ASC, created_at ASC"
                ),
                params![message_type.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fetch_all_by_type: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_message(&row) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!("Skipping message row: {e}");
                }
            }
        }
        Ok(messages)
    }

    async fn delete(&self, uuid: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE uuid = ?1", params![uuid])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_message: {e}")))?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl DestinationStore for LibSqlBackend {
    async fn list_destinations(
        &self,
        status: Option<DestinationStatus>,
    ) -> Result<Vec<Destination>, DatabaseError> {
        let mut rows = match status {
            Some(status) => {
                self.conn()
                    .query(
                        &format!(
                            "SELECT {DESTINATION_COLUMNS} FROM destinations WHERE status = ?1 ORDER BY id ASC"
                        ),
                        params![status.as_str()],
                    )
                    .await
            }
            None => {
                self.conn()
                    .query(
                        &format!("SELECT {DESTINATION_COLUMNS} FROM destinations ORDER BY id ASC"),
                        (),
                    )
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("list_destinations: {e}")))?;

        let mut destinations = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_destination(&row) {
                Ok(d) => destinations.push(d),
                Err(e) => {
                    warn!("Skipping destination row: {e}");
                }
            }
        }
        Ok(destinations)
    }

    async fn add_destination(&self, destination: &Destination) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO destinations (title, url, secret, keywords, keyword_filter, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                destination.title.as_str(),
                destination.url.as_str(),
                opt_text(destination.secret.as_deref()),
                destination.keywords.as_str(),
                i64::from(destination.keyword_filter),
                destination.status.as_str(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("add_destination: {e}")))?;

        let id = conn.last_insert_rowid();
        info!(id, url = %destination.url, "Destination added");
        Ok(id)
    }
}

#[async_trait]
impl FilterStore for LibSqlBackend {
    async fn list_filters(&self, kind: Option<ListKind>) -> Result<Vec<FilterRule>, DatabaseError> {
        let mut rows = match kind {
            Some(kind) => {
                self.conn()
                    .query(
                        "SELECT id, phone_number, kind FROM filters WHERE kind = ?1 ORDER BY id ASC",
                        params![kind.as_str()],
                    )
                    .await
            }
            None => {
                self.conn()
                    .query("SELECT id, phone_number, kind FROM filters ORDER BY id ASC", ())
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("list_filters: {e}")))?;

        let mut rules = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_filter(&row) {
                Ok(Some(rule)) => rules.push(rule),
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping filter row: {e}");
                }
            }
        }
        Ok(rules)
    }

    async fn add_filter(&self, rule: &FilterRule) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO filters (phone_number, kind) VALUES (?1, ?2)",
            params![rule.phone_number.as_str(), rule.kind.as_str()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("add_filter: {e}")))?;

        let mut rows = conn
            .query(
                "SELECT id FROM filters WHERE phone_number = ?1 AND kind = ?2",
                params![rule.phone_number.as_str(), rule.kind.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_filter: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("add_filter: {e}")))?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "filter".into(),
                id: rule.phone_number.clone(),
            })?;
        row.get::<i64>(0)
            .map_err(|e| DatabaseError::Serialization(format!("add_filter: {e}")))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn enqueue_and_fetch_by_uuid() {
        let db = test_db().await;
        let msg = Message::inbound("+15550001", "hello");
        db.enqueue(&msg).await.unwrap();

        let loaded = db.fetch_by_uuid(&msg.uuid).await.unwrap().unwrap();
        assert_eq!(loaded.uuid, msg.uuid);
        assert_eq!(loaded.body, "hello");
        assert_eq!(loaded.from, "+15550001");
        assert_eq!(loaded.message_type, MessageType::Pending);
        assert!(loaded.to.is_none());
    }

    #[tokio::test]
    async fn fetch_by_uuid_not_found() {
        let db = test_db().await;
        assert!(db.fetch_by_uuid("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_forces_pending_and_keeps_retries() {
        let db = test_db().await;
        let mut msg = Message::outgoing("u1", "+1", "x");
        msg.retries = 3;
        db.enqueue(&msg).await.unwrap();

        let loaded = db.fetch_by_uuid("u1").await.unwrap().unwrap();
        assert_eq!(loaded.message_type, MessageType::Pending);
        assert_eq!(loaded.retries, 3);
        assert_eq!(loaded.to.as_deref(), Some("+1"));
    }

    #[tokio::test]
    async fn save_replaces_by_uuid() {
        let db = test_db().await;
        let mut msg = Message::inbound("+1", "x");
        db.enqueue(&msg).await.unwrap();

        msg.message_type = MessageType::Sent;
        db.save(&msg).await.unwrap();

        assert!(db.fetch_all_by_type(MessageType::Pending).await.unwrap().is_empty());
        let sent = db.fetch_all_by_type(MessageType::Sent).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].uuid, msg.uuid);
    }

    #[tokio::test]
    async fn fetch_all_by_type_oldest_first() {
        let db = test_db().await;
        let mut older = Message::inbound("+1", "first");
        older.sent_at = Utc::now() - chrono::Duration::seconds(60);
        let newer = Message::inbound("+2", "second");
        db.enqueue(&newer).await.unwrap();
        db.enqueue(&older).await.unwrap();

        let pending = db.fetch_all_by_type(MessageType::Pending).await.unwrap();
        let bodies: Vec<_> = pending.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let db = test_db().await;
        let msg = Message::inbound("+1", "x");
        db.enqueue(&msg).await.unwrap();
        assert!(db.delete(&msg.uuid).await.unwrap());
        assert!(!db.delete(&msg.uuid).await.unwrap());
    }

    #[tokio::test]
    async fn destinations_listed_in_insertion_order() {
        let db = test_db().await;
        db.add_destination(&Destination::new("a", "https://a.example"))
            .await
            .unwrap();
        db.add_destination(
            &Destination::new("b", "https://b.example").with_status(DestinationStatus::Disabled),
        )
        .await
        .unwrap();
        db.add_destination(
            &Destination::new("c", "https://c.example")
                .with_secret("s3")
                .with_keywords("alert"),
        )
        .await
        .unwrap();

        let all = db.list_destinations(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let enabled = db
            .list_destinations(Some(DestinationStatus::Enabled))
            .await
            .unwrap();
        let titles: Vec<_> = enabled.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c"]);
        assert_eq!(enabled[1].secret(), Some("s3"));
        assert!(enabled[1].keyword_filter);
        assert!(enabled[0].secret.is_none());
    }

    #[tokio::test]
    async fn filters_dedup_and_filter_by_kind() {
        let db = test_db().await;
        let id = db
            .add_filter(&FilterRule::new("+1", ListKind::Whitelist))
            .await
            .unwrap();
        let again = db
            .add_filter(&FilterRule::new("+1", ListKind::Whitelist))
            .await
            .unwrap();
        assert_eq!(id, again);
        db.add_filter(&FilterRule::new("+1", ListKind::Blacklist))
            .await
            .unwrap();

        assert_eq!(db.list_filters(None).await.unwrap().len(), 2);
        let black = db.list_filters(Some(ListKind::Blacklist)).await.unwrap();
        assert_eq!(black.len(), 1);
        assert_eq!(black[0].kind, ListKind::Blacklist);
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/relay.db");
        let msg = Message::inbound("+1", "persisted");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.enqueue(&msg).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.fetch_by_uuid(&msg.uuid).await.unwrap().is_some());
    }
}
