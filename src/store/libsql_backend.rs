//! libSQL store backend — async `Store` implementation.
//!
//! Supports local file and in-memory databases. Timestamps are persisted as
//! fixed-width RFC 3339 UTC strings so that string comparison in SQL matches
//! chronological order (the lease-expiry check relies on this).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::queue::model::{
    AttachmentRef, NewSubmission, Submission, SubmissionKind, SubmissionStatus,
};
use crate::store::migrations;
use crate::store::traits::{ClaimOutcome, EventRecord, ResolveOutcome, Store, UserRecord};

const SUBMISSION_COLUMNS: &str = "id, owner_id, kind, status, subject, body, attachments, \
     related_event_id, admin_reply, reply_read_at, created_at, locked_by, locked_at";

const USER_COLUMNS: &str =
    "id, telegram_id, username, first_name, last_name, patronymic, group_name, student_number";

/// libSQL database backend.
///
/// Holds a single connection reused for all operations; `libsql::Connection`
/// is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
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

        let store = Self { db: Arc::new(db), conn };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self { db: Arc::new(db), conn };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn fetch_submission(&self, id: i64) -> Result<Option<Submission>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_submission(&row)?)),
            None => Ok(None),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp write format: RFC 3339, UTC, fixed microseconds.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

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

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

/// Map a libsql row to a Submission. Column order matches SUBMISSION_COLUMNS.
fn row_to_submission(row: &libsql::Row) -> Result<Submission, DatabaseError> {
    let kind_str: String = row.get(2).map_err(query_err)?;
    let status_str: String = row.get(3).map_err(query_err)?;
    let attachments_json: String = row.get(6).map_err(query_err)?;
    let reply_read_str: Option<String> = row.get::<String>(9).ok();
    let created_str: String = row.get(10).map_err(query_err)?;
    let locked_at_str: Option<String> = row.get::<String>(12).ok();

    let kind = SubmissionKind::from_code(&kind_str)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown kind {kind_str:?}")))?;
    let status = SubmissionStatus::from_code(&status_str)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown status {status_str:?}")))?;
    let attachments: Vec<AttachmentRef> = serde_json::from_str(&attachments_json)
        .map_err(|e| DatabaseError::Serialization(format!("bad attachments column: {e}")))?;

    Ok(Submission {
        id: row.get(0).map_err(query_err)?,
        owner_id: row.get(1).map_err(query_err)?,
        kind,
        status,
        subject: row.get(4).map_err(query_err)?,
        body: row.get(5).map_err(query_err)?,
        attachments,
        related_event_id: row.get::<i64>(7).ok(),
        admin_reply: row.get::<String>(8).ok(),
        reply_read_at: reply_read_str.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created_str),
        locked_by: row.get::<i64>(11).ok(),
        locked_at: locked_at_str.as_deref().map(parse_datetime),
    })
}

/// Map a libsql row to a UserRecord. Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<UserRecord, DatabaseError> {
    Ok(UserRecord {
        id: row.get(0).map_err(query_err)?,
        telegram_id: row.get(1).map_err(query_err)?,
        username: row.get::<String>(2).ok(),
        first_name: row.get::<String>(3).ok(),
        last_name: row.get::<String>(4).ok(),
        patronymic: row.get::<String>(5).ok(),
        group_name: row.get::<String>(6).ok(),
        student_number: row.get::<String>(7).ok(),
    })
}

fn row_to_event(row: &libsql::Row) -> Result<EventRecord, DatabaseError> {
    let created_str: String = row.get(3).map_err(query_err)?;
    Ok(EventRecord {
        id: row.get(0).map_err(query_err)?,
        title: row.get(1).map_err(query_err)?,
        description: row.get::<String>(2).ok(),
        created_at: parse_datetime(&created_str),
    })
}

#[async_trait]
impl Store for LibSqlStore {
    async fn ensure_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> Result<UserRecord, DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO users (telegram_id, username) VALUES (?1, ?2)
                 ON CONFLICT(telegram_id)
                 DO UPDATE SET username = COALESCE(excluded.username, users.username)",
                params![telegram_id, username],
            )
            .await
            .map_err(query_err)?;

        self.get_user_by_telegram(telegram_id)
            .await?
            .ok_or(DatabaseError::NotFound { entity: "user", id: telegram_id })
    }

    async fn get_user(&self, id: i64) -> Result<Option<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_user_by_telegram(
        &self,
        telegram_id: i64,
    ) -> Result<Option<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ?1"),
                params![telegram_id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_profile(
        &self,
        telegram_id: i64,
        last_name: &str,
        first_name: &str,
        patronymic: Option<&str>,
        group_name: &str,
        student_number: &str,
    ) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE users SET last_name = ?1, first_name = ?2, patronymic = ?3,
                        group_name = ?4, student_number = ?5
                 WHERE telegram_id = ?6",
                params![last_name, first_name, patronymic, group_name, student_number, telegram_id],
            )
            .await
            .map_err(query_err)?;

        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "user", id: telegram_id });
        }
        Ok(())
    }

    async fn insert_submission(&self, new: &NewSubmission) -> Result<Submission, DatabaseError> {
        let created_at = new.created_at.unwrap_or_else(Utc::now);
        let attachments = serde_json::to_string(&new.attachments)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = fmt_ts(Utc::now());

        self.conn()
            .execute(
                "INSERT INTO submissions
                     (owner_id, kind, status, subject, body, attachments,
                      related_event_id, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    new.owner_id,
                    new.kind.code(),
                    new.subject.as_str(),
                    new.body.as_str(),
                    attachments,
                    new.related_event_id,
                    fmt_ts(created_at),
                    now,
                ],
            )
            .await
            .map_err(query_err)?;

        let id = self.conn().last_insert_rowid();
        self.fetch_submission(id)
            .await?
            .ok_or(DatabaseError::NotFound { entity: "submission", id })
    }

    async fn get_submission(&self, id: i64) -> Result<Option<Submission>, DatabaseError> {
        self.fetch_submission(id).await
    }

    async fn next_pending(
        &self,
        kind: SubmissionKind,
    ) -> Result<Option<Submission>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions
                     WHERE kind = ?1 AND status = 'pending'
                     ORDER BY created_at ASC, id ASC
                     LIMIT 1"
                ),
                params![kind.code()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_submission(&row)?)),
            None => Ok(None),
        }
    }

    async fn claim_submission(
        &self,
        id: i64,
        reviewer_id: i64,
        now: DateTime<Utc>,
        lease: chrono::Duration,
    ) -> Result<ClaimOutcome, DatabaseError> {
        let lease_cutoff = fmt_ts(now - lease);

        let changed = self
            .conn()
            .execute(
                "UPDATE submissions SET locked_by = ?1, locked_at = ?2
                 WHERE id = ?3 AND status = 'pending'
                   AND (locked_by IS NULL OR locked_by = ?1 OR locked_at < ?4)",
                params![reviewer_id, fmt_ts(now), id, lease_cutoff],
            )
            .await
            .map_err(query_err)?;

        if changed > 0 {
            let claimed = self
                .fetch_submission(id)
                .await?
                .ok_or(DatabaseError::NotFound { entity: "submission", id })?;
            return Ok(ClaimOutcome::Claimed(claimed));
        }

        // The guarded update matched nothing; find out why.
        match self.fetch_submission(id).await? {
            None => Ok(ClaimOutcome::NotFound),
            Some(sub) if sub.status.is_terminal() => Ok(ClaimOutcome::AlreadyResolved),
            Some(sub) => Ok(ClaimOutcome::AlreadyLocked { by: sub.locked_by.unwrap_or(0) }),
        }
    }

    async fn resolve_submission(
        &self,
        id: i64,
        reviewer_id: i64,
        status: SubmissionStatus,
        reply: Option<&str>,
        now: DateTime<Utc>,
        lease: chrono::Duration,
    ) -> Result<ResolveOutcome, DatabaseError> {
        let lease_cutoff = fmt_ts(now - lease);

        let changed = self
            .conn()
            .execute(
                "UPDATE submissions
                 SET status = ?1, admin_reply = ?2, updated_at = ?3,
                     locked_by = NULL, locked_at = NULL
                 WHERE id = ?4 AND status = 'pending'
                   AND (locked_by IS NULL OR locked_by = ?5 OR locked_at < ?6)",
                params![status.code(), reply, fmt_ts(now), id, reviewer_id, lease_cutoff],
            )
            .await
            .map_err(query_err)?;

        if changed > 0 {
            let resolved = self
                .fetch_submission(id)
                .await?
                .ok_or(DatabaseError::NotFound { entity: "submission", id })?;
            return Ok(ResolveOutcome::Resolved(resolved));
        }

        match self.fetch_submission(id).await? {
            None => Ok(ResolveOutcome::NotFound),
            Some(_) => Ok(ResolveOutcome::Stale),
        }
    }

    async fn mark_reply_read(&self, id: i64, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE submissions SET reply_read_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND admin_reply IS NOT NULL AND reply_read_at IS NULL",
                params![fmt_ts(now), id],
            )
            .await
            .map_err(query_err)?;
        Ok(changed > 0)
    }

    async fn find_event_registration(
        &self,
        owner_id: i64,
        event_id: i64,
    ) -> Result<Option<Submission>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions
                     WHERE owner_id = ?1 AND related_event_id = ?2
                       AND kind = 'event_registration'
                     LIMIT 1"
                ),
                params![owner_id, event_id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_submission(&row)?)),
            None => Ok(None),
        }
    }

    async fn cancel_event_registration(
        &self,
        owner_id: i64,
        event_id: i64,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "DELETE FROM submissions
                 WHERE owner_id = ?1 AND related_event_id = ?2
                   AND kind = 'event_registration'",
                params![owner_id, event_id],
            )
            .await
            .map_err(query_err)?;
        Ok(changed > 0)
    }

    async fn has_fee_payment(
        &self,
        owner_id: i64,
        status: SubmissionStatus,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT EXISTS(
                     SELECT 1 FROM submissions
                     WHERE owner_id = ?1 AND kind = 'fee_payment' AND status = ?2
                 )",
                params![owner_id, status.code()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
            None => Ok(false),
        }
    }

    async fn insert_event(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO events (title, description, created_at) VALUES (?1, ?2, ?3)",
                params![title, description, fmt_ts(Utc::now())],
            )
            .await
            .map_err(query_err)?;
        Ok(self.conn().last_insert_rowid())
    }

    async fn get_event(&self, id: i64) -> Result<Option<EventRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, title, description, created_at FROM events WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_event(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_events(&self) -> Result<Vec<EventRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, title, description, created_at FROM events ORDER BY created_at DESC",
                (),
            )
            .await
            .map_err(query_err)?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::model::AttachmentRef;

    async fn memory_store() -> LibSqlStore {
        LibSqlStore::new_memory().await.unwrap()
    }

    async fn seed_user(store: &LibSqlStore, telegram_id: i64) -> UserRecord {
        store.ensure_user(telegram_id, Some("student")).await.unwrap()
    }

    fn appeal(owner: i64) -> NewSubmission {
        NewSubmission::new(owner, SubmissionKind::Appeal, "Общие вопросы").body("need help")
    }

    #[tokio::test]
    async fn open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LibSqlStore::new_local(&dir.path().join("desk.db")).await.unwrap();
        let user = store.ensure_user(77, None).await.unwrap();
        assert_eq!(user.telegram_id, 77);
    }

    #[tokio::test]
    async fn ensure_user_is_idempotent() {
        let store = memory_store().await;
        let first = store.ensure_user(100, Some("alice")).await.unwrap();
        let second = store.ensure_user(100, None).await.unwrap();
        assert_eq!(first.id, second.id);
        // A missing username must not erase the stored one.
        assert_eq!(second.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn submission_round_trip_preserves_attachment_order() {
        let store = memory_store().await;
        let user = seed_user(&store, 1).await;

        let new = appeal(user.id).attachments(vec![
            AttachmentRef::photo("ph_1"),
            AttachmentRef::document("doc_2"),
            AttachmentRef::photo("ph_3"),
        ]);
        let sub = store.insert_submission(&new).await.unwrap();

        assert_eq!(sub.status, SubmissionStatus::Pending);
        let stored = store.get_submission(sub.id).await.unwrap().unwrap();
        assert_eq!(
            stored.attachments.iter().map(|a| a.file_id.as_str()).collect::<Vec<_>>(),
            vec!["ph_1", "doc_2", "ph_3"]
        );
    }

    #[tokio::test]
    async fn next_pending_is_oldest_first_with_id_tiebreak() {
        let store = memory_store().await;
        let user = seed_user(&store, 1).await;
        let stamp = Utc::now();

        let a = store.insert_submission(&appeal(user.id).created_at(stamp)).await.unwrap();
        let _b = store.insert_submission(&appeal(user.id).created_at(stamp)).await.unwrap();
        let next = store.next_pending(SubmissionKind::Appeal).await.unwrap().unwrap();
        assert_eq!(next.id, a.id);
    }

    #[tokio::test]
    async fn claim_respects_foreign_lease_until_it_expires() {
        let store = memory_store().await;
        let user = seed_user(&store, 1).await;
        let sub = store.insert_submission(&appeal(user.id)).await.unwrap();
        let lease = chrono::Duration::minutes(5);
        let now = Utc::now();

        let first = store.claim_submission(sub.id, 10, now, lease).await.unwrap();
        assert!(matches!(first, ClaimOutcome::Claimed(_)));

        // A second reviewer is refused while the lease is fresh.
        let second = store.claim_submission(sub.id, 11, now, lease).await.unwrap();
        assert!(matches!(second, ClaimOutcome::AlreadyLocked { by: 10 }));

        // The same reviewer may renew.
        let renew = store.claim_submission(sub.id, 10, now, lease).await.unwrap();
        assert!(matches!(renew, ClaimOutcome::Claimed(_)));

        // After the inactivity window the lease is up for grabs.
        let later = now + chrono::Duration::minutes(6);
        let takeover = store.claim_submission(sub.id, 11, later, lease).await.unwrap();
        assert!(matches!(takeover, ClaimOutcome::Claimed(_)));
    }

    #[tokio::test]
    async fn resolve_is_single_shot() {
        let store = memory_store().await;
        let user = seed_user(&store, 1).await;
        let sub = store.insert_submission(&appeal(user.id)).await.unwrap();
        let lease = chrono::Duration::minutes(5);

        let first = store
            .resolve_submission(sub.id, 10, SubmissionStatus::Answered, Some("see office hours"), Utc::now(), lease)
            .await
            .unwrap();
        let resolved = match first {
            ResolveOutcome::Resolved(s) => s,
            other => panic!("expected Resolved, got {other:?}"),
        };
        assert_eq!(resolved.status, SubmissionStatus::Answered);
        assert_eq!(resolved.admin_reply.as_deref(), Some("see office hours"));
        assert!(resolved.locked_by.is_none());

        let second = store
            .resolve_submission(sub.id, 10, SubmissionStatus::Answered, None, Utc::now(), lease)
            .await
            .unwrap();
        assert!(matches!(second, ResolveOutcome::Stale));
    }

    #[tokio::test]
    async fn resolve_refuses_foreign_fresh_lease() {
        let store = memory_store().await;
        let user = seed_user(&store, 1).await;
        let sub = store.insert_submission(&appeal(user.id)).await.unwrap();
        let lease = chrono::Duration::minutes(5);
        let now = Utc::now();

        store.claim_submission(sub.id, 10, now, lease).await.unwrap();
        let outcome = store
            .resolve_submission(sub.id, 11, SubmissionStatus::Answered, None, now, lease)
            .await
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::Stale));
    }

    #[tokio::test]
    async fn reply_read_receipt_is_one_shot() {
        let store = memory_store().await;
        let user = seed_user(&store, 1).await;
        let sub = store.insert_submission(&appeal(user.id)).await.unwrap();
        let lease = chrono::Duration::minutes(5);

        // No receipt before a reply exists.
        assert!(!store.mark_reply_read(sub.id, Utc::now()).await.unwrap());

        store
            .resolve_submission(sub.id, 10, SubmissionStatus::Answered, Some("done"), Utc::now(), lease)
            .await
            .unwrap();

        assert!(store.mark_reply_read(sub.id, Utc::now()).await.unwrap());
        assert!(!store.mark_reply_read(sub.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn event_registration_cancel_deletes() {
        let store = memory_store().await;
        let user = seed_user(&store, 1).await;
        let event_id = store.insert_event("Квиз", None).await.unwrap();

        let new = NewSubmission::new(user.id, SubmissionKind::EventRegistration, "Квиз")
            .related_event(event_id);
        store.insert_submission(&new).await.unwrap();

        assert!(store.find_event_registration(user.id, event_id).await.unwrap().is_some());
        assert!(store.cancel_event_registration(user.id, event_id).await.unwrap());
        assert!(store.find_event_registration(user.id, event_id).await.unwrap().is_none());
        // Second cancel is a no-op.
        assert!(!store.cancel_event_registration(user.id, event_id).await.unwrap());
    }

    #[tokio::test]
    async fn fee_payment_status_probe() {
        let store = memory_store().await;
        let user = seed_user(&store, 1).await;
        let lease = chrono::Duration::minutes(5);

        let fee = NewSubmission::new(user.id, SubmissionKind::FeePayment, "Профвзнос")
            .attachments(vec![AttachmentRef::photo("receipt")]);
        let sub = store.insert_submission(&fee).await.unwrap();

        assert!(store.has_fee_payment(user.id, SubmissionStatus::Pending).await.unwrap());
        assert!(!store.has_fee_payment(user.id, SubmissionStatus::Approved).await.unwrap());

        store
            .resolve_submission(sub.id, 10, SubmissionStatus::Approved, None, Utc::now(), lease)
            .await
            .unwrap();
        assert!(store.has_fee_payment(user.id, SubmissionStatus::Approved).await.unwrap());
    }
}
