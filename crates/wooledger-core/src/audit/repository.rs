//! `SQLite` audit log.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tokio::sync::Mutex;

use super::chain::ChainHead;
use super::model::{AuditAction, AuditEntry, AuditFilter, AuditOutcome, NewAuditEntry};
use super::AuditLog;
use crate::message::MessageId;
use crate::request::RequestId;
use crate::{Error, Result};

const COLUMNS: &str = "sequence, recorded_at, actor, action, request_id, message_ids, outcome, \
                       disclosed_count, withheld_count, details, previous_hash, entry_hash";

/// Append-only audit log persisted in `SQLite`.
///
/// Each append reads the chain head and inserts the sealed entry in one
/// transaction, so every entry is written whole and the sequence never has
/// gaps. Writers in this process queue on a lock; a writer in another
/// process that races for the same sequence fails instead of forking the
/// chain.
pub struct SqliteAuditLog {
    pool: SqlitePool,
    writer: Mutex<()>,
}

impl SqliteAuditLog {
    /// Open the log at the given database path.
    ///
    /// Creates the database and table if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        Self::with_pool(pool).await
    }

    /// Create an in-memory log for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS audit_log (
                sequence INTEGER PRIMARY KEY,
                recorded_at TEXT NOT NULL,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                request_id TEXT,
                message_ids TEXT NOT NULL DEFAULT '[]',
                outcome TEXT NOT NULL,
                disclosed_count INTEGER NOT NULL DEFAULT 0,
                withheld_count INTEGER NOT NULL DEFAULT 0,
                details TEXT NOT NULL DEFAULT '{}',
                previous_hash TEXT,
                entry_hash TEXT NOT NULL
            )
            ",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_request ON audit_log(request_id)")
            .execute(&pool)
            .await?;

        let head = read_head(&mut *pool.acquire().await?).await?;
        tracing::debug!(last_sequence = head.last_sequence, "audit log opened");

        Ok(Self {
            pool,
            writer: Mutex::new(()),
        })
    }
}

async fn read_head(conn: &mut SqliteConnection) -> Result<ChainHead> {
    let last = sqlx::query(
        "SELECT sequence, entry_hash FROM audit_log ORDER BY sequence DESC LIMIT 1",
    )
    .fetch_optional(conn)
    .await?;

    Ok(last.map_or_else(ChainHead::default, |row| ChainHead {
        last_sequence: u64::try_from(row.get::<i64, _>("sequence")).unwrap_or(0),
        last_hash: Some(row.get("entry_hash")),
    }))
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
        let writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let head = read_head(&mut tx).await?;
        let sealed = AuditEntry::seal(
            entry,
            head.next_sequence(),
            Utc::now().trunc_subsecs(6),
            head.last_hash.clone(),
        );

        sqlx::query(&format!(
            "INSERT INTO audit_log ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(i64::try_from(sealed.sequence).unwrap_or(i64::MAX))
        .bind(format_timestamp(sealed.recorded_at))
        .bind(&sealed.actor)
        .bind(sealed.action.as_str())
        .bind(sealed.request_id.as_ref().map(RequestId::as_str))
        .bind(serde_json::to_string(&sealed.message_ids)?)
        .bind(sealed.outcome.as_str())
        .bind(i64::from(sealed.disclosed_count))
        .bind(i64::from(sealed.withheld_count))
        .bind(sealed.details.to_string())
        .bind(&sealed.previous_hash)
        .bind(&sealed.entry_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        drop(writer);

        tracing::debug!(
            sequence = sealed.sequence,
            action = %sealed.action,
            "audit entry appended"
        );
        Ok(sealed)
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM audit_log WHERE 1 = 1"));
        if let Some(action) = filter.action {
            builder.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(request_id) = &filter.request_id {
            builder
                .push(" AND request_id = ")
                .push_bind(request_id.as_str().to_string());
        }
        if let Some(actor) = &filter.actor {
            builder.push(" AND actor = ").push_bind(actor.clone());
        }
        if let Some(from) = filter.period.from {
            builder.push(" AND recorded_at >= ").push_bind(format_timestamp(from));
        }
        if let Some(to) = filter.period.to {
            builder.push(" AND recorded_at <= ").push_bind(format_timestamp(to));
        }
        builder.push(" ORDER BY sequence ASC");
        if let Some(limit) = filter.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_entry).collect()
    }

    async fn entry_count(&self) -> Result<u64> {
        let last: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(sequence), 0) FROM audit_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(last).unwrap_or(0))
    }
}

fn decode_entry(row: &SqliteRow) -> Result<AuditEntry> {
    let action: String = row.get("action");
    let outcome: String = row.get("outcome");
    let recorded_at: String = row.get("recorded_at");
    let message_ids: String = row.get("message_ids");
    let details: String = row.get("details");

    Ok(AuditEntry {
        sequence: u64::try_from(row.get::<i64, _>("sequence")).unwrap_or(0),
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| Error::Corrupt(format!("audit timestamp {recorded_at:?}: {e}")))?
            .with_timezone(&Utc),
        actor: row.get("actor"),
        action: AuditAction::parse(&action)
            .ok_or_else(|| Error::Corrupt(format!("audit action {action:?}")))?,
        request_id: row.get::<Option<String>, _>("request_id").map(RequestId::new),
        message_ids: serde_json::from_str::<Vec<MessageId>>(&message_ids)?,
        outcome: AuditOutcome::parse(&outcome)
            .ok_or_else(|| Error::Corrupt(format!("audit outcome {outcome:?}")))?,
        disclosed_count: u32::try_from(row.get::<i64, _>("disclosed_count")).unwrap_or(0),
        withheld_count: u32::try_from(row.get::<i64, _>("withheld_count")).unwrap_or(0),
        details: serde_json::from_str(&details)?,
        previous_hash: row.get("previous_hash"),
        entry_hash: row.get("entry_hash"),
    })
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
