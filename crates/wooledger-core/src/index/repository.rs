//! `SQLite` metadata index.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{ArchiveStats, IndexQuery, MetadataIndex};
use crate::message::{MessageId, MessageRecord, Sender, TermSet, Tier};
use crate::{Error, Result};

const COLUMNS: &str = "id, sender_email, sender_name, subject, body_ref, sent_at, tier, \
                       confidential, case_id, attachment_count, size_bytes";

/// Index of archived message metadata backed by `SQLite`.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Create a new index with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
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

        let index = Self { pool };
        index.initialize().await?;
        Ok(index)
    }

    /// Create an in-memory index for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let index = Self { pool };
        index.initialize().await?;
        Ok(index)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_email TEXT NOT NULL,
                sender_name TEXT,
                subject TEXT NOT NULL DEFAULT '',
                subject_folded TEXT NOT NULL DEFAULT '',
                body_ref TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                tier TEXT NOT NULL,
                tier_rank INTEGER NOT NULL,
                confidential INTEGER NOT NULL DEFAULT 0,
                case_id TEXT,
                attachment_count INTEGER NOT NULL DEFAULT 0,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                indexed_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS message_recipients (
                message_id TEXT NOT NULL REFERENCES messages(id),
                address TEXT NOT NULL,
                PRIMARY KEY (message_id, address)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS message_terms (
                message_id TEXT NOT NULL REFERENCES messages(id),
                field TEXT NOT NULL,
                term TEXT NOT NULL,
                PRIMARY KEY (message_id, field, term)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_message_terms_term ON message_terms(term)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_sent_at ON messages(sent_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Adds a record to the index.
    ///
    /// Records are immutable: inserting an id that is already indexed leaves
    /// the stored record untouched and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn insert(&self, record: &MessageRecord) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT OR IGNORE INTO messages
                (id, sender_email, sender_name, subject, subject_folded, body_ref, sent_at,
                 tier, tier_rank, confidential, case_id, attachment_count, size_bytes, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(record.id.as_str())
        .bind(&record.sender.email)
        .bind(&record.sender.name)
        .bind(&record.subject)
        .bind(crate::text::normalize_phrase(&record.subject))
        .bind(&record.body_ref)
        .bind(format_timestamp(record.sent_at))
        .bind(record.tier.as_str())
        .bind(record.tier.rank())
        .bind(record.confidential)
        .bind(&record.case_id)
        .bind(i64::from(record.attachment_count))
        .bind(i64::try_from(record.size_bytes).unwrap_or(i64::MAX))
        .bind(format_timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            tx.rollback().await?;
            tracing::debug!(id = %record.id, "message already indexed");
            return Ok(false);
        }

        for address in &record.recipients {
            sqlx::query("INSERT OR IGNORE INTO message_recipients (message_id, address) VALUES (?, ?)")
                .bind(record.id.as_str())
                .bind(address)
                .execute(&mut *tx)
                .await?;
        }

        let fields = [("subject", &record.terms.subject), ("body", &record.terms.body)];
        for (field, terms) in fields {
            for term in terms {
                sqlx::query(
                    "INSERT OR IGNORE INTO message_terms (message_id, field, term) VALUES (?, ?, ?)",
                )
                .bind(record.id.as_str())
                .bind(field)
                .bind(term)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        tracing::debug!(id = %record.id, tier = %record.tier, "message indexed");
        Ok(true)
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<MessageRecord> {
        let raw_id: String = row.get("id");
        let id = MessageId::parse(&raw_id)
            .ok_or_else(|| Error::Corrupt(format!("message id {raw_id:?}")))?;

        let recipients = sqlx::query_scalar::<_, String>(
            "SELECT address FROM message_recipients WHERE message_id = ? ORDER BY address",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        let term_rows = sqlx::query("SELECT field, term FROM message_terms WHERE message_id = ?")
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await?;
        let mut terms = TermSet::default();
        for term_row in &term_rows {
            let field: String = term_row.get("field");
            let term: String = term_row.get("term");
            if field == "subject" {
                terms.subject.insert(term);
            } else {
                terms.body.insert(term);
            }
        }

        let sent_at_str: String = row.get("sent_at");
        let sent_at = parse_timestamp(&sent_at_str)?;

        Ok(MessageRecord {
            id,
            sender: Sender {
                email: row.get("sender_email"),
                name: row.get("sender_name"),
            },
            recipients,
            subject: row.get("subject"),
            body_ref: row.get("body_ref"),
            sent_at,
            tier: Tier::parse(row.get::<&str, _>("tier")),
            confidential: row.get("confidential"),
            case_id: row.get("case_id"),
            attachment_count: u32::try_from(row.get::<i64, _>("attachment_count")).unwrap_or(0),
            size_bytes: u64::try_from(row.get::<i64, _>("size_bytes")).unwrap_or(0),
            terms,
        })
    }
}

#[async_trait]
impl MetadataIndex for SqliteIndex {
    async fn candidates(&self, query: &IndexQuery) -> Result<Vec<MessageRecord>> {
        let phrase = query.phrase.as_deref().filter(|p| !p.is_empty());
        if query.terms.is_empty() && phrase.is_none() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM messages WHERE ("));
        if !query.terms.is_empty() {
            builder.push("id IN (SELECT message_id FROM message_terms WHERE term IN (");
            {
                let mut separated = builder.separated(", ");
                for term in &query.terms {
                    separated.push_bind(term.clone());
                }
            }
            builder.push("))");
        }
        if let Some(phrase) = phrase {
            if !query.terms.is_empty() {
                builder.push(" OR ");
            }
            builder
                .push("instr(subject_folded, ")
                .push_bind(phrase.to_string())
                .push(") > 0 OR instr(sender_email, ")
                .push_bind(phrase.to_string())
                .push(") > 0 OR id IN (SELECT message_id FROM message_recipients WHERE instr(address, ")
                .push_bind(phrase.to_string())
                .push(") > 0)");
        }
        builder.push(")");

        if let Some(from) = query.date_range.from {
            builder.push(" AND sent_at >= ").push_bind(format_timestamp(from));
        }
        if let Some(to) = query.date_range.to {
            builder.push(" AND sent_at <= ").push_bind(format_timestamp(to));
        }
        if let Some(max_tier) = query.max_tier {
            builder.push(" AND tier_rank <= ").push_bind(max_tier.rank());
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        tracing::debug!(
            terms = query.terms.len(),
            candidates = rows.len(),
            "index candidate query"
        );

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.hydrate(row).await?);
        }
        Ok(records)
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM messages WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> Result<ArchiveStats> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) AS total,
                COUNT(CASE WHEN sent_at >= ? THEN 1 END) AS recent,
                COUNT(CASE WHEN tier = 'confidential' OR confidential = 1 THEN 1 END)
                    AS confidential,
                COUNT(CASE WHEN case_id IS NOT NULL AND case_id <> '' THEN 1 END) AS case_linked,
                COALESCE(SUM(size_bytes), 0) AS total_bytes
            FROM messages
            ",
        )
        .bind(format_timestamp(recent_since))
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| u64::try_from(row.get::<i64, _>(column)).unwrap_or(0);
        Ok(ArchiveStats {
            total_messages: count("total"),
            recent_messages: count("recent"),
            confidential_messages: count("confidential"),
            case_linked_messages: count("case_linked"),
            total_bytes: count("total_bytes"),
        })
    }
}

/// Fixed-width RFC 3339 form so stored timestamps compare lexicographically.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("timestamp {value:?}: {e}")))
}
