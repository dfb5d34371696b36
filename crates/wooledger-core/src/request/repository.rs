//! Disclosure request storage repository.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::model::{
    Decision, DisclosurePackage, DisclosureRequest, PackageItem, RequestId, RequestSummary,
    Requester, WithholdReason,
};
use super::state::{RequestEvent, RequestState};
use crate::audit::NewAuditEntry;
use crate::message::{DateRange, MessageId};
use crate::{Error, Result};

const COLUMNS: &str = "id, query, date_from, date_to, requester_name, requester_email, \
                       description, state, rejection_reason, request_date, due_date, created_at";

/// Repository for disclosure requests and their packages.
///
/// Terminal transitions stage the audit entry that records them in the same
/// write, in the `pending_audit` column. The entry stays staged until
/// [`clear_pending_audit`](Self::clear_pending_audit) confirms it reached the
/// audit log, so an interrupted append can be redelivered.
pub struct RequestRepository {
    pool: SqlitePool,
}

impl RequestRepository {
    /// Create a new repository with the given database path.
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

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS woo_requests (
                id TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                date_from TEXT,
                date_to TEXT,
                requester_name TEXT NOT NULL,
                requester_email TEXT,
                description TEXT,
                state TEXT NOT NULL DEFAULT 'pending',
                rejection_reason TEXT,
                pending_audit TEXT,
                request_date TEXT NOT NULL,
                due_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS woo_request_items (
                request_id TEXT NOT NULL REFERENCES woo_requests(id),
                position INTEGER NOT NULL,
                message_id TEXT NOT NULL,
                decision TEXT NOT NULL,
                reason TEXT,
                score REAL NOT NULL,
                PRIMARY KEY (request_id, position)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a newly registered request.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn insert(&self, request: &DisclosureRequest) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO woo_requests ({COLUMNS}, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(request.id.as_str())
        .bind(&request.query)
        .bind(request.date_range.from.map(format_timestamp))
        .bind(request.date_range.to.map(format_timestamp))
        .bind(&request.requester.name)
        .bind(&request.requester.email)
        .bind(&request.description)
        .bind(request.state.as_str())
        .bind(&request.rejection_reason)
        .bind(request.request_date.to_string())
        .bind(request.due_date.to_string())
        .bind(format_timestamp(request.created_at))
        .bind(format_timestamp(request.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &RequestId) -> Result<Option<DisclosureRequest>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM woo_requests WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_request).transpose()
    }

    /// Get a request by id, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids, or an error if the query fails.
    pub async fn require(&self, id: &RequestId) -> Result<DisclosureRequest> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("request {id}")))
    }

    /// All requests with their match counts, most recently filed first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<RequestSummary>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {COLUMNS},
                (SELECT COUNT(*) FROM woo_request_items i WHERE i.request_id = woo_requests.id)
                    AS matched
            FROM woo_requests
            ORDER BY request_date DESC, created_at DESC
            "
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RequestSummary {
                    request: decode_request(row)?,
                    matched: u64::try_from(row.get::<i64, _>("matched")).unwrap_or(0),
                })
            })
            .collect()
    }

    /// Applies `event` to a request currently in `from`.
    ///
    /// The update only succeeds if the stored state is still `from`, so two
    /// callers racing on the same request cannot both advance it. `audit` is
    /// staged with the new state when the transition is terminal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the table forbids the event or the
    /// stored state moved on, or an error if the query fails.
    pub async fn transition(
        &self,
        id: &RequestId,
        from: RequestState,
        event: RequestEvent,
        reason: Option<&str>,
        audit: Option<&NewAuditEntry>,
    ) -> Result<RequestState> {
        let to = from.transition(event)?;
        let staged = audit.map(serde_json::to_string).transpose()?;

        let updated = sqlx::query(
            r"
            UPDATE woo_requests
            SET state = ?, rejection_reason = COALESCE(?, rejection_reason),
                pending_audit = COALESCE(?, pending_audit), updated_at = ?
            WHERE id = ? AND state = ?
            ",
        )
        .bind(to.as_str())
        .bind(reason)
        .bind(staged)
        .bind(format_timestamp(Utc::now()))
        .bind(id.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let current = self.require(id).await?.state;
            return Err(Error::InvalidTransition {
                from: current,
                event,
            });
        }

        Ok(to)
    }

    /// Stores `package` and moves its request from `Processing` to
    /// `Completed`, staging `audit` alongside.
    ///
    /// All of it happens in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the request is not processing, or an
    /// error if the query fails.
    pub async fn complete(&self, package: &DisclosurePackage, audit: &NewAuditEntry) -> Result<()> {
        let to = RequestState::Processing.transition(RequestEvent::Complete)?;
        let staged = serde_json::to_string(audit)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE woo_requests SET state = ?, pending_audit = ?, updated_at = ?
            WHERE id = ? AND state = ?
            ",
        )
        .bind(to.as_str())
        .bind(staged)
        .bind(format_timestamp(Utc::now()))
        .bind(package.request_id.as_str())
        .bind(RequestState::Processing.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            let current = self.require(&package.request_id).await?.state;
            return Err(Error::InvalidTransition {
                from: current,
                event: RequestEvent::Complete,
            });
        }

        for (position, item) in package.items.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO woo_request_items
                    (request_id, position, message_id, decision, reason, score)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(package.request_id.as_str())
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(item.message_id.as_str())
            .bind(item.decision.as_str())
            .bind(item.decision.reason().map(|r| r.as_str()))
            .bind(item.score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Audit entry staged for a request and not yet confirmed delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the staged entry cannot be
    /// decoded.
    pub async fn pending_audit(&self, id: &RequestId) -> Result<Option<NewAuditEntry>> {
        let staged =
            sqlx::query_scalar::<_, Option<String>>("SELECT pending_audit FROM woo_requests WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?
                .flatten();

        Ok(staged.as_deref().map(serde_json::from_str).transpose()?)
    }

    /// Ids of requests with a staged audit entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn with_pending_audit(&self) -> Result<Vec<RequestId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM woo_requests WHERE pending_audit IS NOT NULL ORDER BY updated_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(RequestId::new).collect())
    }

    /// Marks the staged audit entry of a request as delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear_pending_audit(&self, id: &RequestId) -> Result<()> {
        sqlx::query("UPDATE woo_requests SET pending_audit = NULL WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stored package items of a request, in ranking order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn package(&self, id: &RequestId) -> Result<DisclosurePackage> {
        let rows = sqlx::query(
            r"
            SELECT message_id, decision, reason, score
            FROM woo_request_items
            WHERE request_id = ?
            ORDER BY position ASC
            ",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(|row| {
                let raw_id: String = row.get("message_id");
                let message_id = MessageId::parse(&raw_id)
                    .ok_or_else(|| Error::Corrupt(format!("message id {raw_id:?}")))?;
                let decision = match row.get::<&str, _>("decision") {
                    "disclosed" => Decision::Disclosed,
                    _ => Decision::Withheld(WithholdReason::parse(
                        row.get::<Option<&str>, _>("reason").unwrap_or("unavailable"),
                    )),
                };
                Ok(PackageItem {
                    message_id,
                    decision,
                    score: row.get("score"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DisclosurePackage {
            request_id: id.clone(),
            items,
        })
    }
}

fn decode_request(row: &SqliteRow) -> Result<DisclosureRequest> {
    let state: String = row.get("state");
    let created_at: String = row.get("created_at");

    Ok(DisclosureRequest {
        id: RequestId::new(row.get::<String, _>("id")),
        query: row.get("query"),
        date_range: DateRange {
            from: parse_optional_timestamp(row.get("date_from"))?,
            to: parse_optional_timestamp(row.get("date_to"))?,
        },
        requester: Requester {
            name: row.get("requester_name"),
            email: row.get("requester_email"),
        },
        description: row.get("description"),
        state: RequestState::parse(&state)
            .ok_or_else(|| Error::Corrupt(format!("request state {state:?}")))?,
        rejection_reason: row.get("rejection_reason"),
        request_date: parse_date(row.get("request_date"))?,
        due_date: parse_date(row.get("due_date"))?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("timestamp {value:?}: {e}")))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn parse_date(value: String) -> Result<NaiveDate> {
    value
        .parse()
        .map_err(|e| Error::Corrupt(format!("date {value:?}: {e}")))
}
