//! The disclosure service facade.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use super::export::{self, ExportSummary};
use crate::archive::{ArchiveStore, FsArchiveStore};
use crate::audit::{
    AuditEntry, AuditFilter, AuditLog, ChainVerification, NewAuditEntry, SqliteAuditLog,
    verify_chain,
};
use crate::config::Config;
use crate::dependency::{self, Dependency};
use crate::index::{ArchiveStats, MetadataIndex, SqliteIndex};
use crate::message::{DateRange, MessageId, MessageRecord};
use crate::request::{
    DisclosurePackage, DisclosureRequest, NewRequest, RequestId, RequestProcessor,
    RequestRepository, RequestState, RequestSummary,
};
use crate::search::{SearchEngine, SearchFilters, SearchResults};
use crate::{Error, Result};

/// Window of [`ArchiveStats::recent_messages`], in days.
pub const RECENT_DAYS: i64 = 7;

/// Storage and collaborators behind a [`DisclosureService`].
pub struct Backends {
    /// Metadata index queried by searches.
    pub index: Arc<dyn MetadataIndex>,
    /// Archive holding raw message content.
    pub archive: Arc<dyn ArchiveStore>,
    /// Request storage.
    pub requests: Arc<RequestRepository>,
    /// Audit log.
    pub audit: Arc<dyn AuditLog>,
}

/// Entry point for searching the archive and handling disclosure requests.
///
/// Cheap to clone; clones share the same backends.
#[derive(Clone)]
pub struct DisclosureService {
    index: Arc<dyn MetadataIndex>,
    engine: SearchEngine,
    archive: Arc<dyn ArchiveStore>,
    requests: Arc<RequestRepository>,
    audit: Arc<dyn AuditLog>,
    processor: RequestProcessor,
    timeout: Duration,
    actor: String,
}

impl DisclosureService {
    /// Assembles a service over `backends`.
    #[must_use]
    pub fn new(backends: Backends, timeout: Duration, actor: impl Into<String>) -> Self {
        let actor = actor.into();
        let engine = SearchEngine::new(Arc::clone(&backends.index), timeout);
        let processor = RequestProcessor::new(
            engine.clone(),
            Arc::clone(&backends.archive),
            Arc::clone(&backends.requests),
            Arc::clone(&backends.audit),
            timeout,
            actor.clone(),
        );
        Self {
            index: backends.index,
            engine,
            archive: backends.archive,
            requests: backends.requests,
            audit: backends.audit,
            processor,
            timeout,
            actor,
        }
    }

    /// Opens the persistent backends named by `config`.
    ///
    /// Audit entries left staged by an earlier run are recorded; if the log
    /// refuses them they stay staged and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the database or archive directory cannot be opened.
    pub async fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let database = config.database_url_path()?;

        let backends = Backends {
            index: Arc::new(SqliteIndex::new(database).await?),
            archive: Arc::new(FsArchiveStore::new(&config.archive_dir).await?),
            requests: Arc::new(RequestRepository::new(database).await?),
            audit: Arc::new(SqliteAuditLog::new(database).await?),
        };
        tracing::debug!(database, archive = %config.archive_dir.display(), "service opened");

        let service = Self::new(backends, config.dependency_timeout(), config.actor.clone());
        if let Err(err) = service.processor.record_all_pending().await {
            tracing::warn!(error = %err, "staged audit entries could not be recorded yet");
        }
        Ok(service)
    }

    /// Registers a request in the `Pending` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be stored.
    pub async fn create_request(&self, new: NewRequest) -> Result<DisclosureRequest> {
        let request = DisclosureRequest::register(new, Utc::now());
        self.requests.insert(&request).await?;
        tracing::info!(request = %request.id, due = %request.due_date, "request registered");
        Ok(request)
    }

    /// Processes a pending request.
    ///
    /// # Errors
    ///
    /// See [`RequestProcessor::submit`].
    pub async fn submit(&self, id: &RequestId) -> Result<DisclosurePackage> {
        self.processor.submit(id).await
    }

    /// Registers and processes a request in one step.
    ///
    /// # Errors
    ///
    /// Once the request is registered, failures come back as
    /// [`Error::Submission`] carrying its id, so the caller can still look
    /// it up. The wrapped cause is `InvalidRequest` for queries without
    /// searchable text and `DependencyUnavailable` if a backend failed; the
    /// request is rejected in both cases.
    pub async fn submit_request(
        &self,
        query_text: &str,
        date_range: Option<DateRange>,
    ) -> Result<RequestId> {
        let new = NewRequest::new(query_text).with_date_range(date_range.unwrap_or_default());
        let request = self.create_request(new).await?;
        match self.submit(&request.id).await {
            Ok(_) => Ok(request.id),
            Err(err) => Err(Error::Submission {
                request: request.id,
                source: Box::new(err),
            }),
        }
    }

    /// Withdraws a pending request.
    ///
    /// # Errors
    ///
    /// See [`RequestProcessor::cancel`].
    pub async fn cancel_request(&self, id: &RequestId) -> Result<RequestState> {
        self.processor.cancel(id).await
    }

    /// Current state of a request.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    pub async fn get_request_status(&self, id: &RequestId) -> Result<RequestState> {
        Ok(self.requests.require(id).await?.state)
    }

    /// A request with all its attributes.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    pub async fn get_request(&self, id: &RequestId) -> Result<DisclosureRequest> {
        self.requests.require(id).await
    }

    /// All requests with their match counts, most recently filed first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_requests(&self) -> Result<Vec<RequestSummary>> {
        self.requests.list().await
    }

    /// Package of a completed request.
    ///
    /// A package is only handed out once its completion is in the audit log;
    /// a staged entry is recorded first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids, `PackageNotReady` unless the
    /// request has completed, or the audit log error if the staged entry
    /// cannot be recorded.
    pub async fn get_disclosure_package(&self, id: &RequestId) -> Result<DisclosurePackage> {
        let state = self.get_request_status(id).await?;
        if state != RequestState::Completed {
            return Err(Error::PackageNotReady(state));
        }
        self.processor.record_pending(id).await?;
        self.requests.package(id).await
    }

    /// Looks up one archived message.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index has no such message and
    /// `DependencyUnavailable` if the index fails.
    pub async fn get_message(&self, id: &MessageId) -> Result<MessageRecord> {
        dependency::bounded(Dependency::MetadataIndex, self.timeout, self.index.get(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {id}")))
    }

    /// Archive-wide figures; "recent" covers the last seven days.
    ///
    /// # Errors
    ///
    /// Returns `DependencyUnavailable` if the index fails.
    pub async fn archive_stats(&self) -> Result<ArchiveStats> {
        let since = Utc::now() - TimeDelta::days(RECENT_DAYS);
        dependency::bounded(Dependency::MetadataIndex, self.timeout, self.index.stats(since)).await
    }

    /// Searches the archive and records the search in the audit log.
    ///
    /// # Errors
    ///
    /// Returns `DependencyUnavailable` if the index fails, or an error if the
    /// audit entry cannot be appended.
    pub async fn search(&self, query_text: &str, filters: &SearchFilters) -> Result<SearchResults> {
        let results = self.engine.search(query_text, filters).await?;
        let ids = results
            .as_slice()
            .iter()
            .map(|hit| hit.message_id().clone())
            .collect();
        self.audit
            .append(NewAuditEntry::search(&self.actor, query_text, ids))
            .await?;
        Ok(results)
    }

    /// Audit entries matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub async fn audit_query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        self.audit.query(filter).await
    }

    /// Checks the integrity of the whole audit hash chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub async fn verify_audit_chain(&self) -> Result<ChainVerification> {
        let entries = self.audit.query(&AuditFilter::default()).await?;
        let verification = verify_chain(&entries);
        if !verification.valid {
            tracing::warn!(
                first_invalid = ?verification.first_invalid_sequence,
                error = ?verification.error,
                "audit chain verification failed"
            );
        }
        Ok(verification)
    }

    /// Writes the disclosed messages of a completed request into `dir`.
    ///
    /// # Errors
    ///
    /// Returns `PackageNotReady` unless the request has completed, or an
    /// error if the archive or filesystem fails.
    pub async fn export_package(&self, id: &RequestId, dir: &Path) -> Result<ExportSummary> {
        let package = self.get_disclosure_package(id).await?;
        export::write_package(self.archive.as_ref(), self.timeout, &package, dir).await
    }
}
