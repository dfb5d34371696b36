//! Request processing: search, classify, decide, record.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::model::{
    Decision, DisclosurePackage, DisclosureRequest, PackageItem, RequestId, WithholdReason,
};
use super::repository::RequestRepository;
use super::state::{RequestEvent, RequestState};
use crate::archive::ArchiveStore;
use crate::audit::{AuditFilter, AuditLog, NewAuditEntry};
use crate::classification::{classify, is_disclosable};
use crate::dependency::{self, Dependency};
use crate::message::MessageId;
use crate::search::{SearchEngine, SearchFilters};
use crate::{Error, Result, text};

/// Rejection reason recorded for queries with no searchable text.
pub const REASON_INVALID: &str = "invalid_request";
/// Rejection reason recorded for withdrawn requests.
pub const REASON_CANCELLED: &str = "cancelled";

/// Drives disclosure requests through their lifecycle.
///
/// A request is processed sequentially; separate requests may be processed
/// concurrently on clones sharing the same backends.
///
/// Each terminal transition is stored together with the audit entry that
/// records it, and the entry is then appended to the audit log. If the
/// append fails the entry stays staged with the request: the next call
/// touching that request appends it, and a completed package is not handed
/// out until it has been recorded. Every terminal request ends up with
/// exactly one audit entry.
#[derive(Clone)]
pub struct RequestProcessor {
    engine: SearchEngine,
    archive: Arc<dyn ArchiveStore>,
    requests: Arc<RequestRepository>,
    audit: Arc<dyn AuditLog>,
    recording: Arc<Mutex<()>>,
    timeout: Duration,
    actor: String,
}

impl RequestProcessor {
    /// Creates a processor. Archive calls are bounded by `timeout`.
    #[must_use]
    pub fn new(
        engine: SearchEngine,
        archive: Arc<dyn ArchiveStore>,
        requests: Arc<RequestRepository>,
        audit: Arc<dyn AuditLog>,
        timeout: Duration,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            archive,
            requests,
            audit,
            recording: Arc::new(Mutex::new(())),
            timeout,
            actor: actor.into(),
        }
    }

    /// Processes a pending request to completion.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the request does not exist.
    /// - `InvalidTransition` if it is not pending.
    /// - `InvalidRequest` if its query is empty after normalization; the
    ///   request is rejected.
    /// - `DependencyUnavailable` if the index or archive failed; the request
    ///   is rejected.
    /// - Any audit log error; the outcome stays staged and is recorded by a
    ///   later call.
    ///
    /// Submitting a completed request whose audit entry is still staged
    /// records the entry and returns the stored package.
    pub async fn submit(&self, id: &RequestId) -> Result<DisclosurePackage> {
        let request = self.requests.require(id).await?;
        if self.record_pending(id).await? && request.state == RequestState::Completed {
            return self.requests.package(id).await;
        }
        request.state.transition(RequestEvent::Submit)?;

        if text::normalize_phrase(&request.query).is_empty() {
            self.reject(id, RequestState::Pending, RequestEvent::Invalidate, REASON_INVALID)
                .await?;
            return Err(Error::InvalidRequest(format!(
                "request {id} has no searchable query text"
            )));
        }

        self.requests
            .transition(id, RequestState::Pending, RequestEvent::Submit, None, None)
            .await?;
        tracing::info!(request = %id, "request processing");

        match self.assemble(&request).await {
            Ok(package) => {
                let entry = NewAuditEntry::completed(&self.actor, &package);
                self.requests.complete(&package, &entry).await?;
                self.record_pending(id).await?;
                tracing::info!(
                    request = %id,
                    disclosed = package.disclosed_count(),
                    withheld = package.withheld_count(),
                    "request completed"
                );
                Ok(package)
            }
            Err(err) => {
                // Search and archive failures surface only as DependencyUnavailable.
                self.reject(id, RequestState::Processing, RequestEvent::Fail, &err.to_string())
                    .await?;
                Err(err)
            }
        }
    }

    /// Withdraws a pending request.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids and `InvalidTransition` unless the
    /// request is pending.
    pub async fn cancel(&self, id: &RequestId) -> Result<RequestState> {
        let request = self.requests.require(id).await?;
        self.record_pending(id).await?;
        self.reject(id, request.state, RequestEvent::Cancel, REASON_CANCELLED)
            .await
    }

    /// Appends the audit entry staged for `id`, if one is outstanding.
    ///
    /// Returns `true` if an entry was outstanding. An entry already present
    /// in the log is not appended a second time.
    ///
    /// # Errors
    ///
    /// Returns an error if the request store or the audit log fails; the
    /// entry then stays staged.
    pub async fn record_pending(&self, id: &RequestId) -> Result<bool> {
        let _recording = self.recording.lock().await;
        let Some(entry) = self.requests.pending_audit(id).await? else {
            return Ok(false);
        };

        let recorded = self
            .audit
            .query(&AuditFilter::for_request(id))
            .await?
            .iter()
            .any(|e| e.action == entry.action);
        if recorded {
            tracing::debug!(request = %id, "staged audit entry already recorded");
        } else {
            self.audit.append(entry).await?;
        }
        self.requests.clear_pending_audit(id).await?;
        Ok(true)
    }

    /// Appends every outstanding audit entry, oldest first.
    ///
    /// Returns how many were outstanding.
    ///
    /// # Errors
    ///
    /// Stops at the first entry that cannot be recorded.
    pub async fn record_all_pending(&self) -> Result<usize> {
        let ids = self.requests.with_pending_audit().await?;
        for id in &ids {
            self.record_pending(id).await?;
        }
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "outstanding audit entries recorded");
        }
        Ok(ids.len())
    }

    async fn reject(
        &self,
        id: &RequestId,
        from: RequestState,
        event: RequestEvent,
        reason: &str,
    ) -> Result<RequestState> {
        let entry = NewAuditEntry::rejected(&self.actor, id, reason);
        let state = self
            .requests
            .transition(id, from, event, Some(reason), Some(&entry))
            .await?;
        self.record_pending(id).await?;
        tracing::info!(request = %id, %event, reason, "request rejected");
        Ok(state)
    }

    /// Searches and decides every match, in ranking order.
    async fn assemble(&self, request: &DisclosureRequest) -> Result<DisclosurePackage> {
        let filters = SearchFilters::in_range(request.date_range);
        let hits = self.engine.search(&request.query, &filters).await?;

        let mut items = Vec::with_capacity(hits.len());
        for hit in hits {
            let tier = classify(&hit.record);
            let decision = if is_disclosable(tier) {
                self.retrieve(hit.message_id()).await?
            } else {
                Decision::Withheld(WithholdReason::Classification(tier))
            };
            items.push(PackageItem {
                message_id: hit.record.id,
                decision,
                score: hit.score,
            });
        }

        Ok(DisclosurePackage {
            request_id: request.id.clone(),
            items,
        })
    }

    /// Confirms the body of a disclosable message can be released.
    async fn retrieve(&self, id: &MessageId) -> Result<Decision> {
        match dependency::bounded(Dependency::ArchiveStore, self.timeout, self.archive.get_body(id))
            .await
        {
            Ok(_) => Ok(Decision::Disclosed),
            Err(err) if err.is_not_found() => {
                tracing::warn!(message = id.short(), "body missing from archive, withholding");
                Ok(Decision::Withheld(WithholdReason::Unavailable))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchiveStore;
    use crate::audit::{AuditAction, AuditEntry, MemoryAuditLog};
    use crate::dependency::DEFAULT_TIMEOUT;
    use crate::index::SqliteIndex;
    use crate::message::{MessageRecord, NewMessage, Sender, Tier};
    use crate::request::NewRequest;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory log whose storage can be switched off.
    struct SwitchableAudit {
        log: Arc<MemoryAuditLog>,
        down: AtomicBool,
    }

    impl SwitchableAudit {
        fn check(&self) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::other("audit disk full")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AuditLog for SwitchableAudit {
        async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
            self.check()?;
            self.log.append(entry).await
        }

        async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
            self.check()?;
            self.log.query(filter).await
        }

        async fn entry_count(&self) -> Result<u64> {
            self.log.entry_count().await
        }
    }

    struct Fixture {
        processor: RequestProcessor,
        archive: Arc<MemoryArchiveStore>,
        requests: Arc<RequestRepository>,
        audit: Arc<MemoryAuditLog>,
        switch: Arc<SwitchableAudit>,
        index: Arc<SqliteIndex>,
    }

    impl Fixture {
        async fn new() -> Self {
            let index = Arc::new(SqliteIndex::in_memory().await.unwrap());
            let archive = Arc::new(MemoryArchiveStore::new());
            let requests = Arc::new(RequestRepository::in_memory().await.unwrap());
            let audit = Arc::new(MemoryAuditLog::new());
            let switch = Arc::new(SwitchableAudit {
                log: audit.clone(),
                down: AtomicBool::new(false),
            });
            let processor = RequestProcessor::new(
                SearchEngine::new(index.clone(), DEFAULT_TIMEOUT),
                archive.clone(),
                requests.clone(),
                switch.clone(),
                DEFAULT_TIMEOUT,
                "test",
            );
            Self {
                processor,
                archive,
                requests,
                audit,
                switch,
                index,
            }
        }

        fn audit_down(&self, down: bool) {
            self.switch.down.store(down, Ordering::SeqCst);
        }

        async fn message(&self, subject: &str, body: &str, tier: Tier) -> MessageRecord {
            let raw = format!("Subject: {subject}\n\n{body}");
            let id = self.archive.put(raw.clone().into_bytes()).await;
            let record = MessageRecord::from_new(&NewMessage {
                raw: raw.as_bytes(),
                body_text: body,
                sender: Sender::new("p.jansen@haarlem.nl", None),
                recipients: vec!["it-team@haarlem.nl".into()],
                subject,
                sent_at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap(),
                tier,
                confidential: false,
                case_id: None,
                attachment_count: 0,
            });
            assert_eq!(record.id, id);
            self.index.insert(&record).await.unwrap();
            record
        }

        async fn file(&self, query: &str) -> RequestId {
            let request = DisclosureRequest::register(NewRequest::new(query), Utc::now());
            self.requests.insert(&request).await.unwrap();
            request.id
        }
    }

    #[tokio::test]
    async fn test_confidential_match_is_withheld() {
        let fx = Fixture::new().await;
        let public = fx.message("DMS integratie", "project planning", Tier::Public).await;
        let secret = fx
            .message("Begroting 2024", "project kosten", Tier::Confidential)
            .await;

        let id = fx.file("project").await;
        let package = fx.processor.submit(&id).await.unwrap();

        assert_eq!(package.len(), 2);
        let disclosed: Vec<_> = package.disclosed().map(|i| &i.message_id).collect();
        assert_eq!(disclosed, vec![&public.id]);
        let withheld: Vec<_> = package.withheld().collect();
        assert_eq!(withheld[0].message_id, secret.id);
        assert_eq!(
            withheld[0].decision,
            Decision::Withheld(WithholdReason::Classification(Tier::Confidential))
        );

        let entries = fx.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::RequestCompleted);
        assert_eq!(entries[0].disclosed_count, 1);
        assert_eq!(entries[0].withheld_count, 1);
    }

    #[tokio::test]
    async fn test_blank_query_rejects() {
        let fx = Fixture::new().await;
        let id = fx.file("   ").await;

        let err = fx.processor.submit(&id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let request = fx.requests.require(&id).await.unwrap();
        assert_eq!(request.state, RequestState::Rejected);
        assert_eq!(request.rejection_reason.as_deref(), Some(REASON_INVALID));

        let entries = fx.audit.query(&AuditFilter::for_request(&id)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].disclosed_count, 0);
        assert_eq!(entries[0].withheld_count, 0);
    }

    #[tokio::test]
    async fn test_missing_body_is_withheld_unavailable() {
        let fx = Fixture::new().await;
        let gone = fx.message("MinIO opslag", "archief opslag", Tier::Public).await;
        let kept = fx.message("Opslag migratie", "archief", Tier::Internal).await;
        fx.archive.evict(&gone.id).await;

        let id = fx.file("opslag").await;
        let package = fx.processor.submit(&id).await.unwrap();

        let decision_of = |mid: &MessageId| {
            package
                .items
                .iter()
                .find(|i| &i.message_id == mid)
                .map(|i| i.decision)
                .unwrap()
        };
        assert_eq!(
            decision_of(&gone.id),
            Decision::Withheld(WithholdReason::Unavailable)
        );
        assert_eq!(decision_of(&kept.id), Decision::Disclosed);
    }

    #[tokio::test]
    async fn test_no_matches_still_completes() {
        let fx = Fixture::new().await;
        fx.message("DMS integratie", "planning", Tier::Public).await;

        let id = fx.file("parkeervergunning").await;
        let package = fx.processor.submit(&id).await.unwrap();

        assert!(package.is_empty());
        assert_eq!(
            fx.requests.require(&id).await.unwrap().state,
            RequestState::Completed
        );
    }

    #[tokio::test]
    async fn test_terminal_request_cannot_be_resubmitted() {
        let fx = Fixture::new().await;
        let id = fx.file("dms").await;
        fx.processor.submit(&id).await.unwrap();

        assert!(matches!(
            fx.processor.submit(&id).await,
            Err(Error::InvalidTransition {
                from: RequestState::Completed,
                event: RequestEvent::Submit
            })
        ));
        assert!(matches!(
            fx.processor.cancel(&id).await,
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(fx.audit.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_pending() {
        let fx = Fixture::new().await;
        let id = fx.file("dms").await;

        assert_eq!(fx.processor.cancel(&id).await.unwrap(), RequestState::Rejected);
        let request = fx.requests.require(&id).await.unwrap();
        assert_eq!(request.rejection_reason.as_deref(), Some(REASON_CANCELLED));
        assert_eq!(fx.audit.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let fx = Fixture::new().await;
        let err = fx
            .processor
            .submit(&RequestId::new("WOO-2024-missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fx.audit.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_audit_append_is_recorded_on_retry() {
        let fx = Fixture::new().await;
        fx.message("DMS integratie", "project planning", Tier::Public).await;
        let id = fx.file("project").await;

        fx.audit_down(true);
        let err = fx.processor.submit(&id).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(
            fx.requests.require(&id).await.unwrap().state,
            RequestState::Completed
        );
        assert!(fx.requests.pending_audit(&id).await.unwrap().is_some());
        assert!(fx.audit.entries().await.is_empty());

        // Still down: the retry fails and nothing is lost.
        assert!(fx.processor.submit(&id).await.is_err());

        fx.audit_down(false);
        let package = fx.processor.submit(&id).await.unwrap();
        assert_eq!(package.disclosed_count(), 1);

        let entries = fx.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::RequestCompleted);
        assert_eq!(entries[0].request_id.as_ref(), Some(&id));
        assert!(fx.requests.pending_audit(&id).await.unwrap().is_none());

        assert!(matches!(
            fx.processor.submit(&id).await,
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(fx.audit.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_record_all_pending() {
        let fx = Fixture::new().await;
        let blank = fx.file("  ").await;
        let withdrawn = fx.file("dms").await;

        fx.audit_down(true);
        assert!(fx.processor.submit(&blank).await.is_err());
        assert!(fx.processor.cancel(&withdrawn).await.is_err());
        assert_eq!(
            fx.requests.require(&withdrawn).await.unwrap().state,
            RequestState::Rejected
        );

        fx.audit_down(false);
        assert_eq!(fx.processor.record_all_pending().await.unwrap(), 2);
        assert_eq!(fx.processor.record_all_pending().await.unwrap(), 0);

        let entries = fx.audit.entries().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.action == AuditAction::RequestRejected));
    }

    #[tokio::test]
    async fn test_staged_entry_already_in_log_is_not_duplicated() {
        let fx = Fixture::new().await;
        let id = fx.file("dms").await;
        let entry = NewAuditEntry::rejected("test", &id, REASON_CANCELLED);
        fx.requests
            .transition(
                &id,
                RequestState::Pending,
                RequestEvent::Cancel,
                Some(REASON_CANCELLED),
                Some(&entry),
            )
            .await
            .unwrap();
        // Appended, but the store never learned it was delivered.
        fx.audit.append(entry).await.unwrap();

        assert!(fx.processor.record_pending(&id).await.unwrap());
        assert_eq!(fx.audit.entries().await.len(), 1);
        assert!(!fx.processor.record_pending(&id).await.unwrap());
    }
}
