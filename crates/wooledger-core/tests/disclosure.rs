//! Integration tests for disclosure request processing.
//!
//! These tests drive the public service API against test doubles for the
//! metadata index and the archive store, so outages and missing blobs can be
//! simulated without a real backend.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

use wooledger_core::{
    ArchiveStats, ArchiveStore, AuditAction, AuditEntry, AuditFilter, AuditLog, AuditOutcome,
    Backends, DateRange, Decision, Dependency, DisclosureService, Error, IndexQuery,
    MemoryArchiveStore, MemoryAuditLog, MessageId, MessageRecord, MetadataIndex, NewAuditEntry,
    NewMessage, NewRequest, RequestRepository, RequestState, SearchFilters, Sender, Tier,
    WithholdReason,
};

const SHORT_TIMEOUT: Duration = Duration::from_millis(50);

/// Index double holding records in a vector.
///
/// Returns every record as a candidate; the search engine applies the
/// filters and scoring itself.
#[derive(Default)]
struct VecIndex {
    records: Vec<MessageRecord>,
}

#[async_trait]
impl MetadataIndex for VecIndex {
    async fn candidates(&self, _query: &IndexQuery) -> wooledger_core::Result<Vec<MessageRecord>> {
        Ok(self.records.clone())
    }

    async fn get(&self, id: &MessageId) -> wooledger_core::Result<Option<MessageRecord>> {
        Ok(self.records.iter().find(|r| &r.id == id).cloned())
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> wooledger_core::Result<ArchiveStats> {
        Ok(ArchiveStats {
            total_messages: self.records.len() as u64,
            recent_messages: self.records.iter().filter(|r| r.sent_at >= recent_since).count()
                as u64,
            ..ArchiveStats::default()
        })
    }
}

/// Index double that never answers.
struct HangingIndex;

#[async_trait]
impl MetadataIndex for HangingIndex {
    async fn candidates(&self, _query: &IndexQuery) -> wooledger_core::Result<Vec<MessageRecord>> {
        std::future::pending().await
    }

    async fn get(&self, _id: &MessageId) -> wooledger_core::Result<Option<MessageRecord>> {
        std::future::pending().await
    }

    async fn stats(&self, _recent_since: DateTime<Utc>) -> wooledger_core::Result<ArchiveStats> {
        std::future::pending().await
    }
}

/// Archive double whose backend is down.
struct BrokenArchive;

#[async_trait]
impl ArchiveStore for BrokenArchive {
    async fn get_body(&self, _id: &MessageId) -> wooledger_core::Result<Bytes> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "object store refused connection",
        )))
    }
}

/// Audit log whose disk can fill up.
struct FullDiskAudit {
    log: MemoryAuditLog,
    full: AtomicBool,
}

impl FullDiskAudit {
    fn check(&self) -> wooledger_core::Result<()> {
        if self.full.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("audit disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLog for FullDiskAudit {
    async fn append(&self, entry: NewAuditEntry) -> wooledger_core::Result<AuditEntry> {
        self.check()?;
        self.log.append(entry).await
    }

    async fn query(&self, filter: &AuditFilter) -> wooledger_core::Result<Vec<AuditEntry>> {
        self.check()?;
        self.log.query(filter).await
    }

    async fn entry_count(&self) -> wooledger_core::Result<u64> {
        self.log.entry_count().await
    }
}

struct Harness {
    service: DisclosureService,
    audit: Arc<MemoryAuditLog>,
    archive: Arc<MemoryArchiveStore>,
}

struct Mail {
    subject: &'static str,
    body: &'static str,
    tier: Tier,
    day: u32,
}

async fn archived(archive: &MemoryArchiveStore, mails: &[Mail]) -> Vec<MessageRecord> {
    let mut records = Vec::new();
    for mail in mails {
        let raw = format!("Subject: {}\r\n\r\n{}", mail.subject, mail.body);
        archive.put(raw.clone().into_bytes()).await;
        records.push(MessageRecord::from_new(&NewMessage {
            raw: raw.as_bytes(),
            body_text: mail.body,
            sender: Sender::new("p.jansen@haarlem.nl", Some("Pieter Jansen")),
            recipients: vec!["griffie@haarlem.nl".to_string()],
            subject: mail.subject,
            sent_at: Utc.with_ymd_and_hms(2024, 1, mail.day, 9, 0, 0).unwrap(),
            tier: mail.tier,
            confidential: false,
            case_id: None,
            attachment_count: 0,
        }));
    }
    records
}

async fn harness(mails: &[Mail]) -> (Harness, Vec<MessageRecord>) {
    let archive = Arc::new(MemoryArchiveStore::new());
    let records = archived(&archive, mails).await;
    let audit = Arc::new(MemoryAuditLog::new());
    let backends = Backends {
        index: Arc::new(VecIndex {
            records: records.clone(),
        }),
        archive: archive.clone(),
        requests: Arc::new(RequestRepository::in_memory().await.unwrap()),
        audit: audit.clone(),
    };
    let service = DisclosureService::new(backends, SHORT_TIMEOUT, "woo-coordinator");
    (
        Harness {
            service,
            audit,
            archive,
        },
        records,
    )
}

fn scenario_a() -> [Mail; 2] {
    [
        Mail {
            subject: "DMS integratie",
            body: "voortgang van het project",
            tier: Tier::Public,
            day: 15,
        },
        Mail {
            subject: "Begroting 2024",
            body: "kosten van het project",
            tier: Tier::Confidential,
            day: 16,
        },
    ]
}

#[tokio::test]
async fn test_confidential_match_is_withheld() {
    let (h, records) = harness(&scenario_a()).await;
    let (m1, m2) = (&records[0], &records[1]);

    let request = h
        .service
        .create_request(NewRequest::new("project"))
        .await
        .unwrap();
    let package = h.service.submit(&request.id).await.unwrap();

    let disclosed: Vec<_> = package.disclosed().map(|i| i.message_id.clone()).collect();
    assert_eq!(disclosed, vec![m1.id.clone()]);

    let withheld: Vec<_> = package.withheld().collect();
    assert_eq!(withheld.len(), 1);
    assert_eq!(withheld[0].message_id, m2.id);
    assert_eq!(
        withheld[0].decision,
        Decision::Withheld(WithholdReason::Classification(Tier::Confidential))
    );

    assert_eq!(
        h.service.get_request_status(&request.id).await.unwrap(),
        RequestState::Completed
    );
}

#[tokio::test]
async fn test_blank_query_is_rejected() {
    let (h, _) = harness(&scenario_a()).await;

    let request = h.service.create_request(NewRequest::new("   ")).await.unwrap();
    let err = h.service.submit(&request.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));

    assert_eq!(
        h.service.get_request_status(&request.id).await.unwrap(),
        RequestState::Rejected
    );

    let entries = h.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::RequestRejected);
    assert_eq!(entries[0].request_id.as_ref(), Some(&request.id));
    assert_eq!(entries[0].disclosed_count, 0);
    assert_eq!(entries[0].withheld_count, 0);
}

#[tokio::test]
async fn test_missing_body_is_withheld_unavailable() {
    let (h, records) = harness(&[
        Mail {
            subject: "MinIO implementatie",
            body: "status update opslag",
            tier: Tier::Internal,
            day: 18,
        },
        Mail {
            subject: "MinIO capaciteit",
            body: "opslag uitbreiding",
            tier: Tier::Public,
            day: 19,
        },
    ])
    .await;
    h.archive.evict(&records[0].id).await;

    let id = h.service.submit_request("minio", None).await.unwrap();
    let package = h.service.get_disclosure_package(&id).await.unwrap();

    for item in &package.items {
        let expected = if item.message_id == records[0].id {
            Decision::Withheld(WithholdReason::Unavailable)
        } else {
            Decision::Disclosed
        };
        assert_eq!(item.decision, expected);
    }
    assert_eq!(package.len(), 2);
}

#[tokio::test]
async fn test_concurrent_identical_requests() {
    let (h, _) = harness(&scenario_a()).await;

    let (a, b) = tokio::join!(
        h.service.submit_request("project", None),
        h.service.submit_request("project", None)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a, b);

    let package_a = h.service.get_disclosure_package(&a).await.unwrap();
    let package_b = h.service.get_disclosure_package(&b).await.unwrap();
    assert_eq!(package_a.items, package_b.items);
    assert_eq!(package_a.request_id, a);
    assert_eq!(package_b.request_id, b);

    for id in [&a, &b] {
        let entries = h
            .service
            .audit_query(&AuditFilter::for_request(id))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::RequestCompleted);
    }
}

#[tokio::test]
async fn test_unreachable_index_rejects_request() {
    let audit = Arc::new(MemoryAuditLog::new());
    let service = DisclosureService::new(
        Backends {
            index: Arc::new(HangingIndex),
            archive: Arc::new(MemoryArchiveStore::new()),
            requests: Arc::new(RequestRepository::in_memory().await.unwrap()),
            audit: audit.clone(),
        },
        SHORT_TIMEOUT,
        "woo-coordinator",
    );

    let request = service.create_request(NewRequest::new("dms")).await.unwrap();
    let err = service.submit(&request.id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::DependencyUnavailable {
            dependency: Dependency::MetadataIndex,
            ..
        }
    ));

    let stored = service.get_request(&request.id).await.unwrap();
    assert_eq!(stored.state, RequestState::Rejected);
    assert!(stored.rejection_reason.is_some());

    let entries = audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Failure);
}

#[tokio::test]
async fn test_archive_outage_rejects_request() {
    let store = MemoryArchiveStore::new();
    let records = archived(&store, &scenario_a()).await;
    let audit = Arc::new(MemoryAuditLog::new());
    let service = DisclosureService::new(
        Backends {
            index: Arc::new(VecIndex { records }),
            archive: Arc::new(BrokenArchive),
            requests: Arc::new(RequestRepository::in_memory().await.unwrap()),
            audit: audit.clone(),
        },
        SHORT_TIMEOUT,
        "woo-coordinator",
    );

    let err = service.submit_request("project", None).await.unwrap_err();
    assert!(matches!(
        err.cause(),
        Error::DependencyUnavailable {
            dependency: Dependency::ArchiveStore,
            ..
        }
    ));
    assert_eq!(audit.entry_count().await.unwrap(), 1);

    let requests = service.list_requests().await.unwrap();
    assert_eq!(Some(&requests[0].request.id), err.request_id());
    assert_eq!(requests[0].request.state, RequestState::Rejected);
    assert_eq!(requests[0].matched, 0);
}

#[tokio::test]
async fn test_blank_submission_reports_rejected_request() {
    let (h, _) = harness(&scenario_a()).await;

    let err = h.service.submit_request("   ", None).await.unwrap_err();
    assert!(matches!(err.cause(), Error::InvalidRequest(_)));
    let id = err.request_id().unwrap();

    assert_eq!(
        h.service.get_request_status(id).await.unwrap(),
        RequestState::Rejected
    );
    let entries = h.service.audit_query(&AuditFilter::for_request(id)).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::RequestRejected);
    assert_eq!(entries[0].disclosed_count, 0);
    assert_eq!(entries[0].withheld_count, 0);
}

#[tokio::test]
async fn test_package_is_withheld_until_completion_is_audited() {
    let store = MemoryArchiveStore::new();
    let records = archived(&store, &scenario_a()).await;
    let audit = Arc::new(FullDiskAudit {
        log: MemoryAuditLog::new(),
        full: AtomicBool::new(true),
    });
    let service = DisclosureService::new(
        Backends {
            index: Arc::new(VecIndex { records }),
            archive: Arc::new(store),
            requests: Arc::new(RequestRepository::in_memory().await.unwrap()),
            audit: audit.clone(),
        },
        SHORT_TIMEOUT,
        "woo-coordinator",
    );

    let request = service.create_request(NewRequest::new("project")).await.unwrap();
    let err = service.submit(&request.id).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(service.get_disclosure_package(&request.id).await.is_err());
    assert_eq!(audit.log.entries().await.len(), 0);

    audit.full.store(false, Ordering::SeqCst);
    let package = service.get_disclosure_package(&request.id).await.unwrap();
    assert_eq!(package.disclosed_count(), 1);
    assert_eq!(package.withheld_count(), 1);

    let entries = audit.log.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::RequestCompleted);
    assert_eq!(entries[0].request_id.as_ref(), Some(&request.id));

    // Reading the package again does not record the completion twice.
    service.get_disclosure_package(&request.id).await.unwrap();
    assert_eq!(audit.log.entries().await.len(), 1);
}

#[tokio::test]
async fn test_audit_log_grows_by_one_per_terminal_request() {
    let (h, _) = harness(&scenario_a()).await;

    h.service
        .search("project", &SearchFilters::default())
        .await
        .unwrap();
    let before = h.audit.entries().await;

    let pending = h.service.create_request(NewRequest::new("dms")).await.unwrap();
    h.service.submit_request("project", None).await.unwrap();
    h.service.submit_request("begroting", None).await.unwrap();
    let blank = h.service.submit_request("  ", None).await;
    assert!(matches!(
        blank.as_ref().map_err(Error::cause),
        Err(Error::InvalidRequest(_))
    ));
    h.service.cancel_request(&pending.id).await.unwrap();

    let after = h.audit.entries().await;
    assert_eq!(after.len(), before.len() + 4);
    assert_eq!(&after[..before.len()], &before[..]);
    assert!(h.service.verify_audit_chain().await.unwrap().valid);
}

#[tokio::test]
async fn test_terminal_requests_reject_transitions() {
    let (h, _) = harness(&scenario_a()).await;
    let completed = h.service.submit_request("project", None).await.unwrap();
    let cancelled = h.service.create_request(NewRequest::new("dms")).await.unwrap();
    h.service.cancel_request(&cancelled.id).await.unwrap();
    let entries = h.audit.entries().await.len();

    for id in [&completed, &cancelled.id] {
        assert!(matches!(
            h.service.submit(id).await,
            Err(Error::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.service.cancel_request(id).await,
            Err(Error::InvalidTransition { .. })
        ));
    }
    assert_eq!(h.audit.entries().await.len(), entries);
}

#[tokio::test]
async fn test_date_range_excluding_matches_completes_empty() {
    let (h, _) = harness(&scenario_a()).await;
    let range = DateRange {
        from: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
        to: Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()),
    };

    let id = h.service.submit_request("project", Some(range)).await.unwrap();
    let package = h.service.get_disclosure_package(&id).await.unwrap();
    assert!(package.is_empty());

    let entries = h.service.audit_query(&AuditFilter::for_request(&id)).await.unwrap();
    assert_eq!(entries[0].action, AuditAction::RequestCompleted);
}

#[tokio::test]
async fn test_every_match_is_decided_once() {
    let (h, records) = harness(&[
        Mail {
            subject: "Verkeerslichten kruispunt",
            body: "verkeersdata analyse",
            tier: Tier::Public,
            day: 10,
        },
        Mail {
            subject: "Verkeersdata export",
            body: "ruwe data",
            tier: Tier::Internal,
            day: 11,
        },
        Mail {
            subject: "Coalitieoverleg",
            body: "verkeersdata en begroting",
            tier: Tier::Confidential,
            day: 12,
        },
    ])
    .await;

    let id = h.service.submit_request("verkeersdata", None).await.unwrap();
    let package = h.service.get_disclosure_package(&id).await.unwrap();

    assert_eq!(package.len(), records.len());
    assert_eq!(
        package.disclosed_count() + package.withheld_count(),
        u32::try_from(package.len()).unwrap()
    );

    let entry = &h.service.audit_query(&AuditFilter::for_request(&id)).await.unwrap()[0];
    assert_eq!(entry.disclosed_count, 2);
    assert_eq!(entry.withheld_count, 1);
}
