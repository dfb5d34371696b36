//! # wooledger-core
//!
//! Core business logic for `WooLedger`, a disclosure engine for municipal
//! e-mail archives under the Dutch Open Government Act (WOO).
//!
//! This crate provides:
//! - Domain models for archived messages and their classification tiers
//! - Ranked free-text search over a metadata index (`SQLite`)
//! - A content-addressed archive store
//! - **Disclosure Requests** - a state machine from filing to package
//! - **Audit Log** - append-only, hash-chained record of every decision
//! - Configuration and the service facade used by the CLI

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod audit;
pub mod classification;
pub mod config;
pub mod dependency;
mod error;
pub mod index;
pub mod message;
pub mod request;
pub mod search;
pub mod service;
pub mod text;

pub use archive::{ArchiveStore, FsArchiveStore, MemoryArchiveStore};
pub use audit::{
    AuditAction, AuditEntry, AuditFilter, AuditLog, AuditOutcome, ChainVerification,
    MemoryAuditLog, NewAuditEntry, SqliteAuditLog,
};
pub use classification::{classify, is_disclosable};
pub use config::Config;
pub use dependency::Dependency;
pub use error::{Error, Result};
pub use index::{ArchiveStats, IndexQuery, MetadataIndex, SqliteIndex};
pub use message::{DateRange, MessageId, MessageRecord, NewMessage, Sender, Tier};
pub use request::{
    Decision, DisclosurePackage, DisclosureRequest, NewRequest, PackageItem, RequestEvent,
    RequestId, RequestProcessor, RequestRepository, RequestState, RequestSummary, Requester,
    WithholdReason,
};
pub use search::{SearchEngine, SearchFilters, SearchHit, SearchResults};
pub use service::{Backends, DisclosureService, ExportSummary, RECENT_DAYS};
