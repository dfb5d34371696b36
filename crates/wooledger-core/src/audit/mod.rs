//! Append-only audit log.
//!
//! Every standalone search and every terminal disclosure decision is
//! recorded here. Entries are sealed into a SHA-256 hash chain when they are
//! appended, so [`verify_chain`] can detect entries that were altered,
//! removed, or reordered after the fact. The public contract has no delete.
//!
//! The log is injected into the request processor as an [`AuditLog`] trait
//! object; [`SqliteAuditLog`] persists it and [`MemoryAuditLog`] backs tests.

mod chain;
mod memory;
mod model;
mod repository;

use async_trait::async_trait;

pub use chain::{ChainHead, ChainVerification, compute_hash, verify_chain};
pub use memory::MemoryAuditLog;
pub use model::{AuditAction, AuditEntry, AuditFilter, AuditOutcome, NewAuditEntry};
pub use repository::SqliteAuditLog;

use crate::Result;

/// Sink for audit entries.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Seals and appends an entry. Each append is atomic.
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry>;

    /// Entries matching `filter`, oldest first.
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>>;

    /// Number of entries ever appended.
    async fn entry_count(&self) -> Result<u64>;
}
