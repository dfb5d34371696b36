//! In-memory audit log.

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use tokio::sync::Mutex;

use super::chain::ChainHead;
use super::model::{AuditEntry, AuditFilter, NewAuditEntry};
use super::AuditLog;
use crate::Result;

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<AuditEntry>,
    head: ChainHead,
}

/// Audit log kept in memory, for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    inner: Mutex<Inner>,
}

impl MemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries, oldest first.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().await.entries.clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
        let mut inner = self.inner.lock().await;
        let sealed = AuditEntry::seal(
            entry,
            inner.head.next_sequence(),
            Utc::now().trunc_subsecs(6),
            inner.head.last_hash.clone(),
        );
        inner.head.advance(&sealed);
        inner.entries.push(sealed.clone());
        Ok(sealed)
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .iter()
            .filter(|e| filter.matches(e))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn entry_count(&self) -> Result<u64> {
        Ok(self.inner.lock().await.head.last_sequence)
    }
}
