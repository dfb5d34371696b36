//! Metadata index.
//!
//! The index is the queryable catalog of [`MessageRecord`]s. The search
//! engine only talks to it through [`MetadataIndex`], so deployments can back
//! it with anything that answers candidate queries; [`SqliteIndex`] is the
//! bundled implementation.

mod repository;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use repository::SqliteIndex;

use crate::Result;
use crate::message::{DateRange, MessageId, MessageRecord, Tier};

/// Candidate query passed to the index.
///
/// A record is a candidate when it carries any of `terms`, or when its
/// normalized subject or one of its addresses contains `phrase`, and it
/// passes both filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexQuery {
    /// Folded query terms.
    pub terms: BTreeSet<String>,
    /// Normalized query phrase for subject and address substring matching.
    pub phrase: Option<String>,
    /// Inclusive send-time range.
    pub date_range: DateRange,
    /// Highest stored tier to return.
    pub max_tier: Option<Tier>,
}

/// Read interface of the metadata index.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Returns every record matching `query`, in no particular order.
    async fn candidates(&self, query: &IndexQuery) -> Result<Vec<MessageRecord>>;

    /// Looks up one record.
    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>>;

    /// Aggregate figures over the whole index.
    ///
    /// `recent_since` is the cut-off for [`ArchiveStats::recent_messages`].
    async fn stats(&self, recent_since: DateTime<Utc>) -> Result<ArchiveStats>;
}

/// Archive-wide figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    /// Indexed messages.
    pub total_messages: u64,
    /// Messages sent on or after the cut-off.
    pub recent_messages: u64,
    /// Messages classified or marked confidential.
    pub confidential_messages: u64,
    /// Messages filed under a case.
    pub case_linked_messages: u64,
    /// Combined size of the raw messages.
    pub total_bytes: u64,
}
