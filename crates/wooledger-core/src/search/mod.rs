//! Free-text search over the metadata index.
//!
//! Queries are normalized with [`crate::text`], filters are pushed down into
//! the index query so that only in-range, in-tier records are scored, and the
//! survivors are ranked by [`ranking::rank_order`]. Searching is stateless:
//! re-issuing the same query against an unchanged index yields the same
//! ordered results.

pub mod ranking;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use ranking::ParsedQuery;

use crate::Result;
use crate::classification::classify;
use crate::dependency::{self, Dependency};
use crate::index::{IndexQuery, MetadataIndex};
use crate::message::{DateRange, MessageId, MessageRecord, Tier};

/// Filters applied before ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Inclusive send-time range.
    pub date_range: DateRange,
    /// Highest classification tier to return.
    pub max_tier: Option<Tier>,
    /// Number of ranked results to skip.
    pub offset: usize,
    /// Maximum number of results to return.
    pub limit: Option<usize>,
}

impl SearchFilters {
    /// Filters restricted to a date range.
    #[must_use]
    pub fn in_range(date_range: DateRange) -> Self {
        Self {
            date_range,
            ..Self::default()
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Relevance score.
    pub score: f64,
    /// The matching record.
    pub record: MessageRecord,
}

impl SearchHit {
    /// Identifier of the matching message.
    #[must_use]
    pub const fn message_id(&self) -> &MessageId {
        &self.record.id
    }
}

/// Ranked results of one search, consumed in order.
#[derive(Debug, Clone)]
pub struct SearchResults {
    hits: std::vec::IntoIter<SearchHit>,
}

impl SearchResults {
    /// An empty result sequence.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            hits: Vec::new().into_iter(),
        }
    }

    /// Remaining hits as a slice, without consuming them.
    #[must_use]
    pub fn as_slice(&self) -> &[SearchHit] {
        self.hits.as_slice()
    }
}

impl Iterator for SearchResults {
    type Item = SearchHit;

    fn next(&mut self) -> Option<Self::Item> {
        self.hits.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.hits.size_hint()
    }
}

impl ExactSizeIterator for SearchResults {}

/// Executes ranked searches against a metadata index.
#[derive(Clone)]
pub struct SearchEngine {
    index: Arc<dyn MetadataIndex>,
    timeout: Duration,
}

impl SearchEngine {
    /// Creates an engine over `index`; each index call is bounded by `timeout`.
    #[must_use]
    pub fn new(index: Arc<dyn MetadataIndex>, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    /// Runs a search.
    ///
    /// Empty or stop-word-only queries yield no results.
    ///
    /// # Errors
    ///
    /// Returns `DependencyUnavailable` if the index fails or times out.
    pub async fn search(&self, query_text: &str, filters: &SearchFilters) -> Result<SearchResults> {
        let Some(query) = ParsedQuery::parse(query_text) else {
            tracing::debug!("query has no searchable terms");
            return Ok(SearchResults::empty());
        };

        let index_query = IndexQuery {
            terms: query.terms.clone(),
            phrase: Some(query.phrase.clone()),
            date_range: filters.date_range,
            max_tier: filters.max_tier,
        };
        let candidates = dependency::bounded(
            Dependency::MetadataIndex,
            self.timeout,
            self.index.candidates(&index_query),
        )
        .await?;
        let candidate_count = candidates.len();

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|record| filters.date_range.contains(record.sent_at))
            .filter(|record| filters.max_tier.is_none_or(|max| classify(record) <= max))
            .filter_map(|record| query.score(&record).map(|score| SearchHit { score, record }))
            .collect();
        hits.sort_by(|a, b| ranking::rank_order((a.score, &a.record), (b.score, &b.record)));

        let hits: Vec<SearchHit> = hits
            .into_iter()
            .skip(filters.offset)
            .take(filters.limit.unwrap_or(usize::MAX))
            .collect();

        tracing::debug!(
            terms = query.terms.len(),
            candidates = candidate_count,
            results = hits.len(),
            "search complete"
        );

        Ok(SearchResults {
            hits: hits.into_iter(),
        })
    }
}
