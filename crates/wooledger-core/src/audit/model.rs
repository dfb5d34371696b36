//! Audit entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::message::{DateRange, MessageId};
use crate::request::{DisclosurePackage, RequestId, RequestState};

/// Kind of decision recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A standalone archive search.
    Search,
    /// A disclosure request reached `completed`.
    RequestCompleted,
    /// A disclosure request reached `rejected`.
    RequestRejected,
}

impl AuditAction {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "search" => Some(Self::Search),
            "request_completed" => Some(Self::RequestCompleted),
            "request_rejected" => Some(Self::RequestRejected),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::RequestCompleted => "request_completed",
            Self::RequestRejected => "request_rejected",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the audited operation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed or was refused.
    Failure,
}

impl AuditOutcome {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// An entry about to be appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    /// Who performed the action.
    pub actor: String,
    /// What was done.
    pub action: AuditAction,
    /// Request the entry is about, if any.
    pub request_id: Option<RequestId>,
    /// Messages the decision covered.
    pub message_ids: Vec<MessageId>,
    /// Result of the action.
    pub outcome: AuditOutcome,
    /// Messages disclosed.
    pub disclosed_count: u32,
    /// Messages withheld.
    pub withheld_count: u32,
    /// Free-form context.
    pub details: serde_json::Value,
}

impl NewAuditEntry {
    /// Entry for a standalone search.
    #[must_use]
    pub fn search(actor: &str, query_text: &str, results: Vec<MessageId>) -> Self {
        Self {
            actor: actor.to_string(),
            action: AuditAction::Search,
            request_id: None,
            details: json!({ "query": query_text, "results_count": results.len() }),
            message_ids: results,
            outcome: AuditOutcome::Success,
            disclosed_count: 0,
            withheld_count: 0,
        }
    }

    /// Entry for a request that completed with `package`.
    #[must_use]
    pub fn completed(actor: &str, package: &DisclosurePackage) -> Self {
        Self {
            actor: actor.to_string(),
            action: AuditAction::RequestCompleted,
            request_id: Some(package.request_id.clone()),
            message_ids: package.items.iter().map(|i| i.message_id.clone()).collect(),
            outcome: AuditOutcome::Success,
            disclosed_count: package.disclosed_count(),
            withheld_count: package.withheld_count(),
            details: json!({ "state": RequestState::Completed.as_str() }),
        }
    }

    /// Entry for a request that was rejected for `reason`.
    #[must_use]
    pub fn rejected(actor: &str, request_id: &RequestId, reason: &str) -> Self {
        Self {
            actor: actor.to_string(),
            action: AuditAction::RequestRejected,
            request_id: Some(request_id.clone()),
            message_ids: Vec::new(),
            outcome: AuditOutcome::Failure,
            disclosed_count: 0,
            withheld_count: 0,
            details: json!({ "state": RequestState::Rejected.as_str(), "reason": reason }),
        }
    }
}

/// An appended, sealed audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log, starting at 1.
    pub sequence: u64,
    /// When the entry was appended.
    pub recorded_at: DateTime<Utc>,
    /// Who performed the action.
    pub actor: String,
    /// What was done.
    pub action: AuditAction,
    /// Request the entry is about, if any.
    pub request_id: Option<RequestId>,
    /// Messages the decision covered.
    pub message_ids: Vec<MessageId>,
    /// Result of the action.
    pub outcome: AuditOutcome,
    /// Messages disclosed.
    pub disclosed_count: u32,
    /// Messages withheld.
    pub withheld_count: u32,
    /// Free-form context.
    pub details: serde_json::Value,
    /// Hash of the preceding entry.
    pub previous_hash: Option<String>,
    /// Hash of this entry.
    pub entry_hash: String,
}

impl AuditEntry {
    /// Seals `new` at `sequence`, chaining it to `previous_hash`.
    #[must_use]
    pub fn seal(
        new: NewAuditEntry,
        sequence: u64,
        recorded_at: DateTime<Utc>,
        previous_hash: Option<String>,
    ) -> Self {
        let mut entry = Self {
            sequence,
            recorded_at,
            actor: new.actor,
            action: new.action,
            request_id: new.request_id,
            message_ids: new.message_ids,
            outcome: new.outcome,
            disclosed_count: new.disclosed_count,
            withheld_count: new.withheld_count,
            details: new.details,
            previous_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = super::chain::compute_hash(&entry);
        entry
    }
}

/// Filter for audit queries. Results are always oldest first.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only entries of this kind.
    pub action: Option<AuditAction>,
    /// Only entries about this request.
    pub request_id: Option<RequestId>,
    /// Only entries by this actor.
    pub actor: Option<String>,
    /// Only entries recorded in this period.
    pub period: DateRange,
    /// Maximum number of entries.
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Filter for all entries about one request.
    #[must_use]
    pub fn for_request(request_id: &RequestId) -> Self {
        Self {
            request_id: Some(request_id.clone()),
            ..Self::default()
        }
    }

    /// Check if an entry matches this filter (ignores `limit`).
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.action.is_none_or(|action| entry.action == action)
            && self
                .request_id
                .as_ref()
                .is_none_or(|id| entry.request_id.as_ref() == Some(id))
            && self.actor.as_ref().is_none_or(|actor| &entry.actor == actor)
            && self.period.contains(entry.recorded_at)
    }
}
