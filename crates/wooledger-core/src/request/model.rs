//! Disclosure request data models.

use std::fmt;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::state::RequestState;
use crate::message::{DateRange, MessageId, Tier};

/// Statutory decision period for a WOO request, in days.
pub const DECISION_PERIOD_DAYS: u64 = 28;

/// Identifier of a disclosure request, e.g. `WOO-2024-3f9a12c0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh identifier for a request registered on `date`.
    #[must_use]
    pub fn generate(date: NaiveDate) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("WOO-{}-{}", date.year(), &suffix[..8]))
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Person or organisation filing a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Name of the requester.
    pub name: String,
    /// Contact address.
    pub email: Option<String>,
}

impl Default for Requester {
    fn default() -> Self {
        Self {
            name: "anonymous".to_string(),
            email: None,
        }
    }
}

/// Input for registering a disclosure request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRequest {
    /// Free-text query.
    pub query: String,
    /// Restrict the search to this period.
    pub date_range: DateRange,
    /// Who is asking.
    pub requester: Requester,
    /// Description of what is requested.
    pub description: Option<String>,
    /// Decision deadline; defaults to [`DECISION_PERIOD_DAYS`] after filing.
    pub due_date: Option<NaiveDate>,
}

impl NewRequest {
    /// Request for `query` with defaults for everything else.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Sets the period to search.
    #[must_use]
    pub const fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    /// Sets the requester.
    #[must_use]
    pub fn with_requester(mut self, requester: Requester) -> Self {
        self.requester = requester;
        self
    }
}

/// A registered disclosure request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisclosureRequest {
    /// Identifier.
    pub id: RequestId,
    /// Free-text query.
    pub query: String,
    /// Period to search.
    pub date_range: DateRange,
    /// Who is asking.
    pub requester: Requester,
    /// Description of what is requested.
    pub description: Option<String>,
    /// Current lifecycle state.
    pub state: RequestState,
    /// Why the request was rejected.
    pub rejection_reason: Option<String>,
    /// Filing date.
    pub request_date: NaiveDate,
    /// Decision deadline.
    pub due_date: NaiveDate,
    /// When the request was registered.
    pub created_at: DateTime<Utc>,
}

impl DisclosureRequest {
    /// Registers `new` at `now` in the `Pending` state.
    #[must_use]
    pub fn register(new: NewRequest, now: DateTime<Utc>) -> Self {
        let request_date = now.date_naive();
        let due_date = new.due_date.unwrap_or_else(|| {
            request_date
                .checked_add_days(Days::new(DECISION_PERIOD_DAYS))
                .unwrap_or(request_date)
        });
        Self {
            id: RequestId::generate(request_date),
            query: new.query,
            date_range: new.date_range,
            requester: new.requester,
            description: new.description,
            state: RequestState::Pending,
            rejection_reason: None,
            request_date,
            due_date,
            created_at: now,
        }
    }

    /// Returns `true` if the deadline has passed without a decision.
    #[must_use]
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.state.is_terminal() && today > self.due_date
    }
}

/// A request as listed in overviews, with the size of its package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    /// The request.
    #[serde(flatten)]
    pub request: DisclosureRequest,
    /// Messages the request matched; zero until it completes.
    pub matched: u64,
}

/// Why a matching message was withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WithholdReason {
    /// Its classification tier is not disclosable.
    Classification(Tier),
    /// Its body could not be retrieved from the archive.
    Unavailable,
}

impl WithholdReason {
    /// Reason text recorded in the package.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Classification(tier) => tier.as_str(),
            Self::Unavailable => "unavailable",
        }
    }

    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "unavailable" => Self::Unavailable,
            tier => Self::Classification(Tier::parse(tier)),
        }
    }
}

impl fmt::Display for WithholdReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disclosure decision for one matching message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Released to the requester.
    Disclosed,
    /// Kept back, with the reason.
    Withheld(WithholdReason),
}

impl Decision {
    /// Decision name recorded in the package.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disclosed => "disclosed",
            Self::Withheld(_) => "withheld",
        }
    }

    /// Withholding reason, if withheld.
    #[must_use]
    pub const fn reason(&self) -> Option<WithholdReason> {
        match self {
            Self::Disclosed => None,
            Self::Withheld(reason) => Some(*reason),
        }
    }

    /// Returns `true` if disclosed.
    #[must_use]
    pub const fn is_disclosed(&self) -> bool {
        matches!(self, Self::Disclosed)
    }
}

/// One entry in a disclosure package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageItem {
    /// Matching message.
    pub message_id: MessageId,
    /// What was decided.
    pub decision: Decision,
    /// Relevance score from the search.
    pub score: f64,
}

/// The complete, ordered result of processing a request.
///
/// Every search match appears exactly once, disclosed or withheld, in
/// ranking order.
#[derive(Debug, Clone, PartialEq)]
pub struct DisclosurePackage {
    /// Request this package answers.
    pub request_id: RequestId,
    /// Decisions in ranking order.
    pub items: Vec<PackageItem>,
}

impl DisclosurePackage {
    /// Number of matches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items that were disclosed.
    pub fn disclosed(&self) -> impl Iterator<Item = &PackageItem> {
        self.items.iter().filter(|i| i.decision.is_disclosed())
    }

    /// Items that were withheld.
    pub fn withheld(&self) -> impl Iterator<Item = &PackageItem> {
        self.items.iter().filter(|i| !i.decision.is_disclosed())
    }

    /// Number of disclosed items.
    #[must_use]
    pub fn disclosed_count(&self) -> u32 {
        u32::try_from(self.disclosed().count()).unwrap_or(u32::MAX)
    }

    /// Number of withheld items.
    #[must_use]
    pub fn withheld_count(&self) -> u32 {
        u32::try_from(self.withheld().count()).unwrap_or(u32::MAX)
    }
}
