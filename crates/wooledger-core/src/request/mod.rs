//! Disclosure requests under the Open Government Act (WOO).
//!
//! A request moves through an explicit state machine ([`RequestState`]),
//! is stored by [`RequestRepository`], and is processed by
//! [`RequestProcessor`] into an ordered [`DisclosurePackage`].

mod model;
mod processor;
mod repository;
mod state;

pub use model::{
    DECISION_PERIOD_DAYS, Decision, DisclosurePackage, DisclosureRequest, NewRequest, PackageItem,
    RequestId, RequestSummary, Requester, WithholdReason,
};
pub use processor::{REASON_CANCELLED, REASON_INVALID, RequestProcessor};
pub use repository::RequestRepository;
pub use state::{RequestEvent, RequestState};
