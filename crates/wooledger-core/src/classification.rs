//! Classification policy.
//!
//! [`classify`] maps a stored record to its effective disclosure tier and
//! [`is_disclosable`] is the only gate deciding whether a tier may be
//! released under a WOO request. Both are pure.

use crate::message::{MessageRecord, Tier};

/// Effective tier of a record.
///
/// The tier assigned at ingestion, escalated to `Confidential` when the record
/// carries an explicit confidentiality marking.
#[must_use]
pub fn classify(record: &MessageRecord) -> Tier {
    if record.confidential {
        Tier::Confidential
    } else {
        record.tier
    }
}

/// Returns `true` if messages of `tier` may be disclosed.
#[must_use]
pub const fn is_disclosable(tier: Tier) -> bool {
    match tier {
        Tier::Public | Tier::Internal => true,
        Tier::Confidential => false,
    }
}
