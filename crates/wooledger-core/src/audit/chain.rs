//! Hash chain over the audit log.

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use super::model::AuditEntry;

/// Tail of the chain: where the next entry goes and what it links to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainHead {
    /// Sequence number of the last entry, 0 for an empty log.
    pub last_sequence: u64,
    /// Hash of the last entry.
    pub last_hash: Option<String>,
}

impl ChainHead {
    /// Sequence number for the next entry.
    #[must_use]
    pub const fn next_sequence(&self) -> u64 {
        self.last_sequence + 1
    }

    /// Moves the head past `entry`.
    pub fn advance(&mut self, entry: &AuditEntry) {
        self.last_sequence = entry.sequence;
        self.last_hash = Some(entry.entry_hash.clone());
    }
}

/// Outcome of verifying a run of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// Whether every entry verified.
    pub valid: bool,
    /// Entries examined.
    pub total_entries: usize,
    /// Entries verified before the first failure.
    pub verified_entries: usize,
    /// Sequence number of the first bad entry.
    pub first_invalid_sequence: Option<u64>,
    /// What was wrong with it.
    pub error: Option<String>,
}

/// Expected hash of `entry`, covering every field but `entry_hash`.
#[must_use]
pub fn compute_hash(entry: &AuditEntry) -> String {
    let message_ids = entry
        .message_ids
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let input = format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}",
        entry.sequence,
        entry.recorded_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        entry.actor,
        entry.action.as_str(),
        entry.request_id.as_ref().map_or("", |id| id.as_str()),
        message_ids,
        entry.outcome.as_str(),
        entry.disclosed_count,
        entry.withheld_count,
        entry.details,
        entry.previous_hash.as_deref().unwrap_or(""),
    );
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Verifies hashes, links, and sequence continuity of a log read oldest first.
#[must_use]
pub fn verify_chain(entries: &[AuditEntry]) -> ChainVerification {
    let mut result = ChainVerification {
        valid: true,
        total_entries: entries.len(),
        verified_entries: 0,
        first_invalid_sequence: None,
        error: None,
    };

    let mut head = ChainHead::default();
    for entry in entries {
        let problem = if entry.sequence != head.next_sequence() {
            Some(format!(
                "expected sequence {}, found {}",
                head.next_sequence(),
                entry.sequence
            ))
        } else if entry.previous_hash != head.last_hash {
            Some("broken link to previous entry".to_string())
        } else if compute_hash(entry) != entry.entry_hash {
            Some("entry hash mismatch".to_string())
        } else {
            None
        };

        if let Some(problem) = problem {
            result.valid = false;
            result.first_invalid_sequence = Some(entry.sequence);
            result.error = Some(format!("entry {}: {problem}", entry.sequence));
            return result;
        }

        head.advance(entry);
        result.verified_entries += 1;
    }

    result
}
