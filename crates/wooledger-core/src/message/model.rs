//! Archived message data models.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::text;

/// Content-addressed message identifier.
///
/// The lowercase hex SHA-256 digest of the raw message bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Derives the identifier of a raw message.
    #[must_use]
    pub fn from_content(raw: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(raw)))
    }

    /// Wraps an identifier read back from storage.
    ///
    /// Returns `None` unless `id` is a 64 character hex digest.
    #[must_use]
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        (id.len() == 64 && id.bytes().all(|b| b.is_ascii_hexdigit())).then_some(Self(id))
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for listings.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Disclosure sensitivity of a message.
///
/// Tiers are strictly ordered: `Public < Internal < Confidential`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Openly publishable.
    Public,
    /// Internal correspondence; disclosable on request.
    Internal,
    /// Never disclosed under a WOO request.
    #[default]
    Confidential,
}

impl Tier {
    /// All tiers in ascending sensitivity.
    pub const ALL: [Self; 3] = [Self::Public, Self::Internal, Self::Confidential];

    /// Parse from an archive classification label.
    ///
    /// Accepts English and Dutch labels. Unknown labels, including
    /// `unclassified`, map to `Confidential`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "public" | "openbaar" => Self::Public,
            "internal" | "intern" => Self::Internal,
            _ => Self::Confidential,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Confidential => "confidential",
        }
    }

    /// Dutch label used on disclosure documents.
    #[must_use]
    pub const fn dutch_label(&self) -> &'static str {
        match self {
            Self::Public => "openbaar",
            Self::Internal => "intern",
            Self::Confidential => "vertrouwelijk",
        }
    }

    /// Numeric rank for ordered storage.
    #[must_use]
    pub const fn rank(&self) -> i64 {
        match self {
            Self::Public => 0,
            Self::Internal => 1,
            Self::Confidential => 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sender of an archived message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Address, normalized to lowercase.
    pub email: String,
    /// Display name, if the header carried one.
    pub name: Option<String>,
}

impl Sender {
    /// Creates a sender.
    #[must_use]
    pub fn new(email: &str, name: Option<&str>) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            name: name.map(ToString::to_string),
        }
    }
}

/// Searchable terms derived from a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSet {
    /// Terms occurring in the subject.
    pub subject: BTreeSet<String>,
    /// Terms occurring in the body text.
    pub body: BTreeSet<String>,
}

impl TermSet {
    /// Derives terms from a subject and body text.
    #[must_use]
    pub fn derive(subject: &str, body_text: &str) -> Self {
        Self {
            subject: text::terms(subject),
            body: text::terms(body_text),
        }
    }

    /// Returns `true` if `term` occurs anywhere in the message.
    #[must_use]
    pub fn contains(&self, term: &str) -> bool {
        self.subject.contains(term) || self.body.contains(term)
    }
}

/// An archived message as seen by the metadata index.
///
/// Records are immutable once ingested. Reclassification produces a new
/// record, never an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Content-addressed identifier.
    pub id: MessageId,
    /// Sender.
    pub sender: Sender,
    /// Recipient addresses.
    pub recipients: BTreeSet<String>,
    /// Subject line.
    pub subject: String,
    /// Key of the raw message in the archive store.
    pub body_ref: String,
    /// When the message was sent.
    pub sent_at: DateTime<Utc>,
    /// Classification assigned at ingestion.
    pub tier: Tier,
    /// Explicit confidentiality marking set at ingestion.
    pub confidential: bool,
    /// Case (`zaak`) the message is filed under.
    pub case_id: Option<String>,
    /// Number of attachments.
    pub attachment_count: u32,
    /// Size of the raw message in bytes.
    pub size_bytes: u64,
    /// Derived searchable terms.
    pub terms: TermSet,
}

/// Input for building a [`MessageRecord`] from raw archive content.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    /// Raw message bytes as stored in the archive.
    pub raw: &'a [u8],
    /// Decoded plain-text body used for term extraction.
    pub body_text: &'a str,
    /// Sender.
    pub sender: Sender,
    /// Recipient addresses.
    pub recipients: Vec<String>,
    /// Subject line.
    pub subject: &'a str,
    /// When the message was sent.
    pub sent_at: DateTime<Utc>,
    /// Classification label.
    pub tier: Tier,
    /// Explicit confidentiality marking.
    pub confidential: bool,
    /// Case reference.
    pub case_id: Option<&'a str>,
    /// Number of attachments.
    pub attachment_count: u32,
}

impl MessageRecord {
    /// Builds the immutable record for raw archive content.
    #[must_use]
    pub fn from_new(new: &NewMessage<'_>) -> Self {
        let id = MessageId::from_content(new.raw);
        Self {
            body_ref: object_key(&id),
            id,
            sender: new.sender.clone(),
            recipients: new
                .recipients
                .iter()
                .map(|r| r.trim().to_lowercase())
                .collect(),
            subject: new.subject.to_string(),
            sent_at: new.sent_at,
            tier: new.tier,
            confidential: new.confidential,
            case_id: new.case_id.map(ToString::to_string),
            attachment_count: new.attachment_count,
            size_bytes: new.raw.len() as u64,
            terms: TermSet::derive(new.subject, new.body_text),
        }
    }

    /// Returns `true` if the sender or a recipient address contains
    /// `fragment`, compared case-insensitively.
    #[must_use]
    pub fn address_contains(&self, fragment: &str) -> bool {
        let fragment = text::fold(fragment.trim());
        !fragment.is_empty()
            && std::iter::once(&self.sender.email)
                .chain(&self.recipients)
                .any(|address| text::fold(address).contains(&fragment))
    }
}

/// Archive object key for a message: `<first two hex chars>/<digest>.eml`.
#[must_use]
pub fn object_key(id: &MessageId) -> String {
    let digest = id.as_str();
    format!("{}/{digest}.eml", &digest[..2.min(digest.len())])
}

/// Inclusive range of send times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest send time, inclusive.
    pub from: Option<DateTime<Utc>>,
    /// Latest send time, inclusive.
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Range without bounds.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    /// Range covering whole calendar days (UTC), both ends inclusive.
    #[must_use]
    pub fn days(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            from: from
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| t.and_utc()),
            to: to
                .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
                .map(|t| t.and_utc()),
        }
    }

    /// Returns `true` if `at` lies inside the range.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample<'a>(raw: &'a [u8], subject: &'a str) -> NewMessage<'a> {
        NewMessage {
            raw,
            body_text: "Voortgang van het project",
            sender: Sender::new("J.Doe@Haarlem.nl", Some("John Doe")),
            recipients: vec!["Team@haarlem.nl".into()],
            subject,
            sent_at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap(),
            tier: Tier::Internal,
            confidential: false,
            case_id: Some("ZAAK-2024-001"),
            attachment_count: 0,
        }
    }

    #[test]
    fn test_message_id_is_content_addressed() {
        let a = MessageId::from_content(b"raw message");
        let b = MessageId::from_content(b"raw message");
        let c = MessageId::from_content(b"other message");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_message_id_parse() {
        let id = MessageId::from_content(b"x");
        assert_eq!(MessageId::parse(&id.as_str().to_uppercase()), Some(id));
        assert_eq!(MessageId::parse("not-a-digest"), None);
    }

    #[test]
    fn test_tier_order() {
        assert!(Tier::Public < Tier::Internal);
        assert!(Tier::Internal < Tier::Confidential);
    }

    #[test]
    fn test_tier_parse_labels() {
        assert_eq!(Tier::parse("openbaar"), Tier::Public);
        assert_eq!(Tier::parse("Intern"), Tier::Internal);
        assert_eq!(Tier::parse("vertrouwelijk"), Tier::Confidential);
        assert_eq!(Tier::parse("unclassified"), Tier::Confidential);
        assert_eq!(Tier::parse(Tier::Internal.as_str()), Tier::Internal);
    }

    #[test]
    fn test_record_from_new() {
        let raw = b"From: j.doe@haarlem.nl\r\n\r\nbody";
        let record = MessageRecord::from_new(&sample(raw, "Project update - DMS"));

        assert_eq!(record.id, MessageId::from_content(raw));
        assert_eq!(record.sender.email, "j.doe@haarlem.nl");
        assert!(record.recipients.contains("team@haarlem.nl"));
        assert!(record.terms.subject.contains("dms"));
        assert!(record.terms.body.contains("voortgang"));
        assert!(!record.terms.contains("het"));
        assert_eq!(record.size_bytes, raw.len() as u64);
        assert!(record.body_ref.ends_with(".eml"));
        assert!(record.body_ref.starts_with(&record.id.as_str()[..2]));
    }

    #[test]
    fn test_address_contains() {
        let record = MessageRecord::from_new(&sample(b"raw", "Overleg"));
        assert!(record.address_contains("J.Doe@haarlem.nl"));
        assert!(record.address_contains("team@"));
        assert!(!record.address_contains("griffie"));
        assert!(!record.address_contains("  "));
    }

    #[test]
    fn test_date_range_days_is_inclusive() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let range = DateRange::days(Some(day), Some(day));

        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap()));
        assert!(DateRange::unbounded().contains(Utc::now()));
    }
}
