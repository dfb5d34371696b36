//! Query parsing and relevance scoring.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::message::MessageRecord;
use crate::text;

/// Weight of a term matched in the subject relative to the body.
pub const SUBJECT_WEIGHT: f64 = 2.0;

/// Score of a record whose sender or recipient address contains the query.
pub const ADDRESS_FLOOR: f64 = 1.0;

/// A normalized free-text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Distinct folded terms, stop-words removed.
    pub terms: BTreeSet<String>,
    /// Folded, whitespace-collapsed query text.
    pub phrase: String,
}

impl ParsedQuery {
    /// Parses query text.
    ///
    /// Returns `None` when nothing searchable remains: empty text, or text
    /// made only of stop-words. Such queries match no messages.
    #[must_use]
    pub fn parse(query_text: &str) -> Option<Self> {
        let terms = text::terms(query_text);
        if terms.is_empty() {
            return None;
        }
        Some(Self {
            terms,
            phrase: text::normalize_phrase(query_text),
        })
    }

    /// Scores `record` against the query, or `None` if it does not match.
    ///
    /// Coverage of the query terms, with subject hits counting
    /// [`SUBJECT_WEIGHT`] times a body hit. A record whose subject contains
    /// the whole query phrase scores at least full subject coverage; one
    /// whose sender or recipient address contains it scores at least
    /// [`ADDRESS_FLOOR`]. Scores lie in `(0, SUBJECT_WEIGHT]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, record: &MessageRecord) -> Option<f64> {
        let terms = &record.terms;
        let in_subject = self
            .terms
            .iter()
            .filter(|t| terms.subject.contains(*t))
            .count();
        let body_only = self
            .terms
            .iter()
            .filter(|t| !terms.subject.contains(*t) && terms.body.contains(*t))
            .count();
        let subject_phrase = !self.phrase.is_empty()
            && text::normalize_phrase(&record.subject).contains(&self.phrase);
        let address_phrase = record.address_contains(&self.phrase);

        if in_subject == 0 && body_only == 0 && !subject_phrase && !address_phrase {
            return None;
        }

        let weighted = SUBJECT_WEIGHT.mul_add(in_subject as f64, body_only as f64);
        let mut score = weighted / self.terms.len() as f64;
        if address_phrase {
            score = score.max(ADDRESS_FLOOR);
        }
        if subject_phrase {
            score = score.max(SUBJECT_WEIGHT);
        }
        Some(score)
    }
}

/// Result ordering: score descending, then most recent first, then id.
#[must_use]
pub fn rank_order(a: (f64, &MessageRecord), b: (f64, &MessageRecord)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| b.1.sent_at.cmp(&a.1.sent_at))
        .then_with(|| a.1.id.cmp(&b.1.id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::message::{NewMessage, Sender, Tier};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    const VOCABULARY: [&str; 8] = [
        "dms",
        "project",
        "minio",
        "begroting",
        "verkeerslichten",
        "digitalisering",
        "planning",
        "archief",
    ];

    fn record(raw: &str, subject: &str, body: &str, hour: u32) -> MessageRecord {
        MessageRecord::from_new(&NewMessage {
            raw: raw.as_bytes(),
            body_text: body,
            sender: Sender::new("info@haarlem.nl", None),
            recipients: vec![],
            subject,
            sent_at: Utc.with_ymd_and_hms(2024, 1, 16, hour, 0, 0).unwrap(),
            tier: Tier::Public,
            confidential: false,
            case_id: None,
            attachment_count: 0,
        })
    }

    fn words(max: usize) -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(VOCABULARY.to_vec()), 0..max)
            .prop_map(|w| w.join(" "))
    }

    #[test]
    fn test_parse_rejects_empty_and_stop_words() {
        assert!(ParsedQuery::parse("").is_none());
        assert!(ParsedQuery::parse("   ").is_none());
        assert!(ParsedQuery::parse("de het een").is_none());
        let parsed = ParsedQuery::parse("Verkeerslichten  en Verkeersdata").unwrap();
        assert_eq!(parsed.terms.len(), 2);
        assert_eq!(parsed.phrase, "verkeerslichten en verkeersdata");
    }

    #[test]
    fn test_subject_counts_double() {
        let query = ParsedQuery::parse("verkeerslichten").unwrap();
        let subject = record("a", "Verkeerslichten", "", 10);
        let body = record("b", "Vraag", "over verkeerslichten", 10);

        assert_eq!(query.score(&subject).unwrap(), 2.0);
        assert_eq!(query.score(&body).unwrap(), 1.0);
    }

    #[test]
    fn test_partial_coverage() {
        let query = ParsedQuery::parse("dms implementatie digitalisering").unwrap();
        let r = record("a", "DMS update", "implementatie", 10);
        // dms in subject (2) + implementatie in body (1), over three terms
        assert_eq!(query.score(&r).unwrap(), 1.0);
    }

    #[test]
    fn test_phrase_match_without_shared_terms() {
        let query = ParsedQuery::parse("integratie").unwrap();
        let r = record("a", "DMSintegratie planning", "", 10);
        assert!(!r.terms.contains("integratie"));
        assert_eq!(query.score(&r).unwrap(), 2.0);
    }

    #[test]
    fn test_address_matches() {
        let r = MessageRecord::from_new(&NewMessage {
            raw: b"persvraag",
            body_text: "Vragen over de planning",
            sender: Sender::new("journalist@haarlemsdagblad.nl", Some("Journalist HD")),
            recipients: vec!["woordvoering@haarlem.nl".into()],
            subject: "Vragen over digitalisering",
            sent_at: Utc.with_ymd_and_hms(2024, 1, 19, 11, 30, 0).unwrap(),
            tier: Tier::Public,
            confidential: false,
            case_id: Some("PERS-2024-001"),
            attachment_count: 0,
        });

        for query in ["journalist", "haarlemsdagblad", "woordvoering@haarlem.nl"] {
            let score = ParsedQuery::parse(query).unwrap().score(&r);
            assert_eq!(score, Some(ADDRESS_FLOOR), "{query}");
        }
        // A partial address still matches as a substring.
        let partial = ParsedQuery::parse("dagblad.nl").unwrap();
        assert!(partial.score(&r).is_some());
    }

    #[test]
    fn test_non_match() {
        let query = ParsedQuery::parse("begroting").unwrap();
        assert!(query.score(&record("a", "Lunch", "vrijdag", 10)).is_none());
    }

    #[test]
    fn test_rank_order_ties() {
        let older = record("a", "x", "", 9);
        let newer = record("b", "x", "", 11);
        assert_eq!(rank_order((1.0, &newer), (1.0, &older)), Ordering::Less);
        assert_eq!(rank_order((2.0, &older), (1.0, &newer)), Ordering::Less);

        let same_a = record("c", "x", "", 9);
        let same_b = record("d", "x", "", 9);
        let expected = same_a.id.cmp(&same_b.id);
        assert_eq!(rank_order((1.0, &same_a), (1.0, &same_b)), expected);
    }

    proptest! {
        #[test]
        fn prop_scores_are_bounded(query in words(4), subject in words(5), body in words(8)) {
            let r = record("m", &subject, &body, 10);
            if let Some(parsed) = ParsedQuery::parse(&query)
                && let Some(score) = parsed.score(&r)
            {
                prop_assert!(score > 0.0, "score {score} for {query:?}");
                prop_assert!(score <= SUBJECT_WEIGHT, "score {score} for {query:?}");
            }
        }

        #[test]
        fn prop_subject_never_below_body(
            term in prop::sample::select(VOCABULARY.to_vec()),
            filler in words(4),
        ) {
            let filler: Vec<&str> = filler.split(' ').filter(|w| *w != term).collect();
            let filler = filler.join(" ");
            let query = ParsedQuery::parse(term).unwrap();

            let in_subject = record("s", &format!("{filler} {term}"), &filler, 10);
            let in_body = record("b", &filler, &format!("{filler} {term}"), 10);

            let subject_score = query.score(&in_subject).unwrap();
            let body_score = query.score(&in_body).unwrap();
            prop_assert!(subject_score >= body_score);
        }

        #[test]
        fn prop_rank_order_is_deterministic(
            entries in prop::collection::vec((0u8..4, 0u32..3), 1..12),
            seed in any::<u64>(),
        ) {
            let scored: Vec<(f64, MessageRecord)> = entries
                .iter()
                .enumerate()
                .map(|(i, (score, hour))| {
                    (f64::from(*score) / 2.0, record(&format!("m{i}"), "x", "", *hour))
                })
                .collect();

            let sort = |mut items: Vec<(f64, MessageRecord)>| {
                items.sort_by(|a, b| rank_order((a.0, &a.1), (b.0, &b.1)));
                items.into_iter().map(|(_, r)| r.id).collect::<Vec<_>>()
            };

            // Rotate and reverse by the seed to vary the input order.
            let mut shuffled = scored.clone();
            let len = shuffled.len();
            shuffled.rotate_left(usize::try_from(seed).unwrap_or(0) % len);
            if seed % 2 == 1 {
                shuffled.reverse();
            }

            prop_assert_eq!(sort(scored), sort(shuffled));
        }
    }
}
