//! Demonstration archive content.
//!
//! Five e-mails from a municipal mailbox, covering every classification
//! tier. Seeding is idempotent: records are content-addressed, so loading
//! them twice stores them once.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;
use wooledger_core::{Config, FsArchiveStore, MessageRecord, NewMessage, Sender, SqliteIndex, Tier};

struct Sample {
    sender: &'static str,
    sender_name: &'static str,
    recipients: &'static [&'static str],
    subject: &'static str,
    sent_at: &'static str,
    case_id: &'static str,
    classification: &'static str,
    body: &'static str,
}

const SAMPLES: [Sample; 5] = [
    Sample {
        sender: "j.doe@haarlem.nl",
        sender_name: "John Doe",
        recipients: &["team@haarlem.nl", "manager@haarlem.nl"],
        subject: "Project update - DMS implementatie voortgang",
        sent_at: "2024-01-15T10:30:00+01:00",
        case_id: "ZAAK-2024-001",
        classification: "intern",
        body: "Beste collega's,\n\nDe implementatie van het nieuwe DMS loopt volgens planning. \
               De migratie van de zaakdossiers start volgende week.\n\nGroet,\nJohn",
    },
    Sample {
        sender: "burger@example.com",
        sender_name: "Bezorgde Burger",
        recipients: &["info@haarlem.nl"],
        subject: "WOO verzoek - verkeerslichten en verkeersdata gemeente",
        sent_at: "2024-01-16T14:20:00+01:00",
        case_id: "WOO-2024-002",
        classification: "openbaar",
        body: "Geachte heer/mevrouw,\n\nGraag ontvang ik alle documenten over de afstelling van \
               de verkeerslichten en de verzamelde verkeersdata van 2023.\n\nMet vriendelijke groet",
    },
    Sample {
        sender: "wethouder@haarlem.nl",
        sender_name: "Wethouder Smith",
        recipients: &["griffie@haarlem.nl", "pers@haarlem.nl"],
        subject: "VERTROUWELIJK: Coalitieoverleg agenda en afspraken",
        sent_at: "2024-01-17T09:15:00+01:00",
        case_id: "RAAD-2024-003",
        classification: "vertrouwelijk",
        body: "Agenda coalitieoverleg: begroting 2024, digitalisering dienstverlening, \
               personele bezetting. Niet verspreiden.",
    },
    Sample {
        sender: "projectleider@haarlem.nl",
        sender_name: "Project Manager IT",
        recipients: &["cio@haarlem.nl"],
        subject: "MinIO implementatie - status update week 3",
        sent_at: "2024-01-18T16:45:00+01:00",
        case_id: "PROJ-2024-004",
        classification: "intern",
        body: "De MinIO opslag voor het e-mailarchief draait in de testomgeving. \
               Koppeling met het DMS volgt na de security review.",
    },
    Sample {
        sender: "journalist@haarlemsdagblad.nl",
        sender_name: "Journalist HD",
        recipients: &["woordvoering@haarlem.nl"],
        subject: "Vragen over digitalisering gemeente - deadline artikel",
        sent_at: "2024-01-19T11:30:00+01:00",
        case_id: "PERS-2024-001",
        classification: "openbaar",
        body: "Voor een artikel over de digitalisering van de gemeente heb ik enkele vragen \
               over de kosten en planning van het DMS project. Deadline vrijdag.",
    },
];

impl Sample {
    /// Renders the sample as a raw RFC 5322 message.
    fn raw(&self) -> String {
        format!(
            "From: {} <{}>\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nX-Zaak-Id: {}\r\n\r\n{}\r\n",
            self.sender_name,
            self.sender,
            self.recipients.join(", "),
            self.subject,
            self.sent_at,
            self.case_id,
            self.body
        )
    }
}

/// Loads the sample messages into the index and archive named by `config`.
///
/// Returns the number of records that were new.
pub async fn run(config: &Config) -> Result<usize> {
    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let index = SqliteIndex::new(config.database_url_path()?)
        .await
        .context("opening metadata index")?;
    let archive = FsArchiveStore::new(&config.archive_dir)
        .await
        .context("opening archive")?;

    let mut inserted = 0;
    for sample in &SAMPLES {
        let raw = sample.raw();
        let sent_at: DateTime<Utc> = DateTime::parse_from_rfc3339(sample.sent_at)
            .with_context(|| format!("sample date {}", sample.sent_at))?
            .with_timezone(&Utc);

        let id = archive.put(raw.as_bytes()).await?;
        let record = MessageRecord::from_new(&NewMessage {
            raw: raw.as_bytes(),
            body_text: sample.body,
            sender: Sender::new(sample.sender, Some(sample.sender_name)),
            recipients: sample.recipients.iter().map(ToString::to_string).collect(),
            subject: sample.subject,
            sent_at,
            tier: Tier::parse(sample.classification),
            confidential: false,
            case_id: Some(sample.case_id),
            attachment_count: 0,
        });
        debug_assert_eq!(record.id, id);

        if index.insert(&record).await? {
            inserted += 1;
            info!(message = record.id.short(), subject = sample.subject, "seeded");
        }
    }

    Ok(inserted)
}
