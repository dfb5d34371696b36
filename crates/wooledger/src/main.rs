//! `WooLedger` - WOO disclosure engine for municipal e-mail archives.
//!
//! Command-line front end over `wooledger-core`:
//! - Ranked search over the archive, every search audited
//! - Message metadata and archive statistics
//! - Filing, processing, and cancelling disclosure requests
//! - Inspecting and exporting disclosure packages
//! - Querying and verifying the audit log

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wooledger_core::{
    AuditAction, AuditFilter, Config, DateRange, DisclosureService, Error, MessageId, NewRequest,
    RequestId, Requester, SearchFilters, Tier,
};

mod output;
mod seed;

/// `WooLedger` CLI
#[derive(Parser)]
#[command(name = "wooledger")]
#[command(about = "WOO disclosure engine for municipal e-mail archives", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WOOLEDGER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable JSON logging
    #[arg(long, env = "WOOLEDGER_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the demonstration e-mails into the archive
    Seed,

    #[command(flatten)]
    Service(ServiceCommand),
}

/// Commands that run against an opened [`DisclosureService`].
#[derive(Subcommand)]
enum ServiceCommand {
    /// Search the archive
    Search {
        /// Free-text query
        query: String,
        #[command(flatten)]
        period: Period,
        /// Highest classification tier to return
        #[arg(long, value_parser = ["public", "internal", "confidential"])]
        max_tier: Option<String>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Number of results to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the metadata of one archived message
    Show {
        /// Message id (hex digest)
        id: String,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize the archive
    Stats {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// File a disclosure request and process it
    Submit {
        /// Free-text query
        query: String,
        #[command(flatten)]
        period: Period,
        /// Name of the requester
        #[arg(long)]
        requester: Option<String>,
        /// Contact address of the requester
        #[arg(long)]
        email: Option<String>,
        /// What is being requested
        #[arg(long)]
        description: Option<String>,
        /// Register the request without processing it
        #[arg(long)]
        no_process: bool,
    },

    /// Process a pending request
    Process {
        /// Request id
        id: String,
    },

    /// Withdraw a pending request
    Cancel {
        /// Request id
        id: String,
    },

    /// Show a request
    Status {
        /// Request id
        id: String,
    },

    /// Show the disclosure package of a completed request
    Package {
        /// Request id
        id: String,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the disclosed messages of a completed request to a directory
    Export {
        /// Request id
        id: String,
        /// Target directory
        dir: PathBuf,
    },

    /// List all requests
    Requests {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Query the audit log
    Audit {
        /// Only entries of this kind
        #[arg(long, value_parser = ["search", "request_completed", "request_rejected"])]
        action: Option<String>,
        /// Only entries about this request
        #[arg(long)]
        request: Option<String>,
        /// Only entries by this actor
        #[arg(long)]
        actor: Option<String>,
        /// Maximum number of entries
        #[arg(long)]
        limit: Option<usize>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify the audit hash chain
    VerifyAudit,
}

/// Inclusive period, by calendar day.
#[derive(clap::Args)]
struct Period {
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl Period {
    fn range(&self) -> Result<DateRange> {
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            bail!("--from {from} is after --to {to}");
        }
        Ok(DateRange::days(self.from, self.to))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wooledger=info,wooledger_core=info".into());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = Config::load(cli.config.as_deref())
        .await
        .context("loading configuration")?;

    match cli.command {
        Command::Seed => {
            let inserted = seed::run(&config).await?;
            println!("Seeded {inserted} new message(s)");
            Ok(())
        }
        Command::Service(command) => {
            let service = DisclosureService::open(&config)
                .await
                .with_context(|| format!("opening {}", config.database_path.display()))?;
            run(&service, command).await
        }
    }
}

async fn run(service: &DisclosureService, command: ServiceCommand) -> Result<()> {
    match command {
        ServiceCommand::Search {
            query,
            period,
            max_tier,
            limit,
            offset,
            json,
        } => {
            let filters = SearchFilters {
                date_range: period.range()?,
                max_tier: max_tier.as_deref().map(Tier::parse),
                offset,
                limit,
            };
            let results = service.search(&query, &filters).await?;
            output::search_hits(results.as_slice(), json)?;
        }
        ServiceCommand::Show { id, json } => {
            let Some(id) = MessageId::parse(&id) else {
                bail!("{id:?} is not a message id");
            };
            output::message(&service.get_message(&id).await?, json)?;
        }
        ServiceCommand::Stats { json } => {
            output::stats(&service.archive_stats().await?, json)?;
        }
        ServiceCommand::Submit {
            query,
            period,
            requester,
            email,
            description,
            no_process,
        } => {
            let mut new = NewRequest::new(query).with_date_range(period.range()?);
            if requester.is_some() || email.is_some() {
                let name = requester.unwrap_or_else(|| Requester::default().name);
                new = new.with_requester(Requester { name, email });
            }
            new.description = description;

            let request = service.create_request(new).await?;
            println!("Registered {}", request.id);
            if !no_process {
                process(service, &request.id).await?;
            }
        }
        ServiceCommand::Process { id } => process(service, &RequestId::new(id)).await?,
        ServiceCommand::Cancel { id } => {
            let id = RequestId::new(id);
            let state = service.cancel_request(&id).await?;
            println!("{id} is now {state}");
        }
        ServiceCommand::Status { id } => {
            let request = service.get_request(&RequestId::new(id)).await?;
            output::request(&request);
        }
        ServiceCommand::Package { id, json } => {
            let package = service.get_disclosure_package(&RequestId::new(id)).await?;
            output::package(&package, json)?;
        }
        ServiceCommand::Export { id, dir } => {
            let summary = service.export_package(&RequestId::new(id), &dir).await?;
            output::export(&summary);
        }
        ServiceCommand::Requests { json } => {
            output::requests(&service.list_requests().await?, json)?;
        }
        ServiceCommand::Audit {
            action,
            request,
            actor,
            limit,
            json,
        } => {
            let filter = AuditFilter {
                action: action.as_deref().and_then(AuditAction::parse),
                request_id: request.map(RequestId::new),
                actor,
                limit,
                ..AuditFilter::default()
            };
            output::audit_entries(&service.audit_query(&filter).await?, json)?;
        }
        ServiceCommand::VerifyAudit => {
            let verification = service.verify_audit_chain().await?;
            output::verification(&verification);
            if !verification.valid {
                bail!("audit chain verification failed");
            }
        }
    }
    Ok(())
}

/// Processes a request and reports the outcome.
async fn process(service: &DisclosureService, id: &RequestId) -> Result<()> {
    match service.submit(id).await {
        Ok(package) => {
            info!(request = %id, "processed");
            output::package(&package, false)
        }
        Err(err @ (Error::InvalidRequest(_) | Error::DependencyUnavailable { .. })) => {
            println!("{id} rejected");
            Err(err.into())
        }
        Err(err) => Err(err).with_context(|| format!("processing {id}")),
    }
}
