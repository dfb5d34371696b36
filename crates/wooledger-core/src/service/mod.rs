//! Service layer.
//!
//! [`DisclosureService`] is the surface the CLI talks to: it bundles the
//! search engine, the request processor, and the audit log behind the
//! operations exposed to callers.

mod disclosure;
mod export;

pub use disclosure::{Backends, DisclosureService, RECENT_DAYS};
pub use export::{ExportSummary, MANIFEST_FILE};
