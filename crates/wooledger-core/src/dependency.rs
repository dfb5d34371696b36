//! Bounded calls into external collaborators.
//!
//! Every call into the metadata index or the archive store goes through
//! [`bounded`], which turns timeouts and backend failures into
//! [`Error::DependencyUnavailable`]. `NotFound` passes through untouched
//! because it is a per-item condition, not an outage.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Default timeout for index queries and blob retrieval.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// External collaborator the core depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// The metadata index.
    MetadataIndex,
    /// The blob archive.
    ArchiveStore,
}

impl Dependency {
    /// Stable name used in logs and audit details.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MetadataIndex => "metadata_index",
            Self::ArchiveStore => "archive_store",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetadataIndex => write!(f, "Metadata index"),
            Self::ArchiveStore => write!(f, "Archive store"),
        }
    }
}

/// Runs `call` with a deadline, mapping failures to `DependencyUnavailable`.
///
/// # Errors
///
/// Returns `NotFound` unchanged and `DependencyUnavailable` for every other
/// failure, including expiry of `timeout`.
pub async fn bounded<T, F>(dependency: Dependency, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err @ (Error::NotFound(_) | Error::DependencyUnavailable { .. }))) => Err(err),
        Ok(Err(err)) => {
            tracing::warn!(dependency = dependency.as_str(), error = %err, "dependency call failed");
            Err(Error::DependencyUnavailable {
                dependency,
                reason: err.to_string(),
            })
        }
        Err(_) => {
            tracing::warn!(
                dependency = dependency.as_str(),
                timeout_ms = timeout.as_millis(),
                "dependency call timed out"
            );
            Err(Error::DependencyUnavailable {
                dependency,
                reason: format!("timed out after {}ms", timeout.as_millis()),
            })
        }
    }
}
