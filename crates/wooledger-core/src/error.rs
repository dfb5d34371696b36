//! Error types for the core library.

use thiserror::Error;

use crate::dependency::Dependency;
use crate::request::{RequestEvent, RequestId, RequestState};

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The request is malformed, for example an empty query.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The metadata index or archive store could not be reached in time.
    #[error("{dependency} unavailable: {reason}")]
    DependencyUnavailable {
        /// Which collaborator failed.
        dependency: Dependency,
        /// Underlying failure.
        reason: String,
    },

    /// A referenced message, blob, or request does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request state machine does not allow this transition.
    #[error("Invalid transition: cannot {event} a request that is {from}")]
    InvalidTransition {
        /// State the request was in.
        from: RequestState,
        /// Event that was rejected.
        event: RequestEvent,
    },

    /// Processing failed for a request registered by the same call.
    ///
    /// The request keeps the state it reached, `rejected` for invalid
    /// queries and backend outages.
    #[error("Request {request}: {source}")]
    Submission {
        /// The registered request.
        request: RequestId,
        /// Why processing stopped.
        #[source]
        source: Box<Error>,
    },

    /// The disclosure package is not available in the request's current state.
    #[error("Disclosure package not available: request is {0}")]
    PackageNotReady(RequestState),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for the per-item "missing" error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The underlying error, looking through [`Error::Submission`].
    #[must_use]
    pub fn cause(&self) -> &Self {
        match self {
            Self::Submission { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Id of the registered request, for errors that carry one.
    #[must_use]
    pub const fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Submission { request, .. } => Some(request),
            _ => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
