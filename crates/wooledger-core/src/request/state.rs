//! Disclosure request state machine.
//!
//! ```text
//!            submit             complete
//! Pending ───────────► Processing ───────► Completed
//!    │                     │
//!    │ invalidate/cancel   │ fail
//!    └──────────► Rejected ◄┘
//! ```
//!
//! `Completed` and `Rejected` are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lifecycle state of a disclosure request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Registered, not yet processed.
    #[default]
    Pending,
    /// Search and classification in progress.
    Processing,
    /// Package produced.
    Completed,
    /// Refused: invalid, cancelled, or a dependency was unavailable.
    Rejected,
}

impl RequestState {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Returns `true` for states with no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Applies `event`, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for any pair not in the transition table.
    pub fn transition(self, event: RequestEvent) -> Result<Self> {
        match (self, event) {
            (Self::Pending, RequestEvent::Submit) => Ok(Self::Processing),
            (Self::Pending, RequestEvent::Invalidate | RequestEvent::Cancel)
            | (Self::Processing, RequestEvent::Fail) => Ok(Self::Rejected),
            (Self::Processing, RequestEvent::Complete) => Ok(Self::Completed),
            (from, event) => Err(Error::InvalidTransition { from, event }),
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event driving a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestEvent {
    /// Start processing.
    Submit,
    /// The query failed validation.
    Invalidate,
    /// The caller withdrew the request.
    Cancel,
    /// Processing produced a package.
    Complete,
    /// A dependency was unavailable during processing.
    Fail,
}

impl RequestEvent {
    /// Every event, for exhaustive checks.
    pub const ALL: [Self; 5] = [
        Self::Submit,
        Self::Invalidate,
        Self::Cancel,
        Self::Complete,
        Self::Fail,
    ];
}

impl fmt::Display for RequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Submit => "submit",
            Self::Invalidate => "invalidate",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::Fail => "fail",
        };
        f.write_str(verb)
    }
}
