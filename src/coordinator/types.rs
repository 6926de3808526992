// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the Mobana coordinator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attribution::{Attribution, AttributionRecord};
use crate::remote::ApiError;

/// Configuration lifecycle state.
///
/// ```text
/// Unconfigured ──init(valid)──► Configured
///      ▲                            │
///      └──────init(invalid)─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    /// `init` has not run, or ran with missing credentials
    Unconfigured,
    /// Credentials present; operations are live
    Configured,
}

impl std::fmt::Display for ConfigState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "Unconfigured"),
            Self::Configured => write!(f, "Configured"),
        }
    }
}

/// Why an attribution could not be resolved.
///
/// None of these are cached: the next call retries.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributionError {
    #[error("network error")]
    Network,
    #[error("request timed out")]
    Timeout,
    #[error("server error (status {status})")]
    Server { status: u16 },
    #[error("SDK not configured")]
    NotConfigured,
    #[error("SDK disabled")]
    Disabled,
    #[error("unexpected response")]
    Unknown,
}

impl From<ApiError> for AttributionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(_) => Self::Network,
            ApiError::Timeout => Self::Timeout,
            ApiError::Server { status } => Self::Server { status },
            ApiError::InvalidResponse(_) => Self::Unknown,
        }
    }
}

/// Result of [`super::Mobana::get_attribution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttributionResult {
    /// The install was attributed to a campaign
    Matched { attribution: Attribution },
    /// Definitive answer: organic install
    NoMatch,
    /// Transient or configuration failure
    Error { error: AttributionError },
}

impl AttributionResult {
    pub fn error(error: AttributionError) -> Self {
        Self::Error { error }
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Matched { .. } => "matched",
            Self::NoMatch => "no_match",
            Self::Error { .. } => "error",
        }
    }

    #[must_use]
    pub fn attribution(&self) -> Option<&Attribution> {
        match self {
            Self::Matched { attribution } => Some(attribution),
            _ => None,
        }
    }

    /// Matched or no-match, as opposed to an error.
    #[must_use]
    pub fn is_definitive(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }
}

/// A definitive answer held in memory.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resolved {
    Matched(Attribution),
    NoMatch,
}

impl From<Resolved> for AttributionResult {
    fn from(resolved: Resolved) -> Self {
        match resolved {
            Resolved::Matched(attribution) => Self::Matched { attribution },
            Resolved::NoMatch => Self::NoMatch,
        }
    }
}

impl From<AttributionRecord> for Resolved {
    fn from(record: AttributionRecord) -> Self {
        match record.attribution {
            Some(attribution) if record.matched => Self::Matched(attribution),
            _ => Self::NoMatch,
        }
    }
}

/// Options for [`super::Mobana::get_attribution`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributionOptions {
    /// Overrides the configured request timeout
    pub timeout: Option<Duration>,
}

impl AttributionOptions {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

/// Result of a conversion queue flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushResult {
    /// Events read from the queue
    pub total: usize,
    /// Events the server accepted
    pub succeeded: usize,
    /// Events put back on the queue
    pub failed: usize,
}

impl FlushResult {
    /// Check if every event was delivered
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
