//! Provider trait and error taxonomy for the fallback chain.
//!
//! A [`BarProvider`] abstracts one market-data vendor. Vendor HTTP clients
//! live outside this crate; they only need to map their failures onto
//! [`ProviderError`] so the chain can decide whether to fall back.

use crate::domain::Bar;
use crate::time::Interval;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message fragments that mark a status-less failure as transport level.
const TRANSPORT_KEYWORDS: [&str; 12] = [
    "timeout",
    "timed out",
    "network",
    "connection",
    "connect",
    "reset",
    "refused",
    "unreachable",
    "dns",
    "socket",
    "broken pipe",
    "eof",
];

/// Failure reported by a provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// HTTP status, when the vendor answered at all.
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn call_timeout(after: std::time::Duration) -> Self {
        Self::transport(format!("call timed out after {} ms", after.as_millis()))
    }

    /// 429, any 5xx, or a transport failure (no status, network/timeout wording).
    pub fn is_retryable(&self) -> bool {
        match self.status {
            Some(429) => true,
            Some(status) => status >= 500,
            None => {
                let message = self.message.to_ascii_lowercase();
                TRANSPORT_KEYWORDS.iter().any(|k| message.contains(k))
            }
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Which side of the chain served (or failed) a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Primary,
    Secondary,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Primary => "primary",
            ProviderKind::Secondary => "secondary",
        })
    }
}

/// Errors surfaced by [`FallbackChain::get_bars`](super::FallbackChain::get_bars).
#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("invalid symbol {0:?}")]
    InvalidSymbol(String),

    #[error("unsupported resolution {0:?}")]
    UnsupportedResolution(String),

    #[error("resolution {0:?} is finer than the one-minute bars providers expose")]
    ResolutionTooFine(String),

    #[error("invalid range: {from} is after {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    /// Non-retryable failure, surfaced without falling back.
    #[error("{kind} provider {name} failed: {source}")]
    Provider {
        kind: ProviderKind,
        name: String,
        #[source]
        source: ProviderError,
    },

    #[error(
        "all providers failed: primary: {primary}; secondary after {attempts} attempt(s): {}",
        describe(.secondary)
    )]
    Exhausted {
        primary: ProviderError,
        secondary: Option<ProviderError>,
        attempts: u32,
    },

    #[error(
        "deadline exceeded after {attempts} fallback attempt(s) (primary: {}; secondary: {})",
        describe(.primary),
        describe(.secondary)
    )]
    DeadlineExceeded {
        primary: Option<ProviderError>,
        secondary: Option<ProviderError>,
        attempts: u32,
    },
}

impl DataError {
    /// Caller mistakes: never retried, never sent to a provider.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DataError::InvalidSymbol(_)
                | DataError::UnsupportedResolution(_)
                | DataError::ResolutionTooFine(_)
                | DataError::InvalidRange { .. }
        )
    }
}

fn describe(err: &Option<ProviderError>) -> String {
    match err {
        Some(e) => e.to_string(),
        None => "not attempted".to_string(),
    }
}

/// One market-data vendor.
///
/// Implementations receive an already-canonical [`Interval`] and return bars
/// stamped with their bucket start.
#[async_trait]
pub trait BarProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ProviderError>;
}
