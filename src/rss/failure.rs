//! Normalized fetch-cycle failures.
//!
//! Everything that can go wrong with a remote feed is reduced to a
//! `(reason, message)` pair. Nothing past the fetcher/parser boundary sees a
//! raw transport or XML error.

use std::fmt;

use thiserror::Error;

/// Why a fetch cycle did not produce items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Feed is inactive. Skip condition, not recorded.
    FeedInactive,
    /// Feed is Critical and the manual path honours the health gate. Skip
    /// condition, not recorded.
    FeedCritical,
    /// Unparsable URL, missing host or non-http(s) scheme.
    InvalidUrl,
    /// Target resolves (or may resolve) to a non-public address.
    PrivateIp,
    /// Redirect chain longer than allowed.
    TooManyRedirects,
    /// Connect or read timeout.
    Timeout,
    /// Transport failure other than a timeout.
    ConnectionError,
    /// Non-2xx terminal response or unusable redirect.
    HttpError,
    /// Body larger than the configured cap.
    ResponseTooLarge,
    /// Body empty or whitespace only.
    EmptyResponse,
    /// Body is not a feed document.
    ParseError,
}

impl FailureReason {
    /// Stable snake_case name, shown to operators.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::FeedInactive => "feed_inactive",
            FailureReason::FeedCritical => "feed_critical",
            FailureReason::InvalidUrl => "invalid_url",
            FailureReason::PrivateIp => "private_ip",
            FailureReason::TooManyRedirects => "too_many_redirects",
            FailureReason::Timeout => "timeout",
            FailureReason::ConnectionError => "connection_error",
            FailureReason::HttpError => "http_error",
            FailureReason::ResponseTooLarge => "response_too_large",
            FailureReason::EmptyResponse => "empty_response",
            FailureReason::ParseError => "parse_error",
        }
    }

    /// Skip conditions are reported to the caller but never recorded
    /// against the feed's health.
    pub fn is_skip(&self) -> bool {
        matches!(self, FailureReason::FeedInactive | FailureReason::FeedCritical)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A normalized failure: reason plus operator-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}: {message}")]
pub struct FetchFailure {
    /// Failure category.
    pub reason: FailureReason,
    /// Human-readable detail, stored as the feed's `last_error`.
    pub message: String,
}

impl FetchFailure {
    /// Create a failure.
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Result of a fetcher or parser step.
pub type FetchResult<T> = std::result::Result<T, FetchFailure>;
