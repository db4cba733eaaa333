use thiserror::Error;

/// Failures surfaced by the message backend and the feed core.
///
/// Payloads are plain strings so the error can be stored in feed state and
/// handed to the UI more than once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// A fetch, insert, write or subscribe call did not complete.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The referenced message or conversation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller has no valid session.
    #[error("unauthenticated")]
    Unauthenticated,
}

impl FeedError {
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::NetworkFailure(err.to_string())
    }

    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }
}
