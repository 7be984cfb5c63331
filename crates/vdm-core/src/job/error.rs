//! Job error taxonomy and classification of transfer failures.

use thiserror::Error;

/// The work size could not be determined. Fatal: the job fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EnumerationError {
    pub message: String,
}

impl EnumerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of a single transfer attempt.
#[derive(Debug, Clone, Error)]
pub enum TransferFailure {
    /// Transient: the remote asked us to slow down. The job waits and retries.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Any other failure. Fatal: the job fails.
    #[error("{0}")]
    Failed(String),
}

impl TransferFailure {
    /// Build a failure from an error message, classifying rate limiting.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_failure(&message) {
            FailureKind::RateLimited => TransferFailure::RateLimited(message),
            FailureKind::Fatal => TransferFailure::Failed(message),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TransferFailure::RateLimited(m) | TransferFailure::Failed(m) => m,
        }
    }
}

/// Progress text that could not be parsed. Never surfaced to the caller.
#[derive(Debug, Clone, Error)]
#[error("unparsable progress text: {text:?}")]
pub struct ProgressParseError {
    pub text: String,
}

impl ProgressParseError {
    pub(crate) fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

/// Retry classification of a failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Fatal,
}

/// Classify a failure message from an external operation.
///
/// Rate limiting is recognised by an HTTP 429 status or a "too many requests"
/// phrase; everything else is fatal.
pub fn classify_failure(message: &str) -> FailureKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("too many requests")
        || lower.contains("http error 429")
        || lower.split(|c: char| !c.is_ascii_digit()).any(|tok| tok == "429")
    {
        FailureKind::RateLimited
    } else {
        FailureKind::Fatal
    }
}
