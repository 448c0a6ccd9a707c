/**
 * Error types.
 *
 * `TransportError` is what a `Transport` returns when a round trip could
 * not be completed; its `FailureKind` drives the dispatcher's retry
 * policy. `Error` covers construction-time failures (bad configuration).
 * Nothing in here ever crosses into a collaborator: they only see
 * `Outcome` values.
 */
use std::fmt;

/**
 * Why a round trip failed. Each kind maps to exactly one routing policy in
 * the dispatcher:
 *
 * | kind           | policy             |
 * |----------------|--------------------|
 * | `Encoding`     | advance to next    |
 * | `Timeout`      | retry same later   |
 * | `Io`           | retry same later   |
 * | `Unclassified` | advance to next    |
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request could not be built from the package (URL, header, body).
    Encoding,
    /// Connect or read deadline exceeded.
    Timeout,
    /// Any other network-level failure.
    Io,
    /// Anything else.
    Unclassified,
}

impl FailureKind {
    /// Whether the same package should be sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::Io)
    }

    /// Short cause used in failure messages.
    pub fn reason(&self) -> &'static str {
        match self {
            FailureKind::Encoding => "Failed to encode parameters",
            FailureKind::Timeout => "Request timed out",
            FailureKind::Io => "Request failed",
            FailureKind::Unclassified => "Runtime exception",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// A round trip that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Encoding, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Io, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unclassified, message)
    }
}

/// Construction-time errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("endpoint url cannot carry a path: {0}")]
    NotABase(String),
}
