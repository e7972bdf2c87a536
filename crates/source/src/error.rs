//! Source Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Domain-level failures reported by the remote API ("this story does not
//! exist") are kept apart from transport failures so that callers can show
//! the right message and so that the retry loop leaves them alone.

use derive_more::{Display, Error};

/// A source error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure or timeout before a response arrived.
    #[display("transport error")]
    Transport,
    #[display("work not found")]
    WorkNotFound,
    #[display("chapter not found")]
    ChapterNotFound,
    #[display("reading list not found")]
    ListNotFound,
    /// The remote API is shedding load.
    #[display("rate limited by remote API")]
    RateLimited,
    #[display("login rejected")]
    InvalidCredentials,
    #[display("unexpected response status {_0}")]
    UnexpectedStatus(#[error(not(source))] u16),
    /// A successful response whose body did not match the expected shape.
    #[display("invalid response body")]
    InvalidResponse,
    #[display("invalid chapter archive")]
    InvalidArchive,
    #[display("image unavailable")]
    ImageUnavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport | Self::RateLimited => true,
            Self::UnexpectedStatus(status) => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` for the "this thing does not exist" family.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::WorkNotFound | Self::ChapterNotFound | Self::ListNotFound)
    }
}
