//! Configuration Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// One of the configuration sources could not be read or parsed.
    #[display("could not load configuration")]
    Load,
    /// The configuration parsed, but the combination of values is invalid.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// No sensible default location exists on this platform.
    #[display("could not determine a cache directory for this platform")]
    NoCacheDirectory,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
