//! Downloader Error Types
//!
//! Errors raised by the lower crates are re-raised here under one of a small
//! set of kinds, keeping the original `Exn` tree as a child. Each kind maps
//! onto exactly one client-facing response.

use axum::http::StatusCode;
use derive_more::{Display, Error};
use wpd_generate::error::{Error as GenerateError, ErrorKind as GenerateErrorKind};
use wpd_source::error::{Error as SourceError, ErrorKind as SourceErrorKind};

/// A downloader error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for downloader operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The work, chapter or reading list does not exist.
    #[display("content not found")]
    NotFound,
    #[display("remote API is rate limiting")]
    RateLimited,
    #[display("login rejected")]
    InvalidCredentials,
    /// Only one half of the username/password pair was given.
    #[display("incomplete credentials")]
    MissingCredentials,
    /// The cover or the author avatar could not be fetched.
    #[display("required asset unavailable")]
    AssetUnavailable,
    #[display("document rendering failed")]
    RenderFailure,
    /// PDF output was requested but is disabled in this deployment.
    #[display("output format disabled")]
    FormatDisabled,
    #[display("configuration error")]
    Configuration,
    /// The remote API failed in a way that is not the client's fault.
    #[display("upstream failure")]
    Upstream,
    /// The client went away before the download finished.
    #[display("download cancelled")]
    Cancelled,
    #[display("internal error")]
    Internal,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Upstream)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidCredentials | Self::FormatDisabled => StatusCode::FORBIDDEN,
            Self::MissingCredentials => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, human-readable explanation shown to the client.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "That story does not exist, or it has been deleted.",
            Self::RateLimited => "The story site is overloaded right now. Please try again in a few minutes.",
            Self::InvalidCredentials => "Those credentials were rejected. Check your username and password.",
            Self::MissingCredentials => "Include both a username and a password, or neither.",
            Self::AssetUnavailable => "The cover or author picture for this story could not be downloaded.",
            Self::FormatDisabled => "PDF downloads are disabled on this server.",
            Self::Cancelled => "The download was cancelled.",
            _ => "Something went wrong while building your download. Please try again later.",
        }
    }

    /// Re-raises a source client error, keeping its tree as a child.
    #[track_caller]
    pub fn source(err: SourceError) -> Error {
        let kind = match &*err {
            SourceErrorKind::WorkNotFound | SourceErrorKind::ChapterNotFound | SourceErrorKind::ListNotFound => {
                Self::NotFound
            },
            SourceErrorKind::RateLimited => Self::RateLimited,
            SourceErrorKind::InvalidCredentials => Self::InvalidCredentials,
            SourceErrorKind::ImageUnavailable => Self::AssetUnavailable,
            SourceErrorKind::Transport
            | SourceErrorKind::UnexpectedStatus(_)
            | SourceErrorKind::InvalidResponse
            | SourceErrorKind::InvalidArchive => Self::Upstream,
        };
        err.raise(kind)
    }

    /// Re-raises a generator error, keeping its tree as a child.
    #[track_caller]
    pub fn generate(err: GenerateError) -> Error {
        let kind = match &*err {
            GenerateErrorKind::UnknownLicense(_) => Self::Configuration,
            GenerateErrorKind::Render | GenerateErrorKind::Tagging => Self::RenderFailure,
            GenerateErrorKind::Cancelled => Self::Cancelled,
            GenerateErrorKind::NotCompiled | GenerateErrorKind::Archive | GenerateErrorKind::Template => Self::Internal,
        };
        err.raise(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SourceErrorKind::WorkNotFound, ErrorKind::NotFound)]
    #[case(SourceErrorKind::ChapterNotFound, ErrorKind::NotFound)]
    #[case(SourceErrorKind::ListNotFound, ErrorKind::NotFound)]
    #[case(SourceErrorKind::RateLimited, ErrorKind::RateLimited)]
    #[case(SourceErrorKind::InvalidCredentials, ErrorKind::InvalidCredentials)]
    #[case(SourceErrorKind::Transport, ErrorKind::Upstream)]
    #[case(SourceErrorKind::UnexpectedStatus(502), ErrorKind::Upstream)]
    #[case(SourceErrorKind::ImageUnavailable, ErrorKind::AssetUnavailable)]
    fn source_kinds(#[case] source: SourceErrorKind, #[case] expected: ErrorKind) {
        assert_eq!(*ErrorKind::source(exn::Exn::new(source)), expected);
    }

    #[rstest]
    #[case(GenerateErrorKind::UnknownLicense(42), ErrorKind::Configuration)]
    #[case(GenerateErrorKind::Render, ErrorKind::RenderFailure)]
    #[case(GenerateErrorKind::Tagging, ErrorKind::RenderFailure)]
    #[case(GenerateErrorKind::Archive, ErrorKind::Internal)]
    #[case(GenerateErrorKind::Cancelled, ErrorKind::Cancelled)]
    fn generate_kinds(#[case] generate: GenerateErrorKind, #[case] expected: ErrorKind) {
        assert_eq!(*ErrorKind::generate(exn::Exn::new(generate)), expected);
    }

    #[rstest]
    #[case(ErrorKind::NotFound, 404)]
    #[case(ErrorKind::RateLimited, 429)]
    #[case(ErrorKind::InvalidCredentials, 403)]
    #[case(ErrorKind::MissingCredentials, 422)]
    #[case(ErrorKind::FormatDisabled, 403)]
    #[case(ErrorKind::RenderFailure, 500)]
    #[case(ErrorKind::Upstream, 500)]
    fn statuses(#[case] kind: ErrorKind, #[case] expected: u16) {
        assert_eq!(kind.status().as_u16(), expected);
    }

    #[rstest]
    #[case(ErrorKind::RateLimited, true)]
    #[case(ErrorKind::Upstream, true)]
    #[case(ErrorKind::NotFound, false)]
    #[case(ErrorKind::Cancelled, false)]
    #[case(ErrorKind::RenderFailure, false)]
    fn retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }
}
