//! Render Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("chrome/chromium not detected on your system")]
    ChromeNotFound,
    #[display("chrome did not finish within the render timeout")]
    ChromeTimeout,
    /// Chrome exited with a non-zero exit code, or was killed by a signal (`-1`).
    #[display("chrome exited with code: {_0}")]
    ChromeFailed(#[error(not(source))] i32),
    /// The caller gave up; the child process was killed.
    #[display("cancelled while waiting for an external process")]
    Cancelled,
    #[display("chrome exited successfully but wrote no document")]
    EmptyOutput,
    #[display("exiftool not detected on your system")]
    ExifToolNotFound,
    /// ExifTool rejected the tags or the document.
    #[display("exiftool exited with code: {_0}")]
    TaggingFailed(#[error(not(source))] i32),
    /// Asset was not loadable (either file or builtin).
    #[display("asset not found: {_0}")]
    AssetNotFound(#[error(not(source))] String),
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChromeTimeout)
    }
}
