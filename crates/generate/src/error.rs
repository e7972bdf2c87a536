//! Generator Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// `dump` was called before a successful `compile`.
    #[display("document has not been compiled")]
    NotCompiled,
    /// The work names a licensing policy outside the known table.
    #[display("unknown licensing policy: {_0}")]
    UnknownLicense(#[error(not(source))] u8),
    #[display("could not write the document archive")]
    Archive,
    #[display("could not populate the document template")]
    Template,
    #[display("layout engine failed")]
    Render,
    #[display("metadata patch failed")]
    Tagging,
    /// The request was abandoned while compiling.
    #[display("compilation cancelled")]
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}
