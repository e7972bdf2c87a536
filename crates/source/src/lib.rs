//! Client for the remote story API.
//!
//! Fetches work metadata, the per-work chapter archive, reading lists, and
//! images. Every call is wrapped in exponential backoff bounded by a total
//! time ceiling and, unless credentials are involved, served through the
//! shared [`ResponseCache`](wpd_cache::ResponseCache).
//!
//! # Layers
//! - [`Transport`]: sends one request. [`HttpTransport`] is the production
//!   implementation; `mock::MockTransport` (feature `mock`) answers from a
//!   table for tests.
//! - [`RetryPolicy`]: decides whether and when to try again.
//! - [`SourceClient`]: endpoint URLs, cache policy, and mapping of API error
//!   codes onto [`ErrorKind`](error::ErrorKind).

mod archive;
mod client;
mod credentials;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod models;
mod retry;
mod transport;

#[cfg(any(test, feature = "mock"))]
pub use crate::archive::build_archive;
pub use crate::archive::ChapterArchive;
pub use crate::client::{CachePolicy, SourceClient};
pub use crate::credentials::Credentials;
pub use crate::retry::RetryPolicy;
pub use crate::transport::{HttpTransport, Method, Request, Response, Transport};
