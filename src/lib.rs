//! Story downloader service.
//!
//! [`Downloader`] drives one request through the pipeline: fetch metadata and
//! the chapter archive, normalize each chapter, optionally resolve its
//! images, and compile an EPUB or PDF. [`routes`] exposes it over HTTP and
//! streams the result at a bounded rate via [`throttle`](throttle::throttle).

mod download;
pub mod error;
mod images;
mod job;
pub mod routes;
pub mod throttle;

pub use crate::download::{DownloadRequest, Downloader, Format, Mode};
pub use crate::images::resolve_images;
pub use crate::job::{Job, Stage};
