//! External collaborators of the PDF pipeline: a headless Chrome layout
//! engine and an ExifTool metadata patcher.
//!
//! Both run as child processes and block, so callers on an async runtime
//! should invoke them from a blocking task. Each takes a cancellation token;
//! the child is killed as soon as it fires.

mod chrome;
pub mod error;
mod exiftool;
mod render;
mod style;

use crate::chrome::Chrome;
use crate::error::Result;
pub use crate::exiftool::{DocumentMetadata, ExifTool};
pub use crate::style::{CssVariables, StyleConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Turns a complete HTML document into paginated bytes.
pub trait LayoutEngine: Send + Sync {
    fn render(&self, html: &str, variables: &CssVariables, cancel: &CancellationToken) -> Result<Vec<u8>>;
}

/// Writes bibliographic metadata into an already rendered document.
pub trait MetadataPatcher: Send + Sync {
    fn patch(&self, pdf: &[u8], metadata: &DocumentMetadata, cancel: &CancellationToken) -> Result<Vec<u8>>;
}

/// Chrome-backed [`LayoutEngine`].
#[derive(Debug, Clone)]
pub struct Renderer {
    chrome: Chrome,
    styles: StyleConfig,
    timeout: Duration,
}
impl Renderer {
    /// Discovers Chrome on the system.
    pub fn new(styles: StyleConfig) -> Result<Self> {
        Ok(Self { chrome: Chrome::discover()?, styles, timeout: DEFAULT_TIMEOUT })
    }
}
