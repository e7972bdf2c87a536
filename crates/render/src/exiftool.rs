//! Document metadata patching through ExifTool.

use crate::MetadataPatcher;
use crate::chrome::wait_with_timeout;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use rust_embed::Embed;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONFIG_NAME: &str = "exiftool.config";

#[derive(Embed)]
#[folder = "../../assets/exiftool/"]
struct Config;

/// Bibliographic fields written into a PDF's document information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    /// ExifTool date format, `YYYY:MM:DD HH:MM:SS+00:00`.
    pub creation_date: String,
    pub modify_date: String,
    pub keywords: Vec<String>,
    pub language: String,
    pub completed: bool,
    pub mature: bool,
    pub producer: String,
}
impl DocumentMetadata {
    /// Tag assignments in ExifTool's `-Tag=value` form.
    pub fn arguments(&self) -> Vec<String> {
        let flag = |value: bool| if value { "True" } else { "False" };
        [
            ("Author", self.author.clone()),
            ("Title", self.title.clone()),
            // ExifTool reads `$/` as a newline inside tag values.
            ("Subject", self.subject.trim().replace("\r\n", "$/").replace('\n', "$/")),
            ("CreationDate", self.creation_date.clone()),
            ("ModDate", self.modify_date.clone()),
            ("Keywords", self.keywords.join(",")),
            ("Language", self.language.clone()),
            ("Completed", flag(self.completed).to_string()),
            ("MatureContent", flag(self.mature).to_string()),
            ("Producer", self.producer.clone()),
        ]
        .into_iter()
        .map(|(tag, value)| format!("-{tag}={value}"))
        .collect()
    }
}

/// An ExifTool executable plus the user-defined tag configuration it needs
/// for the `Completed` and `MatureContent` fields.
#[derive(Debug)]
pub struct ExifTool {
    executable: PathBuf,
    config: tempfile::NamedTempFile,
    timeout: Duration,
}
impl ExifTool {
    pub fn discover() -> Result<Self> {
        let executable = which::which("exiftool").or_raise(|| ErrorKind::ExifToolNotFound)?;
        tracing::debug!(exiftool = %executable.display(), "Discovered ExifTool executable");
        let embedded = Config::get(CONFIG_NAME).ok_or_raise(|| ErrorKind::AssetNotFound(CONFIG_NAME.to_string()))?;
        let mut config = tempfile::Builder::new().suffix(".config").tempfile().or_raise(|| ErrorKind::Io)?;
        config.write_all(&embedded.data).or_raise(|| ErrorKind::Io)?;
        config.flush().or_raise(|| ErrorKind::Io)?;
        Ok(Self { executable, config, timeout: DEFAULT_TIMEOUT })
    }

    /// Rewrites the document information of `pdf`, returning the patched bytes.
    #[instrument(skip_all, fields(pdf_size = pdf.len(), title = %metadata.title))]
    pub fn tag(&self, pdf: &[u8], metadata: &DocumentMetadata, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().or_raise(|| ErrorKind::Io)?;
        file.write_all(pdf).or_raise(|| ErrorKind::Io)?;
        file.flush().or_raise(|| ErrorKind::Io)?;

        let mut child = Command::new(&self.executable)
            // `-config` is only honoured as the first argument.
            .arg("-config")
            .arg(self.config.path())
            .args(metadata.arguments())
            .arg("-overwrite_original")
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .or_raise(|| ErrorKind::Io)?;
        let Some(status) = wait_with_timeout(&mut child, self.timeout, cancel)? else {
            exn::bail!(ErrorKind::TaggingFailed(-1));
        };
        let mut report = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout.read_to_string(&mut report).or_raise(|| ErrorKind::Io)?;
        }
        if !status.success() {
            exn::bail!(ErrorKind::TaggingFailed(status.code().unwrap_or(-1)));
        }
        // ExifTool exits zero even when it declines to write anything.
        if !report.contains("1 image files updated") {
            tracing::warn!(report = report.trim(), "ExifTool did not update the document");
            exn::bail!(ErrorKind::TaggingFailed(0));
        }
        std::fs::read(file.path()).or_raise(|| ErrorKind::Io)
    }
}

impl MetadataPatcher for ExifTool {
    fn patch(&self, pdf: &[u8], metadata: &DocumentMetadata, cancel: &CancellationToken) -> Result<Vec<u8>> {
        self.tag(pdf, metadata, cancel)
    }
}
