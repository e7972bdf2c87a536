//! Layered configuration for the downloader.
//!
//! Values are merged, lowest priority first, from compiled defaults, an
//! optional configuration file (TOML, YAML or JSON chosen by extension), and
//! finally environment variables prefixed with `WPD_`. Nested keys use a
//! double underscore in the environment: `WPD_CACHE__BACKEND=memory`.
//!
//! The resulting [`Config`] is validated once and then handed to whichever
//! component needs it. Nothing in this crate holds global state.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "WPD_";
const CONFIG_FILE_STEM: &str = "config";

/// Browser identification sent with every outgoing request. The remote API
/// blocks obviously non-browser clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/103.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub source: SourceConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP server listens on.
    pub bind: String,
    /// Directory of static frontend assets, served for any unmatched route.
    pub static_dir: Option<PathBuf>,
}
impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8086".to_string(), static_dir: None }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    /// Database file for the `sqlite` backend. Defaults to the platform
    /// cache directory when unset.
    pub path: Option<PathBuf>,
    pub expiry_secs: u64,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::default(),
            path: None,
            // 12 hours
            expiry_secs: 43_200,
        }
    }
}
impl CacheConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }

    /// Location of the SQLite database, falling back to the platform cache
    /// directory (e.g. `~/.cache/wpd/responses.sqlite`).
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("", "", "wpd").ok_or_raise(|| ErrorKind::NoCacheDirectory)?;
        Ok(dirs.cache_dir().join("responses.sqlite"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Total time budget for retrying a single call, including backoff.
    pub retry_ceiling_secs: u64,
    pub request_timeout_secs: u64,
}
impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.wattpad.com".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry_ceiling_secs: 15,
            request_timeout_secs: 30,
        }
    }
}
impl SourceConfig {
    pub fn retry_ceiling(&self) -> Duration {
        Duration::from_secs(self.retry_ceiling_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// PDF output needs Chrome and ExifTool installed; deployments without
    /// them switch it off.
    pub pdf_enabled: bool,
    pub image_batch_size: usize,
    pub bio_max_chars: usize,
    pub stream_chunk_bytes: usize,
    pub stream_chunk_delay_ms: u64,
    /// Upper bound on how long streaming any single document may take.
    /// Chunks are widened for large documents to stay under it.
    pub stream_max_secs: u64,
}
impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            pdf_enabled: true,
            image_batch_size: 3,
            bio_max_chars: 400,
            stream_chunk_bytes: 64 * 1024,
            stream_chunk_delay_ms: 25,
            stream_max_secs: 20,
        }
    }
}
impl DownloadConfig {
    pub fn stream_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.stream_chunk_delay_ms)
    }

    pub fn stream_max(&self) -> Duration {
        Duration::from_secs(self.stream_max_secs)
    }
}

impl Config {
    /// Loads configuration from defaults, an optional file, and the
    /// environment. When `path` is `None`, a `config.{toml,yaml,yml,json}` in
    /// the platform configuration directory is used if one exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => figment = Self::merge_file(figment, path)?,
            None => {
                if let Some(dirs) = ProjectDirs::from("", "", "wpd") {
                    for ext in ["toml", "yaml", "yml", "json"] {
                        let candidate = dirs.config_dir().join(format!("{CONFIG_FILE_STEM}.{ext}"));
                        if candidate.is_file() {
                            tracing::debug!(path = %candidate.display(), "Discovered configuration file");
                            figment = Self::merge_file(figment, &candidate)?;
                            break;
                        }
                    }
                }
            },
        }
        let config: Config = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
        if !path.is_file() {
            exn::bail!(ErrorKind::Invalid(format!("configuration file not found: {}", path.display())));
        }
        Ok(match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Toml::file(path)),
        })
    }

    /// Rejects combinations of values that would otherwise be silently ignored.
    pub fn validate(&self) -> Result<()> {
        if self.cache.backend == CacheBackend::Memory && self.cache.path.is_some() {
            exn::bail!(ErrorKind::Invalid(
                "cache.path provided while the memory cache is selected; set cache.backend = \"sqlite\" to use a file".into()
            ));
        }
        if self.download.image_batch_size == 0 {
            exn::bail!(ErrorKind::Invalid("download.image_batch_size must be at least 1".into()));
        }
        if self.download.stream_chunk_bytes == 0 {
            exn::bail!(ErrorKind::Invalid("download.stream_chunk_bytes must be at least 1".into()));
        }
        if self.source.base_url.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("source.base_url must not be empty".into()));
        }
        Ok(())
    }
}
