use clap::Parser;
use exn::ResultExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wpd::error::{ErrorKind, Result};
use wpd::routes::{AppState, router};
use wpd::Downloader;
use wpd_config::Config;
use wpd_generate::PdfToolchain;
use wpd_source::SourceClient;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Overrides `server.bind`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Configuration)?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let cache = wpd_cache::open(&config.cache).await.or_raise(|| ErrorKind::Configuration)?;
    let purge = cache.clone().map(|cache| wpd_cache::spawn_purge(cache, config.cache.expiry()));
    let client = SourceClient::from_config(&config.source, cache).or_raise(|| ErrorKind::Configuration)?;
    let pdf = if config.download.pdf_enabled {
        match PdfToolchain::discover(config.download.bio_max_chars) {
            Ok(toolchain) => Some(Arc::new(toolchain)),
            Err(err) => {
                tracing::warn!(error = ?err, "PDF toolchain unavailable, serving EPUB only");
                None
            },
        }
    } else {
        None
    };

    let downloader = Downloader::new(Arc::new(client), pdf, config.download.clone());
    let app = router(AppState { downloader: Arc::new(downloader) }, config.server.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(config.server.bind.as_str()).await.or_raise(|| ErrorKind::Configuration)?;
    tracing::info!(bind = %config.server.bind, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .or_raise(|| ErrorKind::Internal)?;
    if let Some(purge) = purge {
        purge.abort();
    }
    Ok(())
}
