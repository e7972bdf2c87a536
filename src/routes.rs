//! HTTP surface.

use crate::download::{DownloadRequest, Downloader, Format, Mode};
use crate::error::{Error, ErrorKind};
use crate::job::Job;
use crate::throttle::{Pace, throttle};
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use exn::ResultExt;
use serde::Deserialize;
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::services::ServeDir;

#[derive(Clone)]
pub struct AppState {
    pub downloader: Arc<Downloader>,
}

/// Query string of `GET /download/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub download_images: bool,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub format: Format,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DownloadParams {
    fn into_request(self, id: u64) -> DownloadRequest {
        DownloadRequest {
            id,
            mode: self.mode,
            format: self.format,
            download_images: self.download_images,
            username: self.username,
            password: self.password,
        }
    }
}

/// Error response: the kind picks the status and the message, the full tree
/// only goes to the log.
pub struct Failure(Error);

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let kind = *self.0;
        if kind.status().is_server_error() {
            tracing::error!(error = ?self.0, retryable = kind.is_retryable(), "Download failed");
        } else {
            tracing::info!(error = %kind, retryable = kind.is_retryable(), "Download refused");
        }
        (kind.status(), Html(format!("<p class=\"error\">{}</p>", kind.message()))).into_response()
    }
}

pub fn router(state: AppState, static_dir: Option<&FsPath>) -> Router {
    let router = Router::new().route("/download/{id}", get(download)).with_state(state);
    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

/// Runs the pipeline on its own task so that a client hanging up cancels it
/// through the job's drop guard instead of silently abandoning it.
async fn download(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, Failure> {
    let request = params.into_request(id);
    let job = Job::new();
    let guard = job.cancel_on_drop();
    let task = tokio::spawn({
        let downloader = state.downloader.clone();
        let job = job.clone();
        async move { downloader.run(&request, &job).await }
    });
    let document = task.await.or_raise(|| ErrorKind::Internal)??;
    let _ = guard.disarm();

    let disposition = format!("attachment; filename=\"{}\"", document.filename);
    let pace = Pace::from(state.downloader.config());
    let body = Body::from_stream(throttle(document.bytes, pace, job));
    Ok((
        [
            (header::CONTENT_TYPE, document.media_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
