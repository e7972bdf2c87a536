//! The download pipeline: metadata, content, normalization, images,
//! compilation. Streaming is handled by [`throttle`](crate::throttle).

use crate::error::{ErrorKind, Result};
use crate::images::resolve_images;
use crate::job::{Job, Stage};
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tracing::instrument;
use wpd_config::DownloadConfig;
use wpd_generate::{
    EpubGenerator, GeneratedDocument, Generator, LicensingPolicy, Manuscript, PdfGenerator, PdfToolchain, slug,
};
use wpd_normalize::{ChapterTree, normalize};
use wpd_source::models::Work;
use wpd_source::{Credentials, SourceClient};
use zip::write::SimpleFileOptions;

const ZIP_MEDIA_TYPE: &str = "application/zip";

/// What the requested identifier refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// A work id.
    #[default]
    Story,
    /// A chapter id; the owning work is looked up first.
    Part,
    /// A reading list id; every member work is downloaded.
    Collection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Epub,
    Pdf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadRequest {
    pub id: u64,
    pub mode: Mode,
    pub format: Format,
    pub download_images: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DownloadRequest {
    pub fn new(id: u64, mode: Mode, format: Format) -> Self {
        Self { id, mode, format, ..Default::default() }
    }

    pub fn with_images(mut self, download_images: bool) -> Self {
        self.download_images = download_images;
        self
    }

    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Runs download requests against one shared [`SourceClient`].
pub struct Downloader {
    client: Arc<SourceClient>,
    pdf: Option<Arc<PdfToolchain>>,
    config: DownloadConfig,
}

impl Downloader {
    /// `pdf` is `None` when PDF output is disabled or unavailable.
    pub fn new(client: Arc<SourceClient>, pdf: Option<Arc<PdfToolchain>>, config: DownloadConfig) -> Self {
        Self { client, pdf, config }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Runs `request` to a finished document, or stops early once `job` is
    /// cancelled. No further remote calls are made after cancellation.
    #[instrument(skip_all, fields(id = request.id, mode = ?request.mode, format = ?request.format, images = request.download_images))]
    pub async fn run(&self, request: &DownloadRequest, job: &Job) -> Result<GeneratedDocument> {
        tokio::select! {
            biased;
            () = job.cancelled() => {
                tracing::info!(stage = ?job.stage(), "Download cancelled");
                job.advance(Stage::Cancelled);
                exn::bail!(ErrorKind::Cancelled);
            },
            result = self.pipeline(request, job) => result,
        }
    }

    async fn pipeline(&self, request: &DownloadRequest, job: &Job) -> Result<GeneratedDocument> {
        if request.format == Format::Pdf && self.pdf.is_none() {
            exn::bail!(ErrorKind::FormatDisabled);
        }
        let credentials = self.login(request).await?;
        let credentials = credentials.as_ref();
        match request.mode {
            Mode::Story => {
                let work = self.client.fetch_work(request.id, credentials).await.map_err(ErrorKind::source)?;
                self.build(work, request, credentials, job).await
            },
            Mode::Part => {
                let (_, work) =
                    self.client.fetch_work_from_chapter_id(request.id, credentials).await.map_err(ErrorKind::source)?;
                self.build(work, request, credentials, job).await
            },
            Mode::Collection => self.batch(request, credentials, job).await,
        }
    }

    /// Logs in when both halves of the credential pair are present.
    async fn login(&self, request: &DownloadRequest) -> Result<Option<Credentials>> {
        fn present(s: &Option<String>) -> Option<&str> {
            s.as_deref().filter(|s| !s.is_empty())
        }
        match (present(&request.username), present(&request.password)) {
            (Some(username), Some(password)) => {
                let credentials = self.client.login(username, password).await.map_err(ErrorKind::source)?;
                Ok(Some(credentials))
            },
            (None, None) => Ok(None),
            _ => exn::bail!(ErrorKind::MissingCredentials),
        }
    }

    /// Builds one document per list member and packs them into a zip. Each
    /// member reports its stages on its own [`Job::member`]; the batch job
    /// itself moves from [`Stage::MetadataFetched`] (list fetched) to
    /// [`Stage::Compiled`] (archive written).
    async fn batch(
        &self,
        request: &DownloadRequest,
        credentials: Option<&Credentials>,
        job: &Job,
    ) -> Result<GeneratedDocument> {
        let list = self.client.fetch_list(request.id, credentials).await.map_err(ErrorKind::source)?;
        tracing::info!(list = list.id, works = list.works.len(), "Downloading reading list");
        job.advance(Stage::MetadataFetched);
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        // Documents are already compressed.
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for work_id in &list.works {
            let work = self.client.fetch_work(*work_id, credentials).await.map_err(ErrorKind::source)?;
            let document = self.build(work, request, credentials, &job.member()).await?;
            writer.start_file(document.filename.as_str(), options).or_raise(|| ErrorKind::Internal)?;
            writer.write_all(&document.bytes).or_raise(|| ErrorKind::Internal)?;
        }
        let bytes = writer.finish().or_raise(|| ErrorKind::Internal)?.into_inner();
        job.advance(Stage::Compiled);
        Ok(GeneratedDocument {
            bytes,
            media_type: ZIP_MEDIA_TYPE,
            filename: format!("{}_{}.zip", slug(&list.name), list.id),
        })
    }

    #[instrument(skip_all, fields(work = work.id, chapters = work.parts.len()))]
    async fn build(
        &self,
        work: Work,
        request: &DownloadRequest,
        credentials: Option<&Credentials>,
        job: &Job,
    ) -> Result<GeneratedDocument> {
        job.advance(Stage::MetadataFetched);
        let archive = self.client.fetch_chapter_archive(work.id, credentials).await.map_err(ErrorKind::source)?;
        job.advance(Stage::ContentFetched);

        let cover = self.fetch_asset(&work.cover).await?;
        let (avatar, badge) = match request.format {
            Format::Pdf => {
                let avatar = self.fetch_asset(&work.user.avatar_full_size()).await?;
                (Some(avatar), self.fetch_badge(&work).await)
            },
            Format::Epub => (None, None),
        };

        let chapters: Vec<ChapterTree> = work
            .live_chapters()
            .map(|(_, chapter)| match archive.get(chapter.id) {
                Some(raw) => normalize(chapter.id, &chapter.title, raw),
                None => {
                    tracing::warn!(chapter = chapter.id, "Chapter missing from archive, compiling it empty");
                    ChapterTree::empty(chapter.id, chapter.title.as_str())
                },
            })
            .collect();
        job.advance(Stage::Normalized);

        let images = if request.download_images {
            let mut images = Vec::with_capacity(chapters.len());
            for chapter in &chapters {
                images.push(resolve_images(&self.client, chapter, self.config.image_batch_size).await);
            }
            job.advance(Stage::ImagesResolved);
            Some(images)
        } else {
            None
        };

        let manuscript = Manuscript { work, chapters, cover, avatar, badge, images };
        let mut generator = self.generator(request.format, manuscript)?;
        // Runs on after `run` has returned on cancellation, until the token
        // stops it.
        let cancel = job.token();
        let document = tokio::task::spawn_blocking(move || {
            generator.compile(&cancel)?;
            generator.dump()
        })
        .await
        .or_raise(|| ErrorKind::Internal)?
        .map_err(ErrorKind::generate)?;
        tracing::info!(filename = %document.filename, bytes = document.bytes.len(), "Compiled document");
        job.advance(Stage::Compiled);
        Ok(document)
    }

    fn generator(&self, format: Format, manuscript: Manuscript) -> Result<Box<dyn Generator>> {
        Ok(match format {
            Format::Epub => Box::new(EpubGenerator::new(manuscript)),
            Format::Pdf => {
                let toolchain = self.pdf.clone().ok_or_raise(|| ErrorKind::FormatDisabled)?;
                Box::new(PdfGenerator::new(manuscript, toolchain))
            },
        })
    }

    /// Fetches the cover or avatar. Without either the document cannot be
    /// produced, so failure here ends the request.
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>> {
        if url.is_empty() {
            exn::bail!(ErrorKind::AssetUnavailable);
        }
        let bytes = self.client.fetch_image(url, false).await.or_raise(|| ErrorKind::AssetUnavailable)?;
        if bytes.is_empty() {
            tracing::warn!(url, "Asset fetch returned no bytes");
            exn::bail!(ErrorKind::AssetUnavailable);
        }
        Ok(bytes)
    }

    /// Fetches the licensing badge through the shared cache; only a handful
    /// of badges exist. The document is still complete without it.
    async fn fetch_badge(&self, work: &Work) -> Option<Vec<u8>> {
        let url = LicensingPolicy::lookup(work.copyright)?.badge_url()?;
        match self.client.fetch_image(&url, true).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                tracing::warn!(url, "Licensing badge was empty, leaving it out");
                None
            },
            Err(err) => {
                tracing::warn!(url, error = ?err, "Licensing badge unavailable, leaving it out");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wpd_config::SourceConfig;
    use wpd_source::build_archive;
    use wpd_source::mock::{MockReply, MockTransport};

    const BASE: &str = "https://api.test";

    fn downloader(transport: &Arc<MockTransport>) -> Downloader {
        let config = SourceConfig { base_url: BASE.to_string(), retry_ceiling_secs: 0, ..Default::default() };
        let client = SourceClient::new(transport.clone(), None, &config);
        Downloader::new(Arc::new(client), None, DownloadConfig::default())
    }

    #[tokio::test]
    async fn half_a_login_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let request = DownloadRequest { username: Some("reader".into()), ..DownloadRequest::new(1, Mode::Story, Format::Epub) };
        let err = downloader(&transport).run(&request, &Job::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::MissingCredentials);
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn pdf_disabled() {
        let transport = Arc::new(MockTransport::new());
        let request = DownloadRequest::new(1, Mode::Story, Format::Pdf);
        let err = downloader(&transport).run(&request, &Job::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::FormatDisabled);
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn rejected_login_is_forbidden() {
        let transport = Arc::new(MockTransport::new());
        transport.set_route(format!("{BASE}/auth/login?nextUrl=%2F&_data=routes%2Fauth.login"), MockReply::status(400, ""));
        let request = DownloadRequest::new(1, Mode::Story, Format::Epub).with_login("reader", "wrong");
        let err = downloader(&transport).run(&request, &Job::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidCredentials);
    }

    #[tokio::test]
    async fn missing_cover_stops_before_generation() {
        let transport = Arc::new(MockTransport::new());
        let mut work = serde_json::json!({
            "id": "5",
            "title": "Coverless",
            "createDate": "2024-08-14T16:01:58Z",
            "modifyDate": "2024-09-01T08:00:00Z",
            "language": { "name": "English" },
            "user": { "username": "someone", "avatar": "", "description": "" },
            "cover": "https://img.test/cover.jpg",
            "parts": [{ "id": 50, "title": "One" }],
            "copyright": 1
        });
        transport.set_route(format!("{BASE}/api/v3/stories/5?fields={}", wpd_source::models::WORK_FIELDS), MockReply::json(&work));
        transport.set_route(
            format!("{BASE}/apiv2/?m=storytext&group_id=5&output=zip"),
            MockReply::ok(build_archive(&[("50.html", "<p>Text.</p>")])),
        );
        transport.set_route("https://img.test/cover.jpg", MockReply::ok(Vec::new()));
        let job = Job::new();
        let err = downloader(&transport).run(&DownloadRequest::new(5, Mode::Story, Format::Epub), &job).await.unwrap_err();
        assert_eq!(*err, ErrorKind::AssetUnavailable);
        assert_eq!(job.stage(), Stage::ContentFetched);

        work["cover"] = serde_json::Value::String(String::new());
        transport.set_route(format!("{BASE}/api/v3/stories/5?fields={}", wpd_source::models::WORK_FIELDS), MockReply::json(&work));
        let err = downloader(&transport).run(&DownloadRequest::new(5, Mode::Story, Format::Epub), &Job::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::AssetUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_remote_calls() {
        let transport = Arc::new(MockTransport::new().with_latency(Duration::from_secs(1)));
        let downloader = Arc::new(downloader(&transport));
        let job = Job::new();
        let task = tokio::spawn({
            let downloader = downloader.clone();
            let job = job.clone();
            async move { downloader.run(&DownloadRequest::new(9, Mode::Story, Format::Epub), &job).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        job.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(*err, ErrorKind::Cancelled);
        assert_eq!(job.stage(), Stage::Cancelled);
        let calls = transport.total_calls();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.total_calls(), calls);
    }
}
