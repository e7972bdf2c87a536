use crate::archive::ChapterArchive;
use crate::credentials::Credentials;
use crate::error::{ErrorKind, Result};
use crate::models::{ApiError, ChapterLookup, RawReadingList, ReadingList, WORK_FIELDS, Work};
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, Request, Response, Transport};
use exn::ResultExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::instrument;
use wpd_cache::{CacheKey, Payload, ResponseCache};
use wpd_config::SourceConfig;

// Error codes carried in the body of `400` responses.
const CODE_STORY_NOT_FOUND: u32 = 1017;
const CODE_PART_NOT_FOUND: u32 = 1020;
const CODE_NO_PARTS_FOR_STORY: u32 = 463;

/// Whether a call may read from and write to the shared response cache.
///
/// Chosen from the presence of credentials: anything fetched on behalf of a
/// logged-in user may be personalised, so it is never stored or served from
/// the shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Shared,
    Bypass,
}
impl CachePolicy {
    pub fn for_credentials(credentials: Option<&Credentials>) -> Self {
        match credentials {
            Some(_) => Self::Bypass,
            None => Self::Shared,
        }
    }
}

/// Which domain error a `400`/`404` from a given endpoint stands for.
#[derive(Debug, Clone, Copy)]
enum Resource {
    Work,
    Chapter,
    List,
    Image,
}
impl Resource {
    fn not_found(self) -> ErrorKind {
        match self {
            Self::Work => ErrorKind::WorkNotFound,
            Self::Chapter => ErrorKind::ChapterNotFound,
            Self::List => ErrorKind::ListNotFound,
            Self::Image => ErrorKind::ImageUnavailable,
        }
    }

    fn classify(self, response: &Response) -> ErrorKind {
        match response.status {
            429 => ErrorKind::RateLimited,
            404 => self.not_found(),
            400 => match ApiError::parse(&response.body).code() {
                None | Some(CODE_STORY_NOT_FOUND | CODE_PART_NOT_FOUND | CODE_NO_PARTS_FOR_STORY) => self.not_found(),
                Some(code) => {
                    tracing::debug!(code, "Unrecognised API error code");
                    ErrorKind::UnexpectedStatus(400)
                },
            },
            status => ErrorKind::UnexpectedStatus(status),
        }
    }
}

/// Client for the remote story API.
///
/// Every call goes through a single retry-wrapped `execute` function
/// parameterised by a [`CachePolicy`]. The cache and configuration
/// are handed in at construction; the client holds no global state and is
/// cheap to clone.
#[derive(Debug, Clone)]
pub struct SourceClient {
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn ResponseCache>>,
    base_url: String,
    retry: RetryPolicy,
}

impl SourceClient {
    pub fn new(transport: Arc<dyn Transport>, cache: Option<Arc<dyn ResponseCache>>, config: &SourceConfig) -> Self {
        Self {
            transport,
            cache,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(config.retry_ceiling()),
        }
    }

    /// Client speaking HTTPS through `reqwest`.
    pub fn from_config(config: &SourceConfig, cache: Option<Arc<dyn ResponseCache>>) -> Result<Self> {
        let transport = HttpTransport::new(&config.user_agent, config.request_timeout())?;
        Ok(Self::new(Arc::new(transport), cache, config))
    }

    /// Logs in with a username and password, returning the session cookies.
    ///
    /// Anything other than `204 No Content` carrying at least one cookie is a
    /// rejected login. Never cached and never retried.
    #[instrument(skip_all)]
    pub async fn login(&self, username: &str, password: &str) -> Result<Credentials> {
        let url = format!("{}/auth/login?nextUrl=%2F&_data=routes%2Fauth.login", self.base_url);
        let form = vec![
            // Usernames are case-insensitive upstream.
            ("username".to_string(), username.to_lowercase()),
            ("password".to_string(), password.to_string()),
        ];
        let response = self.transport.send(Request::post_form(url, form)).await?;
        if response.status == 429 {
            exn::bail!(ErrorKind::RateLimited);
        }
        if response.status != 204 || response.cookies.is_empty() {
            tracing::info!(status = response.status, "Login rejected");
            exn::bail!(ErrorKind::InvalidCredentials);
        }
        Ok(Credentials::new(response.cookies))
    }

    #[instrument(skip(self, credentials), fields(authenticated = credentials.is_some()))]
    pub async fn fetch_work(&self, work_id: u64, credentials: Option<&Credentials>) -> Result<Work> {
        let url = format!("{}/api/v3/stories/{work_id}?fields={WORK_FIELDS}", self.base_url);
        let payload = self.get(&url, Resource::Work, credentials).await?;
        Self::decode(&payload)
    }

    /// Resolves the work owning `chapter_id`, returning its id and metadata.
    #[instrument(skip(self, credentials), fields(authenticated = credentials.is_some()))]
    pub async fn fetch_work_from_chapter_id(
        &self,
        chapter_id: u64,
        credentials: Option<&Credentials>,
    ) -> Result<(u64, Work)> {
        let url = format!("{}/api/v3/story_parts/{chapter_id}?fields=groupId,group({WORK_FIELDS})", self.base_url);
        let payload = self.get(&url, Resource::Chapter, credentials).await?;
        let lookup: ChapterLookup = Self::decode(&payload)?;
        tracing::debug!(work_id = lookup.group_id, "Resolved chapter to work");
        Ok((lookup.group_id, lookup.group))
    }

    /// Downloads every chapter's raw markup in one archive.
    #[instrument(skip(self, credentials), fields(authenticated = credentials.is_some()))]
    pub async fn fetch_chapter_archive(&self, work_id: u64, credentials: Option<&Credentials>) -> Result<ChapterArchive> {
        let url = format!("{}/apiv2/?m=storytext&group_id={work_id}&output=zip", self.base_url);
        let payload = self.get(&url, Resource::Work, credentials).await?;
        let archive = ChapterArchive::from_bytes(&payload)?;
        tracing::debug!(chapters = archive.len(), "Decoded chapter archive");
        Ok(archive)
    }

    #[instrument(skip(self, credentials), fields(authenticated = credentials.is_some()))]
    pub async fn fetch_list(&self, list_id: u64, credentials: Option<&Credentials>) -> Result<ReadingList> {
        let url = format!("{}/api/v3/lists/{list_id}?fields=id,name,stories(id)", self.base_url);
        let payload = self.get(&url, Resource::List, credentials).await?;
        let raw: RawReadingList = Self::decode(&payload)?;
        Ok(raw.into())
    }

    /// Downloads an image. Only the small fixed set of licensing badges is
    /// ever fetched with `cacheable` set.
    #[instrument(skip(self))]
    pub async fn fetch_image(&self, url: &str, cacheable: bool) -> Result<Vec<u8>> {
        let policy = if cacheable { CachePolicy::Shared } else { CachePolicy::Bypass };
        let payload = self.execute(Request::get(url), policy, Resource::Image).await?;
        Ok(payload.to_vec())
    }

    async fn get(&self, url: &str, resource: Resource, credentials: Option<&Credentials>) -> Result<Payload> {
        let request = Request::get(url).with_cookie(credentials.map(Credentials::cookie_header));
        self.execute(request, CachePolicy::for_credentials(credentials), resource).await
    }

    /// The single path every remote call takes: consult the cache when
    /// allowed, otherwise send with retry, then populate the cache.
    async fn execute(&self, request: Request, policy: CachePolicy, resource: Resource) -> Result<Payload> {
        let cache = match policy {
            CachePolicy::Shared => self.cache.as_deref(),
            CachePolicy::Bypass => None,
        };
        let key = CacheKey::new(request.method.as_str(), &request.url);
        if let Some(cache) = cache {
            match cache.get(&key).await {
                Ok(Some(payload)) => {
                    tracing::trace!(%key, "Cache hit");
                    return Ok(payload);
                },
                Ok(None) => {},
                Err(err) => tracing::warn!(error = ?err, "Cache read failed, continuing uncached"),
            }
        }
        let payload: Payload = self
            .retry
            .run(|| {
                let request = request.clone();
                async move {
                    let response = self.transport.send(request).await?;
                    if !response.is_success() {
                        exn::bail!(resource.classify(&response));
                    }
                    Ok(Payload::from(response.body))
                }
            })
            .await?;
        if let Some(cache) = cache
            && let Err(err) = cache.put(&key, payload.clone()).await
        {
            tracing::warn!(error = ?err, "Cache write failed");
        }
        Ok(payload)
    }

    fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
        serde_json::from_slice(payload).or_raise(|| ErrorKind::InvalidResponse)
    }
}
