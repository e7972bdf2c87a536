//! The seam between the client's retry/cache logic and the network.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{COOKIE, SET_COOKIE};
use std::fmt::Debug;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}
impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    /// Raw `Cookie` header value.
    pub cookie: Option<String>,
    /// URL-encoded form body.
    pub form: Option<Vec<(String, String)>>,
}
impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: Method::Get, url: url.into(), cookie: None, form: None }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self { method: Method::Post, url: url.into(), cookie: None, form: Some(form) }
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
    /// Name/value pairs from every `Set-Cookie` header.
    pub cookies: Vec<(String, String)>,
}
impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request and returns whatever came back.
///
/// Implementations only fail for transport-level problems; any HTTP status,
/// including errors, is a successful [`Response`].
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .or_raise(|| ErrorKind::Transport)?;
        Ok(Self { client })
    }

    fn parse_set_cookie(value: &str) -> Option<(String, String)> {
        let pair = value.split(';').next()?;
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if let Some(cookie) = &request.cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }
        let response = builder.send().await.or_raise(|| ErrorKind::Transport)?;
        let status = response.status().as_u16();
        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(Self::parse_set_cookie)
            .collect();
        let body = response.bytes().await.or_raise(|| ErrorKind::Transport)?.to_vec();
        Ok(Response { status, body, cookies })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("token=abc; Path=/; HttpOnly", Some(("token", "abc")))]
    #[case("empty=; Max-Age=0", Some(("empty", "")))]
    #[case("garbage", None)]
    #[case("=novalue", None)]
    fn parses_set_cookie(#[case] header: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = HttpTransport::parse_set_cookie(header);
        assert_eq!(parsed, expected.map(|(k, v)| (k.to_string(), v.to_string())));
    }
}
