use std::fmt;

/// Opaque bag of session cookies obtained from a login.
///
/// Forwarded verbatim as a `Cookie` header. Never persisted and never part of
/// a cache key; its presence alone switches a request to bypass the cache.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    cookies: Vec<(String, String)>,
}

impl Credentials {
    pub fn new(cookies: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        Self { cookies: cookies.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn cookie_header(&self) -> String {
        self.cookies.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("; ")
    }
}

// Cookie values are session secrets; keep them out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("cookies", &self.cookies.iter().map(|(k, _)| k).collect::<Vec<_>>()).finish()
    }
}
