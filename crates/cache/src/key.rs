use std::fmt;

/// Identity of a cached response: a BLAKE3 digest over the request method and
/// the full URL (query string included).
///
/// Credentials are never part of the key. Authenticated requests bypass the
/// cache entirely instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &str, url: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b" ");
        hasher.update(url.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_is_case_insensitive() {
        assert_eq!(CacheKey::new("get", "https://x/a"), CacheKey::new("GET", "https://x/a"));
    }

    #[test]
    fn query_string_is_significant() {
        assert_ne!(CacheKey::new("GET", "https://x/a?fields=id"), CacheKey::new("GET", "https://x/a?fields=title"));
    }

    #[test]
    fn key_is_hex_digest() {
        let key = CacheKey::new("GET", "https://x/a");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
