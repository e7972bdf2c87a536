//! In-memory transport for testing.

use crate::error::{ErrorKind, Result};
use crate::transport::{Request, Response, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the mock answers for one route.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(Response),
    /// Fail before any response, like a dropped connection.
    Fail,
}
impl MockReply {
    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::Respond(Response { status, body: body.into(), cookies: Vec::new() })
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, body)
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::ok(value.to_string())
    }

    pub fn with_cookies(self, cookies: &[(&str, &str)]) -> Self {
        match self {
            Self::Respond(mut response) => {
                response.cookies = cookies.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
                Self::Respond(response)
            },
            Self::Fail => Self::Fail,
        }
    }
}

/// Transport that answers from a table of canned replies.
///
/// Routes match on the full URL. A route holds a queue of replies: each call
/// consumes one, and the last one is repeated forever. Unknown URLs get an
/// empty `404`. Every request is recorded so tests can assert on call counts
/// and ordering, and an optional latency makes concurrency observable.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<Request>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: impl Into<String>, reply: MockReply) -> Self {
        self.route_sequence(url, [reply])
    }

    pub fn route_sequence(self, url: impl Into<String>, replies: impl IntoIterator<Item = MockReply>) -> Self {
        self.lock_routes().insert(url.into(), replies.into_iter().collect());
        self
    }

    /// Adds or replaces a route on a transport that is already shared.
    pub fn set_route(&self, url: impl Into<String>, reply: MockReply) {
        self.lock_routes().insert(url.into(), VecDeque::from([reply]));
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<Request> {
        self.lock_calls().clone()
    }

    pub fn call_urls(&self) -> Vec<String> {
        self.lock_calls().iter().map(|r| r.url.clone()).collect()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.lock_calls().iter().filter(|r| r.url == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock_calls().len()
    }

    /// Highest number of requests that were awaiting a reply at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    // Poisoning only happens after another test thread panicked.
    fn lock_routes(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<MockReply>>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<Request>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self, url: &str) -> MockReply {
        let mut routes = self.lock_routes();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MockReply::status(404, "")),
            Some(queue) => queue.front().cloned().unwrap_or(MockReply::status(404, "")),
            None => MockReply::status(404, ""),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);
impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let url = request.url.clone();
        self.lock_calls().push(request);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.next_reply(&url) {
            MockReply::Respond(response) => Ok(response),
            MockReply::Fail => exn::bail!(ErrorKind::Transport),
        }
    }
}
