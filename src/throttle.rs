//! Rate-limited streaming of a finished document.

use crate::job::{Job, Stage};
use async_stream::stream;
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use wpd_config::DownloadConfig;

/// Chunk size and inter-chunk delay for one response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pace {
    pub chunk_bytes: usize,
    pub delay: Duration,
    /// Upper bound on the total time spent sleeping between chunks.
    pub ceiling: Duration,
}

impl From<&DownloadConfig> for Pace {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            chunk_bytes: config.stream_chunk_bytes.max(1),
            delay: config.stream_chunk_delay(),
            ceiling: config.stream_max(),
        }
    }
}

impl Pace {
    /// Chunk size for a body of `len` bytes: the configured size, widened
    /// so that the number of delays never pushes past the ceiling.
    pub fn chunk_size(&self, len: usize) -> usize {
        let chunk = self.chunk_bytes.max(1);
        if self.delay.is_zero() {
            return chunk;
        }
        let max_chunks = (self.ceiling.as_millis() / self.delay.as_millis().max(1)).max(1) as usize;
        chunk.max(len.div_ceil(max_chunks))
    }
}

/// Marks the job cancelled if the body is dropped before it was fully sent.
struct Abandoned {
    job: Job,
    finished: bool,
}
impl Drop for Abandoned {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!("Client disconnected mid-stream");
            self.job.cancel();
            self.job.advance(Stage::Cancelled);
        }
    }
}

/// Emits `bytes` in paced chunks, moving `job` through
/// [`Stage::Streaming`] to [`Stage::Done`]. Dropping the stream at any point
/// before the last chunk, including before it is first polled, cancels `job`.
pub fn throttle(bytes: Vec<u8>, pace: Pace, job: Job) -> impl Stream<Item = Result<Vec<u8>, Infallible>> {
    let chunk = pace.chunk_size(bytes.len());
    job.advance(Stage::Streaming);
    let mut guard = Abandoned { job, finished: false };
    stream! {
        let mut chunks = bytes.chunks(chunk).peekable();
        while let Some(piece) = chunks.next() {
            yield Ok(piece.to_vec());
            if chunks.peek().is_some() && !pace.delay.is_zero() {
                tokio::time::sleep(pace.delay).await;
            }
        }
        guard.finished = true;
        guard.job.advance(Stage::Done);
    }
}
