//! Lifecycle of one download request.

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Where a download currently is. Stages only move forward; a request for an
/// earlier stage is ignored. [`Stage::Cancelled`] can be reached from any
/// stage before [`Stage::Done`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    MetadataFetched,
    ContentFetched,
    Normalized,
    ImagesResolved,
    Compiled,
    Streaming,
    Done,
    Cancelled,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

/// Cancellation token and progress reporting shared by everything working on
/// one request. Cloning yields another handle to the same job.
#[derive(Debug, Clone)]
pub struct Job {
    cancel: CancellationToken,
    stage: Arc<watch::Sender<Stage>>,
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

impl Job {
    pub fn new() -> Self {
        Self { cancel: CancellationToken::new(), stage: Arc::new(watch::Sender::new(Stage::Idle)) }
    }

    pub fn stage(&self) -> Stage {
        *self.stage.borrow()
    }

    /// A job for one member of a batch. It has its own stages, so each work
    /// runs from [`Stage::Idle`], and is cancelled along with this job.
    pub fn member(&self) -> Self {
        Self { cancel: self.cancel.child_token(), stage: Arc::new(watch::Sender::new(Stage::Idle)) }
    }

    /// Moves forward to `stage`. Earlier stages and anything after a terminal
    /// stage are ignored.
    pub fn advance(&self, stage: Stage) {
        self.stage.send_if_modified(|current| {
            if current.is_terminal() || stage <= *current {
                return false;
            }
            *current = stage;
            true
        });
    }

    /// Token handed to blocking work that cannot await [`Job::cancelled`].
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once [`Job::cancel`] has been called on any handle.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Cancels the job when dropped, unless disarmed first.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.cancel.clone().drop_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_stages_stick() {
        let job = Job::new();
        job.advance(Stage::MetadataFetched);
        job.advance(Stage::Cancelled);
        job.advance(Stage::Compiled);
        assert_eq!(job.stage(), Stage::Cancelled);
    }

    #[test]
    fn drop_guard_cancels() {
        let job = Job::new();
        drop(job.cancel_on_drop());
        assert!(job.is_cancelled());

        let job = Job::new();
        let _ = job.cancel_on_drop().disarm();
        assert!(!job.is_cancelled());
    }

    #[test]
    fn stages_never_move_back() {
        let job = Job::new();
        job.advance(Stage::Compiled);
        job.advance(Stage::MetadataFetched);
        assert_eq!(job.stage(), Stage::Compiled);
        job.advance(Stage::Streaming);
        assert_eq!(job.stage(), Stage::Streaming);
    }

    #[test]
    fn members_restart_and_share_cancellation() {
        let job = Job::new();
        job.advance(Stage::Compiled);
        let member = job.member();
        assert_eq!(member.stage(), Stage::Idle);
        member.advance(Stage::MetadataFetched);
        assert_eq!(job.stage(), Stage::Compiled);

        job.cancel();
        assert!(member.is_cancelled());
        // Cancelling a member leaves the batch running.
        let job = Job::new();
        job.member().cancel();
        assert!(!job.is_cancelled());
    }
}
