pub mod github;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("error delivering check run: {0}")]
    Http(#[from] reqwest::Error),

    #[error("check run delivery rejected with status {status}")]
    Rejected { status: u16 },
}

/// Reports job state transitions back to the originating VCS.
///
/// Job executors treat an absent notifier as a no-op; the trait is only ever
/// handed out by a trigger whose events can be reported upstream.
#[async_trait]
pub trait JobStatusNotifier: Send + Sync {
    async fn in_progress(&self, job_name: &str) -> Result<(), NotifyError>;
    async fn success(&self, job_name: &str) -> Result<(), NotifyError>;
    async fn cancelled(&self, job_name: &str) -> Result<(), NotifyError>;
    async fn timed_out(&self, job_name: &str) -> Result<(), NotifyError>;
    async fn failure(&self, job_name: &str) -> Result<(), NotifyError>;
}
