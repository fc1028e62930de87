use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{JobStatusNotifier, NotifyError};

const DEFAULT_API_BASE: &str = "https://api.github.com";

// Check runs are still behind the antiope preview media type.
const ACCEPT_HEADER: &str = "application/vnd.github.antiope-preview+json";

/// Reports job statuses to GitHub as check runs against the head commit of
/// the check suite that produced the event.
pub struct CheckRunNotifier {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    head_sha: String,
    token: String,
}

impl CheckRunNotifier {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        head_sha: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_owned(),
            owner: owner.into(),
            repo: repo.into(),
            head_sha: head_sha.into(),
            token: token.into(),
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn post(&self, run: CheckRun<'_>) -> Result<(), NotifyError> {
        let url = format!(
            "{}/repos/{}/{}/check-runs",
            self.api_base, self.owner, self.repo,
        );
        let response = self
            .client
            .post(&url)
            .header("Accept", ACCEPT_HEADER)
            .header("Authorization", format!("token {}", self.token))
            .header("User-Agent", "drake-worker")
            .json(&run)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    fn started(&self, job_name: &str) -> CheckRun<'_> {
        CheckRun {
            name: job_name.to_owned(),
            head_sha: &self.head_sha,
            status: "in_progress",
            conclusion: None,
            started_at: Some(Utc::now()),
            completed_at: None,
            output: CheckRunOutput {
                title: job_name.to_owned(),
                summary: "",
            },
        }
    }

    fn completed(&self, job_name: &str, conclusion: &'static str) -> CheckRun<'_> {
        CheckRun {
            name: job_name.to_owned(),
            head_sha: &self.head_sha,
            status: "completed",
            conclusion: Some(conclusion),
            started_at: None,
            completed_at: Some(Utc::now()),
            output: CheckRunOutput {
                title: job_name.to_owned(),
                summary: "",
            },
        }
    }
}

#[async_trait]
impl JobStatusNotifier for CheckRunNotifier {
    async fn in_progress(&self, job_name: &str) -> Result<(), NotifyError> {
        self.post(self.started(job_name)).await
    }

    async fn success(&self, job_name: &str) -> Result<(), NotifyError> {
        self.post(self.completed(job_name, "success")).await
    }

    async fn cancelled(&self, job_name: &str) -> Result<(), NotifyError> {
        self.post(self.completed(job_name, "cancelled")).await
    }

    async fn timed_out(&self, job_name: &str) -> Result<(), NotifyError> {
        self.post(self.completed(job_name, "timed_out")).await
    }

    async fn failure(&self, job_name: &str) -> Result<(), NotifyError> {
        self.post(self.completed(job_name, "failure")).await
    }
}

// ---------------------------------------------------------------------------
// Wire documents
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CheckRun<'a> {
    name: String,
    head_sha: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conclusion: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    output: CheckRunOutput,
}

#[derive(Debug, Serialize)]
struct CheckRunOutput {
    title: String,
    summary: &'static str,
}
