use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::event::Event;
use crate::notify::JobStatusNotifier;
use crate::notify::github::CheckRunNotifier;
use crate::selector::RefSelector;

use super::{Trigger, TriggerError};

pub const SPEC_URI: &str = "github.com/lovethedrake/drakespec-github";

/// Provider identifier carried in `event.source` for GitHub events.
const EVENT_SOURCE: &str = "github";

static BRANCH_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("refs/heads/(.+)").expect("branch ref pattern compiles"));
static TAG_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("refs/tags/(.+)").expect("tag ref pattern compiles"));

pub fn from_config(config: &serde_json::Value) -> Result<Box<dyn Trigger>, TriggerError> {
    let trigger: GithubTrigger =
        serde_json::from_value(config.clone()).map_err(TriggerError::MalformedConfig)?;
    Ok(Box::new(trigger))
}

/// Trigger for events relayed from GitHub by the upstream gateway.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GithubTrigger {
    pull_request: Option<PullRequestSelector>,
    push: Option<PushSelector>,
    check_suite: Option<CheckSuiteSelector>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PullRequestSelector {
    target_branches: Option<RefSelector>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PushSelector {
    branches: Option<RefSelector>,
    tags: Option<RefSelector>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CheckSuiteSelector {
    branches: Option<RefSelector>,
}

impl Trigger for GithubTrigger {
    fn matches(&self, event: &Event) -> Result<bool, TriggerError> {
        if event.source != EVENT_SOURCE {
            tracing::debug!(
                source = %event.source,
                "event source does not match github trigger",
            );
            return Ok(false);
        }
        match event.kind.as_str() {
            "pull_request:opened" | "pull_request:synchronize" | "pull_request:reopened" => {
                let Some(selector) = &self.pull_request else {
                    return Ok(false);
                };
                let Some(target_branches) = &selector.target_branches else {
                    return Ok(false);
                };
                let payload: PullRequestPayload = decode(&event.payload)?;
                Ok(target_branches.matches(&payload.pull_request.base.git_ref)?)
            }
            "push" => {
                let Some(selector) = &self.push else {
                    return Ok(false);
                };
                selector.matches(&event.payload)
            }
            "check_suite:requested" | "check_suite:rerequested" => {
                let Some(selector) = &self.check_suite else {
                    return Ok(false);
                };
                let Some(branches) = &selector.branches else {
                    return Ok(false);
                };
                let wrapper: CheckSuitePayload = decode(&event.payload)?;
                // A check suite for a PR from a fork has no head branch;
                // the empty string is still a valid selector input.
                let branch = wrapper.body.check_suite.head_branch.unwrap_or_default();
                Ok(branches.matches(&branch)?)
            }
            other => {
                tracing::debug!(kind = other, "event type not handled by github trigger");
                Ok(false)
            }
        }
    }

    fn notifier_for(
        &self,
        event: &Event,
    ) -> Result<Option<Arc<dyn JobStatusNotifier>>, TriggerError> {
        // Only check-suite payloads carry the installation token needed to
        // write check runs.
        if event.source != EVENT_SOURCE || !event.kind.starts_with("check_suite:") {
            return Ok(None);
        }
        let wrapper: CheckSuitePayload = decode(&event.payload)?;
        Ok(Some(Arc::new(CheckRunNotifier::new(
            wrapper.body.repository.owner.login,
            wrapper.body.repository.name,
            wrapper.body.check_suite.head_sha,
            wrapper.token,
        ))))
    }
}

impl PushSelector {
    fn matches(&self, payload: &str) -> Result<bool, TriggerError> {
        let push: PushPayload = decode(payload)?;
        let (selector, git_ref) = if let Some(captures) = BRANCH_REF.captures(&push.git_ref) {
            (self.branches.as_ref(), captures[1].to_owned())
        } else if let Some(captures) = TAG_REF.captures(&push.git_ref) {
            (self.tags.as_ref(), captures[1].to_owned())
        } else {
            tracing::debug!(git_ref = %push.git_ref, "no applicable selector for ref");
            return Ok(false);
        };
        let Some(selector) = selector else {
            return Ok(false);
        };
        Ok(selector.matches(&git_ref)?)
    }
}

fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, TriggerError> {
    serde_json::from_str(payload).map_err(TriggerError::MalformedPayload)
}

// ---------------------------------------------------------------------------
// Payload documents
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PullRequestPayload {
    pull_request: PullRequest,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PullRequest {
    base: BaseRef,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BaseRef {
    #[serde(rename = "ref")]
    git_ref: String,
}

/// The gateway wraps the raw check-suite webhook body in an envelope that
/// adds the installation token used for check-run writes.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CheckSuitePayload {
    token: String,
    body: CheckSuiteEvent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CheckSuiteEvent {
    check_suite: CheckSuite,
    repository: Repository,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CheckSuite {
    head_branch: Option<String>,
    head_sha: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Repository {
    name: String,
    owner: Owner,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Owner {
    login: String,
}
