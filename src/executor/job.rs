use std::time::Duration;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::BuildError;
use crate::event::Event;
use crate::notify::JobStatusNotifier;
use crate::spec::JobSpec;
use crate::substrate::{Substrate, SubstrateError};

use super::{pod, pod_name};

/// Run a single job to completion: submit its pod, watch for the primary
/// container's terminal state, and report the outcome upstream.
///
/// A terminal notification is guaranteed on every exit path after the
/// in-progress notification went out; notifier failures on the way out are
/// logged, never propagated.
pub async fn run_job(
    cancel: &CancellationToken,
    substrate: &dyn Substrate,
    event: &Event,
    config: &WorkerConfig,
    pipeline_name: &str,
    job: &JobSpec,
    notifier: Option<&dyn JobStatusNotifier>,
) -> Result<(), BuildError> {
    if let Some(notifier) = notifier {
        notifier.in_progress(&job.name).await?;
    }

    let result = watch_to_completion(cancel, substrate, event, config, pipeline_name, job).await;

    if let Some(notifier) = notifier {
        let send = if cancel.is_cancelled() {
            notifier.cancelled(&job.name)
        } else {
            match &result {
                Ok(()) => notifier.success(&job.name),
                Err(BuildError::TimedOut { .. }) => notifier.timed_out(&job.name),
                Err(_) => notifier.failure(&job.name),
            }
        };
        if let Err(err) = send.await {
            tracing::warn!(
                job = %job.name,
                error = %err,
                "error sending job status notification",
            );
        }
    }

    result
}

async fn watch_to_completion(
    cancel: &CancellationToken,
    substrate: &dyn Substrate,
    event: &Event,
    config: &WorkerConfig,
    pipeline_name: &str,
    job: &JobSpec,
) -> Result<(), BuildError> {
    let pod = pod::build_job_pod(event, pipeline_name, job)?;
    let name = pod_name(pipeline_name, &job.name, &event.build_id);
    let namespace = &event.project.kubernetes.namespace;

    tracing::info!(pod = %name, "creating job pod");
    substrate.create_pod(namespace, &pod).await?;

    let mut snapshots = substrate.watch_pod(namespace, &name).await?;
    let timeout = job
        .timeout_seconds
        .map_or(config.default_job_timeout, Duration::from_secs);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            snapshot = snapshots.next() => match snapshot {
                Some(Ok(pod)) => {
                    if let Some(outcome) = classify(&pod, &job.primary_container.name, &name) {
                        return outcome;
                    }
                }
                Some(Err(err)) => return Err(err.into()),
                None => {
                    return Err(SubstrateError::Watch {
                        pod: name,
                        message: "watch stream ended unexpectedly".into(),
                    }
                    .into());
                }
            },
            () = &mut deadline => {
                return Err(BuildError::TimedOut { job: job.name.clone() });
            }
            () = cancel.cancelled() => {
                return Err(BuildError::InProgressJobAborted { job: job.name.clone() });
            }
        }
    }
}

/// Inspect a pod snapshot for the primary container's terminal state. Other
/// containers and non-terminal states are ignored; `None` means keep
/// watching.
fn classify(pod: &Pod, primary_container: &str, pod_name: &str) -> Option<Result<(), BuildError>> {
    let statuses = pod.status.as_ref()?.container_statuses.as_ref()?;
    let status = statuses.iter().find(|s| s.name == primary_container)?;
    let terminated = status.state.as_ref()?.terminated.as_ref()?;
    let reason = terminated.reason.clone().unwrap_or_default();
    if reason == "Completed" {
        Some(Ok(()))
    } else {
        Some(Err(BuildError::PodFailed {
            pod: pod_name.to_owned(),
            reason,
        }))
    }
}
