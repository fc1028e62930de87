use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::WorkerConfig;
use crate::error::{BuildError, fold_errors};
use crate::event::Event;
use crate::notify::JobStatusNotifier;
use crate::spec::Pipeline;
use crate::substrate::Substrate;

use super::{job, storage, worker_label_selector};

/// Execute one pipeline for one event: provision shared storage if any job
/// wants it, fan jobs out in dependency order, aggregate their errors, and
/// tear substrate resources down on the way out.
pub async fn execute_pipeline(
    cancel: CancellationToken,
    substrate: Arc<dyn Substrate>,
    event: Arc<Event>,
    config: Arc<WorkerConfig>,
    pipeline: Pipeline,
    notifier: Option<Arc<dyn JobStatusNotifier>>,
) -> Result<(), BuildError> {
    tracing::info!(pipeline = %pipeline.name, "executing pipeline");

    let uses_storage = pipeline.uses_shared_storage();
    if uses_storage {
        // Nothing to tear down yet if this fails; jobs only start after the
        // claim exists.
        storage::create_shared_storage(substrate.as_ref(), &event, &config, &pipeline.name)
            .await?;
    }

    let result = run_jobs(&cancel, &substrate, &event, &config, &pipeline, notifier).await;

    teardown(&cancel, substrate.as_ref(), &event, &pipeline.name, uses_storage).await;

    if result.is_ok() {
        tracing::info!(pipeline = %pipeline.name, "pipeline succeeded");
    }
    result
}

async fn run_jobs(
    cancel: &CancellationToken,
    substrate: &Arc<dyn Substrate>,
    event: &Arc<Event>,
    config: &Arc<WorkerConfig>,
    pipeline: &Pipeline,
    notifier: Option<Arc<dyn JobStatusNotifier>>,
) -> Result<(), BuildError> {
    // One completion signal per job; flipped to true only when the job
    // succeeds, letting dependents proceed.
    let mut done_txs: HashMap<String, watch::Sender<bool>> = HashMap::new();
    let mut done_rxs: HashMap<String, watch::Receiver<bool>> = HashMap::new();
    for job in &pipeline.jobs {
        let (tx, rx) = watch::channel(false);
        done_txs.insert(job.name.clone(), tx);
        done_rxs.insert(job.name.clone(), rx);
    }

    // Cancelling this scope means "start no new jobs". Jobs already
    // executing keep running; only managers still waiting on dependencies
    // bail out.
    let pending = cancel.child_token();

    let (err_tx, mut err_rx) = mpsc::unbounded_channel::<BuildError>();
    let tracker = TaskTracker::new();

    for job_spec in pipeline.jobs.clone() {
        let dependencies: Vec<watch::Receiver<bool>> = job_spec
            .dependencies
            .iter()
            .map(|name| done_rxs[name].clone())
            .collect();
        let done_tx = done_txs
            .remove(&job_spec.name)
            .expect("one completion sender per job");
        let err_tx = err_tx.clone();
        let cancel = cancel.clone();
        let pending = pending.clone();
        let substrate = Arc::clone(substrate);
        let event = Arc::clone(event);
        let config = Arc::clone(config);
        let notifier = notifier.clone();
        let pipeline_name = pipeline.name.clone();

        tracker.spawn(async move {
            for mut dependency in dependencies {
                tokio::select! {
                    changed = dependency.wait_for(|done| *done) => {
                        if changed.is_err() {
                            // The dependency's manager went away without
                            // completing; this job can never start.
                            let _ = err_tx.send(BuildError::PendingJobCanceled {
                                job: job_spec.name.clone(),
                            });
                            return;
                        }
                    }
                    () = pending.cancelled() => {
                        let _ = err_tx.send(BuildError::PendingJobCanceled {
                            job: job_spec.name.clone(),
                        });
                        return;
                    }
                }
            }

            let outcome = job::run_job(
                &cancel,
                substrate.as_ref(),
                &event,
                &config,
                &pipeline_name,
                &job_spec,
                notifier.as_deref(),
            )
            .await;
            match outcome {
                Ok(()) => {
                    let _ = done_tx.send(true);
                }
                // This send is deliberately not guarded by any cancellation
                // check: an error must never be lost, and the collector is
                // guaranteed to drain the channel until every sender drops.
                Err(err) => {
                    let _ = err_tx.send(err);
                }
            }
        });
    }
    tracker.close();
    drop(err_tx);

    // The collector must not observe cancellation. It runs until recv()
    // returns None, which happens exactly when all manager tasks have
    // finished and dropped their senders; that is the all-done signal.
    let mut errs = Vec::new();
    while let Some(err) = err_rx.recv().await {
        tracing::error!(pipeline = %pipeline.name, error = %err, "job error");
        // First error fails the pipeline: stop starting pending jobs, but
        // let in-progress jobs run to completion.
        pending.cancel();
        errs.push(err);
    }
    tracker.wait().await;

    fold_errors(errs)
}

/// Runs exactly once per pipeline, on every exit path after provisioning.
async fn teardown(
    cancel: &CancellationToken,
    substrate: &dyn Substrate,
    event: &Event,
    pipeline_name: &str,
    uses_storage: bool,
) {
    if cancel.is_cancelled() {
        // Cancellation strands whatever pods were still running, so sweep
        // everything this worker created. Completed builds keep their pods
        // around for post-mortem inspection.
        let selector = worker_label_selector(&event.worker_id);
        tracing::info!(%selector, "deleting pods");
        if let Err(err) = substrate
            .delete_pods_by_label(&event.project.kubernetes.namespace, &selector)
            .await
        {
            tracing::error!(
                pipeline = %pipeline_name,
                error = %err,
                "error deleting pods",
            );
        }
    }

    if uses_storage
        && let Err(err) = storage::destroy_shared_storage(substrate, event, pipeline_name).await
    {
        tracing::error!(
            pipeline = %pipeline_name,
            error = %err,
            "error destroying shared storage",
        );
    }
}
