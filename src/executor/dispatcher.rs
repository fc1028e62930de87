use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::WorkerConfig;
use crate::error::{BuildError, fold_errors};
use crate::event::Event;
use crate::notify::JobStatusNotifier;
use crate::spec::{Pipeline, load};
use crate::substrate::Substrate;
use crate::trigger::TriggerRegistry;

use super::{pipeline, secret};

/// Top-level entry for one event: load the pipeline spec, select the
/// pipelines whose triggers match, and execute them in parallel under the
/// per-build secret.
pub async fn execute_build(
    cancel: CancellationToken,
    substrate: Arc<dyn Substrate>,
    event: Arc<Event>,
    config: Arc<WorkerConfig>,
) -> Result<(), BuildError> {
    let spec = load::load(&config.spec_search_paths, &event).await?;
    let selected = select_pipelines(&event, spec.pipelines)?;

    if selected.is_empty() {
        tracing::info!("no pipelines are eligible for this event; nothing to do");
        return Ok(());
    }

    secret::create_build_secret(substrate.as_ref(), &event).await?;

    let result = run_pipelines(&cancel, &substrate, &event, &config, selected).await;

    // Teardown never overrides the primary result.
    if let Err(err) = secret::destroy_build_secret(substrate.as_ref(), &event).await {
        tracing::error!(error = %err, "error destroying build secret");
    }

    result
}

type SelectedPipeline = (Pipeline, Option<Arc<dyn JobStatusNotifier>>);

/// For each pipeline, the first trigger whose spec URI is registered and
/// which matches the event selects the pipeline and supplies its notifier.
/// Triggers with unknown spec URIs are skipped.
fn select_pipelines(
    event: &Event,
    pipelines: Vec<Pipeline>,
) -> Result<Vec<SelectedPipeline>, BuildError> {
    let registry = TriggerRegistry::standard();
    let mut selected = Vec::new();
    for pipeline in pipelines {
        tracing::info!(pipeline = %pipeline.name, "evaluating triggers");
        let mut matched = None;
        for trigger_spec in &pipeline.triggers {
            let Some(built) = registry.build(&trigger_spec.spec_uri, &trigger_spec.config) else {
                tracing::debug!(
                    pipeline = %pipeline.name,
                    spec_uri = %trigger_spec.spec_uri,
                    "skipping trigger with unrecognized spec uri",
                );
                continue;
            };
            let trigger = built?;
            if trigger.matches(event)? {
                tracing::info!(pipeline = %pipeline.name, "pipeline is eligible for execution");
                matched = Some(trigger.notifier_for(event)?);
                break;
            }
        }
        if let Some(notifier) = matched {
            selected.push((pipeline, notifier));
        }
    }
    Ok(selected)
}

async fn run_pipelines(
    cancel: &CancellationToken,
    substrate: &Arc<dyn Substrate>,
    event: &Arc<Event>,
    config: &Arc<WorkerConfig>,
    selected: Vec<SelectedPipeline>,
) -> Result<(), BuildError> {
    let (err_tx, mut err_rx) = mpsc::unbounded_channel::<BuildError>();
    let tracker = TaskTracker::new();

    for (pipeline_spec, notifier) in selected {
        let err_tx = err_tx.clone();
        let cancel = cancel.clone();
        let substrate = Arc::clone(substrate);
        let event = Arc::clone(event);
        let config = Arc::clone(config);
        tracker.spawn(async move {
            if let Err(err) = pipeline::execute_pipeline(
                cancel,
                substrate,
                event,
                config,
                pipeline_spec,
                notifier,
            )
            .await
            {
                // Unconditional send: errors are never dropped, and the
                // collector drains until all senders are gone.
                let _ = err_tx.send(err);
            }
        });
    }
    tracker.close();
    drop(err_tx);

    // Like the pipeline-level collector, this loop is driven to completion
    // by sender drop, never interrupted by cancellation.
    let mut errs = Vec::new();
    while let Some(err) = err_rx.recv().await {
        errs.push(err);
    }
    tracker.wait().await;

    fold_errors(errs)
}
