use crate::config::WorkerConfig;
use crate::error::BuildError;
use crate::event::Event;
use crate::substrate::Substrate;

use super::{common_labels, shared_storage_pvc_name};

/// Provision the pipeline's shared-storage claim. Only called when some
/// container in the pipeline actually mounts shared storage.
pub async fn create_shared_storage(
    substrate: &dyn Substrate,
    event: &Event,
    config: &WorkerConfig,
    pipeline_name: &str,
) -> Result<(), BuildError> {
    let name = shared_storage_pvc_name(&event.worker_id, pipeline_name);
    let storage_class = event
        .project
        .kubernetes
        .build_storage_class
        .as_deref()
        .or(config.default_build_storage_class.as_deref());
    let mut labels = common_labels(event, "buildStorage");
    labels.insert("pipeline".to_owned(), pipeline_name.to_owned());

    tracing::info!(pvc = %name, "creating shared storage");
    substrate
        .create_pvc(
            &event.project.kubernetes.namespace,
            &name,
            labels,
            &event.project.kubernetes.build_storage_size,
            storage_class,
        )
        .await?;
    Ok(())
}

pub async fn destroy_shared_storage(
    substrate: &dyn Substrate,
    event: &Event,
    pipeline_name: &str,
) -> Result<(), BuildError> {
    let name = shared_storage_pvc_name(&event.worker_id, pipeline_name);
    tracing::info!(pvc = %name, "destroying shared storage");
    substrate
        .delete_pvc(&event.project.kubernetes.namespace, &name)
        .await?;
    Ok(())
}
