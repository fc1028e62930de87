use crate::error::BuildError;
use crate::event::Event;
use crate::substrate::Substrate;

use super::{build_secret_name, common_labels};

/// Create the per-build secret holding the project's secret map. Every job
/// container references it by key, so it must exist before any pipeline
/// starts.
pub async fn create_build_secret(
    substrate: &dyn Substrate,
    event: &Event,
) -> Result<(), BuildError> {
    let name = build_secret_name(&event.build_id);
    tracing::info!(secret = %name, "creating build secret");
    substrate
        .create_secret(
            &event.project.kubernetes.namespace,
            &name,
            event.project.secrets.clone(),
            common_labels(event, "buildSecret"),
        )
        .await?;
    Ok(())
}

pub async fn destroy_build_secret(
    substrate: &dyn Substrate,
    event: &Event,
) -> Result<(), BuildError> {
    let name = build_secret_name(&event.build_id);
    tracing::info!(secret = %name, "destroying build secret");
    substrate
        .delete_secret(&event.project.kubernetes.namespace, &name)
        .await?;
    Ok(())
}
