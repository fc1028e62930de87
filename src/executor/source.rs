use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, ResourceRequirements, SecretKeySelector, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::BuildError;
use crate::event::Event;
use crate::substrate::quantity;

pub(crate) const SOURCE_VOLUME: &str = "src";
pub(crate) const SOURCE_WORKSPACE: &str = "/src";

const GIT_SIDECAR_IMAGE: &str = "brigadecore/git-sidecar:v1.1.0";

/// Init container that clones project source into the job pod's `src`
/// volume before any job container starts.
pub fn build_source_clone_container(event: &Event) -> Result<Container, BuildError> {
    let project = &event.project;
    let mut env = vec![
        env_var("CI", "true"),
        env_var("BRIGADE_BUILD_ID", &event.build_id),
        env_var("BRIGADE_COMMIT_ID", &event.revision.commit),
        env_var("BRIGADE_COMMIT_REF", &event.revision.git_ref),
        env_var("BRIGADE_EVENT_PROVIDER", &event.source),
        env_var("BRIGADE_EVENT_TYPE", &event.kind),
        env_var("BRIGADE_PROJECT_ID", &project.id),
        env_var("BRIGADE_REMOTE_URL", &project.repo.clone_url),
        env_var("BRIGADE_WORKSPACE", SOURCE_WORKSPACE),
        env_var("BRIGADE_PROJECT_NAMESPACE", &project.kubernetes.namespace),
        env_var(
            "BRIGADE_SUBMODULES",
            if project.repo.init_submodules {
                "true"
            } else {
                "false"
            },
        ),
    ];
    if project.repo.ssh_key.is_some() {
        env.push(secret_env_var("BRIGADE_REPO_KEY", &project.id, "sshKey"));
    }
    if project.repo.token.is_some() {
        env.push(secret_env_var(
            "BRIGADE_REPO_AUTH_TOKEN",
            &project.id,
            "github.token",
        ));
    }

    Ok(Container {
        name: "source-cloner".into(),
        image: Some(GIT_SIDECAR_IMAGE.into()),
        image_pull_policy: Some("Always".into()),
        env: Some(env),
        volume_mounts: Some(vec![VolumeMount {
            name: SOURCE_VOLUME.into(),
            mount_path: SOURCE_WORKSPACE.into(),
            ..Default::default()
        }]),
        resources: sidecar_resources(event)?,
        ..Default::default()
    })
}

fn sidecar_resources(event: &Event) -> Result<Option<ResourceRequirements>, BuildError> {
    let Some(resources) = &event.project.kubernetes.vcs_sidecar_resources else {
        return Ok(None);
    };
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();
    for (key, value) in [
        ("cpu", &resources.cpu_request),
        ("memory", &resources.memory_request),
    ] {
        if let Some(value) = value {
            quantity::validate(value)
                .map_err(|err| BuildError::Validation(err.to_string()))?;
            requests.insert(key.to_owned(), Quantity(value.clone()));
        }
    }
    for (key, value) in [
        ("cpu", &resources.cpu_limit),
        ("memory", &resources.memory_limit),
    ] {
        if let Some(value) = value {
            quantity::validate(value)
                .map_err(|err| BuildError::Validation(err.to_string()))?;
            limits.insert(key.to_owned(), Quantity(value.clone()));
        }
    }
    if requests.is_empty() && limits.is_empty() {
        return Ok(None);
    }
    Ok(Some(ResourceRequirements {
        requests: (!requests.is_empty()).then_some(requests),
        limits: (!limits.is_empty()).then_some(limits),
        ..Default::default()
    }))
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn secret_env_var(name: &str, secret_name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret_name.into(),
                key: key.into(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
