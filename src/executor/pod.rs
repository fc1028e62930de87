use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, HostPathVolumeSource,
    LocalObjectReference, PersistentVolumeClaimVolumeSource, Pod, PodSpec, ResourceRequirements,
    SecretKeySelector, SecurityContext, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::error::BuildError;
use crate::event::Event;
use crate::spec::{ContainerSpec, JobSpec, ResourceSpec, SourceMountMode};
use crate::substrate::quantity;

use super::source::{SOURCE_VOLUME, build_source_clone_container};
use super::{build_secret_name, job_labels, pod_name, shared_storage_pvc_name};

pub(crate) const SHARED_STORAGE_VOLUME: &str = "shared-storage";
pub(crate) const DOCKER_SOCKET_VOLUME: &str = "docker-socket";
pub(crate) const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Translate a job spec into the pod submitted to the substrate.
///
/// All validation happens here, before any substrate call: privileged and
/// host-mount requests are checked against project policy and resource
/// quantities are parsed.
pub fn build_job_pod(
    event: &Event,
    pipeline_name: &str,
    job: &JobSpec,
) -> Result<Pod, BuildError> {
    let name = pod_name(pipeline_name, &job.name, &event.build_id);
    let source_read_only = job.source_mount_mode == SourceMountMode::ReadOnly;

    // Primary container is always pod-container index 0; sidecars follow in
    // declaration order.
    let mut containers = Vec::with_capacity(1 + job.sidecars.len());
    containers.push(build_container(event, &job.primary_container, source_read_only)?);
    for sidecar in &job.sidecars {
        containers.push(build_container(event, sidecar, source_read_only)?);
    }

    let mut volumes = Vec::new();
    let mut init_containers = Vec::new();
    if job.uses_source() {
        volumes.push(Volume {
            name: SOURCE_VOLUME.into(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
        init_containers.push(build_source_clone_container(event)?);
    }
    if job.uses_shared_storage() {
        volumes.push(Volume {
            name: SHARED_STORAGE_VOLUME.into(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: shared_storage_pvc_name(&event.worker_id, pipeline_name),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    if job.mounts_docker_socket() {
        volumes.push(Volume {
            name: DOCKER_SOCKET_VOLUME.into(),
            host_path: Some(HostPathVolumeSource {
                path: DOCKER_SOCKET_PATH.into(),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let mut node_selector = BTreeMap::new();
    let mut tolerations = Vec::new();
    if let Some(os_family) = &job.os_family {
        node_selector.insert("kubernetes.io/os".to_owned(), os_family.clone());
        tolerations.push(Toleration {
            key: Some("os".into()),
            operator: Some("Equal".into()),
            value: Some(os_family.clone()),
            effect: Some("NoSchedule".into()),
            ..Default::default()
        });
    }
    if let Some(cpu_arch) = &job.cpu_arch {
        node_selector.insert("kubernetes.io/arch".to_owned(), cpu_arch.clone());
    }

    let image_pull_secrets: Vec<LocalObjectReference> = event
        .project
        .kubernetes
        .image_pull_secrets
        .iter()
        .map(|name| LocalObjectReference { name: name.clone() })
        .collect();

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(name),
            labels: Some(job_labels(event, pipeline_name, &job.name)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".into()),
            init_containers: (!init_containers.is_empty()).then_some(init_containers),
            containers,
            volumes: (!volumes.is_empty()).then_some(volumes),
            node_selector: (!node_selector.is_empty()).then_some(node_selector),
            tolerations: (!tolerations.is_empty()).then_some(tolerations),
            image_pull_secrets: (!image_pull_secrets.is_empty()).then_some(image_pull_secrets),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn build_container(
    event: &Event,
    spec: &ContainerSpec,
    source_read_only: bool,
) -> Result<Container, BuildError> {
    if spec.privileged && !event.project.allow_privileged_jobs {
        return Err(BuildError::Validation(format!(
            "container {:?} requested to be privileged, but privileged jobs \
             are not permitted by this project",
            spec.name
        )));
    }
    if spec.mount_docker_socket && !event.project.allow_host_mounts {
        return Err(BuildError::Validation(format!(
            "container {:?} requested to mount the docker socket, but host \
             mounts are not permitted by this project",
            spec.name
        )));
    }

    // Project secrets come first, by key reference into the build secret;
    // the container's own entries follow in declaration order.
    let mut env: Vec<EnvVar> = event
        .project
        .secrets
        .keys()
        .map(|key| EnvVar {
            name: key.clone(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: build_secret_name(&event.build_id),
                    key: key.clone(),
                    optional: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();
    for entry in &spec.env {
        env.push(match entry.split_once('=') {
            Some((name, value)) => EnvVar {
                name: name.to_owned(),
                value: Some(value.to_owned()),
                ..Default::default()
            },
            None => EnvVar {
                name: entry.clone(),
                ..Default::default()
            },
        });
    }

    let mut volume_mounts = Vec::new();
    if let Some(path) = &spec.source_mount_path {
        volume_mounts.push(VolumeMount {
            name: SOURCE_VOLUME.into(),
            mount_path: path.clone(),
            read_only: source_read_only.then_some(true),
            ..Default::default()
        });
    }
    if let Some(path) = &spec.shared_storage_mount_path {
        volume_mounts.push(VolumeMount {
            name: SHARED_STORAGE_VOLUME.into(),
            mount_path: path.clone(),
            ..Default::default()
        });
    }
    if spec.mount_docker_socket {
        volume_mounts.push(VolumeMount {
            name: DOCKER_SOCKET_VOLUME.into(),
            mount_path: DOCKER_SOCKET_PATH.into(),
            ..Default::default()
        });
    }

    Ok(Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        image_pull_policy: spec.image_pull_policy.clone(),
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        args: (!spec.args.is_empty()).then(|| spec.args.clone()),
        env: (!env.is_empty()).then_some(env),
        working_dir: spec.working_dir.clone(),
        stdin: Some(spec.tty),
        tty: Some(spec.tty),
        security_context: Some(SecurityContext {
            privileged: Some(spec.privileged),
            ..Default::default()
        }),
        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
        resources: translate_resources(&spec.name, &spec.resources)?,
        ..Default::default()
    })
}

fn translate_resources(
    container_name: &str,
    resources: &ResourceSpec,
) -> Result<Option<ResourceRequirements>, BuildError> {
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();
    for (key, value) in [
        ("cpu", &resources.cpu.request),
        ("memory", &resources.memory.request),
    ] {
        if let Some(value) = value {
            quantity::validate(value).map_err(|err| {
                BuildError::Validation(format!("container {container_name:?}: {err}"))
            })?;
            requests.insert(key.to_owned(), Quantity(value.clone()));
        }
    }
    for (key, value) in [
        ("cpu", &resources.cpu.limit),
        ("memory", &resources.memory.limit),
    ] {
        if let Some(value) = value {
            quantity::validate(value).map_err(|err| {
                BuildError::Validation(format!("container {container_name:?}: {err}"))
            })?;
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
