pub mod load;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Entity model
// ---------------------------------------------------------------------------

/// A parsed, validated pipeline spec document.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub pipelines: Vec<Pipeline>,
}

/// An acyclic graph of jobs executed together.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    pub triggers: Vec<TriggerSpec>,
    /// Jobs in declaration order, dependencies resolved.
    pub jobs: Vec<JobSpec>,
}

impl Pipeline {
    /// True when any container in the pipeline mounts shared storage, which
    /// is what obligates the executor to provision the pipeline PVC.
    pub fn uses_shared_storage(&self) -> bool {
        self.jobs.iter().any(JobSpec::uses_shared_storage)
    }
}

/// A unit of work materialised as a pod with one primary container and zero
/// or more sidecars.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub dependencies: Vec<String>,
    pub primary_container: ContainerSpec,
    pub sidecars: Vec<ContainerSpec>,
    pub source_mount_mode: SourceMountMode,
    pub os_family: Option<String>,
    pub cpu_arch: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl JobSpec {
    pub fn containers(&self) -> impl Iterator<Item = &ContainerSpec> {
        std::iter::once(&self.primary_container).chain(self.sidecars.iter())
    }

    pub fn uses_source(&self) -> bool {
        self.containers().any(|c| c.source_mount_path.is_some())
    }

    pub fn uses_shared_storage(&self) -> bool {
        self.containers()
            .any(|c| c.shared_storage_mount_path.is_some())
    }

    pub fn mounts_docker_socket(&self) -> bool {
        self.containers().any(|c| c.mount_docker_socket)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub image_pull_policy: Option<String>,
    pub command: Vec<String>,
    pub args: Vec<String>,
    /// `K=V` or bare `K` entries, in declaration order.
    pub env: Vec<String>,
    pub working_dir: Option<String>,
    pub tty: bool,
    pub privileged: bool,
    pub mount_docker_socket: bool,
    pub source_mount_path: Option<String>,
    pub shared_storage_mount_path: Option<String>,
    pub resources: ResourceSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceSpec {
    pub cpu: ResourceBounds,
    pub memory: ResourceBounds,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceBounds {
    pub request: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SourceMountMode {
    #[default]
    #[serde(rename = "readOnly")]
    ReadOnly,
    #[serde(rename = "readWrite")]
    ReadWrite,
}

/// A predicate attachment deciding, from an event, whether a pipeline runs.
/// The config payload is opaque here; the evaluator registry decodes it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    pub spec_uri: String,
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
}

fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

// ---------------------------------------------------------------------------
// Wire document
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SpecDocument {
    jobs: BTreeMap<String, JobDocument>,
    pipelines: BTreeMap<String, PipelineDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDocument {
    primary_container: ContainerSpec,
    #[serde(default)]
    sidecars: Vec<ContainerSpec>,
    #[serde(default)]
    source_mount_mode: SourceMountMode,
    #[serde(default)]
    os_family: Option<String>,
    #[serde(default)]
    cpu_arch: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineDocument {
    #[serde(default)]
    triggers: Vec<TriggerSpec>,
    jobs: Vec<PipelineJobRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineJobRef {
    name: String,
    #[serde(default)]
    dependencies: Vec<String>,
}

// ---------------------------------------------------------------------------
// Parsing & validation
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("no pipeline spec found at any of the configured locations")]
    NotFound,

    #[error("error reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing pipeline spec: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid pipeline spec: {0}")]
    Invalid(String),
}

/// Parse a Drakefile document into a validated [`BuildSpec`].
pub fn parse(yaml: &str) -> Result<BuildSpec, SpecError> {
    let doc: SpecDocument = serde_yaml::from_str(yaml)?;

    let mut pipelines = Vec::with_capacity(doc.pipelines.len());
    for (pipeline_name, pipeline_doc) in &doc.pipelines {
        pipelines.push(resolve_pipeline(pipeline_name, pipeline_doc, &doc.jobs)?);
    }
    Ok(BuildSpec { pipelines })
}

fn resolve_pipeline(
    name: &str,
    doc: &PipelineDocument,
    jobs: &BTreeMap<String, JobDocument>,
) -> Result<Pipeline, SpecError> {
    if name.is_empty() {
        return Err(SpecError::Invalid("pipeline is missing a name".into()));
    }
    if doc.jobs.is_empty() {
        return Err(SpecError::Invalid(format!(
            "pipeline {name:?} must have at least one job"
        )));
    }

    let mut seen = BTreeSet::new();
    let mut resolved = Vec::with_capacity(doc.jobs.len());
    for job_ref in &doc.jobs {
        if !seen.insert(job_ref.name.as_str()) {
            return Err(SpecError::Invalid(format!(
                "pipeline {name:?} references job {:?} more than once",
                job_ref.name
            )));
        }
        let job_doc = jobs.get(&job_ref.name).ok_or_else(|| {
            SpecError::Invalid(format!(
                "pipeline {name:?} references undefined job {:?}",
                job_ref.name
            ))
        })?;
        validate_containers(&job_ref.name, job_doc)?;
        resolved.push(JobSpec {
            name: job_ref.name.clone(),
            dependencies: job_ref.dependencies.clone(),
            primary_container: job_doc.primary_container.clone(),
            sidecars: job_doc.sidecars.clone(),
            source_mount_mode: job_doc.source_mount_mode,
            os_family: job_doc.os_family.clone(),
            cpu_arch: job_doc.cpu_arch.clone(),
            timeout_seconds: job_doc.timeout_seconds,
        });
    }

    for job in &resolved {
        for dependency in &job.dependencies {
            if !seen.contains(dependency.as_str()) {
                return Err(SpecError::Invalid(format!(
                    "job {:?} in pipeline {name:?} depends on {dependency:?}, \
                     which is not part of the pipeline",
                    job.name
                )));
            }
        }
    }

    check_acyclic(name, &resolved)?;

    Ok(Pipeline {
        name: name.to_owned(),
        triggers: doc.triggers.clone(),
        jobs: resolved,
    })
}

fn validate_containers(job_name: &str, job: &JobDocument) -> Result<(), SpecError> {
    let mut names = BTreeSet::new();
    for container in std::iter::once(&job.primary_container).chain(job.sidecars.iter()) {
        if container.name.is_empty() {
            return Err(SpecError::Invalid(format!(
                "job {job_name:?} has a container with no name"
            )));
        }
        if container.image.is_empty() {
            return Err(SpecError::Invalid(format!(
                "container {:?} of job {job_name:?} is missing an image",
                container.name
            )));
        }
        if !names.insert(container.name.as_str()) {
            return Err(SpecError::Invalid(format!(
                "job {job_name:?} declares container {:?} more than once",
                container.name
            )));
        }
    }
    Ok(())
}

/// Reject dependency cycles with an iterative depth-first walk.
fn check_acyclic(pipeline_name: &str, jobs: &[JobSpec]) -> Result<(), SpecError> {
    let by_name: BTreeMap<&str, &JobSpec> =
        jobs.iter().map(|j| (j.name.as_str(), j)).collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    for job in jobs {
        if marks.contains_key(job.name.as_str()) {
            continue;
        }
        // (job, next dependency index) pairs form the explicit DFS stack.
        let mut stack: Vec<(&JobSpec, usize)> = vec![(job, 0)];
        marks.insert(job.name.as_str(), Mark::Visiting);
        while let Some((current, next)) = stack.pop() {
            if next >= current.dependencies.len() {
                marks.insert(current.name.as_str(), Mark::Done);
                continue;
            }
            stack.push((current, next + 1));
            let dep_name = current.dependencies[next].as_str();
            match marks.get(dep_name) {
                Some(Mark::Visiting) => {
                    return Err(SpecError::Invalid(format!(
                        "pipeline {pipeline_name:?} has a dependency cycle through \
                         job {dep_name:?}"
                    )));
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(dep_name, Mark::Visiting);
                    stack.push((by_name[dep_name], 0));
                }
            }
        }
    }
    Ok(())
}
