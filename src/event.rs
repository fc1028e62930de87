use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Domain model
// ---------------------------------------------------------------------------

/// A single inbound occurrence (webhook, CLI invocation) handled by this
/// worker process. Immutable for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub id: String,
    /// Identifier of the gateway which created the event.
    pub source: String,
    /// Event type; values and meanings are source-specific.
    pub kind: String,
    pub short_title: String,
    pub long_title: String,
    /// Opaque source-specific JSON blob; only the trigger evaluators
    /// interpret it.
    pub payload: String,
    pub build_id: String,
    pub worker_id: String,
    pub revision: Revision,
    pub project: Project,
    pub worker: WorkerMeta,
}

/// VCS details of the commit the build runs against.
#[derive(Debug, Clone, Default)]
pub struct Revision {
    pub commit: String,
    pub git_ref: String,
}

#[derive(Debug, Clone, Default)]
pub struct Project {
    pub id: String,
    pub secrets: BTreeMap<String, String>,
    pub repo: RepoConfig,
    pub kubernetes: KubernetesConfig,
    pub allow_privileged_jobs: bool,
    pub allow_host_mounts: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RepoConfig {
    pub clone_url: String,
    pub git_ref: String,
    /// Set when the project secret carries an `sshKey` entry for cloning.
    pub ssh_key: Option<String>,
    /// Set when the project secret carries a `github.token` entry.
    pub token: Option<String>,
    pub init_submodules: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesConfig {
    pub namespace: String,
    pub image_pull_secrets: Vec<String>,
    pub build_storage_class: Option<String>,
    pub build_storage_size: String,
    pub vcs_sidecar_resources: Option<SidecarResources>,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            image_pull_secrets: Vec::new(),
            build_storage_class: None,
            build_storage_size: "1Gi".into(),
            vcs_sidecar_resources: None,
        }
    }
}

/// Resource bounds for the source-clone sidecar container.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SidecarResources {
    pub cpu_request: Option<String>,
    pub cpu_limit: Option<String>,
    pub memory_request: Option<String>,
    pub memory_limit: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerMeta {
    pub api_address: String,
    pub api_token: String,
    pub config_files_directory: String,
    pub default_config_files: BTreeMap<String, String>,
    pub log_level: String,
    pub git: GitConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitConfig {
    #[serde(rename = "cloneURL")]
    pub clone_url: String,
    pub commit: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub init_submodules: bool,
}

// ---------------------------------------------------------------------------
// Wire document
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EventDocument {
    id: String,
    source: String,
    #[serde(rename = "type")]
    kind: String,
    short_title: String,
    long_title: String,
    /// Source-specific JSON, doubly encoded: the field value is itself a
    /// JSON document in string form.
    payload: String,
    project: ProjectDocument,
    worker: WorkerDocument,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProjectDocument {
    id: String,
    secrets: BTreeMap<String, String>,
    repo: Option<RepoDocument>,
    kubernetes: KubernetesConfig,
    allow_privileged_jobs: bool,
    allow_host_mounts: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RepoDocument {
    #[serde(rename = "cloneURL")]
    clone_url: String,
    #[serde(rename = "ref")]
    git_ref: String,
    ssh_key: Option<String>,
    token: Option<String>,
    init_submodules: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WorkerDocument {
    api_address: String,
    api_token: String,
    config_files_directory: String,
    default_config_files: BTreeMap<String, String>,
    log_level: String,
    git: GitConfig,
}

impl From<EventDocument> for Event {
    fn from(doc: EventDocument) -> Self {
        let build_id = doc.id.clone();
        // One worker process per event, so the event id uniquely identifies
        // the worker as well.
        let worker_id = format!("worker-{}", doc.id);
        let revision = Revision {
            commit: doc.worker.git.commit.clone(),
            git_ref: doc.worker.git.git_ref.clone(),
        };
        let repo = match doc.project.repo {
            Some(repo) => RepoConfig {
                clone_url: if repo.clone_url.is_empty() {
                    doc.worker.git.clone_url.clone()
                } else {
                    repo.clone_url
                },
                git_ref: if repo.git_ref.is_empty() {
                    doc.worker.git.git_ref.clone()
                } else {
                    repo.git_ref
                },
                ssh_key: repo.ssh_key,
                token: repo.token,
                init_submodules: repo.init_submodules || doc.worker.git.init_submodules,
            },
            None => RepoConfig {
                clone_url: doc.worker.git.clone_url.clone(),
                git_ref: doc.worker.git.git_ref.clone(),
                ssh_key: None,
                token: None,
                init_submodules: doc.worker.git.init_submodules,
            },
        };
        Self {
            id: doc.id,
            source: doc.source,
            kind: doc.kind,
            short_title: doc.short_title,
            long_title: doc.long_title,
            payload: doc.payload,
            build_id,
            worker_id,
            revision,
            project: Project {
                id: doc.project.id,
                secrets: doc.project.secrets,
                repo,
                kubernetes: doc.project.kubernetes,
                allow_privileged_jobs: doc.project.allow_privileged_jobs,
                allow_host_mounts: doc.project.allow_host_mounts,
            },
            worker: WorkerMeta {
                api_address: doc.worker.api_address,
                api_token: doc.worker.api_token,
                config_files_directory: doc.worker.config_files_directory,
                default_config_files: doc.worker.default_config_files,
                log_level: doc.worker.log_level,
                git: doc.worker.git,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("error reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing event document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse an event document from raw JSON bytes.
pub fn parse(contents: &str) -> Result<Event, EventError> {
    let doc: EventDocument = serde_json::from_str(contents)?;
    Ok(doc.into())
}

/// Load the event document handed to this worker by the gateway.
pub async fn load(path: &Path) -> Result<Event, EventError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| EventError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse(&contents)
}
