pub mod kubernetes;
pub mod quantity;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use k8s_openapi::api::core::v1::Pod;

/// Stream of pod snapshots for one watched pod. Ends only on transport
/// failure or when the consumer drops it.
pub type PodStream = BoxStream<'static, Result<Pod, SubstrateError>>;

#[derive(Debug, thiserror::Error)]
pub enum SubstrateError {
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("invalid storage size {value:?}")]
    InvalidSize { value: String },

    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),

    #[error("error watching pod {pod:?}: {message}")]
    Watch { pod: String, message: String },
}

/// The minimal surface of the container orchestrator consumed by the
/// executors. All operations abort promptly when the caller's future is
/// dropped, so cancellation is always observable.
#[async_trait]
pub trait Substrate: Send + Sync {
    async fn create_secret(
        &self,
        namespace: &str,
        name: &str,
        string_data: BTreeMap<String, String>,
        labels: BTreeMap<String, String>,
    ) -> Result<(), SubstrateError>;

    /// Idempotent: deleting a secret that is already gone succeeds.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), SubstrateError>;

    /// Creates a `ReadWriteMany` claim of the given size. The size string is
    /// validated before any API call.
    async fn create_pvc(
        &self,
        namespace: &str,
        name: &str,
        labels: BTreeMap<String, String>,
        size: &str,
        storage_class: Option<&str>,
    ) -> Result<(), SubstrateError>;

    /// Idempotent: deleting a claim that is already gone succeeds.
    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<(), SubstrateError>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), SubstrateError>;

    /// Watch a single pod by name, yielding a snapshot per change.
    async fn watch_pod(&self, namespace: &str, name: &str) -> Result<PodStream, SubstrateError>;

    /// Best-effort bulk delete by label selector.
    async fn delete_pods_by_label(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<(), SubstrateError>;
}
