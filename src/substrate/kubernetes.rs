use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, Pod, Secret, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::runtime::watcher;

use super::{PodStream, Substrate, SubstrateError, quantity};

/// Substrate implementation backed by a Kubernetes cluster.
pub struct KubernetesSubstrate {
    client: kube::Client,
}

impl KubernetesSubstrate {
    /// Connect using in-cluster configuration (falling back to the local
    /// kubeconfig outside a cluster).
    pub async fn connect() -> Result<Self, SubstrateError> {
        let client = kube::Client::try_default().await?;
        Ok(Self { client })
    }

    pub fn with_client(client: kube::Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pvcs(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl Substrate for KubernetesSubstrate {
    async fn create_secret(
        &self,
        namespace: &str,
        name: &str,
        string_data: BTreeMap<String, String>,
        labels: BTreeMap<String, String>,
    ) -> Result<(), SubstrateError> {
        let secret = build_secret(name, string_data, labels);
        self.secrets(namespace)
            .create(&PostParams::default(), &secret)
            .await
            .map_err(|err| classify_create_error("secret", name, err))?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), SubstrateError> {
        ignore_not_found(
            self.secrets(namespace)
                .delete(name, &DeleteParams::default())
                .await
                .map(|_| ()),
        )
    }

    async fn create_pvc(
        &self,
        namespace: &str,
        name: &str,
        labels: BTreeMap<String, String>,
        size: &str,
        storage_class: Option<&str>,
    ) -> Result<(), SubstrateError> {
        quantity::validate(size).map_err(|err| SubstrateError::InvalidSize { value: err.value })?;
        let pvc = build_pvc(name, labels, size, storage_class);
        self.pvcs(namespace)
            .create(&PostParams::default(), &pvc)
            .await
            .map_err(|err| classify_create_error("persistent volume claim", name, err))?;
        Ok(())
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<(), SubstrateError> {
        ignore_not_found(
            self.pvcs(namespace)
                .delete(name, &DeleteParams::default())
                .await
                .map(|_| ()),
        )
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), SubstrateError> {
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await?;
        Ok(())
    }

    async fn watch_pod(&self, namespace: &str, name: &str) -> Result<PodStream, SubstrateError> {
        let api = self.pods(namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let pod_name = name.to_owned();
        let stream = watcher(api, config).filter_map(move |event| {
            let pod_name = pod_name.clone();
            async move {
                match event {
                    Ok(watcher::Event::Apply(pod) | watcher::Event::InitApply(pod)) => {
                        Some(Ok(pod))
                    }
                    Ok(_) => None,
                    Err(err) => Some(Err(SubstrateError::Watch {
                        pod: pod_name,
                        message: err.to_string(),
                    })),
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn delete_pods_by_label(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<(), SubstrateError> {
        self.pods(namespace)
            .delete_collection(
                &DeleteParams::default(),
                &ListParams::default().labels(label_selector),
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Object construction & error mapping
// ---------------------------------------------------------------------------

fn build_secret(
    name: &str,
    string_data: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            labels: Some(labels),
            ..Default::default()
        },
        string_data: Some(string_data),
        ..Default::default()
    }
}

fn build_pvc(
    name: &str,
    labels: BTreeMap<String, String>,
    size: &str,
    storage_class: Option<&str>,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteMany".into()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_owned(),
                    Quantity(size.to_owned()),
                )])),
                ..Default::default()
            }),
            storage_class_name: storage_class.map(ToOwned::to_owned),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn classify_create_error(kind: &'static str, name: &str, err: kube::Error) -> SubstrateError {
    match err {
        kube::Error::Api(response) if response.code == 409 => SubstrateError::AlreadyExists {
            kind,
            name: name.to_owned(),
        },
        other => SubstrateError::Api(other),
    }
}

fn ignore_not_found(result: Result<(), kube::Error>) -> Result<(), SubstrateError> {
    match result {
        Ok(()) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(other) => Err(SubstrateError::Api(other)),
    }
}
