#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateTerminated, ContainerStatus, Pod, PodStatus,
};
use tokio::sync::mpsc::{self, UnboundedSender};

use drake_worker::config::WorkerConfig;
use drake_worker::event::Event;
use drake_worker::notify::{JobStatusNotifier, NotifyError};
use drake_worker::substrate::{PodStream, Substrate, SubstrateError};

// ---------------------------------------------------------------------------
// Fake substrate
//
// Records every call and serves scripted watch streams, so scheduler tests
// can observe ordering, teardown, and cancellation without a cluster.
// ---------------------------------------------------------------------------

/// What the fake substrate does with a watch on a given pod.
pub enum PodScript {
    /// Primary container terminates with reason `Completed`.
    Succeed,
    /// Primary container terminates with the given reason.
    FailWith(&'static str),
    /// Pod never reaches a terminal state.
    Hang,
    /// The test drives watch snapshots by hand.
    Manual(mpsc::UnboundedReceiver<Pod>),
}

#[derive(Default)]
pub struct SubstrateLog {
    /// (namespace, name, string data, labels)
    pub secrets_created: Vec<(String, String, BTreeMap<String, String>, BTreeMap<String, String>)>,
    pub secrets_deleted: Vec<(String, String)>,
    /// (namespace, name, size, storage class)
    pub pvcs_created: Vec<(String, String, String, Option<String>)>,
    pub pvcs_deleted: Vec<(String, String)>,
    pub pods_created: Vec<Pod>,
    /// Pod names in creation order.
    pub pod_order: Vec<String>,
    /// (namespace, label selector)
    pub label_deletes: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeSubstrate {
    pub log: Mutex<SubstrateLog>,
    scripts: Mutex<HashMap<String, PodScript>>,
}

impl FakeSubstrate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the watch behavior for a pod; unscripted pods succeed.
    pub fn script(&self, pod_name: &str, script: PodScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(pod_name.to_owned(), script);
    }

    /// Script a pod for manual driving and return the sender that feeds its
    /// watch stream.
    pub fn manual(&self, pod_name: &str) -> UnboundedSender<Pod> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script(pod_name, PodScript::Manual(rx));
        tx
    }

    pub fn pod_order(&self) -> Vec<String> {
        self.log.lock().unwrap().pod_order.clone()
    }

    pub fn secrets_created(&self) -> usize {
        self.log.lock().unwrap().secrets_created.len()
    }

    /// Wait until the given pods have all been created, in any order.
    pub async fn wait_for_pods(&self, names: &[&str]) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let order = self.pod_order();
            if names.iter().all(|name| order.iter().any(|n| n == name)) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "pods {names:?} were not all created; saw {order:?}",
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Substrate for FakeSubstrate {
    async fn create_secret(
        &self,
        namespace: &str,
        name: &str,
        string_data: BTreeMap<String, String>,
        labels: BTreeMap<String, String>,
    ) -> Result<(), SubstrateError> {
        self.log.lock().unwrap().secrets_created.push((
            namespace.to_owned(),
            name.to_owned(),
            string_data,
            labels,
        ));
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), SubstrateError> {
        self.log
            .lock()
            .unwrap()
            .secrets_deleted
            .push((namespace.to_owned(), name.to_owned()));
        Ok(())
    }

    async fn create_pvc(
        &self,
        namespace: &str,
        name: &str,
        _labels: BTreeMap<String, String>,
        size: &str,
        storage_class: Option<&str>,
    ) -> Result<(), SubstrateError> {
        self.log.lock().unwrap().pvcs_created.push((
            namespace.to_owned(),
            name.to_owned(),
            size.to_owned(),
            storage_class.map(ToOwned::to_owned),
        ));
        Ok(())
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<(), SubstrateError> {
        self.log
            .lock()
            .unwrap()
            .pvcs_deleted
            .push((namespace.to_owned(), name.to_owned()));
        Ok(())
    }

    async fn create_pod(&self, _namespace: &str, pod: &Pod) -> Result<(), SubstrateError> {
        let mut log = self.log.lock().unwrap();
        let name = pod.metadata.name.clone().unwrap_or_default();
        log.pod_order.push(name);
        log.pods_created.push(pod.clone());
        Ok(())
    }

    async fn watch_pod(&self, _namespace: &str, name: &str) -> Result<PodStream, SubstrateError> {
        let primary = {
            let log = self.log.lock().unwrap();
            log.pods_created
                .iter()
                .find(|pod| pod.metadata.name.as_deref() == Some(name))
                .and_then(|pod| pod.spec.as_ref())
                .map(|spec| spec.containers[0].name.clone())
                .unwrap_or_else(|| panic!("watch on pod {name} before it was created"))
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(name)
            .unwrap_or(PodScript::Succeed);

        let stream: PodStream = match script {
            PodScript::Succeed => stream::iter([Ok(terminal_pod(&primary, "Completed"))])
                .chain(stream::pending())
                .boxed(),
            PodScript::FailWith(reason) => stream::iter([Ok(terminal_pod(&primary, reason))])
                .chain(stream::pending())
                .boxed(),
            PodScript::Hang => stream::pending().boxed(),
            PodScript::Manual(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|pod| (Ok(pod), rx))
            })
            .boxed(),
        };
        Ok(stream)
    }

    async fn delete_pods_by_label(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<(), SubstrateError> {
        self.log
            .lock()
            .unwrap()
            .label_deletes
            .push((namespace.to_owned(), label_selector.to_owned()));
        Ok(())
    }
}

/// A pod snapshot whose named primary container has terminated.
pub fn terminal_pod(primary_container: &str, reason: &str) -> Pod {
    Pod {
        status: Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: primary_container.to_owned(),
                state: Some(ContainerState {
                    terminated: Some(ContainerStateTerminated {
                        reason: Some(reason.to_owned()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Recording notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(String, &'static str)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(String, &'static str)> {
        self.events.lock().unwrap().clone()
    }

    /// The notification kinds recorded for one job, in order.
    pub fn events_for(&self, job: &str) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter(|(name, _)| name == job)
            .map(|(_, kind)| kind)
            .collect()
    }

    fn record(&self, job: &str, kind: &'static str) {
        self.events.lock().unwrap().push((job.to_owned(), kind));
    }
}

#[async_trait]
impl JobStatusNotifier for RecordingNotifier {
    async fn in_progress(&self, job_name: &str) -> Result<(), NotifyError> {
        self.record(job_name, "in-progress");
        Ok(())
    }

    async fn success(&self, job_name: &str) -> Result<(), NotifyError> {
        self.record(job_name, "success");
        Ok(())
    }

    async fn cancelled(&self, job_name: &str) -> Result<(), NotifyError> {
        self.record(job_name, "cancelled");
        Ok(())
    }

    async fn timed_out(&self, job_name: &str) -> Result<(), NotifyError> {
        self.record(job_name, "timed-out");
        Ok(())
    }

    async fn failure(&self, job_name: &str) -> Result<(), NotifyError> {
        self.record(job_name, "failure");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event & config builders
// ---------------------------------------------------------------------------

pub const BUILD_ID: &str = "01testbuild";
pub const WORKER_ID: &str = "worker-01testbuild";

pub fn base_event() -> Event {
    let mut event = Event::default();
    event.id = BUILD_ID.into();
    event.build_id = BUILD_ID.into();
    event.worker_id = WORKER_ID.into();
    event.project.id = "hello-drake".into();
    event.project.kubernetes.namespace = "builds".into();
    event
        .project
        .secrets
        .insert("API_KEY".into(), "hunter2".into());
    event
}

pub fn push_event(git_ref: &str) -> Event {
    let mut event = base_event();
    event.source = "github".into();
    event.kind = "push".into();
    event.payload = format!(r#"{{"ref": "{git_ref}"}}"#);
    event
}

/// Write a Drakefile into `dir` and return a config whose search paths find
/// only it.
pub fn config_with_spec(dir: &tempfile::TempDir, yaml: &str) -> WorkerConfig {
    let path = dir.path().join("Drakefile.yaml");
    std::fs::write(&path, yaml).unwrap();
    WorkerConfig {
        spec_search_paths: vec![path],
        ..Default::default()
    }
}
