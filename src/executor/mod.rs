pub mod dispatcher;
pub mod job;
pub mod pipeline;
pub mod pod;
pub mod secret;
pub mod source;
pub mod storage;

use std::collections::BTreeMap;

use crate::event::Event;

// ---------------------------------------------------------------------------
// Resource naming & labelling
//
// Every object this worker creates carries the same label family so that
// teardown can find it again by selector.
// ---------------------------------------------------------------------------

pub fn build_secret_name(build_id: &str) -> String {
    build_id.to_lowercase()
}

/// All callers who need to reference the shared storage PVC by name can
/// derive it from the worker id and pipeline name alone.
pub fn shared_storage_pvc_name(worker_id: &str, pipeline_name: &str) -> String {
    format!(
        "{}-{}",
        worker_id.to_lowercase(),
        pipeline_name.to_lowercase(),
    )
}

pub fn pod_name(pipeline_name: &str, job_name: &str, build_id: &str) -> String {
    format!("{pipeline_name}-{job_name}-{build_id}")
}

/// Selector matching every pod created by this worker process.
pub fn worker_label_selector(worker_id: &str) -> String {
    format!("worker={}", worker_id.to_lowercase())
}

pub(crate) fn common_labels(event: &Event, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("heritage".to_owned(), "brigade".to_owned()),
        ("component".to_owned(), component.to_owned()),
        ("project".to_owned(), event.project.id.clone()),
        ("worker".to_owned(), event.worker_id.to_lowercase()),
        ("build".to_owned(), event.build_id.to_lowercase()),
    ])
}

pub(crate) fn job_labels(
    event: &Event,
    pipeline_name: &str,
    job_name: &str,
) -> BTreeMap<String, String> {
    let mut labels = common_labels(event, "job");
    labels.insert(
        "jobname".to_owned(),
        format!("{pipeline_name}-{job_name}"),
    );
    labels.insert("thedrake.io/pipeline".to_owned(), pipeline_name.to_owned());
    labels.insert("thedrake.io/job".to_owned(), job_name.to_owned());
    labels
}
