pub mod brig;
pub mod github;

use std::collections::HashMap;
use std::sync::Arc;

use crate::event::Event;
use crate::notify::JobStatusNotifier;
use crate::selector::SelectorError;

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("error parsing trigger configuration: {0}")]
    MalformedConfig(#[source] serde_json::Error),

    #[error("error unmarshaling event payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// A predicate attached to a pipeline that decides, from an event, whether
/// that pipeline runs.
pub trait Trigger: Send + Sync {
    /// Deterministic and side-effect free for fixed inputs.
    fn matches(&self, event: &Event) -> Result<bool, TriggerError>;

    /// A notifier for reporting job statuses upstream. `None` when the event
    /// cannot be reported back to its provider; callers treat that as a
    /// no-op notifier.
    fn notifier_for(
        &self,
        event: &Event,
    ) -> Result<Option<Arc<dyn JobStatusNotifier>>, TriggerError>;
}

pub type TriggerBuilder = fn(&serde_json::Value) -> Result<Box<dyn Trigger>, TriggerError>;

/// Maps trigger spec URIs to evaluator constructors. New event providers add
/// an entry here without touching the scheduler.
pub struct TriggerRegistry {
    builders: HashMap<&'static str, TriggerBuilder>,
}

impl TriggerRegistry {
    pub fn standard() -> Self {
        let mut builders: HashMap<&'static str, TriggerBuilder> = HashMap::new();
        builders.insert(github::SPEC_URI, github::from_config);
        builders.insert(brig::SPEC_URI, brig::from_config);
        Self { builders }
    }

    /// `None` for spec URIs this worker does not understand; such triggers
    /// are skipped, never errors.
    pub fn build(
        &self,
        spec_uri: &str,
        config: &serde_json::Value,
    ) -> Option<Result<Box<dyn Trigger>, TriggerError>> {
        self.builders.get(spec_uri).map(|builder| builder(config))
    }
}
