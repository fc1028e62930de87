use std::sync::Arc;

use serde::Deserialize;

use crate::event::Event;
use crate::notify::JobStatusNotifier;

use super::{Trigger, TriggerError};

pub const SPEC_URI: &str = "github.com/lovethedrake/drakespec-brigade-cli";

/// Source identifier stamped on events emitted by the brig CLI gateway.
const EVENT_SOURCE: &str = "brigade.sh/cli";

pub fn from_config(config: &serde_json::Value) -> Result<Box<dyn Trigger>, TriggerError> {
    let trigger: BrigCliTrigger =
        serde_json::from_value(config.clone()).map_err(TriggerError::MalformedConfig)?;
    Ok(Box::new(trigger))
}

/// Trigger for builds kicked off manually through the brig CLI.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrigCliTrigger {
    event_types: Vec<String>,
}

impl Trigger for BrigCliTrigger {
    fn matches(&self, event: &Event) -> Result<bool, TriggerError> {
        if event.source != EVENT_SOURCE {
            tracing::debug!(
                source = %event.source,
                "event source does not match brig trigger",
            );
            return Ok(false);
        }
        Ok(self.event_types.iter().any(|kind| *kind == event.kind))
    }

    fn notifier_for(
        &self,
        _event: &Event,
    ) -> Result<Option<Arc<dyn JobStatusNotifier>>, TriggerError> {
        // CLI events have no upstream check-run equivalent.
        Ok(None)
    }
}
