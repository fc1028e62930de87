use std::path::Path;

use crate::config::DEFAULT_SPEC_FILE;
use crate::event::Event;

use super::{BuildSpec, SpecError};

/// Locate the pipeline spec: the first non-empty file among `paths` wins,
/// then the event's default config files are consulted as a fallback.
pub async fn resolve(paths: &[impl AsRef<Path>], event: &Event) -> Result<String, SpecError> {
    for path in paths {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(contents) if !contents.trim().is_empty() => {
                tracing::debug!(path = %path.display(), "found pipeline spec");
                return Ok(contents);
            }
            Ok(_) => {
                tracing::debug!(path = %path.display(), "pipeline spec file is empty");
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "no pipeline spec here");
            }
        }
    }

    if let Some(contents) = event.worker.default_config_files.get(DEFAULT_SPEC_FILE)
        && !contents.trim().is_empty()
    {
        tracing::debug!("using pipeline spec from event default config files");
        return Ok(contents.clone());
    }

    Err(SpecError::NotFound)
}

/// Resolve and parse the pipeline spec for this event.
pub async fn load(paths: &[impl AsRef<Path>], event: &Event) -> Result<BuildSpec, SpecError> {
    let contents = resolve(paths, event).await?;
    super::parse(&contents)
}
