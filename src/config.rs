use std::path::PathBuf;
use std::time::Duration;

/// File name looked up in the event's default config files when no spec file
/// is found on disk.
pub const DEFAULT_SPEC_FILE: &str = "Drakefile.yaml";

/// Process-wide defaults for one worker run.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Location of the event document handed over by the gateway.
    pub event_path: PathBuf,
    /// Ordered locations searched for the pipeline spec; the first
    /// non-empty file wins.
    pub spec_search_paths: Vec<PathBuf>,
    /// Storage class applied to shared-storage PVCs when the project does
    /// not name one.
    pub default_build_storage_class: Option<String>,
    /// Watchdog applied to jobs that do not declare their own timeout.
    pub default_job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            event_path: PathBuf::from("/var/event/event.json"),
            spec_search_paths: vec![
                PathBuf::from("/etc/brigade/script"),
                PathBuf::from("/vcs/Drakefile.yaml"),
                PathBuf::from("/etc/brigade-project/defaultScript"),
                PathBuf::from("/etc/brigade-default-script/Drakefile.yaml"),
            ],
            default_build_storage_class: None,
            default_job_timeout: Duration::from_secs(10 * 60),
        }
    }
}
