use std::fmt;

use crate::notify::NotifyError;
use crate::spec::SpecError;
use crate::substrate::SubstrateError;
use crate::trigger::TriggerError;

/// Errors surfaced by the dispatcher, pipeline, and job executors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// Job configuration rejected before any substrate call.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    #[error("error sending job status notification: {0}")]
    Notify(#[from] NotifyError),

    /// The primary container terminated with a reason other than `Completed`.
    #[error("pod {pod:?} failed (reason {reason:?})")]
    PodFailed { pod: String, reason: String },

    #[error("timed out waiting for job {job:?} to complete")]
    TimedOut { job: String },

    #[error("in-progress job {job:?} aborted")]
    InProgressJobAborted { job: String },

    #[error("pending job {job:?} canceled")]
    PendingJobCanceled { job: String },

    #[error(transparent)]
    Multi(#[from] MultiError),
}

/// Aggregate carried up when a pipeline or the dispatcher collects two or
/// more errors.
#[derive(Debug)]
pub struct MultiError {
    pub errs: Vec<BuildError>,
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors encountered:", self.errs.len())?;
        for (i, err) in self.errs.iter().enumerate() {
            write!(f, "\n{}. {err}", i + 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

/// Fold collected errors per the aggregation rules: zero errors is success,
/// a single error propagates as-is, two or more become a [`MultiError`].
pub fn fold_errors(mut errs: Vec<BuildError>) -> Result<(), BuildError> {
    match errs.len() {
        0 => Ok(()),
        1 => Err(errs.remove(0)),
        _ => Err(MultiError { errs }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_zero_errors_is_ok() {
        assert!(fold_errors(Vec::new()).is_ok());
    }

    #[test]
    fn fold_single_error_propagates_as_is() {
        let errs = vec![BuildError::TimedOut { job: "test".into() }];
        let err = fold_errors(errs).unwrap_err();
        assert!(matches!(err, BuildError::TimedOut { ref job } if job == "test"));
    }

    #[test]
    fn fold_multiple_errors_aggregates() {
        let errs = vec![
            BuildError::TimedOut { job: "a".into() },
            BuildError::PendingJobCanceled { job: "b".into() },
        ];
        let err = fold_errors(errs).unwrap_err();
        let BuildError::Multi(multi) = err else {
            panic!("expected MultiError, got: {err:?}");
        };
        assert_eq!(multi.errs.len(), 2);
    }

    #[test]
    fn multi_error_display_enumerates() {
        let multi = MultiError {
            errs: vec![
                BuildError::TimedOut { job: "a".into() },
                BuildError::PendingJobCanceled { job: "b".into() },
            ],
        };
        let rendered = multi.to_string();
        assert!(rendered.starts_with("2 errors encountered:"));
        assert!(rendered.contains("1. timed out waiting for job \"a\" to complete"));
        assert!(rendered.contains("2. pending job \"b\" canceled"));
    }

    #[test]
    fn job_error_messages() {
        assert_eq!(
            BuildError::InProgressJobAborted { job: "lint".into() }.to_string(),
            "in-progress job \"lint\" aborted",
        );
        assert_eq!(
            BuildError::PodFailed {
                pod: "ci-lint-01".into(),
                reason: "OOMKilled".into(),
            }
            .to_string(),
            "pod \"ci-lint-01\" failed (reason \"OOMKilled\")",
        );
    }
}
