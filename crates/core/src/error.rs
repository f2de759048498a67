use crate::finalize::PostProcessingSummary;
use crate::record::MediaRecord;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One pre-flight problem found in a rename batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("source does not exist: {}", .source_path.display())]
    MissingSource { source_path: PathBuf },
    #[error("source is not a regular file: {}", .source_path.display())]
    NotAFile { source_path: PathBuf },
    #[error("source listed more than once: {}", .source_path.display())]
    DuplicateSource { source_path: PathBuf },
    #[error(
        "duplicate target {}: both {} and {} rename to it",
        .target_path.display(),
        .first_source.display(),
        .second_source.display()
    )]
    DuplicateTarget {
        target_path: PathBuf,
        first_source: PathBuf,
        second_source: PathBuf,
    },
    #[error("target exists: {} (from {})", .target_path.display(), .source_path.display())]
    TargetExists {
        source_path: PathBuf,
        target_path: PathBuf,
    },
    #[error(
        "circular rename: {} is the target of {}",
        .source_path.display(),
        .other_source.display()
    )]
    CircularRename {
        source_path: PathBuf,
        other_source: PathBuf,
    },
}

/// Phase of a batch rename, used in logs and execution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Validate,
    PrepareDirs,
    Stage,
    Commit,
    Rollback,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchStage::Validate => "validate",
            BatchStage::PrepareDirs => "prepare-dirs",
            BatchStage::Stage => "stage",
            BatchStage::Commit => "commit",
            BatchStage::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),
    #[error("could not prepare target directories: {message}")]
    Preparation {
        message: String,
        cleanup_failures: Vec<String>,
    },
    #[error("batch failed during {stage}: {message}")]
    Execution {
        stage: BatchStage,
        message: String,
        rollback_failures: Vec<String>,
    },
    #[error("batch cancelled before commit")]
    Cancelled,
}

impl BatchError {
    /// Files that may be left in an inconsistent location.
    pub fn rollback_failures(&self) -> &[String] {
        match self {
            BatchError::Execution {
                rollback_failures, ..
            } => rollback_failures,
            BatchError::Preparation {
                cleanup_failures, ..
            } => cleanup_failures,
            _ => &[],
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizationFailureKind {
    ItemFailed,
    Cancelled,
}

/// A finalization run that was aborted and rolled back.
///
/// `partial_summary` keeps the skipped and failed items but never the
/// processed ones, since nothing from the run was kept.
#[derive(Debug)]
pub struct FinalizationError {
    pub kind: FinalizationFailureKind,
    pub message: String,
    pub failing_record: Option<Box<MediaRecord>>,
    pub partial_summary: PostProcessingSummary,
    pub rollback_failures: Vec<String>,
}

impl fmt::Display for FinalizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.failing_record) {
            (FinalizationFailureKind::Cancelled, _) => f.write_str("finalization cancelled")?,
            (FinalizationFailureKind::ItemFailed, Some(record)) => write!(
                f,
                "finalization failed at {}: {}",
                record.source_path.display(),
                self.message
            )?,
            (FinalizationFailureKind::ItemFailed, None) => {
                write!(f, "finalization failed: {}", self.message)?
            }
        }
        if !self.rollback_failures.is_empty() {
            write!(
                f,
                " ({} rollback step(s) failed)",
                self.rollback_failures.len()
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for FinalizationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_issue() {
        let err = BatchError::Validation(vec![
            ValidationIssue::DuplicateTarget {
                target_path: PathBuf::from("/lib/A.mkv"),
                first_source: PathBuf::from("/in/1.mkv"),
                second_source: PathBuf::from("/in/2.mkv"),
            },
            ValidationIssue::MissingSource {
                source_path: PathBuf::from("/in/3.mkv"),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("/in/1.mkv"));
        assert!(text.contains("/in/2.mkv"));
        assert!(text.contains("source does not exist: /in/3.mkv"));
        assert!(err.rollback_failures().is_empty());
    }

    #[test]
    fn finalization_error_mentions_record_and_rollback() {
        let err = FinalizationError {
            kind: FinalizationFailureKind::ItemFailed,
            message: "source file no longer exists".to_string(),
            failing_record: Some(Box::new(MediaRecord::movie("/in/heat.mkv", "Heat", 1995))),
            partial_summary: PostProcessingSummary::default(),
            rollback_failures: vec!["could not move back".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("/in/heat.mkv"));
        assert!(text.contains("1 rollback step(s) failed"));
    }
}
