use crate::cancel::CancelFlag;
use crate::disk::{disk_space_info, DiskSpaceInfo};
use crate::error::{BatchError, BatchStage, ValidationIssue};
use crate::fsops::{
    copy_with_metadata, create_missing_dirs, move_file, normalize_path, remove_dirs_if_empty,
    same_file,
};
use crate::journal::OperationRecord;
use crate::record::RenameOperation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Operations that passed validation and would move a file.
    pub planned: usize,
    pub executed: usize,
    /// Operations whose source already is their target.
    pub unchanged: usize,
    pub dry_run: bool,
}

/// Applies a flat list of renames as one unit.
///
/// Every source is first copied into a per-run staging directory; only then
/// are targets written, in input order, with originals removed one by one.
/// A failure while committing moves everything already placed back.
#[derive(Debug, Clone, Default)]
pub struct BatchRenameExecutor {
    staging_parent: Option<PathBuf>,
    cancel: Option<CancelFlag>,
}

#[derive(Debug)]
struct StagedRename {
    index: usize,
    staged_path: PathBuf,
}

#[derive(Debug)]
struct Staging {
    // Removed with its contents on drop, whatever the outcome.
    _dir: TempDir,
    entries: Vec<StagedRename>,
}

impl BatchRenameExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages into `dir` instead of the system temp directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_parent = Some(dir.into());
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn disk_space_info(&self, operations: &[RenameOperation]) -> Option<DiskSpaceInfo> {
        disk_space_info(operations)
    }

    pub fn execute(
        &self,
        operations: &mut [RenameOperation],
        dry_run: bool,
    ) -> Result<BatchOutcome, BatchError> {
        let active: Vec<usize> = operations
            .iter()
            .enumerate()
            .filter(|(_, op)| !is_noop(op))
            .map(|(index, _)| index)
            .collect();
        let unchanged = operations.len() - active.len();

        self.check_cancel()?;
        debug!(stage = %BatchStage::Validate, operations = active.len(), "batch rename");
        let issues = validate(operations, &active);
        if !issues.is_empty() {
            return Err(BatchError::Validation(issues));
        }

        if dry_run {
            info!(planned = active.len(), unchanged, "batch rename dry run validated");
            return Ok(BatchOutcome {
                planned: active.len(),
                executed: 0,
                unchanged,
                dry_run: true,
            });
        }

        self.check_cancel()?;
        debug!(stage = %BatchStage::PrepareDirs, "batch rename");
        let created_dirs = prepare_dirs(operations, &active)?;

        debug!(stage = %BatchStage::Stage, "batch rename");
        let staging = match self.stage(operations, &active) {
            Ok(staging) => staging,
            Err(err) => {
                remove_dirs_if_empty(&created_dirs);
                return Err(err);
            }
        };

        if let Err(err) = self.check_cancel() {
            remove_dirs_if_empty(&created_dirs);
            return Err(err);
        }

        debug!(stage = %BatchStage::Commit, "batch rename");
        let executed = commit(operations, &staging, &created_dirs)?;

        info!(executed, unchanged, "batch rename applied");
        Ok(BatchOutcome {
            planned: active.len(),
            executed,
            unchanged,
            dry_run: false,
        })
    }

    fn check_cancel(&self) -> Result<(), BatchError> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(BatchError::Cancelled),
            _ => Ok(()),
        }
    }

    fn stage(
        &self,
        operations: &[RenameOperation],
        active: &[usize],
    ) -> Result<Staging, BatchError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".mm-stage-");
        let dir = match &self.staging_parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|err| BatchError::Execution {
            stage: BatchStage::Stage,
            message: format!("could not create staging directory: {err}"),
            rollback_failures: Vec::new(),
        })?;

        let mut entries = Vec::with_capacity(active.len());
        for (ordinal, &index) in active.iter().enumerate() {
            self.check_cancel()?;
            let op = &operations[index];
            let staged_path = dir.path().join(format!("{ordinal:06}.stage"));
            copy_with_metadata(&op.source_path, &staged_path).map_err(|err| {
                BatchError::Execution {
                    stage: BatchStage::Stage,
                    message: format!(
                        "could not stage {}: {err}",
                        op.source_path.display()
                    ),
                    rollback_failures: Vec::new(),
                }
            })?;
            entries.push(StagedRename { index, staged_path });
        }

        Ok(Staging { _dir: dir, entries })
    }
}

fn is_noop(op: &RenameOperation) -> bool {
    op.source_path == op.target_path || same_file(&op.source_path, &op.target_path)
}

fn validate(operations: &[RenameOperation], active: &[usize]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut sources = HashMap::<PathBuf, usize>::new();
    let mut targets = HashMap::<PathBuf, usize>::new();

    for &index in active {
        let op = &operations[index];
        match fs::metadata(&op.source_path) {
            Err(_) => issues.push(ValidationIssue::MissingSource {
                source_path: op.source_path.clone(),
            }),
            Ok(meta) if !meta.is_file() => issues.push(ValidationIssue::NotAFile {
                source_path: op.source_path.clone(),
            }),
            Ok(_) => {}
        }

        if sources.insert(normalize_path(&op.source_path), index).is_some() {
            issues.push(ValidationIssue::DuplicateSource {
                source_path: op.source_path.clone(),
            });
        }

        let target_key = normalize_path(&op.target_path);
        match targets.get(&target_key) {
            Some(&first) => issues.push(ValidationIssue::DuplicateTarget {
                target_path: op.target_path.clone(),
                first_source: operations[first].source_path.clone(),
                second_source: op.source_path.clone(),
            }),
            None => {
                targets.insert(target_key, index);
            }
        }

        if fs::symlink_metadata(&op.target_path).is_ok() {
            issues.push(ValidationIssue::TargetExists {
                source_path: op.source_path.clone(),
                target_path: op.target_path.clone(),
            });
        }
    }

    for &index in active {
        let op = &operations[index];
        let source_key = normalize_path(&op.source_path);
        if let Some(&other) = targets.get(&source_key) {
            if other != index {
                issues.push(ValidationIssue::CircularRename {
                    source_path: op.source_path.clone(),
                    other_source: operations[other].source_path.clone(),
                });
            }
        }
    }

    issues
}

fn prepare_dirs(
    operations: &[RenameOperation],
    active: &[usize],
) -> Result<Vec<PathBuf>, BatchError> {
    let mut created = Vec::new();
    for &index in active {
        let op = &operations[index];
        let Some(parent) = op.target_path.parent() else {
            continue;
        };
        if op.source_path.parent() == Some(parent) {
            continue;
        }
        if let Err(err) = create_missing_dirs(parent, &mut created) {
            let cleanup_failures = remove_dirs_if_empty(&created);
            return Err(BatchError::Preparation {
                message: format!("could not create {}: {err}", parent.display()),
                cleanup_failures,
            });
        }
    }
    Ok(created)
}

fn commit(
    operations: &mut [RenameOperation],
    staging: &Staging,
    created_dirs: &[PathBuf],
) -> Result<usize, BatchError> {
    let mut journal = Vec::<(usize, OperationRecord)>::with_capacity(staging.entries.len());

    for entry in &staging.entries {
        let op = &operations[entry.index];
        if let Err(err) = move_file(&entry.staged_path, &op.target_path) {
            let message = format!("could not place {}: {err}", op.target_path.display());
            return Err(fail_commit(operations, &journal, created_dirs, message, Vec::new()));
        }

        if let Err(err) = fs::remove_file(&op.source_path) {
            let message = format!("could not remove original {}: {err}", op.source_path.display());
            let mut failures = Vec::new();
            if let Err(remove_err) = fs::remove_file(&op.target_path) {
                failures.push(format!(
                    "could not remove placed copy {}: {remove_err}",
                    op.target_path.display()
                ));
            }
            return Err(fail_commit(operations, &journal, created_dirs, message, failures));
        }

        journal.push((
            entry.index,
            OperationRecord::moved(&op.source_path, &op.target_path),
        ));
        operations[entry.index].executed = true;
    }

    Ok(journal.len())
}

fn fail_commit(
    operations: &mut [RenameOperation],
    journal: &[(usize, OperationRecord)],
    created_dirs: &[PathBuf],
    message: String,
    mut rollback_failures: Vec<String>,
) -> BatchError {
    warn!(error = %message, applied = journal.len(), "batch commit failed, rolling back");
    rollback_failures.extend(rollback(operations, journal, created_dirs));
    BatchError::Execution {
        stage: BatchStage::Commit,
        message,
        rollback_failures,
    }
}

fn rollback(
    operations: &mut [RenameOperation],
    journal: &[(usize, OperationRecord)],
    created_dirs: &[PathBuf],
) -> Vec<String> {
    debug!(stage = %BatchStage::Rollback, entries = journal.len(), "batch rename");
    let mut failures = Vec::new();
    for (index, entry) in journal.iter().rev() {
        match entry.undo() {
            Ok(_) => operations[*index].executed = false,
            Err(err) => {
                let message = entry.describe_failure(&err);
                warn!(error = %message, "rollback step failed");
                failures.push(message);
            }
        }
    }
    failures.extend(remove_dirs_if_empty(created_dirs));
    failures
}
