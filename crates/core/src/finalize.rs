use crate::cancel::CancelFlag;
use crate::config::LibraryLayoutConfig;
use crate::conflict::{
    backup_path_for, is_numbered_sibling, unique_sibling, ConflictResolution, OverwriteBackup,
};
use crate::error::{FinalizationError, FinalizationFailureKind};
use crate::fsops::{
    copy_with_metadata, create_missing_dirs, move_file, normalize_path, remove_dirs_if_empty,
    remove_empty_ancestors, same_file,
};
use crate::journal::OperationRecord;
use crate::lock::RootLock;
use crate::record::MediaRecord;
use crate::template::TemplateSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PostProcessingOptions {
    pub dry_run: bool,
    pub copy_mode: bool,
    pub conflict_resolution: ConflictResolution,
    pub cleanup_empty_dirs: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ItemAction {
    Moved,
    Copied,
    PlannedMove,
    PlannedCopy,
    Skipped,
    Failed,
}

impl ItemAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemAction::Moved => "moved",
            ItemAction::Copied => "copied",
            ItemAction::PlannedMove => "planned-move",
            ItemAction::PlannedCopy => "planned-copy",
            ItemAction::Skipped => "skipped",
            ItemAction::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostProcessingItemResult {
    pub record: MediaRecord,
    pub source_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub action: ItemAction,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostProcessingSummary {
    pub processed: Vec<PostProcessingItemResult>,
    pub skipped: Vec<PostProcessingItemResult>,
    pub failed: Vec<PostProcessingItemResult>,
}

impl PostProcessingSummary {
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.failed.len()
    }

    fn push(&mut self, result: PostProcessingItemResult) {
        match result.action {
            ItemAction::Skipped => self.skipped.push(result),
            ItemAction::Failed => self.failed.push(result),
            _ => self.processed.push(result),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Processed,
    Skipped,
    Failed,
}

/// Live outcome of one item, delivered in processing order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessingEvent {
    pub kind: EventKind,
    pub record: MediaRecord,
    pub source_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub message: Option<String>,
}

impl From<&PostProcessingItemResult> for ProcessingEvent {
    fn from(result: &PostProcessingItemResult) -> Self {
        let kind = match result.action {
            ItemAction::Skipped => EventKind::Skipped,
            ItemAction::Failed => EventKind::Failed,
            _ => EventKind::Processed,
        };
        Self {
            kind,
            record: result.record.clone(),
            source_path: result.source_path.clone(),
            target_path: result.target_path.clone(),
            message: result.message.clone(),
        }
    }
}

/// Moves or copies matched records into the organized library tree.
///
/// Each run is all-or-nothing: a failing item rolls back every move, copy
/// and overwrite of the run before the error is returned. Runs are
/// sequential and assume no other process writes below the target roots;
/// live runs hold an advisory lock file in each root they touch.
#[derive(Debug, Clone)]
pub struct LibraryFinalizer {
    layout: LibraryLayoutConfig,
    templates: TemplateSet,
    cancel: Option<CancelFlag>,
}

struct ItemFailure {
    message: String,
    target_path: Option<PathBuf>,
}

impl ItemFailure {
    fn new(message: impl Into<String>, target_path: Option<PathBuf>) -> Self {
        Self {
            message: message.into(),
            target_path,
        }
    }
}

struct JournalEntry {
    record_index: usize,
    operation: OperationRecord,
}

struct Observers<'p, 'e> {
    progress: Option<&'p mut dyn FnMut(usize, usize)>,
    events: Option<&'e mut dyn FnMut(&ProcessingEvent)>,
}

impl Observers<'_, '_> {
    fn report(&mut self, result: &PostProcessingItemResult, position: usize, total: usize) {
        if let Some(events) = self.events.as_mut() {
            events(&ProcessingEvent::from(result));
        }
        if let Some(progress) = self.progress.as_mut() {
            progress(position, total);
        }
    }
}

/// Everything one `process` call has done so far, kept for rollback.
struct RunState {
    options: PostProcessingOptions,
    summary: PostProcessingSummary,
    journal: Vec<JournalEntry>,
    backups: Vec<OverwriteBackup>,
    claimed: HashSet<PathBuf>,
    created_dirs: Vec<PathBuf>,
    cleanup_candidates: BTreeSet<PathBuf>,
    locked_roots: HashSet<PathBuf>,
    locks: Vec<RootLock>,
}

impl LibraryFinalizer {
    pub fn new(layout: LibraryLayoutConfig, templates: TemplateSet) -> Self {
        Self {
            layout,
            templates,
            cancel: None,
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn layout(&self) -> &LibraryLayoutConfig {
        &self.layout
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Finalizes every matched record in order.
    ///
    /// On success each moved or copied record's `source_path` points at its
    /// new location. `progress` receives `(position, total)` with a 1-based
    /// position after each item's event.
    pub fn process(
        &self,
        records: &mut [MediaRecord],
        options: &PostProcessingOptions,
        progress: Option<&mut dyn FnMut(usize, usize)>,
        events: Option<&mut dyn FnMut(&ProcessingEvent)>,
    ) -> Result<PostProcessingSummary, FinalizationError> {
        let selected: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.matched)
            .map(|(index, _)| index)
            .collect();
        let total = selected.len();
        let mut observers = Observers { progress, events };
        let mut state = RunState::new(*options);

        debug!(
            total,
            dry_run = options.dry_run,
            copy_mode = options.copy_mode,
            conflict = options.conflict_resolution.as_str(),
            "finalization started"
        );

        for (position, &index) in selected.iter().enumerate() {
            if self.is_cancelled() {
                warn!(completed = position, total, "finalization cancelled, rolling back");
                let rollback_failures = state.rollback(records);
                return Err(state.into_error(
                    FinalizationFailureKind::Cancelled,
                    "cancelled".to_string(),
                    None,
                    rollback_failures,
                ));
            }

            match self.process_item(&mut state, &mut records[index], index) {
                Ok(result) => {
                    observers.report(&result, position + 1, total);
                    state.summary.push(result);
                }
                Err(failure) => {
                    let record = records[index].clone();
                    warn!(
                        path = %record.source_path.display(),
                        error = %failure.message,
                        "finalization item failed, rolling back run"
                    );
                    let result = PostProcessingItemResult {
                        source_path: record.source_path.clone(),
                        record: record.clone(),
                        target_path: failure.target_path,
                        action: ItemAction::Failed,
                        message: Some(failure.message.clone()),
                    };
                    observers.report(&result, position + 1, total);
                    state.summary.push(result);

                    let rollback_failures = state.rollback(records);
                    return Err(state.into_error(
                        FinalizationFailureKind::ItemFailed,
                        failure.message,
                        Some(record),
                        rollback_failures,
                    ));
                }
            }
        }

        if !options.dry_run {
            state.finish(&self.layout);
        }

        info!(
            processed = state.summary.processed.len(),
            skipped = state.summary.skipped.len(),
            dry_run = options.dry_run,
            "finalization complete"
        );
        Ok(state.summary)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    fn process_item(
        &self,
        state: &mut RunState,
        record: &mut MediaRecord,
        record_index: usize,
    ) -> Result<PostProcessingItemResult, ItemFailure> {
        let options = state.options;
        let source = record.source_path.clone();
        match fs::metadata(&source) {
            Err(_) => return Err(ItemFailure::new("source file no longer exists", None)),
            Ok(meta) if !meta.is_file() => {
                return Err(ItemFailure::new("source is not a regular file", None))
            }
            Ok(_) => {}
        }

        let root = self.layout.target_root(record.media_type).ok_or_else(|| {
            ItemFailure::new(
                format!("no target folder configured for {}", record.media_type.as_str()),
                None,
            )
        })?;
        let relative = self
            .templates
            .render(record, None)
            .map_err(|err| ItemFailure::new(err.to_string(), None))?;
        let mut target = root.join(relative);

        if same_file(&source, &target) {
            debug!(path = %source.display(), "already in target location");
            return Ok(item_result(
                record,
                Some(target),
                ItemAction::Skipped,
                Some("already in target location".to_string()),
            ));
        }

        let mut note = None;
        let claimed = state.claimed.contains(&normalize_path(&target));
        if claimed || fs::symlink_metadata(&target).is_ok() {
            match options.conflict_resolution {
                ConflictResolution::Skip => {
                    debug!(target = %target.display(), "target exists, skipping");
                    return Ok(item_result(
                        record,
                        Some(target),
                        ItemAction::Skipped,
                        Some("target exists; skipped".to_string()),
                    ));
                }
                ConflictResolution::Rename => {
                    if is_numbered_sibling(&record.source_path, &target, normalize_path) {
                        debug!(
                            source = %record.source_path.display(),
                            "already renamed beside target"
                        );
                        return Ok(item_result(
                            record,
                            Some(record.source_path.clone()),
                            ItemAction::Skipped,
                            Some("already in target location".to_string()),
                        ));
                    }
                    let renamed = unique_sibling(&target, &state.claimed, normalize_path);
                    note = Some(format!("renamed to avoid existing {}", target.display()));
                    target = renamed;
                }
                ConflictResolution::Overwrite => {
                    if claimed {
                        return Err(ItemFailure::new(
                            "target is already used by an earlier item of this run",
                            Some(target),
                        ));
                    }
                    if target.is_dir() {
                        return Err(ItemFailure::new(
                            "target exists and is a directory",
                            Some(target),
                        ));
                    }
                    if options.dry_run {
                        note = Some("would overwrite existing target".to_string());
                    } else {
                        state.lock_root(&root)?;
                        state.back_up(&target)?;
                        note = Some("overwrote existing target".to_string());
                    }
                }
            }
        }
        state.claimed.insert(normalize_path(&target));

        if options.dry_run {
            let action = if options.copy_mode {
                ItemAction::PlannedCopy
            } else {
                ItemAction::PlannedMove
            };
            return Ok(item_result(record, Some(target), action, note));
        }

        state.lock_root(&root)?;
        if let Some(parent) = target.parent() {
            create_missing_dirs(parent, &mut state.created_dirs).map_err(|err| {
                ItemFailure::new(
                    format!("could not create {}: {err}", parent.display()),
                    Some(target.clone()),
                )
            })?;
        }

        let (action, operation) = if options.copy_mode {
            copy_with_metadata(&source, &target).map_err(|err| {
                ItemFailure::new(format!("copy failed: {err}"), Some(target.clone()))
            })?;
            (ItemAction::Copied, OperationRecord::copied(&source, &target))
        } else {
            move_file(&source, &target).map_err(|err| {
                ItemFailure::new(format!("move failed: {err}"), Some(target.clone()))
            })?;
            if options.cleanup_empty_dirs {
                if let Some(parent) = source.parent() {
                    state.cleanup_candidates.insert(parent.to_path_buf());
                }
            }
            (ItemAction::Moved, OperationRecord::moved(&source, &target))
        };
        state.journal.push(JournalEntry {
            record_index,
            operation,
        });

        info!(
            action = action.as_str(),
            from = %source.display(),
            to = %target.display(),
            "finalized"
        );
        record.source_path = target.clone();
        let mut result = item_result(record, Some(target), action, note);
        result.source_path = source;
        Ok(result)
    }
}

fn item_result(
    record: &MediaRecord,
    target_path: Option<PathBuf>,
    action: ItemAction,
    message: Option<String>,
) -> PostProcessingItemResult {
    PostProcessingItemResult {
        record: record.clone(),
        source_path: record.source_path.clone(),
        target_path,
        action,
        message,
    }
}

impl RunState {
    fn new(options: PostProcessingOptions) -> Self {
        Self {
            options,
            summary: PostProcessingSummary::default(),
            journal: Vec::new(),
            backups: Vec::new(),
            claimed: HashSet::new(),
            created_dirs: Vec::new(),
            cleanup_candidates: BTreeSet::new(),
            locked_roots: HashSet::new(),
            locks: Vec::new(),
        }
    }

    fn lock_root(&mut self, root: &Path) -> Result<(), ItemFailure> {
        if root.is_dir() && self.locked_roots.contains(&normalize_path(root)) {
            return Ok(());
        }
        create_missing_dirs(root, &mut self.created_dirs).map_err(|err| {
            ItemFailure::new(format!("could not create {}: {err}", root.display()), None)
        })?;
        let lock = RootLock::acquire(root).map_err(|err| {
            let message = if err.kind() == io::ErrorKind::AlreadyExists {
                format!("library root {} is locked by another run", root.display())
            } else {
                format!("could not lock library root {}: {err}", root.display())
            };
            ItemFailure::new(message, None)
        })?;
        self.locked_roots.insert(normalize_path(root));
        self.locks.push(lock);
        Ok(())
    }

    fn back_up(&mut self, target: &Path) -> Result<(), ItemFailure> {
        let backup_path = backup_path_for(target);
        fs::rename(target, &backup_path).map_err(|err| {
            ItemFailure::new(
                format!("could not back up existing target: {err}"),
                Some(target.to_path_buf()),
            )
        })?;
        debug!(
            target = %target.display(),
            backup = %backup_path.display(),
            "moved existing target aside"
        );
        self.backups.push(OverwriteBackup {
            original_path: target.to_path_buf(),
            backup_path,
        });
        Ok(())
    }

    /// Undoes the run newest-first: operations, then overwrite backups.
    ///
    /// Never fails; every step that could not be undone is returned as a message.
    fn rollback(&mut self, records: &mut [MediaRecord]) -> Vec<String> {
        let mut failures = Vec::new();

        for entry in self.journal.iter().rev() {
            match entry.operation.undo() {
                Ok(true) => {
                    if let Some(record) = records.get_mut(entry.record_index) {
                        record.source_path = entry.operation.source_path.clone();
                    }
                }
                Ok(false) => {
                    warn!(
                        target = %entry.operation.target_path.display(),
                        "nothing to undo, target is already gone"
                    );
                }
                Err(err) => {
                    let message = entry.operation.describe_failure(&err);
                    warn!(error = %message, "rollback step failed");
                    failures.push(message);
                }
            }
        }

        for backup in self.backups.iter().rev() {
            if !backup.backup_path.exists() {
                let message = format!(
                    "backup {} of {} is missing",
                    backup.backup_path.display(),
                    backup.original_path.display()
                );
                warn!(error = %message, "rollback step failed");
                failures.push(message);
                continue;
            }
            if backup.original_path.exists() {
                let message = format!(
                    "cannot restore {}: path is occupied, previous content kept at {}",
                    backup.original_path.display(),
                    backup.backup_path.display()
                );
                warn!(error = %message, "rollback step failed");
                failures.push(message);
                continue;
            }
            if let Err(err) = fs::rename(&backup.backup_path, &backup.original_path) {
                let message = format!(
                    "could not restore {} from {}: {err}",
                    backup.original_path.display(),
                    backup.backup_path.display()
                );
                warn!(error = %message, "rollback step failed");
                failures.push(message);
            }
        }

        self.journal.clear();
        self.backups.clear();
        self.locks.clear();
        failures.extend(remove_dirs_if_empty(&self.created_dirs));
        self.created_dirs.clear();
        failures
    }

    /// Deletes overwrite backups and prunes emptied source folders after a successful run.
    fn finish(&mut self, layout: &LibraryLayoutConfig) {
        for backup in &self.backups {
            if !backup.backup_path.exists() {
                continue;
            }
            if let Err(err) = fs::remove_file(&backup.backup_path) {
                warn!(
                    path = %backup.backup_path.display(),
                    error = %err,
                    "could not delete overwrite backup"
                );
            }
        }
        self.backups.clear();

        if !self.options.cleanup_empty_dirs || self.cleanup_candidates.is_empty() {
            return;
        }

        let boundaries: Vec<PathBuf> = layout
            .cleanup_boundaries()
            .iter()
            .map(|root| normalize_path(root))
            .collect();
        let mut candidates: Vec<PathBuf> = self
            .cleanup_candidates
            .iter()
            .filter(|dir| dir.is_dir())
            .map(|dir| normalize_path(dir))
            .collect();
        candidates.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

        for dir in candidates {
            if boundaries.contains(&dir) {
                continue;
            }
            // Boundaries only limit how far up the walk goes; the folder itself
            // is removed wherever it lives.
            let stop = boundaries
                .iter()
                .filter(|root| dir.starts_with(root))
                .max_by_key(|root| root.components().count())
                .map(PathBuf::as_path)
                .or_else(|| dir.parent());
            let Some(stop) = stop else {
                continue;
            };
            for removed in remove_empty_ancestors(&dir, stop) {
                debug!(path = %removed.display(), "removed empty directory");
            }
        }
    }

    fn into_error(
        mut self,
        kind: FinalizationFailureKind,
        message: String,
        failing_record: Option<MediaRecord>,
        rollback_failures: Vec<String>,
    ) -> FinalizationError {
        self.summary.processed.clear();
        FinalizationError {
            kind,
            message,
            failing_record: failing_record.map(Box::new),
            partial_summary: self.summary,
            rollback_failures,
        }
    }
}
