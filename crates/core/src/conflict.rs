use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const BACKUP_PREFIX: &str = ".__mm_backup_";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    #[default]
    Skip,
    Overwrite,
    Rename,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::Skip => "skip",
            ConflictResolution::Overwrite => "overwrite",
            ConflictResolution::Rename => "rename",
        }
    }
}

/// A pre-existing target moved aside for an overwrite; the only copy of its old bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverwriteBackup {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
}

/// Returns the first `name (n).ext` sibling of `candidate` that is neither on
/// disk nor already reserved, and reserves it.
///
/// `reserved` holds normalized paths claimed earlier in the same run.
pub fn unique_sibling(
    candidate: &Path,
    reserved: &HashSet<PathBuf>,
    normalize: impl Fn(&Path) -> PathBuf,
) -> PathBuf {
    let parent = candidate.parent().unwrap_or_else(|| Path::new("."));
    let stem = candidate
        .file_stem()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let ext = candidate
        .extension()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut n = 1usize;
    loop {
        let mut name = format!("{stem} ({n})");
        if !ext.is_empty() {
            name.push('.');
            name.push_str(&ext);
        }
        let next = parent.join(name);
        if !next.exists() && !reserved.contains(&normalize(&next)) {
            return next;
        }
        n += 1;
    }
}

/// True when `candidate` is a `name (n).ext` sibling of `target`, i.e. a name
/// [`unique_sibling`] could have picked for it.
pub fn is_numbered_sibling(
    candidate: &Path,
    target: &Path,
    normalize: impl Fn(&Path) -> PathBuf,
) -> bool {
    let (Some(candidate_parent), Some(target_parent)) = (candidate.parent(), target.parent())
    else {
        return false;
    };
    if normalize(candidate_parent) != normalize(target_parent) {
        return false;
    }
    let (Some(name), Some(stem)) = (
        candidate.file_name().and_then(|v| v.to_str()),
        target.file_stem().and_then(|v| v.to_str()),
    ) else {
        return false;
    };
    let suffix = match target.extension().and_then(|v| v.to_str()) {
        Some(ext) => format!(").{ext}"),
        None => ")".to_string(),
    };

    let Some(number) = name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix(" ("))
        .and_then(|rest| rest.strip_suffix(suffix.as_str()))
    else {
        return false;
    };
    !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit())
        && number.parse::<usize>().is_ok_and(|n| n > 0)
}

/// Hidden path next to `target` that an overwritten file is parked at.
pub fn backup_path_for(target: &Path) -> PathBuf {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let mut name = format!("{BACKUP_PREFIX}{}", Uuid::new_v4().simple());
    if let Some(ext) = target.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    parent.join(name)
}

pub fn is_backup_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with(BACKUP_PREFIX))
        .unwrap_or(false)
}
