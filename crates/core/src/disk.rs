use crate::fsops::normalize_path;
use crate::record::RenameOperation;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use sysinfo::Disks;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskSpaceInfo {
    pub required_bytes: u64,
    pub available_bytes: u64,
}

impl DiskSpaceInfo {
    pub fn is_sufficient(&self) -> bool {
        self.available_bytes >= self.required_bytes
    }
}

/// Advisory space check for a batch: bytes of the existing sources versus the
/// free space of the filesystem holding the first target.
///
/// Returns `None` when the platform reports no matching filesystem.
pub fn disk_space_info(operations: &[RenameOperation]) -> Option<DiskSpaceInfo> {
    let first = operations.first()?;
    let required_bytes = required_bytes(operations);
    let available_bytes = available_space_for(&first.target_path)?;
    Some(DiskSpaceInfo {
        required_bytes,
        available_bytes,
    })
}

pub fn required_bytes(operations: &[RenameOperation]) -> u64 {
    operations
        .par_iter()
        .filter_map(|op| fs::metadata(&op.source_path).ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum()
}

fn available_space_for(path: &Path) -> Option<u64> {
    let resolved = normalize_path(path);
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|disk| resolved.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().components().count());
    match disk {
        Some(disk) => Some(disk.available_space()),
        None => {
            debug!(path = %resolved.display(), "no filesystem found for free space query");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MediaRecord;
    use tempfile::tempdir;

    #[test]
    fn required_bytes_counts_existing_sources_only() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.mkv");
        fs::write(&a, vec![0u8; 1024]).expect("write");
        let ops = vec![
            RenameOperation::new(MediaRecord::movie(&a, "A", 2001), temp.path().join("A.mkv")),
            RenameOperation::new(
                MediaRecord::movie(temp.path().join("gone.mkv"), "B", 2002),
                temp.path().join("B.mkv"),
            ),
        ];
        assert_eq!(required_bytes(&ops), 1024);
    }

    #[test]
    fn empty_batch_has_no_info() {
        assert_eq!(disk_space_info(&[]), None);
    }

    #[test]
    fn sufficiency_compares_bytes() {
        let info = DiskSpaceInfo {
            required_bytes: 10,
            available_bytes: 9,
        };
        assert!(!info.is_sufficient());
    }
}
