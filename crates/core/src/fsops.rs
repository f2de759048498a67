use std::ffi::OsString;
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Renames `from` to `to`, falling back to copy + delete across filesystems.
///
/// The fallback never leaves both files behind: if the source cannot be
/// removed the fresh copy is deleted again before the error is returned.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                from = %from.display(),
                to = %to.display(),
                "rename crosses filesystems, copying"
            );
            copy_with_metadata(from, to)?;
            if let Err(remove_err) = fs::remove_file(from) {
                discard_partial_copy(to);
                return Err(remove_err);
            }
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Copies file contents, access/modification times and permissions into a new file.
///
/// Never replaces an existing `to`. Times are set through the open handle before
/// the source permissions are applied, so read-only sources copy fine. On any
/// failure after `to` was created it is removed again.
pub fn copy_with_metadata(from: &Path, to: &Path) -> io::Result<u64> {
    let mut reader = File::open(from)?;
    let metadata = reader.metadata()?;
    let mut writer = OpenOptions::new().write(true).create_new(true).open(to)?;

    let copied = write_copy(&mut reader, &mut writer, &metadata);
    if copied.is_err() {
        drop(writer);
        discard_partial_copy(to);
    }
    copied
}

fn write_copy(reader: &mut File, writer: &mut File, metadata: &fs::Metadata) -> io::Result<u64> {
    let bytes = io::copy(reader, writer)?;
    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    writer.set_times(times)?;
    writer.set_permissions(metadata.permissions())?;
    Ok(bytes)
}

fn discard_partial_copy(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "could not remove partial copy");
    }
}

/// Creates `dir` and any missing ancestors, recording each directory this call created.
///
/// `created` is filled top-down and keeps the entries made before a failure,
/// so callers can undo partial work.
pub fn create_missing_dirs(dir: &Path, created: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(path) = current {
        if path.as_os_str().is_empty() || path.is_dir() {
            break;
        }
        missing.push(path.to_path_buf());
        current = path.parent();
    }

    for path in missing.into_iter().rev() {
        match fs::create_dir(&path) {
            Ok(()) => created.push(path),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Removes the given directories deepest-first when they are empty.
///
/// Returns a message for every directory that was empty but could not be removed.
pub fn remove_dirs_if_empty(dirs: &[PathBuf]) -> Vec<String> {
    let mut failures = Vec::new();
    for dir in dirs.iter().rev() {
        if !matches!(is_dir_empty(dir), Ok(true)) {
            continue;
        }
        if let Err(err) = fs::remove_dir(dir) {
            warn!(path = %dir.display(), error = %err, "could not remove created directory");
            failures.push(format!("could not remove directory {}: {err}", dir.display()));
        }
    }
    failures
}

/// Removes `start` and its ancestors while they are empty, staying strictly inside `boundary`.
pub fn remove_empty_ancestors(start: &Path, boundary: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let mut current = start;
    while current != boundary && current.starts_with(boundary) {
        match is_dir_empty(current) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                debug!(path = %current.display(), error = %err, "stopping empty directory cleanup");
                break;
            }
        }
        if let Err(err) = fs::remove_dir(current) {
            warn!(path = %current.display(), error = %err, "could not remove empty directory");
            break;
        }
        removed.push(current.to_path_buf());
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    removed
}

pub fn is_dir_empty(dir: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Canonicalizes the nearest existing ancestor of `path` and re-appends the rest.
///
/// Gives a stable key for paths that do not exist yet.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut tail = Vec::<OsString>::new();
    let mut existing = absolute.as_path();
    loop {
        if let Ok(mut resolved) = fs::canonicalize(existing) {
            for name in tail.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// True when both paths exist and resolve to the same file.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn move_file_relocates_contents() {
        let temp = tempdir().expect("tempdir");
        let from = temp.path().join("a.mkv");
        let to = temp.path().join("b.mkv");
        fs::write(&from, b"data").expect("write");

        move_file(&from, &to).expect("move");
        assert!(!from.exists());
        assert_eq!(fs::read(&to).expect("read"), b"data");
    }

    #[test]
    fn copy_with_metadata_keeps_modified_time() {
        let temp = tempdir().expect("tempdir");
        let from = temp.path().join("a.mkv");
        let to = temp.path().join("b.mkv");
        fs::write(&from, b"data").expect("write");
        let past = SystemTime::now() - Duration::from_secs(86_400);
        File::options()
            .write(true)
            .open(&from)
            .expect("open")
            .set_modified(past)
            .expect("set mtime");

        copy_with_metadata(&from, &to).expect("copy");
        assert!(from.exists());
        let copied = fs::metadata(&to).expect("meta").modified().expect("mtime");
        assert_eq!(copied, fs::metadata(&from).expect("meta").modified().expect("mtime"));
    }

    #[cfg(unix)]
    #[test]
    fn copy_with_metadata_handles_read_only_source() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("tempdir");
        let from = temp.path().join("a.mkv");
        let to = temp.path().join("b.mkv");
        fs::write(&from, b"data").expect("write");
        fs::set_permissions(&from, fs::Permissions::from_mode(0o444)).expect("chmod");

        let bytes = copy_with_metadata(&from, &to).expect("copy read-only source");
        assert_eq!(bytes, 4);
        assert_eq!(fs::read(&to).expect("read"), b"data");
        let mode = fs::metadata(&to).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o444);
    }

    #[test]
    fn failed_copy_leaves_no_target() {
        let temp = tempdir().expect("tempdir");
        let dir_source = temp.path().join("folder");
        fs::create_dir(&dir_source).expect("mkdir");
        let to = temp.path().join("b.mkv");

        copy_with_metadata(&dir_source, &to).expect_err("a directory has no contents to copy");
        assert!(!to.exists());
    }

    #[test]
    fn copy_never_replaces_existing_target() {
        let temp = tempdir().expect("tempdir");
        let from = temp.path().join("a.mkv");
        let to = temp.path().join("b.mkv");
        fs::write(&from, b"new").expect("write source");
        fs::write(&to, b"old").expect("write target");

        let err = copy_with_metadata(&from, &to).expect_err("target exists");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&to).expect("read"), b"old");
    }

    #[test]
    fn create_missing_dirs_records_only_new_directories() {
        let temp = tempdir().expect("tempdir");
        let existing = temp.path().join("library");
        fs::create_dir(&existing).expect("mkdir");

        let mut created = Vec::new();
        create_missing_dirs(&existing.join("Movies").join("Heat"), &mut created).expect("create");
        assert_eq!(
            created,
            vec![existing.join("Movies"), existing.join("Movies").join("Heat")]
        );

        let failures = remove_dirs_if_empty(&created);
        assert!(failures.is_empty());
        assert!(!existing.join("Movies").exists());
        assert!(existing.exists());
    }

    #[test]
    fn create_missing_dirs_fails_under_a_file() {
        let temp = tempdir().expect("tempdir");
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"x").expect("write");

        let mut created = Vec::new();
        let err = create_missing_dirs(&blocker.join("child"), &mut created);
        assert!(err.is_err());
        assert!(created.is_empty());
    }

    #[test]
    fn remove_empty_ancestors_stops_at_content_and_boundary() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("downloads");
        let deep = root.join("show").join("season1");
        fs::create_dir_all(&deep).expect("mkdir");
        fs::write(root.join("show").join("keep.nfo"), b"x").expect("write");

        let removed = remove_empty_ancestors(&deep, &root);
        assert_eq!(removed, vec![deep.clone()]);
        assert!(root.join("show").exists());

        fs::remove_file(root.join("show").join("keep.nfo")).expect("remove");
        let removed = remove_empty_ancestors(&root.join("show"), &root);
        assert_eq!(removed, vec![root.join("show")]);
        assert!(root.exists(), "boundary itself is never removed");
    }

    #[test]
    fn normalize_path_resolves_missing_tail() {
        let temp = tempdir().expect("tempdir");
        let base = fs::canonicalize(temp.path()).expect("canonical");
        let missing = temp.path().join("x").join("y.mkv");
        assert_eq!(normalize_path(&missing), base.join("x").join("y.mkv"));
    }

    #[test]
    fn same_file_requires_both_paths() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("a.mkv");
        fs::write(&file, b"x").expect("write");
        let dotted = temp.path().join(".").join("a.mkv");

        assert!(same_file(&file, &dotted));
        assert!(!same_file(&file, &temp.path().join("b.mkv")));
    }
}
