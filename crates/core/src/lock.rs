use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LOCK_FILE_NAME: &str = ".__mm_lock";

/// Advisory lock over one library root, held for the duration of a run.
///
/// Only runs of this crate honor it. A crashed run leaves the lock file
/// behind; it has to be removed by hand.
#[derive(Debug)]
pub struct RootLock {
    path: PathBuf,
}

impl RootLock {
    /// Creates the lock file inside `root`, creating `root` itself if needed.
    pub fn acquire(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let path = root.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "acquired library root lock");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "could not release library root lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_until_release() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("library");

        let lock = RootLock::acquire(&root).expect("first lock");
        assert!(lock.path().exists());
        let err = RootLock::acquire(&root).expect_err("second lock must fail");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        drop(lock);
        assert!(!root.join(LOCK_FILE_NAME).exists());
        RootLock::acquire(&root).expect("lock after release");
    }
}
