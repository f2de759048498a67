use crate::fsops::move_file;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Move,
    Copy,
}

/// A completed filesystem operation, appended only after it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
}

impl OperationRecord {
    pub fn moved(source_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Move,
            source_path: source_path.into(),
            target_path: target_path.into(),
        }
    }

    pub fn copied(source_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Copy,
            source_path: source_path.into(),
            target_path: target_path.into(),
        }
    }

    /// Reverses the operation: a move is moved back, a copy is deleted.
    ///
    /// Returns `Ok(false)` when the target is already gone.
    pub fn undo(&self) -> io::Result<bool> {
        if !self.target_path.exists() {
            return Ok(false);
        }
        match self.kind {
            OperationKind::Move => {
                if self.source_path.exists() {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} is occupied", self.source_path.display()),
                    ));
                }
                move_file(&self.target_path, &self.source_path)?;
            }
            OperationKind::Copy => fs::remove_file(&self.target_path)?,
        }
        Ok(true)
    }

    pub fn describe_failure(&self, err: &io::Error) -> String {
        match self.kind {
            OperationKind::Move => format!(
                "could not move {} back to {}: {err}",
                self.target_path.display(),
                self.source_path.display()
            ),
            OperationKind::Copy => format!(
                "could not remove copied file {}: {err}",
                self.target_path.display()
            ),
        }
    }
}
