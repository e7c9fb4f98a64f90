//! Single-owner lock for a journal
//!
//! An exclusive, non-blocking `flock` on a sibling `<journal>.lock` file,
//! held for as long as the journal is open. The lock lives on its own file
//! because compaction renames a new inode over the journal itself.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::QueueError;

#[derive(Debug)]
pub struct JournalLock {
    path: PathBuf,
    // Released when the descriptor closes
    _file: File,
}

impl JournalLock {
    /// Take the lock for the journal at `journal`
    ///
    /// Fails with [`QueueError::Locked`] when another handle (in this or any
    /// other process) already holds it.
    pub fn acquire(journal: &Path) -> Result<Self, QueueError> {
        let path = lock_path(journal);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        if !try_lock(&file)? {
            return Err(QueueError::Locked {
                path: journal.display().to_string(),
            });
        }
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn lock_path(journal: &Path) -> PathBuf {
    let mut name = journal
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    journal.with_file_name(name)
}

#[cfg(unix)]
fn try_lock(file: &File) -> Result<bool, QueueError> {
    use std::os::unix::io::AsRawFd;

    let res = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if res == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return Ok(false);
    }
    Err(QueueError::Io(err))
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<bool, QueueError> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_holder_is_refused() {
        let dir = tempdir().unwrap();
        let journal = dir.path().join("q.journal");

        let held = JournalLock::acquire(&journal).unwrap();
        assert_eq!(held.path(), dir.path().join("q.journal.lock"));

        let err = JournalLock::acquire(&journal).unwrap_err();
        assert!(matches!(err, QueueError::Locked { .. }));

        drop(held);
        assert!(JournalLock::acquire(&journal).is_ok());
    }
}
