use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::error::{EpicError, Result};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Exclusive advisory lock on `<document>.lock`, released on drop.
#[derive(Debug)]
pub struct DocumentLock {
    file: File,
    path: PathBuf,
}

impl DocumentLock {
    /// Lock file path for an epic document.
    pub fn path_for(document: &Path) -> PathBuf {
        let mut name = document
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        document.with_file_name(name)
    }

    pub fn acquire(document: &Path, timeout: Duration) -> Result<Self> {
        let path = Self::path_for(document);
        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;

            if file.try_lock_exclusive().is_ok() {
                debug!(path = %path.display(), "acquired document lock");
                return Ok(Self { file, path });
            }

            if start.elapsed() >= timeout {
                return Err(EpicError::Locked(path));
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_path_sits_beside_document() {
        let path = DocumentLock::path_for(Path::new("/work/epics/auth.xml"));
        assert_eq!(path, Path::new("/work/epics/auth.xml.lock"));
    }

    #[test]
    fn second_lock_times_out_until_first_drops() {
        let tmp = TempDir::new().unwrap();
        let doc = tmp.path().join("epic.xml");

        let first = DocumentLock::acquire(&doc, Duration::from_millis(50)).unwrap();
        let err = DocumentLock::acquire(&doc, Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, EpicError::Locked(ref p) if p == first.path()));

        drop(first);
        DocumentLock::acquire(&doc, Duration::from_millis(50)).unwrap();
    }
}
