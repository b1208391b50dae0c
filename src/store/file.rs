use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{EpicError, Result};
use crate::store::lock::{DocumentLock, DEFAULT_LOCK_TIMEOUT};
use crate::store::{xml, EpicStore};
use crate::types::Epic;

/// Epic document on disk, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a brand-new document, refusing to overwrite an existing one.
    pub fn create(&self, epic: &Epic) -> Result<()> {
        if self.path.exists() {
            return Err(EpicError::validation(format!(
                "{} already exists",
                self.path.display()
            )));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        self.save(epic)
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl EpicStore for FileStore {
    fn load(&self) -> Result<Epic> {
        debug!(path = %self.path.display(), "loading epic");
        let text = fs::read_to_string(&self.path)?;
        xml::decode(&text)
    }

    fn save(&self, epic: &Epic) -> Result<()> {
        let text = xml::encode(epic)?;

        let mut tmp = NamedTempFile::new_in(self.dir())?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| EpicError::Io(e.error))?;

        info!(
            path = %self.path.display(),
            events = epic.events.len(),
            "saved epic"
        );
        Ok(())
    }

    fn lock(&self) -> Result<Option<DocumentLock>> {
        DocumentLock::acquire(&self.path, self.lock_timeout).map(Some)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::PhaseStatus;
    use crate::testutil::EpicBuilder;
    use tempfile::TempDir;

    #[test]
    fn create_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("epics").join("auth.xml"));
        let epic = EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Active)
            .task("T1", "P1")
            .build();

        store.create(&epic).unwrap();

        assert_eq!(store.load().unwrap(), epic);
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("auth.xml"));
        let epic = EpicBuilder::new("E1").build();
        store.create(&epic).unwrap();

        let err = store.create(&epic).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("auth.xml"));
        let epic = EpicBuilder::new("E1").phase("P1").build();

        store.save(&epic).unwrap();
        store.save(&epic).unwrap();

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["auth.xml".to_string()]);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("missing.xml"));
        assert_eq!(
            store.load().unwrap_err().kind(),
            crate::error::ErrorKind::Io
        );
    }
}
