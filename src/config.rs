//! Per-workspace settings stored in `.epicflow/config.json`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::core::{HintConfig, TestServiceOptions};
use crate::error::{EpicError, Result};

pub const CONFIG_DIR: &str = ".epicflow";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Epic document path, relative to the workspace root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_epic: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_epic: Option<PathBuf>,
    #[serde(default)]
    pub hints: HintConfig,
    #[serde(default)]
    pub tests: TestConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Record a `test_passed` event when an already-passing test passes again.
    #[serde(default = "default_true")]
    pub record_repass: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            record_repass: true,
        }
    }
}

impl TestConfig {
    pub fn service_options(self) -> TestServiceOptions {
        TestServiceOptions {
            record_repass: self.record_repass,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Walk up from `start` to the first directory holding `.epicflow/config.json`.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(CONFIG_DIR).join(CONFIG_FILE).is_file() {
            return Some(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// A loaded config together with where it lives.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: Config,
}

impl Workspace {
    /// Load an explicit config file, or discover one above `start`.
    ///
    /// An explicit path that does not exist is an error; failing to discover
    /// one is not.
    pub fn discover(start: &Path, explicit: Option<&Path>) -> Result<Option<Self>> {
        if let Some(path) = explicit {
            return Self::load(path).map(Some);
        }
        match find_workspace_root(start) {
            Some(root) => Self::load(&root.join(CONFIG_DIR).join(CONFIG_FILE)).map(Some),
            None => Ok(None),
        }
    }

    pub fn load(config_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&text)?;
        debug!(path = %config_path.display(), "loaded config");
        Ok(Self {
            root: workspace_root_of(config_path),
            config_path: config_path.to_path_buf(),
            config,
        })
    }

    /// Create `.epicflow/config.json` under `root`.
    pub fn init(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Err(EpicError::validation(format!(
                "workspace already initialized at {}",
                config_path.display()
            )));
        }
        let workspace = Self {
            root: root.to_path_buf(),
            config_path,
            config: Config {
                project_name: root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned()),
                ..Config::default()
            },
        };
        workspace.save()?;
        Ok(workspace)
    }

    pub fn save(&self) -> Result<()> {
        let dir = self
            .config_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut text = serde_json::to_string_pretty(&self.config)?;
        text.push('\n');
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.config_path)
            .map_err(|e| EpicError::Io(e.error))?;

        info!(path = %self.config_path.display(), "saved config");
        Ok(())
    }

    /// Absolute path for a document path stored in the config.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Path as it should be recorded in the config: relative to the root
    /// when it lives inside the workspace.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn current_epic(&self) -> Option<PathBuf> {
        self.config.current_epic.as_deref().map(|p| self.resolve(p))
    }

    /// Point the workspace at a new epic, remembering the old one.
    pub fn switch_to(&mut self, path: &Path) {
        let relative = self.relative(path);
        if self.config.current_epic.as_ref() != Some(&relative) {
            self.config.previous_epic = self.config.current_epic.take();
        }
        self.config.current_epic = Some(relative);
    }
}

fn workspace_root_of(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    if dir.file_name().is_some_and(|n| n == CONFIG_DIR) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}

/// Pick the epic document: flag, then environment, then config.
pub fn resolve_epic_path(
    flag: Option<&Path>,
    env: Option<PathBuf>,
    workspace: Option<&Workspace>,
) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path);
    }
    workspace
        .and_then(Workspace::current_epic)
        .ok_or(EpicError::NoCurrentEpic)
}
