//! Where the client keeps its files.
//!
//! ```text
//! ~/.kindearth/
//!   config.json
//!   session.json        remembered user
//!   logs/client.jsonl
//! ```

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

const BASE_DIR_NAME: &str = ".kindearth";
const CONFIG_FILE_NAME: &str = "config.json";
const SESSION_FILE_NAME: &str = "session.json";
const LOGS_DIR_NAME: &str = "logs";
const LOG_FILE_NAME: &str = "client.jsonl";

/// Resolved file locations, rooted at one base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Root at `~/.kindearth`.
    pub fn new() -> CoreResult<Self> {
        dirs::home_dir()
            .map(|home| Self::with_base_dir(home.join(BASE_DIR_NAME)))
            .ok_or_else(|| CoreError::Path("home directory is unknown".to_string()))
    }

    /// Root somewhere else, e.g. `--base-dir` or a test directory.
    pub fn with_base_dir(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn base_dir(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Durable store backing "remember me".
    pub fn session_file(&self) -> PathBuf {
        self.root.join(SESSION_FILE_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Create the base and logs directories. Idempotent.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_custom_root() {
        let paths = Paths::with_base_dir(PathBuf::from("/srv/kindearth"));

        assert_eq!(paths.base_dir(), Path::new("/srv/kindearth"));
        assert_eq!(paths.config_file(), Path::new("/srv/kindearth/config.json"));
        assert_eq!(paths.session_file(), Path::new("/srv/kindearth/session.json"));
        assert_eq!(paths.log_file(), Path::new("/srv/kindearth/logs/client.jsonl"));
    }

    #[test]
    fn test_default_root_is_in_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(Paths::new().unwrap().base_dir(), home.join(".kindearth"));
    }

    #[test]
    fn test_ensure_dirs_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested").join("kindearth"));

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(paths.base_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
        assert!(!paths.session_file().exists());
    }
}
