//! services/kiosk/src/adapters/session_file.rs
//!
//! Persists the operator's session as a single JSON document on disk. This is
//! the concrete implementation of the `SessionStorage` port.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use loyalty_core::ports::{PortError, PortResult, SessionStorage};

#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> PortError {
    PortError::Unexpected(format!("Failed to {action} {}: {err}", path.display()))
}

impl SessionStorage for FileSessionStorage {
    fn read(&self) -> PortResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", &self.path, e)),
        }
    }

    /// Writes through a sibling file and a rename, so a crash never leaves a
    /// half-written session behind.
    fn write(&self, raw: &str) -> PortResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| io_error("create", dir, e))?;
        }
        let staging = self.staging_path();
        fs::write(&staging, raw).map_err(|e| io_error("write", &staging, e))?;
        fs::rename(&staging, &self.path).map_err(|e| io_error("replace", &self.path, e))
    }

    fn remove(&self) -> PortResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &self.path, e)),
        }
    }
}
