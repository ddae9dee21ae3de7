//! Grade history storage
//!
//! Read once per cycle, replaced wholesale at the end of a successful one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{error, info};

use crate::error::Result;
use crate::types::GradeHistory;

/// Grade history persisted as one pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last saved history, or `None` when there is no usable file
    /// (a first run). A saved empty history is still `Some`.
    pub fn load_saved(&self) -> Option<GradeHistory> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no previous grades found - first run");
            return None;
        }
        match self.read() {
            Ok(history) => {
                info!(courses = history.len(), "loaded grade history");
                Some(history)
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "could not load grade history - treating as first run");
                None
            }
        }
    }

    /// Like [`load_saved`](Self::load_saved), with a first run read as empty.
    pub fn load(&self) -> GradeHistory {
        self.load_saved().unwrap_or_default()
    }

    fn read(&self) -> Result<GradeHistory> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Replace the stored history. Written to a temp file next to the
    /// target and renamed over it.
    pub fn save(&self, history: &GradeHistory) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(history)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(courses = history.len(), path = %self.path.display(), "saved grade history");
        Ok(())
    }
}
