//! JSON session store: one file per session, keyed by session id

use crate::error::{EngineError, EngineResult};
use crate::session::{SessionExport, SessionResult};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One line of a session listing
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub protocol: String,
    pub phases: usize,
    pub aborted: bool,
    pub path: PathBuf,
}

pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<data dir>/acouphene/sessions`
    pub fn default_location() -> EngineResult<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| EngineError::Config("no user data directory".into()))?;
        Ok(Self::new(base.join("acouphene").join("sessions")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, session_id: &str) -> EngineResult<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(EngineError::Config(format!("invalid session id '{}'", session_id)));
        }
        Ok(self.root.join(format!("{}.json", session_id)))
    }

    pub fn save(&self, session: &SessionResult) -> EngineResult<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(session.session_id())?;
        fs::write(&path, session.to_export().to_json()?)?;
        info!("Saved session {} to {}", session.session_id(), path.display());
        Ok(path)
    }

    pub fn load(&self, session_id: &str) -> EngineResult<SessionResult> {
        Self::load_file(&self.path_for(session_id)?)
    }

    pub fn load_file(path: &Path) -> EngineResult<SessionResult> {
        SessionExport::from_json(&fs::read_to_string(path)?)?.into_result()
    }

    /// Stored sessions, newest first. Unreadable files are skipped.
    pub fn list(&self) -> EngineResult<Vec<SessionEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let export = match fs::read_to_string(&path)
                .map_err(EngineError::from)
                .and_then(|json| SessionExport::from_json(&json))
            {
                Ok(export) => export,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            entries.push(SessionEntry {
                session_id: export.session_id,
                timestamp: export.timestamp,
                protocol: export.metadata.protocol,
                phases: export.results.phases.len(),
                aborted: export.metadata.aborted,
                path,
            });
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Copy a stored session's export to an arbitrary path
    pub fn export_to(&self, session_id: &str, destination: &Path) -> EngineResult<()> {
        let session = self.load(session_id)?;
        fs::write(destination, session.to_export().to_json()?)?;
        Ok(())
    }
}
