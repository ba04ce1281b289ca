//! # session — Crash-Recovery Session File
//!
//! The scanner dumps its tracker and the last report per asset to
//! `SESSION_DIR/session.json` after every cycle so a restart resumes touch
//! counts and node history instead of starting cold.
//!
//! Writes go to `session.json.tmp` first and are renamed into place, so a
//! crash mid-write leaves the previous file intact.  A file that no longer
//! parses is moved aside to `session.json.corrupt` and treated as missing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::tracker::{KingNodeTracker, TrackerConfig};
use crate::models::AssetReport;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session I/O error on {path}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SessionError + '_ {
    move |source| SessionError::Io { path: path.to_path_buf(), source }
}

// ─── Session File ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    pub session_id:   Uuid,
    pub started_at:   DateTime<Utc>,
    pub updated_at:   DateTime<Utc>,
    /// Completed scan cycles
    pub cycles:       u64,
    pub tracker:      KingNodeTracker,
    pub last_results: BTreeMap<String, AssetReport>,
}

impl SessionFile {
    pub fn new(tracker_config: TrackerConfig) -> Self {
        let now = Utc::now();
        Self {
            session_id:   Uuid::new_v4(),
            started_at:   now,
            updated_at:   now,
            cycles:       0,
            tracker:      KingNodeTracker::new(tracker_config),
            last_results: BTreeMap::new(),
        }
    }
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    /// `Ok(None)` when there is no usable session on disk.
    pub async fn load(&self) -> Result<Option<SessionFile>, SessionError> {
        let path = self.path();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No session file");
                return Ok(None);
            }
            Err(e) => return Err(io_err(&path)(e)),
        };

        match serde_json::from_slice::<SessionFile>(&raw) {
            Ok(session) => {
                info!(
                    session_id = %session.session_id,
                    cycles     = session.cycles,
                    assets     = session.last_results.len(),
                    "💾 Session restored"
                );
                Ok(Some(session))
            }
            Err(e) => {
                let aside = path.with_extension("json.corrupt");
                warn!(path = %path.display(), error = %e, "⚠️ Corrupt session file — moving to {}", aside.display());
                tokio::fs::rename(&path, &aside).await.map_err(io_err(&path))?;
                Ok(None)
            }
        }
    }

    /// Atomic replace of `session.json`.
    pub async fn save(&self, session: &SessionFile) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err(&self.dir))?;

        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(session)?;

        tokio::fs::write(&tmp, &json).await.map_err(io_err(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err(&path))?;

        debug!(path = %path.display(), cycles = session.cycles, "Session saved");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
