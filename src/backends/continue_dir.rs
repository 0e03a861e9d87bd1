//! Continue backend: one JSON document per session under `~/.continue/sessions`.
//!
//! Each `<sessionId>.json` holds a whole conversation inline under `history`.
//! The directory also carries a `sessions.json` index, which is not a
//! conversation and is ignored. Continue never splits turns across keys, so
//! [`RecordSource::bubbles_for`] always yields nothing.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::ExtractError;
use crate::model::Application;
use crate::source::{RawRecord, RecordSource, Scope};

/// Session index file that lists sessions without their history.
const SESSION_INDEX: &str = "sessions.json";

/// A Continue sessions directory.
pub struct ContinueDirSource {
    scope: Scope,
    dir: PathBuf,
}

impl ContinueDirSource {
    pub fn open(dir: &Path) -> Result<Self, ExtractError> {
        let label = dir.display().to_string();
        if !dir.is_dir() {
            return Err(ExtractError::backend(label, "sessions directory not found"));
        }
        Ok(Self {
            scope: Scope {
                label,
                application: Application::Continue,
                workspace: None,
            },
            dir: dir.to_path_buf(),
        })
    }

    fn session_files(&self) -> Result<Vec<PathBuf>, ExtractError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| ExtractError::backend(&self.scope.label, e))?;
            let path = entry.path();
            let is_session = entry.file_type().is_file()
                && path.extension().is_some_and(|ext| ext == "json")
                && entry.file_name() != SESSION_INDEX;
            if is_session {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }
}

impl RecordSource for ContinueDirSource {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn containers(&self) -> Result<Vec<RawRecord>, ExtractError> {
        let mut records = Vec::new();
        for path in self.session_files()? {
            let key = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            match std::fs::read_to_string(&path) {
                Ok(value) => records.push(RawRecord { key, value }),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable session file"),
            }
        }
        trace!(dir = %self.scope.label, containers = records.len(), "enumerated sessions");
        Ok(records)
    }

    fn bubbles_for(&self, _identifier: &str) -> Result<Vec<RawRecord>, ExtractError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_session_files_only() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b-session.json"), r#"{"history": []}"#).unwrap();
        std::fs::write(tmp.path().join("a-session.json"), r#"{"history": []}"#).unwrap();
        std::fs::write(tmp.path().join(SESSION_INDEX), "[]").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::create_dir(tmp.path().join("nested.json")).unwrap();

        let source = ContinueDirSource::open(tmp.path()).unwrap();
        let keys: Vec<String> = source
            .containers()
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["a-session", "b-session"]);
        assert_eq!(source.scope().application, Application::Continue);
        assert!(source.bubbles_for("a-session").unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = ContinueDirSource::open(&tmp.path().join("sessions"))
            .err()
            .expect("should fail");
        assert_eq!(err.kind(), "BackendUnavailable");
    }
}
