//! Storage scope discovery.
//!
//! Resolves where Cursor and Continue keep their history on this machine and
//! turns that into a list of [`ScopeLocation`]s. Nothing is opened here; the
//! pipeline opens each location lazily so one bad scope cannot block others.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::backends::{ContinueDirSource, VscdbSource};
use crate::error::ExtractError;
use crate::model::Application;
use crate::source::RecordSource;

/// Workspace storage folder created by extension development hosts.
const EXT_DEV_WORKSPACE: &str = "ext-dev";
const STATE_DB: &str = "state.vscdb";

/// One storage scope that can be opened as a [`RecordSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeLocation {
    /// A Cursor `state.vscdb`; `workspace` is the workspace storage id, if any.
    CursorDb {
        path: PathBuf,
        workspace: Option<String>,
    },
    /// A Continue `sessions/` directory.
    ContinueSessions { dir: PathBuf },
}

impl ScopeLocation {
    pub fn open(&self) -> Result<Box<dyn RecordSource>, ExtractError> {
        match self {
            Self::CursorDb { path, workspace } => {
                Ok(Box::new(VscdbSource::open(path, workspace.clone())?))
            }
            Self::ContinueSessions { dir } => Ok(Box::new(ContinueDirSource::open(dir)?)),
        }
    }

    pub fn application(&self) -> Application {
        match self {
            Self::CursorDb { .. } => Application::Cursor,
            Self::ContinueSessions { .. } => Application::Continue,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::CursorDb { path, .. } => path,
            Self::ContinueSessions { dir } => dir,
        }
    }

    /// Short human-readable description.
    pub fn label(&self) -> String {
        match self {
            Self::CursorDb {
                workspace: Some(id),
                ..
            } => format!("cursor workspace {id}"),
            Self::CursorDb {
                workspace: None, ..
            } => "cursor global".to_string(),
            Self::ContinueSessions { .. } => "continue sessions".to_string(),
        }
    }
}

/// Where to look. Explicit homes win over `CURSOR_HOME` / `CONTINUE_HOME`.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Restrict discovery to one application.
    pub app: Option<Application>,
    pub cursor_home: Option<PathBuf>,
    pub continue_home: Option<PathBuf>,
}

/// Every scope found for the requested applications, Cursor first.
pub fn discover(options: &DiscoveryOptions) -> Vec<ScopeLocation> {
    let wants = |app: Application| options.app.is_none_or(|only| only == app);

    let mut locations = Vec::new();
    if wants(Application::Cursor) {
        for root in cursor_roots(options.cursor_home.as_deref()) {
            locations.extend(cursor_scopes(&root));
        }
    }
    if wants(Application::Continue)
        && let Some(home) = continue_home(options.continue_home.as_deref())
    {
        locations.extend(continue_scopes(&home));
    }
    debug!(scopes = locations.len(), "discovered storage scopes");
    locations
}

/// Candidate Cursor data roots that exist on disk, deduplicated in probe order.
pub fn cursor_roots(explicit: Option<&Path>) -> Vec<PathBuf> {
    let candidates: Vec<PathBuf> = match override_dir(explicit, "CURSOR_HOME") {
        Some(home) => vec![home],
        None => [
            dirs::config_dir(),
            dirs::data_dir(),
            dirs::data_local_dir(),
            dirs::home_dir().map(|h| h.join(".config")),
        ]
        .into_iter()
        .flatten()
        .map(|base| base.join("Cursor"))
        .collect(),
    };

    let mut roots: Vec<PathBuf> = Vec::new();
    for candidate in candidates {
        if !candidate.is_dir() {
            trace!(path = %candidate.display(), "cursor root absent");
            continue;
        }
        if !roots.contains(&candidate) {
            roots.push(candidate);
        }
    }
    roots
}

/// Global and per-workspace databases under one Cursor root.
pub fn cursor_scopes(root: &Path) -> Vec<ScopeLocation> {
    let mut scopes = Vec::new();

    let global_db = root.join("User/globalStorage").join(STATE_DB);
    if global_db.is_file() {
        scopes.push(ScopeLocation::CursorDb {
            path: global_db,
            workspace: None,
        });
    }

    let ws_storage = root.join("User/workspaceStorage");
    if ws_storage.is_dir()
        && let Ok(entries) = std::fs::read_dir(&ws_storage)
    {
        let mut workspaces: Vec<(String, PathBuf)> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
            .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
            .filter(|(id, _)| id != EXT_DEV_WORKSPACE)
            .collect();
        workspaces.sort();

        for (id, dir) in workspaces {
            let candidate = dir.join(STATE_DB);
            if candidate.is_file() {
                scopes.push(ScopeLocation::CursorDb {
                    path: candidate,
                    workspace: Some(id),
                });
            }
        }
    }

    scopes
}

/// The Continue home directory, if it exists.
pub fn continue_home(explicit: Option<&Path>) -> Option<PathBuf> {
    let home = override_dir(explicit, "CONTINUE_HOME")
        .or_else(|| dirs::home_dir().map(|h| h.join(".continue")))?;
    home.is_dir().then_some(home)
}

pub fn continue_scopes(home: &Path) -> Vec<ScopeLocation> {
    let sessions = home.join("sessions");
    if sessions.is_dir() {
        vec![ScopeLocation::ContinueSessions { dir: sessions }]
    } else {
        trace!(home = %home.display(), "no Continue sessions directory");
        Vec::new()
    }
}

fn override_dir(explicit: Option<&Path>, var: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn cursor_scopes_include_global_and_workspaces() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        touch(&root.join("User/globalStorage/state.vscdb"));
        touch(&root.join("User/workspaceStorage/bbb/state.vscdb"));
        touch(&root.join("User/workspaceStorage/aaa/state.vscdb"));
        touch(&root.join("User/workspaceStorage/ext-dev/state.vscdb"));
        std::fs::create_dir_all(root.join("User/workspaceStorage/empty")).unwrap();

        let scopes = cursor_scopes(root);
        let labels: Vec<String> = scopes.iter().map(ScopeLocation::label).collect();
        assert_eq!(
            labels,
            vec!["cursor global", "cursor workspace aaa", "cursor workspace bbb"]
        );
        assert!(scopes.iter().all(|s| s.application() == Application::Cursor));
    }

    #[test]
    fn explicit_cursor_home_wins() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(cursor_roots(Some(tmp.path())), vec![tmp.path().to_path_buf()]);
    }

    #[test]
    fn missing_explicit_cursor_home_yields_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(cursor_roots(Some(&tmp.path().join("nope"))).is_empty());
    }

    #[test]
    fn continue_requires_sessions_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let home = continue_home(Some(tmp.path())).unwrap();
        assert!(continue_scopes(&home).is_empty());

        std::fs::create_dir(tmp.path().join("sessions")).unwrap();
        assert_eq!(
            continue_scopes(&home),
            vec![ScopeLocation::ContinueSessions {
                dir: tmp.path().join("sessions")
            }]
        );
    }

    #[test]
    fn discover_filters_by_application() {
        let cursor = tempfile::TempDir::new().unwrap();
        touch(&cursor.path().join("User/globalStorage/state.vscdb"));
        let cont = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(cont.path().join("sessions")).unwrap();

        let mut options = DiscoveryOptions {
            app: None,
            cursor_home: Some(cursor.path().to_path_buf()),
            continue_home: Some(cont.path().to_path_buf()),
        };
        assert_eq!(discover(&options).len(), 2);

        options.app = Some(Application::Continue);
        let only = discover(&options);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].application(), Application::Continue);
    }

    #[test]
    fn opening_empty_file_as_database_fails_softly() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("state.vscdb");
        touch(&path);
        let location = ScopeLocation::CursorDb {
            path,
            workspace: None,
        };
        // SQLite treats an empty file as an empty database.
        let source = location.open().unwrap();
        assert!(source.containers().unwrap().is_empty());
    }
}
