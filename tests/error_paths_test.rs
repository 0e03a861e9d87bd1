//! Error path tests for storage and output failures.
//!
//! Unreadable session files and broken databases must be skipped without
//! aborting the run; an unwritable output location must abort it.

use histex::discovery::ScopeLocation;
use histex::output::JsonlWriter;
use histex::pipeline::Extractor;

#[test]
fn corrupt_database_skips_scope_only() {
    let tmp = tempfile::TempDir::new().unwrap();
    let broken = tmp.path().join("broken/state.vscdb");
    std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
    std::fs::write(&broken, "garbage that is not sqlite\n".repeat(64)).unwrap();

    let sessions = tmp.path().join("sessions");
    std::fs::create_dir_all(&sessions).unwrap();
    std::fs::write(
        sessions.join("s.json"),
        r#"{"history":[{"message":{"role":"user","content":"hi"}}]}"#,
    )
    .unwrap();

    let locations = vec![
        ScopeLocation::CursorDb {
            path: broken,
            workspace: None,
        },
        ScopeLocation::ContinueSessions { dir: sessions },
    ];
    let (report, _) = Extractor::new(JsonlWriter::new(Vec::new(), "-"))
        .run(&locations)
        .unwrap();

    assert!(report.scopes[0].unavailable.is_some());
    assert!(report.scopes[1].unavailable.is_none());
    assert_eq!(report.summary.conversations, 1);
    assert_eq!(report.summary.complete, 0);
}

#[test]
fn output_into_a_file_path_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let blocker = tmp.path().join("extracted_data");
    std::fs::write(&blocker, "a file, not a directory").unwrap();

    let err = JsonlWriter::create(&blocker.join("conversations.jsonl"))
        .err()
        .expect("creating under a regular file should fail");
    assert_eq!(err.kind(), "OutputError");
}

#[cfg(unix)]
mod unix_error_paths {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use histex::backends::ContinueDirSource;
    use histex::source::RecordSource;

    /// Restore permissions so temp dir cleanup succeeds.
    struct PermGuard {
        path: std::path::PathBuf,
        mode: u32,
    }

    impl Drop for PermGuard {
        fn drop(&mut self) {
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(self.mode));
        }
    }

    #[test]
    fn unreadable_session_file_is_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let locked = tmp.path().join("locked.json");
        fs::write(&locked, r#"{"history":[]}"#).unwrap();
        fs::write(tmp.path().join("open.json"), r#"{"history":[]}"#).unwrap();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let _guard = PermGuard {
            path: locked.clone(),
            mode: 0o644,
        };
        if fs::read(&locked).is_ok() {
            // Running with CAP_DAC_OVERRIDE (e.g. as root): permissions are not enforced.
            return;
        }

        let source = ContinueDirSource::open(tmp.path()).unwrap();
        let keys: Vec<String> = source
            .containers()
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["open"]);
    }

    #[test]
    fn readonly_output_dir_is_output_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::set_permissions(&out, fs::Permissions::from_mode(0o555)).unwrap();
        let _guard = PermGuard {
            path: out.clone(),
            mode: 0o755,
        };
        if fs::write(out.join("probe"), b"").is_ok() {
            return;
        }

        let err = histex::output::JsonlWriter::create(&out.join("conversations.jsonl"))
            .err()
            .expect("read-only dir should reject new files");
        assert!(
            err.to_string().contains("conversations.jsonl"),
            "error should name the target; got: {err}"
        );
    }
}
