//! End-to-end extraction over storage scopes.
//!
//! Containment boundaries:
//! - a container that cannot be decoded, classified or assembled is skipped
//! - a scope that cannot be opened or enumerated is skipped
//! - a sink failure aborts the run
//!
//! Conversations are written and counted as soon as they are assembled, so
//! memory use does not grow with the number of conversations.

use std::io::Write;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assemble::assemble;
use crate::discovery::ScopeLocation;
use crate::error::ExtractError;
use crate::model::Application;
use crate::output::JsonlWriter;
use crate::report::Summary;
use crate::source::{RawContainer, RecordSource};

/// Per-scope progress counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeReport {
    pub scope: String,
    pub application: Application,
    pub conversations: usize,
    pub skipped_containers: usize,
    /// Why the scope was skipped, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<String>,
}

impl ScopeReport {
    fn new(scope: impl Into<String>, application: Application) -> Self {
        Self {
            scope: scope.into(),
            application,
            conversations: 0,
            skipped_containers: 0,
            unavailable: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub summary: Summary,
    pub scopes: Vec<ScopeReport>,
}

/// Streams conversations from record sources into a JSONL sink.
pub struct Extractor<W: Write> {
    sink: JsonlWriter<W>,
    report: RunReport,
}

impl<W: Write> Extractor<W> {
    pub fn new(sink: JsonlWriter<W>) -> Self {
        Self {
            sink,
            report: RunReport::default(),
        }
    }

    /// Extract every location, flush the sink and return the report with the writer.
    pub fn run(mut self, locations: &[ScopeLocation]) -> Result<(RunReport, W), ExtractError> {
        for location in locations {
            self.extract_location(location)?;
        }
        let writer = self.sink.finish()?;
        info!(
            conversations = self.report.summary.conversations,
            scopes = self.report.scopes.len(),
            "extraction complete"
        );
        Ok((self.report, writer))
    }

    /// Open one location and extract it. Only sink failures are returned as errors.
    pub fn extract_location(&mut self, location: &ScopeLocation) -> Result<&ScopeReport, ExtractError> {
        let source = match location.open() {
            Ok(source) => source,
            Err(err) => {
                warn!(scope = %location.label(), error = %err, "skipping storage scope");
                let mut skipped = ScopeReport::new(
                    location.path().display().to_string(),
                    location.application(),
                );
                skipped.unavailable = Some(err.to_string());
                return Ok(self.push(skipped));
            }
        };
        // `source` drops at the end of this call, releasing the backend.
        self.extract_source(source.as_ref())
    }

    /// Extract one already-open source.
    pub fn extract_source(&mut self, source: &dyn RecordSource) -> Result<&ScopeReport, ExtractError> {
        let scope = source.scope();
        let mut report = ScopeReport::new(scope.label.clone(), scope.application);

        let records = match source.containers() {
            Ok(records) => records,
            Err(err) => {
                warn!(scope = %scope.label, error = %err, "skipping storage scope");
                report.unavailable = Some(err.to_string());
                return Ok(self.push(report));
            }
        };

        for record in &records {
            let conversations = match RawContainer::decode(record)
                .and_then(|container| assemble(&container, source))
            {
                Ok(conversations) => conversations,
                Err(err) => {
                    debug!(
                        scope = %scope.label,
                        key = %record.key,
                        kind = err.kind(),
                        error = %err,
                        "skipping container"
                    );
                    report.skipped_containers += 1;
                    continue;
                }
            };

            for conversation in &conversations {
                self.sink.write(conversation)?;
                self.report.summary.record(conversation);
                report.conversations += 1;
            }
        }

        debug!(
            scope = %report.scope,
            conversations = report.conversations,
            skipped = report.skipped_containers,
            "scope done"
        );
        Ok(self.push(report))
    }

    pub fn summary(&self) -> &Summary {
        &self.report.summary
    }

    fn push(&mut self, report: ScopeReport) -> &ScopeReport {
        self.report.scopes.push(report);
        &self.report.scopes[self.report.scopes.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeTag;
    use crate::source::{MemorySource, Scope};
    use serde_json::json;

    fn scope(label: &str) -> Scope {
        Scope {
            label: label.into(),
            application: Application::Cursor,
            workspace: None,
        }
    }

    fn extractor() -> Extractor<Vec<u8>> {
        Extractor::new(JsonlWriter::new(Vec::new(), "-"))
    }

    fn lines(bytes: &[u8]) -> Vec<serde_json::Value> {
        std::str::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn malformed_field_does_not_drop_conversation() {
        let source = MemorySource::new(scope("db"))
            .with_container(
                "composerData:good",
                &json!({"conversation": [
                    {"type": 1, "text": "hi"},
                    {"type": 2, "text": "hello"}
                ]}),
            )
            .with_container(
                "composerData:odd",
                &json!({"conversation": [
                    {"type": 1, "text": "q", "context": {"selections": "oops"}},
                    {"type": 2, "text": "a", "codeBlocks": 7}
                ]}),
            );

        let mut extractor = extractor();
        let report = extractor.extract_source(&source).unwrap().clone();
        assert_eq!(report.conversations, 2);
        assert_eq!(report.skipped_containers, 0);
        assert_eq!(extractor.summary().messages, 4);
        assert_eq!(extractor.summary().complete, 2);
        assert_eq!(extractor.summary().with_code_context, 0);
    }

    #[test]
    fn undecodable_and_unrecognized_containers_are_skipped() {
        let source = MemorySource::new(scope("db"))
            .with_raw_container("composerData:broken", "{not json")
            .with_container("unrelated", &json!({"foo": 1}))
            .with_container("composerData:headers-only", &json!({"name": "no bubbles"}))
            .with_container(
                "composerData:ok",
                &json!({"conversation": [{"type": 1, "text": "hi"}]}),
            );

        let mut extractor = extractor();
        let report = extractor.extract_source(&source).unwrap().clone();
        assert_eq!(report.conversations, 1);
        assert_eq!(report.skipped_containers, 2);
    }

    #[test]
    fn unavailable_scope_is_skipped_and_run_continues() {
        let tmp = tempfile::TempDir::new().unwrap();
        let locations = vec![ScopeLocation::CursorDb {
            path: tmp.path().join("missing/state.vscdb"),
            workspace: None,
        }];

        let (report, bytes) = extractor().run(&locations).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(report.scopes.len(), 1);
        assert!(report.scopes[0].unavailable.is_some());
        assert_eq!(report.summary, Summary::default());
    }

    #[test]
    fn unavailable_source_reports_reason() {
        let source = MemorySource::unavailable(scope("gone"));
        let mut extractor = extractor();
        let report = extractor.extract_source(&source).unwrap();
        assert_eq!(report.conversations, 0);
        assert!(
            report
                .unavailable
                .as_deref()
                .is_some_and(|r| r.contains("gone"))
        );
    }

    #[test]
    fn application_comes_from_scope() {
        let source = MemorySource::new(Scope {
            label: "sessions".into(),
            application: Application::Continue,
            workspace: None,
        })
        .with_container(
            "s1",
            &json!({"sessionId": "s1", "history": [
                {"message": {"role": "user", "content": "q"}},
                {"message": {"role": "assistant", "content": "a"}}
            ]}),
        );

        let mut extractor = extractor();
        extractor.extract_source(&source).unwrap();
        let (report, bytes) = extractor.run(&[]).unwrap();
        let written = lines(&bytes);
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["application"], "continue");
        assert_eq!(written[0]["identifier"], "s1");
        assert_eq!(report.summary.count_for(ShapeTag::InlineArray), 1);
        assert_eq!(
            report.summary.by_application.get(&Application::Continue),
            Some(&1)
        );
    }

    #[test]
    fn sink_failure_aborts() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let source = MemorySource::new(scope("db")).with_container(
            "composerData:a",
            &json!({"conversation": [{"type": 1, "text": "hi"}]}),
        );
        let mut extractor = Extractor::new(JsonlWriter::new(Broken, "out.jsonl"));
        let err = extractor.extract_source(&source).unwrap_err();
        assert!(matches!(err, ExtractError::OutputError { .. }));
    }
}
