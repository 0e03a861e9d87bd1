//! Typed extraction errors for histex.
//!
//! Every variant names the smallest unit it applies to (field, container,
//! scope, output sink). Internal propagation in the binary uses `anyhow`;
//! the library surfaces these `thiserror` types so callers can decide
//! whether to skip or abort.

use std::path::PathBuf;

/// Errors raised while recovering conversations.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The container matches none of the known storage shapes.
    #[error("container '{key}' matches no known storage shape")]
    UnrecognizedShape { key: String },

    /// An optional field exists but has the wrong structural type.
    ///
    /// Never propagated past the field: readers degrade it to absent.
    #[error("field '{field}' should be {expected}, found {found}")]
    MalformedField {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// The container's stored value is not a decodable JSON document.
    #[error("container '{key}' could not be decoded: {detail}")]
    MalformedContainer { key: String, detail: String },

    /// The storage backend for a scope cannot be opened or queried.
    #[error("storage scope {scope} is unavailable: {detail}")]
    BackendUnavailable { scope: String, detail: String },

    /// The conversation sink could not be written.
    #[error("Failed to write conversations to {}: {detail}", path.display())]
    OutputError { path: PathBuf, detail: String },
}

impl ExtractError {
    /// Short stable name of the variant, used in JSON error output.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::UnrecognizedShape { .. } => "UnrecognizedShape",
            ExtractError::MalformedField { .. } => "MalformedField",
            ExtractError::MalformedContainer { .. } => "MalformedContainer",
            ExtractError::BackendUnavailable { .. } => "BackendUnavailable",
            ExtractError::OutputError { .. } => "OutputError",
        }
    }

    pub(crate) fn backend(scope: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        ExtractError::BackendUnavailable {
            scope: scope.to_string(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_unit() {
        let err = ExtractError::UnrecognizedShape {
            key: "composerData:abc".into(),
        };
        assert_eq!(
            err.to_string(),
            "container 'composerData:abc' matches no known storage shape"
        );

        let err = ExtractError::MalformedField {
            field: "codeBlocks",
            expected: "an array",
            found: "a string",
        };
        assert_eq!(
            err.to_string(),
            "field 'codeBlocks' should be an array, found a string"
        );
    }

    #[test]
    fn kind_is_stable() {
        let err = ExtractError::backend("/tmp/state.vscdb", "database is locked");
        assert_eq!(err.kind(), "BackendUnavailable");
        assert!(err.to_string().contains("database is locked"));
    }
}
