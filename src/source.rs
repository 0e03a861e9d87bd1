//! Record Source Adapter: the only view the core has of a storage backend.
//!
//! A [`RecordSource`] enumerates the top-level containers of one storage
//! scope and fetches key-split bubbles by conversation identifier. The
//! assembler never knows whether records came from a SQLite row or a file.

use std::cell::Cell;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ExtractError;
use crate::model::Application;

/// Key prefix shared by every key-split bubble of one conversation.
///
/// Format: `bubbleId:<composerId>:<bubbleId>`
pub fn bubble_key_prefix(identifier: &str) -> String {
    format!("bubbleId:{identifier}:")
}

/// Identity of one enumerable storage unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Human-readable location (database path, directory path).
    pub label: String,
    pub application: Application,
    /// Workspace id for workspace-local scopes; `None` for global ones.
    pub workspace: Option<String>,
}

/// An undecoded keyed record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub key: String,
    pub value: String,
}

impl RawRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A decoded conversation container.
#[derive(Debug, Clone, PartialEq)]
pub struct RawContainer {
    pub key: String,
    pub document: Value,
}

impl RawContainer {
    /// Decode a stored container. Non-JSON values are [`ExtractError::MalformedContainer`].
    pub fn decode(record: &RawRecord) -> Result<Self, ExtractError> {
        let document = serde_json::from_str(&record.value).map_err(|e| {
            ExtractError::MalformedContainer {
                key: record.key.clone(),
                detail: e.to_string(),
            }
        })?;
        Ok(Self {
            key: record.key.clone(),
            document,
        })
    }
}

/// Capabilities the core needs from a storage backend.
pub trait RecordSource {
    /// The scope this source reads.
    fn scope(&self) -> &Scope;

    /// Enumerate every top-level container in the scope.
    fn containers(&self) -> Result<Vec<RawRecord>, ExtractError>;

    /// Every bubble record whose key starts with [`bubble_key_prefix`] for
    /// `identifier`. Order is not guaranteed.
    fn bubbles_for(&self, identifier: &str) -> Result<Vec<RawRecord>, ExtractError>;
}

/// In-memory source for callers that already hold their records.
#[derive(Debug)]
pub struct MemorySource {
    scope: Scope,
    containers: Vec<RawRecord>,
    bubbles: BTreeMap<String, String>,
    available: bool,
    fetches: Cell<usize>,
}

impl MemorySource {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            containers: Vec::new(),
            bubbles: BTreeMap::new(),
            available: true,
            fetches: Cell::new(0),
        }
    }

    /// A source whose every call fails with [`ExtractError::BackendUnavailable`].
    pub fn unavailable(scope: Scope) -> Self {
        Self {
            available: false,
            ..Self::new(scope)
        }
    }

    pub fn with_container(mut self, key: impl Into<String>, document: &Value) -> Self {
        self.containers
            .push(RawRecord::new(key, document.to_string()));
        self
    }

    /// Add a container from raw text, which need not be valid JSON.
    pub fn with_raw_container(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.containers.push(RawRecord::new(key, value));
        self
    }

    pub fn with_bubble(mut self, key: impl Into<String>, document: &Value) -> Self {
        self.bubbles.insert(key.into(), document.to_string());
        self
    }

    /// How many times [`RecordSource::bubbles_for`] has been called.
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    fn check_available(&self) -> Result<(), ExtractError> {
        if self.available {
            Ok(())
        } else {
            Err(ExtractError::backend(&self.scope.label, "source marked unavailable"))
        }
    }
}

impl RecordSource for MemorySource {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn containers(&self) -> Result<Vec<RawRecord>, ExtractError> {
        self.check_available()?;
        Ok(self.containers.clone())
    }

    fn bubbles_for(&self, identifier: &str) -> Result<Vec<RawRecord>, ExtractError> {
        self.fetches.set(self.fetches.get() + 1);
        self.check_available()?;
        let prefix = bubble_key_prefix(identifier);
        Ok(self
            .bubbles
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, value)| RawRecord::new(key.clone(), value.clone()))
            .collect())
    }
}
