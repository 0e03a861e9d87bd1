//! Cursor `state.vscdb` backend: SQLite key/value tables behind [`RecordSource`].
//!
//! ## Storage format
//!
//! Two tables may be present:
//! - `cursorDiskKV` (global storage):
//!   - `composerData:<uuid>` → composer container (inline `conversation`, or headers only)
//!   - `bubbleId:<composerId>:<bubbleId>` → one key-split bubble
//! - `ItemTable` (workspace storage, legacy):
//!   - `workbench.panel.aichat.view.aichat.chatdata` → chat tabs with inline bubbles
//!   - `aiService.prompts` / `aiService.generations` → parallel prompt/generation arrays
//!
//! Either table may be missing; a missing table contributes nothing.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use tracing::{debug, trace};

use crate::error::ExtractError;
use crate::model::Application;
use crate::shape::COMPOSER_KEY_PREFIX;
use crate::source::{RawRecord, RecordSource, Scope, bubble_key_prefix};

/// `ItemTable` key of the legacy tabbed chat panel.
pub const CHAT_DATA_KEY: &str = "workbench.panel.aichat.view.aichat.chatdata";
/// `ItemTable` key of the legacy prompt array.
pub const PROMPTS_KEY: &str = "aiService.prompts";
/// `ItemTable` key of the legacy generation array.
pub const GENERATIONS_KEY: &str = "aiService.generations";

const DISK_KV: &str = "cursorDiskKV";
const ITEM_TABLE: &str = "ItemTable";

/// One opened `state.vscdb`. The connection is released when the source drops.
pub struct VscdbSource {
    scope: Scope,
    conn: Connection,
    has_disk_kv: bool,
    has_item_table: bool,
}

impl VscdbSource {
    /// Open a database read-only with a busy timeout.
    pub fn open(path: &Path, workspace: Option<String>) -> Result<Self, ExtractError> {
        let label = path.display().to_string();
        if !path.is_file() {
            return Err(ExtractError::backend(&label, "database file not found"));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ExtractError::backend(&label, e))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| ExtractError::backend(&label, e))?;

        // Forces SQLite to actually read the header, so a non-database file fails here.
        let has_disk_kv =
            table_exists(&conn, DISK_KV).map_err(|e| ExtractError::backend(&label, e))?;
        let has_item_table =
            table_exists(&conn, ITEM_TABLE).map_err(|e| ExtractError::backend(&label, e))?;

        debug!(db = %label, has_disk_kv, has_item_table, "opened Cursor database");
        Ok(Self {
            scope: Scope {
                label,
                application: Application::Cursor,
                workspace,
            },
            conn,
            has_disk_kv,
            has_item_table,
        })
    }

    fn unavailable(&self, err: rusqlite::Error) -> ExtractError {
        ExtractError::backend(&self.scope.label, err)
    }

    /// All `cursorDiskKV` rows with `lower <= key < upper`.
    fn disk_kv_range(&self, lower: &str, upper: &str) -> Result<Vec<RawRecord>, ExtractError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM cursorDiskKV WHERE key >= ?1 AND key < ?2 ORDER BY key")
            .map_err(|e| self.unavailable(e))?;
        let rows = stmt
            .query_map(rusqlite::params![lower, upper], keyed_row)
            .map_err(|e| self.unavailable(e))?;

        let mut records = Vec::new();
        for row in rows {
            match row.map_err(|e| self.unavailable(e))? {
                Some(record) => records.push(record),
                None => trace!(lower, "skipping row with empty value"),
            }
        }
        Ok(records)
    }

    fn item(&self, key: &str) -> Result<Option<String>, ExtractError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM ItemTable WHERE key = ?1")
            .map_err(|e| self.unavailable(e))?;
        let mut rows = stmt
            .query(rusqlite::params![key])
            .map_err(|e| self.unavailable(e))?;
        match rows.next().map_err(|e| self.unavailable(e))? {
            Some(row) => Ok(keyed_row(row)
                .map_err(|e| self.unavailable(e))?
                .map(|record| record.value)),
            None => Ok(None),
        }
    }

    fn legacy_containers(&self) -> Result<Vec<RawRecord>, ExtractError> {
        let mut records = Vec::new();

        if let Some(chat) = self.item(CHAT_DATA_KEY)? {
            records.push(RawRecord::new(CHAT_DATA_KEY, chat));
        }

        let prompts = self.item(PROMPTS_KEY)?;
        let generations = self.item(GENERATIONS_KEY)?;
        if prompts.is_some() || generations.is_some() {
            // Stitched as text so that a corrupt half fails decoding like any other container.
            let value = format!(
                r#"{{"prompts":{},"generations":{}}}"#,
                prompts.as_deref().unwrap_or("[]"),
                generations.as_deref().unwrap_or("[]"),
            );
            records.push(RawRecord::new(PROMPTS_KEY, value));
        }

        Ok(records)
    }
}

impl RecordSource for VscdbSource {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn containers(&self) -> Result<Vec<RawRecord>, ExtractError> {
        let mut records = Vec::new();
        if self.has_disk_kv {
            // `;` sorts right after `:`, bounding the prefix range.
            records.extend(self.disk_kv_range(COMPOSER_KEY_PREFIX, "composerData;")?);
        }
        if self.has_item_table {
            records.extend(self.legacy_containers()?);
        }
        trace!(db = %self.scope.label, containers = records.len(), "enumerated containers");
        Ok(records)
    }

    fn bubbles_for(&self, identifier: &str) -> Result<Vec<RawRecord>, ExtractError> {
        if !self.has_disk_kv {
            return Ok(Vec::new());
        }
        let prefix = bubble_key_prefix(identifier);
        let upper = format!("bubbleId:{identifier};");
        self.disk_kv_range(&prefix, &upper)
    }
}

/// Check if a table exists in the database.
fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1")
        .and_then(|mut stmt| stmt.exists(rusqlite::params![table]))
}

/// Key plus value stored as TEXT or BLOB. `NULL` or empty values yield `None`.
fn keyed_row(row: &Row<'_>) -> rusqlite::Result<Option<RawRecord>> {
    let key: String = row.get(0)?;
    let value = match row.get_ref(1)? {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        _ => return Ok(None),
    };
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(RawRecord { key, value }))
}
