//! Conversation Assembler: pull bubbles for one container in the order its
//! shape dictates, normalize them, and seal the result into [`Conversation`]s.
//!
//! Every shape yields at most one conversation, except `LegacyTabbed`, which
//! yields one per tab. An empty result means the container held nothing
//! worth emitting.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::ExtractError;
use crate::fields;
use crate::model::{Conversation, ConversationHeader, Message, Role};
use crate::normalize::{is_turn, normalize, normalize_tab_bubble};
use crate::shape::{self, COMPOSER_KEY_PREFIX, ShapeTag};
use crate::source::{RawContainer, RawRecord, RecordSource, Scope, bubble_key_prefix};

/// Inline list field of Continue sessions.
const HISTORY_FIELD: &str = "history";

/// Container fields preserved verbatim in `Conversation::metadata`.
const METADATA_FIELDS: [&str; 2] = ["status", "unifiedMode"];

/// Assemble every conversation a container holds.
pub fn assemble(
    container: &RawContainer,
    source: &dyn RecordSource,
) -> Result<Vec<Conversation>, ExtractError> {
    let shape = shape::detect(container)?;
    trace!(key = %container.key, %shape, "container classified");

    let conversations = match shape {
        ShapeTag::InlineArray => assemble_inline(container, source.scope())?,
        ShapeTag::KeySplit => assemble_key_split(container, source)?,
        ShapeTag::LegacyPaired => assemble_paired(container, source.scope())?,
        ShapeTag::LegacyTabbed => assemble_tabbed(container, source.scope())?,
    };

    debug!(
        key = %container.key,
        %shape,
        conversations = conversations.len(),
        "container assembled"
    );
    Ok(conversations)
}

// ---------------------------------------------------------------------------
// Per-shape assembly
// ---------------------------------------------------------------------------

fn assemble_inline(
    container: &RawContainer,
    scope: &Scope,
) -> Result<Vec<Conversation>, ExtractError> {
    let (field, bubbles) = shape::inline_list(&container.document).unwrap_or_default();
    require_objects(container, "inline bubble list", bubbles)?;

    // Session history items carry their turn under `message`; items without one are not turns.
    let messages = if field == HISTORY_FIELD {
        normalize_all(
            bubbles.iter().filter(|item| fields::object(item, "message").is_some()),
            Role::Assistant,
        )
    } else {
        normalize_all(bubbles.iter(), Role::Assistant)
    };
    let header = container_header(container, scope, ShapeTag::InlineArray, bubbles.iter());
    Ok(Conversation::seal(header, messages).into_iter().collect())
}

fn assemble_key_split(
    container: &RawContainer,
    source: &dyn RecordSource,
) -> Result<Vec<Conversation>, ExtractError> {
    let identifier = shape::key_split_identifier(container).unwrap_or(&container.key);
    let records = source.bubbles_for(identifier)?;
    trace!(identifier, records = records.len(), "fetched key-split bubbles");

    let bubbles = order_key_split(&container.document, identifier, records);
    let messages = normalize_all(bubbles.iter(), Role::Assistant);

    let mut header =
        container_header(container, source.scope(), ShapeTag::KeySplit, bubbles.iter());
    header.identifier = identifier.to_string();
    Ok(Conversation::seal(header, messages).into_iter().collect())
}

/// Zip `prompts[i]` (user) with `generations[i]` (assistant); either side may run out first.
fn assemble_paired(
    container: &RawContainer,
    scope: &Scope,
) -> Result<Vec<Conversation>, ExtractError> {
    let doc = &container.document;
    let prompts = fields::array(doc, "prompts").unwrap_or_default();
    let generations = fields::array(doc, "generations").unwrap_or_default();
    let all: Vec<&Value> = prompts.iter().chain(generations).collect();
    require_objects(container, "prompt/generation arrays", all.iter().copied())?;

    let mut messages = Vec::with_capacity(prompts.len() + generations.len());
    for i in 0..prompts.len().max(generations.len()) {
        if let Some(prompt) = prompts.get(i) {
            messages.extend(normalize_recognized(prompt, Role::User));
        }
        if let Some(generation) = generations.get(i) {
            messages.extend(normalize_recognized(generation, Role::Assistant));
        }
    }

    let header = container_header(container, scope, ShapeTag::LegacyPaired, all.into_iter());
    Ok(Conversation::seal(header, messages).into_iter().collect())
}

/// One conversation per tab.
fn assemble_tabbed(
    container: &RawContainer,
    scope: &Scope,
) -> Result<Vec<Conversation>, ExtractError> {
    let tabs = fields::array(&container.document, "tabs").unwrap_or_default();
    require_objects(container, "tabs", tabs)?;

    let mut conversations = Vec::new();
    for (idx, tab) in tabs.iter().enumerate() {
        if !tab.is_object() {
            trace!(key = %container.key, idx, "skipping non-object tab");
            continue;
        }
        let bubbles = fields::array(tab, "bubbles").unwrap_or_default();
        let messages: Vec<Message> = bubbles
            .iter()
            .filter(|bubble| recognized(bubble))
            .map(|bubble| normalize_tab_bubble(bubble, Role::Assistant))
            .collect();

        let header = ConversationHeader {
            source: ShapeTag::LegacyTabbed,
            application: scope.application,
            identifier: fields::non_empty_string(tab, "tabId")
                .map(String::from)
                .unwrap_or_else(|| format!("{}#{idx}", container.key)),
            title: fields::non_empty_string(tab, "chatTitle").map(String::from),
            workspace: workspace_for(&container.document, bubbles.iter(), scope),
            created_at: fields::timestamp(tab, "createdAt"),
            updated_at: fields::timestamp(tab, "lastSendTime")
                .or_else(|| fields::timestamp(tab, "lastUpdatedAt")),
            metadata: serde_json::Map::new(),
        };

        match Conversation::seal(header, messages) {
            Some(conversation) => conversations.push(conversation),
            None => trace!(key = %container.key, idx, "tab has no messages"),
        }
    }
    Ok(conversations)
}

// ---------------------------------------------------------------------------
// Bubble helpers
// ---------------------------------------------------------------------------

/// Objects that are user or assistant turns; anything else is skipped.
fn recognized(bubble: &Value) -> bool {
    let turn = is_turn(bubble);
    if !turn {
        trace!(
            found = fields::kind_of(bubble),
            code = ?bubble.get("type"),
            "skipping unrecognized bubble"
        );
    }
    turn
}

fn normalize_recognized(bubble: &Value, role_hint: Role) -> Option<Message> {
    recognized(bubble).then(|| normalize(bubble, role_hint))
}

fn normalize_all<'a>(bubbles: impl Iterator<Item = &'a Value>, role_hint: Role) -> Vec<Message> {
    bubbles
        .filter_map(|bubble| normalize_recognized(bubble, role_hint))
        .collect()
}

/// A non-empty list with no object in it is structurally invalid for its shape.
fn require_objects<'a>(
    container: &RawContainer,
    what: &str,
    items: impl IntoIterator<Item = &'a Value>,
) -> Result<(), ExtractError> {
    let mut items = items.into_iter().peekable();
    if items.peek().is_none() {
        return Ok(());
    }
    if items.any(Value::is_object) {
        Ok(())
    } else {
        Err(ExtractError::MalformedContainer {
            key: container.key.clone(),
            detail: format!("no entry of the {what} is an object"),
        })
    }
}

/// Order key-split bubbles: conversation header position, then the bubble's
/// own `createdAt`/`timestamp`, then key order.
fn order_key_split(
    composer: &Value,
    identifier: &str,
    records: Vec<RawRecord>,
) -> Vec<Value> {
    let positions: HashMap<&str, usize> = fields::array(composer, "fullConversationHeadersOnly")
        .unwrap_or_default()
        .iter()
        .filter_map(|header| fields::non_empty_string(header, "bubbleId"))
        .enumerate()
        .map(|(pos, id)| (id, pos))
        .collect();
    let prefix = bubble_key_prefix(identifier);

    let mut decoded: Vec<(Option<usize>, Option<i64>, String, Value)> = records
        .into_iter()
        .filter_map(|record| {
            let bubble: Value = match serde_json::from_str(&record.value) {
                Ok(v) => v,
                Err(e) => {
                    trace!(key = %record.key, error = %e, "skipping undecodable bubble");
                    return None;
                }
            };
            let bubble_id = record.key.strip_prefix(&prefix).unwrap_or(&record.key);
            let position = positions.get(bubble_id).copied();
            let sequence = fields::timestamp(&bubble, "createdAt")
                .or_else(|| fields::timestamp(&bubble, "timestamp"));
            Some((position, sequence, record.key, bubble))
        })
        .collect();

    decoded.sort_by(|a, b| {
        none_last(a.0, b.0)
            .then_with(|| none_last(a.1, b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    decoded.into_iter().map(|(_, _, _, bubble)| bubble).collect()
}

fn none_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// Container-level fields
// ---------------------------------------------------------------------------

fn container_header<'a>(
    container: &RawContainer,
    scope: &Scope,
    source: ShapeTag,
    bubbles: impl Iterator<Item = &'a Value>,
) -> ConversationHeader {
    let doc = &container.document;

    let identifier = fields::non_empty_string(doc, "composerId")
        .or_else(|| fields::non_empty_string(doc, "sessionId"))
        .or_else(|| container.key.strip_prefix(COMPOSER_KEY_PREFIX))
        .unwrap_or(&container.key)
        .to_string();

    let title = ["name", "title", "chatTitle"]
        .into_iter()
        .find_map(|field| fields::non_empty_string(doc, field))
        .map(String::from);

    let metadata = METADATA_FIELDS
        .into_iter()
        .filter_map(|field| {
            doc.get(field)
                .filter(|v| !v.is_null())
                .map(|v| (field.to_string(), v.clone()))
        })
        .collect();

    ConversationHeader {
        source,
        application: scope.application,
        identifier,
        title,
        workspace: workspace_for(doc, bubbles, scope),
        created_at: fields::timestamp(doc, "createdAt"),
        updated_at: fields::timestamp(doc, "lastUpdatedAt"),
        metadata,
    }
}

/// Container's own directory, else a path recovered from bubbles, else the scope's workspace.
fn workspace_for<'a>(
    doc: &Value,
    bubbles: impl Iterator<Item = &'a Value>,
    scope: &Scope,
) -> Option<String> {
    fields::non_empty_string(doc, "workspaceDirectory")
        .or_else(|| fields::non_empty_string(doc, "workspacePath"))
        .map(String::from)
        .or_else(|| workspace_from_bubbles(bubbles).map(|p| p.display().to_string()))
        .or_else(|| scope.workspace.clone())
}

/// Search bubbles for `workspaceProjectDir` or `workspaceUris`.
fn workspace_from_bubbles<'a>(mut bubbles: impl Iterator<Item = &'a Value>) -> Option<PathBuf> {
    bubbles.find_map(|bubble| {
        if let Some(dir) = bubble.get("workspaceProjectDir").and_then(Value::as_str)
            && !dir.is_empty()
        {
            return Some(PathBuf::from(dir));
        }
        bubble
            .get("workspaceUris")
            .and_then(Value::as_array)?
            .iter()
            .filter_map(Value::as_str)
            .find_map(parse_workspace_uri)
    })
}

/// Parse a workspace URI into a filesystem path.
///
/// Handles:
/// - `file:///path/to/project` → `/path/to/project`
/// - `vscode-remote://ssh-remote+{host}/path` → `/path`
fn parse_workspace_uri(uri: &str) -> Option<PathBuf> {
    if let Some(file_path) = uri.strip_prefix("file://") {
        let decoded = urlencoding::decode(file_path).ok()?;
        let path_str = decoded.as_ref();
        // Drive-letter paths arrive as `/C:/...` on Windows.
        #[cfg(target_os = "windows")]
        {
            if path_str.len() > 2
                && path_str.as_bytes()[0] == b'/'
                && path_str.as_bytes()[2] == b':'
            {
                return Some(PathBuf::from(&path_str[1..]));
            }
        }
        return Some(PathBuf::from(path_str));
    }

    if let Some(rest) = uri.strip_prefix("vscode-remote://") {
        let slash_idx = rest.find('/')?;
        let decoded = urlencoding::decode(&rest[slash_idx..]).ok()?;
        return Some(PathBuf::from(decoded.as_ref()));
    }

    None
}
