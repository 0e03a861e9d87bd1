//! Bubble Normalizer: one raw turn of any known shape into a [`Message`].
//!
//! ## Role markers
//!
//! - String tag (`role`, else string `type`): `"user"` = User, anything else = Assistant
//! - Integer `type` code: `1` = User, `2` = Assistant, unknown codes = Assistant
//! - No marker: the caller's role hint
//!
//! Bubbles with an integer code other than `1` or `2` are not turns at all;
//! [`is_turn`] lets assemblers drop them before normalizing.
//!
//! ## Content priority
//!
//! First non-empty plain string among `text` > `rawText` > `textDescription` >
//! `content`, taken verbatim. Legacy chat tabs store the typed prompt in
//! `rawText`, so [`normalize_tab_bubble`] checks it before `text`. Otherwise a
//! `content` array of typed parts is flattened to its `"text"` parts joined
//! by newlines.
//!
//! ## Wrapped items
//!
//! Continue history items keep the message under `message` and attach
//! `reasoning`, `contextItems` and `toolCallStates` to the item itself. Every
//! field is looked up on the message view first and on the outer item second.
//!
//! The transform is pure and total: malformed optional fields are dropped.

use serde_json::Value;

use crate::fields;
use crate::model::{CodeContext, Message, Role, ToolResult};

/// User message type code in Cursor bubbles.
const BUBBLE_TYPE_USER: i64 = 1;
/// Assistant message type code in Cursor bubbles.
const BUBBLE_TYPE_ASSISTANT: i64 = 2;

/// Plain-string content fields, in priority order.
const TEXT_FIELDS: [&str; 4] = ["text", "rawText", "textDescription", "content"];
/// Content priority for legacy chat-tab bubbles.
const TAB_TEXT_FIELDS: [&str; 4] = ["rawText", "text", "textDescription", "content"];

/// Terminal status of a tool call whose output was captured.
const TOOL_STATUS_DONE: &str = "done";

/// Normalize one bubble. `role_hint` applies only when the bubble carries no role marker.
pub fn normalize(bubble: &Value, role_hint: Role) -> Message {
    normalize_with(bubble, role_hint, &TEXT_FIELDS)
}

/// [`normalize`] for bubbles of a legacy chat tab, where `rawText` wins over `text`.
pub fn normalize_tab_bubble(bubble: &Value, role_hint: Role) -> Message {
    normalize_with(bubble, role_hint, &TAB_TEXT_FIELDS)
}

/// Whether a bubble is a conversational turn: an object whose integer
/// `type` code, if it has one, is the user or assistant code.
pub fn is_turn(bubble: &Value) -> bool {
    if !bubble.is_object() {
        return false;
    }
    let view = fields::object(bubble, "message").unwrap_or(bubble);
    match view.get("type") {
        Some(Value::Number(code)) => matches!(
            code.as_i64(),
            Some(BUBBLE_TYPE_USER | BUBBLE_TYPE_ASSISTANT)
        ),
        _ => true,
    }
}

fn normalize_with(bubble: &Value, role_hint: Role, text_fields: &[&str]) -> Message {
    let unit = Unit::new(bubble);

    let role = unit.find(resolve_role).unwrap_or(role_hint);
    let mut message = Message::new(role, resolve_content(unit.view, text_fields));

    message.reasoning = unit
        .find(|doc| fields::text_like(doc, "reasoning"))
        .or_else(|| unit.find(|doc| fields::text_like(doc, "thinking")));
    message.context_items = unit.find(|doc| fields::opaque_list(doc, "contextItems"));

    match role {
        Role::User => {
            message.code_context = unit.find(code_context);
        }
        Role::Assistant => {
            message.tool_calls = unit.find(|doc| fields::opaque_list(doc, "toolCalls"));
            message.code_blocks = unit.find(|doc| fields::opaque_list(doc, "codeBlocks"));
            message.suggested_code_blocks =
                unit.find(|doc| fields::opaque_list(doc, "suggestedCodeBlocks"));
            message.suggested_diffs = unit.find(|doc| fields::opaque_list(doc, "suggestedDiffs"));
            message.diff_histories = unit.find(|doc| fields::opaque_list(doc, "diffHistories"));
            message.tool_results = tool_results(&unit);
        }
    }

    message
}

/// A bubble seen through its optional `message` wrapper.
struct Unit<'a> {
    item: &'a Value,
    view: &'a Value,
}

impl<'a> Unit<'a> {
    fn new(item: &'a Value) -> Self {
        let view = fields::object(item, "message").unwrap_or(item);
        Self { item, view }
    }

    fn is_wrapped(&self) -> bool {
        !std::ptr::eq(self.item, self.view)
    }

    /// First hit on the message view, then on the outer item.
    fn find<T>(&self, read: impl Fn(&'a Value) -> Option<T>) -> Option<T> {
        read(self.view).or_else(|| {
            if self.is_wrapped() {
                read(self.item)
            } else {
                None
            }
        })
    }

    /// Values of `field` from both the view and the outer item, view first.
    fn lists(&self, field: &'static str) -> impl Iterator<Item = &'a Value> + use<'a> {
        let inner = fields::array(self.view, field).unwrap_or_default();
        let outer = if self.is_wrapped() {
            fields::array(self.item, field).unwrap_or_default()
        } else {
            &[]
        };
        inner.iter().chain(outer.iter())
    }
}

fn role_from_tag(tag: &str) -> Role {
    if tag == "user" {
        Role::User
    } else {
        Role::Assistant
    }
}

fn role_from_code(code: i64) -> Role {
    match code {
        BUBBLE_TYPE_USER => Role::User,
        BUBBLE_TYPE_ASSISTANT => Role::Assistant,
        _ => Role::Assistant,
    }
}

fn resolve_role(doc: &Value) -> Option<Role> {
    if let Some(tag) = doc.get("role").and_then(Value::as_str) {
        return Some(role_from_tag(tag));
    }
    match doc.get("type")? {
        Value::String(tag) => Some(role_from_tag(tag)),
        Value::Number(code) => code.as_i64().map(role_from_code),
        _ => None,
    }
}

fn resolve_content(doc: &Value, text_fields: &[&str]) -> String {
    for field in text_fields {
        if let Some(Value::String(text)) = doc.get(*field)
            && !text.is_empty()
        {
            return text.clone();
        }
    }

    match doc.get("content") {
        Some(Value::Array(parts)) => join_text_parts(parts),
        _ => String::new(),
    }
}

/// Join the `text` of every `"text"` part with newlines, skipping other parts.
fn join_text_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Selections from `context.selections`, else top-level `selections`.
fn code_context(doc: &Value) -> Option<Vec<CodeContext>> {
    let selections = fields::object(doc, "context")
        .and_then(|ctx| fields::array(ctx, "selections"))
        .or_else(|| fields::array(doc, "selections"))?;

    let context: Vec<CodeContext> = selections.iter().filter_map(selection).collect();
    (!context.is_empty()).then_some(context)
}

/// A selection without `uri.fsPath` is skipped.
fn selection(sel: &Value) -> Option<CodeContext> {
    let file_path = fields::object(sel, "uri").and_then(|uri| fields::string(uri, "fsPath"))?;
    let code_snippet = fields::string(sel, "text")
        .or_else(|| fields::string(sel, "rawText"))
        .unwrap_or_default();
    let range = sel.get("range").filter(|r| !r.is_null()).cloned();

    Some(CodeContext {
        file_path: file_path.to_string(),
        code_snippet: code_snippet.to_string(),
        range,
    })
}

/// Finished tool calls from `toolCallStates` and `toolResults`.
fn tool_results(unit: &Unit<'_>) -> Option<Vec<ToolResult>> {
    let results: Vec<ToolResult> = unit
        .lists("toolCallStates")
        .chain(unit.lists("toolResults"))
        .filter_map(finished_tool_call)
        .collect();
    (!results.is_empty()).then_some(results)
}

fn finished_tool_call(state: &Value) -> Option<ToolResult> {
    if state.get("status").and_then(Value::as_str) != Some(TOOL_STATUS_DONE) {
        return None;
    }
    // A present `output` key counts even when it holds `null`.
    let output = state.get("output")?.clone();
    let tool_name = state
        .pointer("/tool/function/name")
        .and_then(Value::as_str)
        .or_else(|| state.get("name").and_then(Value::as_str))
        .map(String::from);

    Some(ToolResult { tool_name, output })
}
