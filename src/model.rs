//! Canonical conversation model: the single output shape of histex.
//!
//! Every historical storage shape is normalized into these types. They are
//! plain values: built once during assembly and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::shape::ShapeTag;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Application whose storage a conversation was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Application {
    Cursor,
    Continue,
}

impl Application {
    pub fn slug(self) -> &'static str {
        match self {
            Application::Cursor => "cursor",
            Application::Continue => "continue",
        }
    }

    /// Parse a CLI-facing slug.
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.to_ascii_lowercase().as_str() {
            "cursor" | "cur" => Some(Application::Cursor),
            "continue" | "cont" => Some(Application::Continue),
            _ => None,
        }
    }
}

impl std::fmt::Display for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// A file selection the user attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeContext {
    pub file_path: String,
    pub code_snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<serde_json::Value>,
}

/// Output captured from a tool call that finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub output: serde_json::Value,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_context: Option<Vec<CodeContext>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_items: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_blocks: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_code_blocks: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_diffs: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_histories: Option<Vec<serde_json::Value>>,
}

impl Message {
    /// A message with only role and content set.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_results: None,
            reasoning: None,
            code_context: None,
            context_items: None,
            code_blocks: None,
            suggested_code_blocks: None,
            suggested_diffs: None,
            diff_histories: None,
        }
    }

    pub fn has_code_context(&self) -> bool {
        self.code_context.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Suggested edits or recorded diff history. Plain code blocks don't count.
    pub fn has_diffs(&self) -> bool {
        fn non_empty(list: &Option<Vec<serde_json::Value>>) -> bool {
            list.as_ref().is_some_and(|l| !l.is_empty())
        }

        non_empty(&self.suggested_code_blocks)
            || non_empty(&self.suggested_diffs)
            || non_empty(&self.diff_histories)
    }

    pub fn has_tool_use(&self) -> bool {
        self.tool_calls.is_some() || self.tool_results.is_some()
    }
}

/// One recovered chat thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Turns in stored order.
    pub messages: Vec<Message>,
    /// Storage shape that produced this conversation.
    pub source: ShapeTag,
    pub application: Application,
    /// Composer id, tab id, session id or container key. Not unique across shapes.
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub has_code_context: bool,
    pub has_diffs: bool,
    /// At least one assistant turn.
    pub is_complete: bool,
}

/// Everything a conversation needs besides its messages and derived flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHeader {
    pub source: ShapeTag,
    pub application: Application,
    pub identifier: String,
    pub title: Option<String>,
    pub workspace: Option<String>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Conversation {
    /// Seal a conversation, computing its derived flags.
    ///
    /// Returns `None` when there are no messages: empty threads are never emitted.
    pub fn seal(header: ConversationHeader, messages: Vec<Message>) -> Option<Self> {
        if messages.is_empty() {
            return None;
        }

        let has_code_context = messages.iter().any(Message::has_code_context);
        let has_diffs = messages.iter().any(Message::has_diffs);
        let is_complete = messages.iter().any(|m| m.role == Role::Assistant);

        Some(Self {
            messages,
            source: header.source,
            application: header.application,
            identifier: header.identifier,
            title: header.title,
            workspace: header.workspace,
            created_at: header.created_at,
            updated_at: header.updated_at,
            metadata: header.metadata,
            has_code_context,
            has_diffs,
            is_complete,
        })
    }

    pub fn has_tool_use(&self) -> bool {
        self.messages.iter().any(Message::has_tool_use)
    }

    pub fn has_reasoning(&self) -> bool {
        self.messages.iter().any(|m| m.reasoning.is_some())
    }
}
