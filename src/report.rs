//! Aggregation Reporter: run-level counts folded from the conversation stream.
//!
//! [`Summary::record`] is called once per conversation as it is written out,
//! so the report never buffers conversations.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Application, Conversation};
use crate::shape::ShapeTag;

/// Counts over every emitted conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub conversations: usize,
    pub messages: usize,
    pub by_source: BTreeMap<ShapeTag, usize>,
    pub by_application: BTreeMap<Application, usize>,
    pub with_code_context: usize,
    pub with_diffs: usize,
    pub complete: usize,
    pub with_tool_use: usize,
    pub with_reasoning: usize,
}

impl Summary {
    /// Fold a stream of conversations in one pass.
    pub fn fold<'a>(conversations: impl IntoIterator<Item = &'a Conversation>) -> Self {
        conversations
            .into_iter()
            .fold(Self::default(), |mut summary, conversation| {
                summary.record(conversation);
                summary
            })
    }

    /// Add one conversation to the counts.
    pub fn record(&mut self, conversation: &Conversation) {
        self.conversations += 1;
        self.messages += conversation.messages.len();
        *self.by_source.entry(conversation.source).or_insert(0) += 1;
        *self
            .by_application
            .entry(conversation.application)
            .or_insert(0) += 1;
        self.with_code_context += usize::from(conversation.has_code_context);
        self.with_diffs += usize::from(conversation.has_diffs);
        self.complete += usize::from(conversation.is_complete);
        self.with_tool_use += usize::from(conversation.has_tool_use());
        self.with_reasoning += usize::from(conversation.has_reasoning());
    }

    pub fn count_for(&self, source: ShapeTag) -> usize {
        self.by_source.get(&source).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationHeader, Message, Role};
    use serde_json::json;

    fn conversation(source: ShapeTag, messages: Vec<Message>) -> Conversation {
        let header = ConversationHeader {
            source,
            application: Application::Cursor,
            identifier: "id".into(),
            title: None,
            workspace: None,
            created_at: None,
            updated_at: None,
            metadata: serde_json::Map::new(),
        };
        Conversation::seal(header, messages).unwrap()
    }

    #[test]
    fn fold_counts_every_dimension() {
        let mut answer = Message::new(Role::Assistant, "a");
        answer.diff_histories = Some(vec![json!({})]);
        answer.reasoning = Some("because".into());

        let mut tool = Message::new(Role::Assistant, "t");
        tool.tool_calls = Some(vec![json!({"name": "grep"})]);

        let convs = vec![
            conversation(ShapeTag::InlineArray, vec![Message::new(Role::User, "q"), answer]),
            conversation(ShapeTag::KeySplit, vec![Message::new(Role::User, "q")]),
            conversation(ShapeTag::InlineArray, vec![tool]),
        ];

        let summary = Summary::fold(&convs);
        assert_eq!(summary.conversations, 3);
        assert_eq!(summary.messages, 4);
        assert_eq!(summary.count_for(ShapeTag::InlineArray), 2);
        assert_eq!(summary.count_for(ShapeTag::KeySplit), 1);
        assert_eq!(summary.count_for(ShapeTag::LegacyTabbed), 0);
        assert_eq!(summary.by_application.get(&Application::Cursor), Some(&3));
        assert_eq!(summary.with_diffs, 1);
        assert_eq!(summary.with_code_context, 0);
        assert_eq!(summary.complete, 2);
        assert_eq!(summary.with_tool_use, 1);
        assert_eq!(summary.with_reasoning, 1);
    }

    #[test]
    fn incremental_equals_fold() {
        let convs = vec![
            conversation(ShapeTag::LegacyPaired, vec![Message::new(Role::User, "hi")]),
            conversation(ShapeTag::LegacyTabbed, vec![Message::new(Role::Assistant, "yo")]),
        ];
        let mut incremental = Summary::default();
        for c in &convs {
            incremental.record(c);
        }
        assert_eq!(incremental, Summary::fold(&convs));
    }

    #[test]
    fn empty_stream_is_default() {
        assert_eq!(Summary::fold(&Vec::new()), Summary::default());
    }

    #[test]
    fn serializes_source_keys_snake_case() {
        let summary = Summary::fold(&[conversation(
            ShapeTag::KeySplit,
            vec![Message::new(Role::User, "x")],
        )]);
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["by_source"]["key_split"], 1);
        assert_eq!(value["by_application"]["cursor"], 1);
    }
}
