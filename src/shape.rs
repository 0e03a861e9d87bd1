//! Shape Detector: classify a raw container by structural probing.
//!
//! ## Known shapes
//!
//! | Shape            | Probe                                                    |
//! |------------------|----------------------------------------------------------|
//! | `InlineArray`    | non-empty `conversation` (Cursor) or `history` (Continue) |
//! | `KeySplit`       | `composerId`, or a `composerData:<id>` container key      |
//! | `LegacyTabbed`   | non-empty `tabs`, each holding its own `bubbles`          |
//! | `LegacyPaired`   | parallel `prompts` / `generations` arrays                 |
//!
//! Probes run in that order. Inline storage wins over key-split storage even
//! when both could apply, so a composer that still carries its bubbles inline
//! never triggers a key lookup.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtractError;
use crate::fields;
use crate::source::RawContainer;

/// Key prefix of Cursor composer containers in `cursorDiskKV`.
pub const COMPOSER_KEY_PREFIX: &str = "composerData:";

/// Fields that may hold an embedded, ordered bubble list.
pub const INLINE_FIELDS: [&str; 2] = ["conversation", "history"];

/// Structural pattern a container follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeTag {
    InlineArray,
    KeySplit,
    LegacyPaired,
    LegacyTabbed,
}

impl ShapeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeTag::InlineArray => "inline_array",
            ShapeTag::KeySplit => "key_split",
            ShapeTag::LegacyPaired => "legacy_paired",
            ShapeTag::LegacyTabbed => "legacy_tabbed",
        }
    }
}

impl std::fmt::Display for ShapeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a container.
pub fn detect(container: &RawContainer) -> Result<ShapeTag, ExtractError> {
    let doc = &container.document;

    if inline_bubbles(doc).is_some() {
        return Ok(ShapeTag::InlineArray);
    }
    if key_split_identifier(container).is_some() {
        return Ok(ShapeTag::KeySplit);
    }
    if fields::non_empty_array(doc, "tabs").is_some() {
        return Ok(ShapeTag::LegacyTabbed);
    }
    let prompts = fields::array(doc, "prompts");
    let generations = fields::array(doc, "generations");
    if prompts.into_iter().chain(generations).any(|l| !l.is_empty()) {
        return Ok(ShapeTag::LegacyPaired);
    }

    Err(ExtractError::UnrecognizedShape {
        key: container.key.clone(),
    })
}

/// The first non-empty embedded bubble list, if any.
pub fn inline_bubbles(doc: &Value) -> Option<&[Value]> {
    inline_list(doc).map(|(_, bubbles)| bubbles)
}

/// Like [`inline_bubbles`], also naming the field the list came from.
pub fn inline_list(doc: &Value) -> Option<(&'static str, &[Value])> {
    INLINE_FIELDS
        .iter()
        .find_map(|field| fields::non_empty_array(doc, *field).map(|list| (*field, list)))
}

/// Identifier usable for key-split bubble lookup.
///
/// `composerId` wins; otherwise the suffix of a `composerData:<id>` key.
pub fn key_split_identifier(container: &RawContainer) -> Option<&str> {
    fields::non_empty_string(&container.document, "composerId").or_else(|| {
        container
            .key
            .strip_prefix(COMPOSER_KEY_PREFIX)
            .filter(|id| !id.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn container(key: &str, document: Value) -> RawContainer {
        RawContainer {
            key: key.into(),
            document,
        }
    }

    #[test]
    fn inline_conversation() {
        let c = container("composerData:a", json!({"conversation": [{"type": 1}]}));
        assert_eq!(detect(&c).unwrap(), ShapeTag::InlineArray);
    }

    #[test]
    fn inline_continue_history() {
        let c = container("session-1", json!({"sessionId": "s", "history": [{"message": {}}]}));
        assert_eq!(detect(&c).unwrap(), ShapeTag::InlineArray);
    }

    #[test]
    fn inline_wins_over_key_split() {
        let c = container(
            "composerData:a",
            json!({"composerId": "a", "conversation": [{"type": 1, "text": "hi"}]}),
        );
        assert_eq!(detect(&c).unwrap(), ShapeTag::InlineArray);
    }

    #[test]
    fn empty_inline_with_identifier_is_key_split() {
        let c = container("other", json!({"composerId": "abc", "conversation": []}));
        assert_eq!(detect(&c).unwrap(), ShapeTag::KeySplit);
        assert_eq!(key_split_identifier(&c), Some("abc"));
    }

    #[test]
    fn key_split_identifier_from_container_key() {
        let c = container("composerData:xyz", json!({"fullConversationHeadersOnly": []}));
        assert_eq!(detect(&c).unwrap(), ShapeTag::KeySplit);
        assert_eq!(key_split_identifier(&c), Some("xyz"));
    }

    #[test]
    fn tabs_are_legacy_tabbed() {
        let c = container(
            "workbench.panel.aichat.view.aichat.chatdata",
            json!({"tabs": [{"tabId": "t1", "bubbles": []}]}),
        );
        assert_eq!(detect(&c).unwrap(), ShapeTag::LegacyTabbed);
    }

    #[test]
    fn parallel_arrays_are_legacy_paired() {
        let c = container("aiService", json!({"prompts": [{"text": "hi"}], "generations": []}));
        assert_eq!(detect(&c).unwrap(), ShapeTag::LegacyPaired);

        let c = container("aiService", json!({"generations": [{"textDescription": "yo"}]}));
        assert_eq!(detect(&c).unwrap(), ShapeTag::LegacyPaired);
    }

    #[test]
    fn empty_parallel_arrays_are_unrecognized() {
        let c = container("aiService", json!({"prompts": [], "generations": []}));
        assert!(matches!(
            detect(&c),
            Err(ExtractError::UnrecognizedShape { .. })
        ));
    }

    #[test]
    fn unknown_document_is_unrecognized() {
        let c = container("misc", json!({"hello": "world"}));
        let err = detect(&c).unwrap_err();
        assert_eq!(err.to_string(), "container 'misc' matches no known storage shape");
    }

    #[test]
    fn malformed_inline_field_falls_through() {
        let c = container("composerData:q", json!({"conversation": "not a list"}));
        assert_eq!(detect(&c).unwrap(), ShapeTag::KeySplit);
    }
}
