//! Typed optional-field access over raw JSON documents.
//!
//! Every read declares the shape it expects and what absence means. A field
//! that is missing or `null` is absent; a field with the wrong structural
//! type is reported as [`ExtractError::MalformedField`] at trace level and
//! then treated as absent too.

use serde_json::Value;
use tracing::trace;

use crate::error::ExtractError;

/// Describe a JSON value's structural type for diagnostics.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn degrade(field: &'static str, expected: &'static str, found: &Value) {
    let err = ExtractError::MalformedField {
        field,
        expected,
        found: kind_of(found),
    };
    trace!(%err, "degrading field to absent");
}

/// Array field; wrong type degrades to `None`.
pub fn array<'a>(doc: &'a Value, field: &'static str) -> Option<&'a [Value]> {
    match doc.get(field)? {
        Value::Array(items) => Some(items.as_slice()),
        Value::Null => None,
        other => {
            degrade(field, "an array", other);
            None
        }
    }
}

/// Array field that also counts as absent when empty.
pub fn non_empty_array<'a>(doc: &'a Value, field: &'static str) -> Option<&'a [Value]> {
    array(doc, field).filter(|items| !items.is_empty())
}

/// Owned copy of a non-empty array field, for opaque pass-through.
pub fn opaque_list(doc: &Value, field: &'static str) -> Option<Vec<Value>> {
    non_empty_array(doc, field).map(<[Value]>::to_vec)
}

/// Object field; wrong type degrades to `None`.
pub fn object<'a>(doc: &'a Value, field: &'static str) -> Option<&'a Value> {
    match doc.get(field)? {
        value @ Value::Object(_) => Some(value),
        Value::Null => None,
        other => {
            degrade(field, "an object", other);
            None
        }
    }
}

/// String field; wrong type degrades to `None`.
pub fn string<'a>(doc: &'a Value, field: &'static str) -> Option<&'a str> {
    match doc.get(field)? {
        Value::String(s) => Some(s.as_str()),
        Value::Null => None,
        other => {
            degrade(field, "a string", other);
            None
        }
    }
}

/// String field that also counts as absent when empty.
pub fn non_empty_string<'a>(doc: &'a Value, field: &'static str) -> Option<&'a str> {
    string(doc, field).filter(|s| !s.is_empty())
}

/// Text stored either as a plain string or as an object with a `text` key.
pub fn text_like(doc: &Value, field: &'static str) -> Option<String> {
    let text = match doc.get(field)? {
        Value::String(s) => s.as_str(),
        value @ Value::Object(_) => string(value, "text")?,
        Value::Null => return None,
        other => {
            degrade(field, "a string or an object with text", other);
            return None;
        }
    };
    Some(text.to_string()).filter(|s| !s.is_empty())
}

/// Timestamp field in any of the accepted encodings, as epoch millis.
pub fn timestamp(doc: &Value, field: &'static str) -> Option<i64> {
    let value = doc.get(field)?;
    let parsed = parse_timestamp(value);
    if parsed.is_none() && !value.is_null() {
        degrade(field, "a timestamp", value);
    }
    parsed
}

/// Parse a timestamp value (ISO-8601, epoch seconds, epoch millis) into epoch millis.
///
/// Numbers below `10^11` are taken as seconds; anything larger is millis.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    const SECONDS_CUTOFF: u64 = 100_000_000_000;

    let from_number = |n: i64| {
        if n.unsigned_abs() < SECONDS_CUTOFF {
            n.checked_mul(1000)
        } else {
            Some(n)
        }
    };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                from_number(i)
            } else {
                // Floats outside the i64 range would saturate rather than fail.
                n.as_f64()
                    .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                    .and_then(|f| from_number(f.trunc() as i64))
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                return from_number(n);
            }
            chrono::DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.timestamp_millis())
        }
        _ => None,
    }
}
