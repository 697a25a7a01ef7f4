//! Type normalization and path construction
//!
//! Raw type vocabulary from JSON Schema, sample inference and XML Schema is
//! collapsed onto [`FieldType`] here. Unknown tokens never fail; they become
//! `any` so unfamiliar schema dialects still produce a usable tree.
//!
//! Paths use `.` between object levels, a `[]` suffix on the segment of a
//! repeated element, and `@` before attribute names:
//! `order.item[].name`, `order@currency`. Any of these characters (and `\`)
//! inside a name is escaped with a backslash, so a key `a.b` yields `a\.b`
//! and never meets the nested path `a.b`.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use crate::types::FieldType;
use serde_json::Value;
use std::borrow::Cow;

/// Normalize a raw `type` value as found in a schema document
///
/// - absent → `any`
/// - a string token → see [`normalize_token`]
/// - an array of tokens → the first non-null token; all-null → `null`
pub fn normalize_type(raw: Option<&Value>) -> FieldType {
    match raw {
        None => FieldType::Any,
        Some(Value::String(token)) => normalize_token(token),
        Some(Value::Array(tokens)) => {
            let mut saw_token = false;
            for token in tokens.iter().filter_map(Value::as_str) {
                saw_token = true;
                let normalized = normalize_token(token);
                if normalized != FieldType::Null {
                    return normalized;
                }
            }
            if saw_token {
                FieldType::Null
            } else {
                FieldType::Any
            }
        }
        Some(_) => FieldType::Any,
    }
}

/// Normalize a single type token
///
/// Canonical tokens map to themselves. Namespace-qualified XML Schema
/// built-ins are matched on their local name, case-insensitively
/// (`xs:int`, `xsd:dateTime`). A qualified built-in that has no closer match
/// is textual and maps to `string`; an unqualified unknown token maps to `any`.
pub fn normalize_token(raw: &str) -> FieldType {
    let lower = raw.trim().to_ascii_lowercase();
    if let Some(canonical) = FieldType::from_canonical(&lower) {
        return canonical;
    }

    let (qualified, local) = match lower.rsplit_once(':') {
        Some((_, local)) => (true, local),
        None => (false, lower.as_str()),
    };

    match local {
        "int" | "integer" | "long" | "short" | "byte" | "nonnegativeinteger"
        | "positiveinteger" | "nonpositiveinteger" | "negativeinteger" | "unsignedint"
        | "unsignedlong" | "unsignedshort" | "unsignedbyte" => FieldType::Integer,
        "decimal" | "float" | "double" => FieldType::Number,
        "date" | "datetime" => FieldType::Date,
        "boolean" => FieldType::Boolean,
        "string" | "normalizedstring" | "token" => FieldType::String,
        "anytype" | "anysimpletype" => FieldType::Any,
        _ if qualified => FieldType::String,
        _ => FieldType::Any,
    }
}

fn is_path_syntax(ch: char) -> bool {
    matches!(ch, '.' | '[' | ']' | '@' | '\\')
}

/// Escape path syntax inside a single name segment
pub fn escape_segment(name: &str) -> Cow<'_, str> {
    if !name.chars().any(is_path_syntax) {
        return Cow::Borrowed(name);
    }
    let mut escaped = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if is_path_syntax(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    Cow::Owned(escaped)
}

/// Build the path of a child named `name` under `parent_path`
///
/// An empty parent means the node sits at the root. `is_array_item` appends
/// `[]` to the new segment itself rather than starting another segment.
pub fn generate_path(parent_path: &str, name: &str, is_array_item: bool) -> String {
    let name = escape_segment(name);
    let mut path = if parent_path.is_empty() {
        name.into_owned()
    } else {
        format!("{}.{}", parent_path, name)
    };
    if is_array_item {
        path.push_str("[]");
    }
    path
}

/// Build the path of an attribute leaf: `parent@name`
pub fn generate_attribute_path(parent_path: &str, name: &str) -> String {
    format!("{}@{}", parent_path, escape_segment(name))
}

/// Derive a node id from its path
///
/// `.` becomes `-` and `[]` becomes `-array`, so `order.item[].name` yields
/// `order-item-array-name`. To keep the mapping injective, `_` and `-` in
/// names are escaped as `__` and `_-`, and a segment that starts with
/// `array` directly after a `.` has its first letter escaped as `_a`.
/// Backslash-escaped name characters get their own codes: `_d` for `.`,
/// `_o` for `[`, `_c` for `]`, `_t` for `@` and `_b` for `\`.
pub fn generate_id(path: &str) -> String {
    let mut id = String::with_capacity(path.len() + 8);
    let mut rest = path;
    while let Some(ch) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("[]") {
            id.push_str("-array");
            rest = after;
            continue;
        }
        rest = &rest[ch.len_utf8()..];
        match ch {
            '\\' => {
                let code = match rest.chars().next() {
                    Some('.') => Some('d'),
                    Some('[') => Some('o'),
                    Some(']') => Some('c'),
                    Some('@') => Some('t'),
                    Some('\\') => Some('b'),
                    _ => None,
                };
                id.push('_');
                match code {
                    Some(code) => {
                        id.push(code);
                        rest = &rest[1..];
                    }
                    // A stray backslash stands for itself
                    None => id.push('b'),
                }
            }
            '.' => {
                id.push('-');
                if rest.starts_with("array") {
                    id.push_str("_a");
                    rest = &rest[1..];
                }
            }
            '_' => id.push_str("__"),
            '-' => id.push_str("_-"),
            other => id.push(other),
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_missing_is_any() {
        assert_eq!(normalize_type(None), FieldType::Any);
    }

    #[test]
    fn test_normalize_token_arrays() {
        assert_eq!(normalize_type(Some(&json!(["null", "string"]))), FieldType::String);
        assert_eq!(normalize_type(Some(&json!(["integer", "null"]))), FieldType::Integer);
        assert_eq!(normalize_type(Some(&json!(["null", "null"]))), FieldType::Null);
        assert_eq!(normalize_type(Some(&json!([]))), FieldType::Any);
    }

    #[test]
    fn test_normalize_xsd_builtins() {
        assert_eq!(normalize_token("xs:int"), FieldType::Integer);
        assert_eq!(normalize_token("xsd:Long"), FieldType::Integer);
        assert_eq!(normalize_token("xs:short"), FieldType::Integer);
        assert_eq!(normalize_token("xs:decimal"), FieldType::Number);
        assert_eq!(normalize_token("xs:double"), FieldType::Number);
        assert_eq!(normalize_token("xs:dateTime"), FieldType::Date);
        assert_eq!(normalize_token("xs:date"), FieldType::Date);
        assert_eq!(normalize_token("xs:boolean"), FieldType::Boolean);
        assert_eq!(normalize_token("xs:string"), FieldType::String);
        assert_eq!(normalize_token("xs:anyURI"), FieldType::String);
        assert_eq!(normalize_token("xs:anyType"), FieldType::Any);
    }

    #[test]
    fn test_normalize_unknown_degrades_to_any() {
        assert_eq!(normalize_token("uuid"), FieldType::Any);
        assert_eq!(normalize_token(""), FieldType::Any);
        assert_eq!(normalize_type(Some(&json!({"oneOf": []}))), FieldType::Any);
    }

    #[test]
    fn test_normalize_is_idempotent_on_canonical_tokens() {
        for t in FieldType::ALL {
            assert_eq!(normalize_token(t.as_str()), t);
            assert_eq!(normalize_token(normalize_token(t.as_str()).as_str()), t);
        }
    }

    #[test]
    fn test_generate_path() {
        assert_eq!(generate_path("", "order", false), "order");
        assert_eq!(generate_path("order", "item", true), "order.item[]");
        assert_eq!(generate_path("order.item[]", "name", false), "order.item[].name");
        assert_eq!(generate_attribute_path("order", "currency"), "order@currency");
    }

    #[test]
    fn test_generate_id() {
        assert_eq!(generate_id("order.item[].name"), "order-item-array-name");
        assert_eq!(generate_id("order@currency"), "order@currency");
        assert_eq!(generate_id("tags[]"), "tags-array");
    }

    #[test]
    fn test_generate_id_disambiguates_lookalikes() {
        assert_ne!(generate_id("a.b"), generate_id("a-b"));
        assert_ne!(generate_id("a.array"), generate_id("a[]"));
        assert_ne!(generate_id("a_.b"), generate_id("a_-b"));
        assert_ne!(generate_id("a.b-c"), generate_id("a-b.c"));
    }

    #[test]
    fn test_path_syntax_in_names_is_escaped() {
        assert_eq!(generate_path("", "a.b", false), "a\\.b");
        assert_eq!(generate_path("r", "t[]", false), "r.t\\[\\]");
        assert_eq!(generate_path("r", "x@y", true), "r.x\\@y[]");
        assert_eq!(generate_path("", "c:\\tmp", false), "c:\\\\tmp");
        assert_eq!(generate_attribute_path("r", "a.b"), "r@a\\.b");
        assert_eq!(generate_path("", "plain", false), "plain");
    }

    #[test]
    fn test_dotted_key_and_nested_key_stay_apart() {
        let dotted = generate_path("", "a.b", false);
        let nested = generate_path(&generate_path("", "a", false), "b", false);
        assert_ne!(dotted, nested);
        assert_ne!(generate_id(&dotted), generate_id(&nested));
        assert_eq!(generate_id(&dotted), "a_db");
        assert_eq!(generate_id(&nested), "a-b");
    }

    #[test]
    fn test_bracketed_key_and_array_stay_apart() {
        let array = generate_path("", "t", true);
        let bracketed = generate_path("", "t[]", false);
        assert_eq!(array, "t[]");
        assert_eq!(bracketed, "t\\[\\]");
        assert_ne!(generate_id(&array), generate_id(&bracketed));
        assert_eq!(generate_id(&bracketed), "t_o_c");
    }

    #[test]
    fn test_escaped_attribute_marker_differs_from_attribute() {
        let attribute = generate_attribute_path("r", "x");
        let element = generate_path("", "r@x", false);
        assert_ne!(attribute, element);
        assert_ne!(generate_id(&attribute), generate_id(&element));
    }
}
