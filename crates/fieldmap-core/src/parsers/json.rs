//! Depth-bounded JSON reading shared by the JSON parsers
//!
//! `serde_json` stops at 128 levels of nesting, and lifting that limit alone
//! leaves deserialization recursing once per level. Documents are first
//! scanned iteratively: every container a fixed number of levels below the
//! root is collapsed to `{}` or `[]` in the text. Collapsed content is only
//! checked for balanced brackets and closed strings. The field-tree ceiling
//! is applied afterwards by each parser, so the document ceiling only has to
//! stay above it.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use serde::de::Error as _;
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;

/// Container levels kept for a field-tree ceiling of `max_depth`
///
/// One field level spans at most three document levels in a schema
/// (`properties`, the property itself, `items`).
pub fn document_levels(max_depth: usize) -> usize {
    max_depth.saturating_mul(4).saturating_add(8)
}

/// Read `content`; containers `max_levels` levels below the root are kept empty
pub fn read_document(content: &str, max_levels: usize) -> Result<Value, serde_json::Error> {
    let text = collapse_deep_containers(content, max_levels)?;
    let mut deserializer = serde_json::Deserializer::from_str(&text);
    deserializer.disable_recursion_limit();
    let value = Value::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(value)
}

fn closer_for(open: u8) -> u8 {
    if open == b'{' {
        b'}'
    } else {
        b']'
    }
}

/// Rewrite containers opened at `max_levels` open containers as empty ones
fn collapse_deep_containers(
    content: &str,
    max_levels: usize,
) -> Result<Cow<'_, str>, serde_json::Error> {
    let bytes = content.as_bytes();
    let mut collapsed: Option<String> = None;
    let mut copied = 0;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' if depth == max_levels => {
                let end = skip_container(bytes, i)?;
                let out = collapsed.get_or_insert_with(|| String::with_capacity(i + 2));
                out.push_str(&content[copied..i]);
                out.push(byte as char);
                out.push(closer_for(byte) as char);
                copied = end;
                i = end;
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }

    Ok(match collapsed {
        Some(mut out) => {
            out.push_str(&content[copied..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(content),
    })
}

/// Offset just past the container opening at `start`
fn skip_container(bytes: &[u8], start: usize) -> Result<usize, serde_json::Error> {
    let mut closers = vec![closer_for(bytes[start])];
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes.iter().enumerate().skip(start + 1) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => closers.push(closer_for(byte)),
            b'}' | b']' => {
                if closers.pop() != Some(byte) {
                    return Err(serde_json::Error::custom(format!(
                        "mismatched '{}' at byte {}",
                        byte as char, offset
                    )));
                }
                if closers.is_empty() {
                    return Ok(offset + 1);
                }
            }
            _ => {}
        }
    }
    Err(serde_json::Error::custom("EOF while skipping a nested container"))
}
