//! Global functions and primitive methods available to scripts
//!
//! Everything here is pure: no clock, no randomness, no I/O. Higher-order
//! array methods (`map`, `filter`, ...) call back into the interpreter and
//! live there.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::value::{ArrayRef, Budget, ScriptValue, SLOT_BYTES};
use super::SandboxError;
use crate::transformer::functions::number_to_string;

type BuiltinResult = Result<ScriptValue, SandboxError>;

const GLOBAL_FUNCTIONS: &[&str] = &[
    "String",
    "Number",
    "Boolean",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "Error",
    "TypeError",
];

const NAMESPACES: &[&str] = &["Math", "JSON", "Array", "Object"];

const NAMESPACE_FUNCTIONS: &[&str] = &[
    "Math.abs",
    "Math.floor",
    "Math.ceil",
    "Math.round",
    "Math.trunc",
    "Math.sign",
    "Math.sqrt",
    "Math.pow",
    "Math.min",
    "Math.max",
    "JSON.stringify",
    "JSON.parse",
    "Array.isArray",
    "Object.keys",
    "Object.values",
    "Object.entries",
    "Number.isInteger",
    "Number.isFinite",
    "Number.isNaN",
];

/// Look up a global binding by name
pub(crate) fn global(name: &str) -> Option<ScriptValue> {
    match name {
        "NaN" => Some(ScriptValue::Number(f64::NAN)),
        "Infinity" => Some(ScriptValue::Number(f64::INFINITY)),
        _ => GLOBAL_FUNCTIONS
            .iter()
            .chain(NAMESPACES)
            .find(|candidate| **candidate == name)
            .map(|name| ScriptValue::Builtin(*name)),
    }
}

/// Property of a global namespace or function (`Math.PI`, `Math.max`)
pub(crate) fn builtin_member(owner: &str, property: &str) -> ScriptValue {
    match (owner, property) {
        ("Math", "PI") => ScriptValue::Number(std::f64::consts::PI),
        ("Math", "E") => ScriptValue::Number(std::f64::consts::E),
        ("Number", "MAX_SAFE_INTEGER") => ScriptValue::Number(9_007_199_254_740_991.0),
        _ => NAMESPACE_FUNCTIONS
            .iter()
            .find(|qualified| {
                qualified
                    .split_once('.')
                    .is_some_and(|(o, p)| o == owner && p == property)
            })
            .map_or(ScriptValue::Undefined, |name| ScriptValue::Builtin(*name)),
    }
}

fn arg(args: &[ScriptValue], index: usize) -> ScriptValue {
    args.get(index).cloned().unwrap_or(ScriptValue::Undefined)
}

fn number_arg(args: &[ScriptValue], index: usize) -> f64 {
    arg(args, index).to_number()
}

/// Integer argument with JavaScript `ToIntegerOrInfinity` rounding
fn integer_arg(args: &[ScriptValue], index: usize, default: i64) -> i64 {
    match args.get(index) {
        None | Some(ScriptValue::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            if n.is_nan() {
                0
            } else {
                n.trunc().clamp(i64::MIN as f64, i64::MAX as f64) as i64
            }
        }
    }
}

/// Resolve a possibly negative index against `len`
fn relative_index(index: i64, len: usize) -> usize {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    resolved.clamp(0, len) as usize
}

/// Call a global or namespace function
pub(crate) fn call_builtin(name: &str, args: &[ScriptValue], budget: &mut Budget) -> BuiltinResult {
    let value = match name {
        "String" => budget.alloc_string(match args.first() {
            None => String::new(),
            Some(v) => v.to_display(),
        })?,
        "Number" => ScriptValue::Number(args.first().map_or(0.0, ScriptValue::to_number)),
        "Boolean" => ScriptValue::Bool(arg(args, 0).truthy()),
        "parseInt" => ScriptValue::Number(parse_int(&arg(args, 0).to_display(), integer_arg(args, 1, 0))),
        "parseFloat" => ScriptValue::Number(parse_float(&arg(args, 0).to_display())),
        "isNaN" => ScriptValue::Bool(number_arg(args, 0).is_nan()),
        "isFinite" => ScriptValue::Bool(number_arg(args, 0).is_finite()),
        "Error" | "TypeError" => {
            let message = match args.first() {
                None | Some(ScriptValue::Undefined) => String::new(),
                Some(v) => v.to_display(),
            };
            budget.alloc_object(vec![
                ("name".to_string(), ScriptValue::string(name)),
                ("message".to_string(), ScriptValue::string(message)),
            ])?
        }
        "Math.abs" => ScriptValue::Number(number_arg(args, 0).abs()),
        "Math.floor" => ScriptValue::Number(number_arg(args, 0).floor()),
        "Math.ceil" => ScriptValue::Number(number_arg(args, 0).ceil()),
        // JavaScript rounds halves toward positive infinity
        "Math.round" => ScriptValue::Number((number_arg(args, 0) + 0.5).floor()),
        "Math.trunc" => ScriptValue::Number(number_arg(args, 0).trunc()),
        "Math.sign" => {
            let n = number_arg(args, 0);
            ScriptValue::Number(if n.is_nan() || n == 0.0 { n } else { n.signum() })
        }
        "Math.sqrt" => ScriptValue::Number(number_arg(args, 0).sqrt()),
        "Math.pow" => ScriptValue::Number(number_arg(args, 0).powf(number_arg(args, 1))),
        "Math.min" => ScriptValue::Number(fold_numbers(args, f64::INFINITY, f64::min)),
        "Math.max" => ScriptValue::Number(fold_numbers(args, f64::NEG_INFINITY, f64::max)),
        "JSON.stringify" => match arg(args, 0) {
            ScriptValue::Undefined => ScriptValue::Undefined,
            value => {
                let text = serde_json::to_string(&value.to_json()?)
                    .map_err(|e| SandboxError::type_error(e.to_string()))?;
                budget.alloc_string(text)?
            }
        },
        "JSON.parse" => {
            let text = arg(args, 0).to_display();
            let parsed: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| SandboxError::Thrown {
                    message: format!("SyntaxError: {}", e),
                })?;
            budget.import(&parsed)?
        }
        "Array.isArray" => ScriptValue::Bool(matches!(arg(args, 0), ScriptValue::Array(_))),
        "Object.keys" | "Object.values" | "Object.entries" => object_listing(name, &arg(args, 0), budget)?,
        "Number.isInteger" => ScriptValue::Bool(matches!(
            arg(args, 0),
            ScriptValue::Number(n) if n.is_finite() && n.fract() == 0.0
        )),
        "Number.isFinite" => ScriptValue::Bool(matches!(arg(args, 0), ScriptValue::Number(n) if n.is_finite())),
        "Number.isNaN" => ScriptValue::Bool(matches!(arg(args, 0), ScriptValue::Number(n) if n.is_nan())),
        other => {
            return Err(SandboxError::type_error(format!("{} is not a function", other)));
        }
    };
    Ok(value)
}

fn fold_numbers(args: &[ScriptValue], start: f64, pick: fn(f64, f64) -> f64) -> f64 {
    args.iter().map(ScriptValue::to_number).fold(start, |acc, n| {
        if acc.is_nan() || n.is_nan() {
            f64::NAN
        } else {
            pick(acc, n)
        }
    })
}

fn object_listing(name: &str, target: &ScriptValue, budget: &mut Budget) -> BuiltinResult {
    let items: Vec<ScriptValue> = match target {
        ScriptValue::Object(entries) => {
            let entries = entries.borrow();
            let mut items = Vec::with_capacity(entries.len());
            for (key, value) in entries.iter() {
                items.push(match name {
                    "Object.keys" => budget.alloc_string(key.clone())?,
                    "Object.values" => value.clone(),
                    _ => {
                        let key = budget.alloc_string(key.clone())?;
                        budget.alloc_array(vec![key, value.clone()])?
                    }
                });
            }
            items
        }
        ScriptValue::Array(items) => {
            let items = items.borrow();
            let mut listed = Vec::with_capacity(items.len());
            for (index, value) in items.iter().enumerate() {
                listed.push(match name {
                    "Object.keys" => budget.alloc_string(index.to_string())?,
                    "Object.values" => value.clone(),
                    _ => {
                        let key = budget.alloc_string(index.to_string())?;
                        budget.alloc_array(vec![key, value.clone()])?
                    }
                });
            }
            listed
        }
        ScriptValue::Undefined | ScriptValue::Null => {
            return Err(SandboxError::type_error(
                "cannot convert undefined or null to object",
            ));
        }
        _ => Vec::new(),
    };
    budget.alloc_array(items)
}

fn parse_int(text: &str, radix: i64) -> f64 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = match radix {
        0 | 16 if digits.starts_with("0x") || digits.starts_with("0X") => (16, &digits[2..]),
        0 => (10, digits),
        r @ 2..=36 => (r as u32, digits),
        _ => return f64::NAN,
    };
    let mut result: Option<f64> = None;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        result = Some(result.unwrap_or(0.0) * f64::from(radix) + f64::from(d));
    }
    match result {
        Some(n) if negative => -n,
        Some(n) => n,
        None => f64::NAN,
    }
}

/// Longest numeric prefix, as `parseFloat` reads it
fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    for literal in ["Infinity", "+Infinity", "-Infinity"] {
        if text.starts_with(literal) {
            return if literal.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
        }
    }
    let bytes = text.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if seen_digit && end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    text[..end].parse().unwrap_or(f64::NAN)
}

/// Non-method properties of primitives (`length`)
pub(crate) fn primitive_property(receiver: &ScriptValue, property: &str) -> Option<ScriptValue> {
    match (receiver, property) {
        (ScriptValue::Str(s), "length") => Some(ScriptValue::Number(s.encode_utf16().count() as f64)),
        (ScriptValue::Array(items), "length") => Some(ScriptValue::Number(items.borrow().len() as f64)),
        _ => None,
    }
}

/// Call a method on a string receiver
pub(crate) fn call_string_method(
    s: &str,
    method: &str,
    args: &[ScriptValue],
    budget: &mut Budget,
) -> BuiltinResult {
    let chars: Vec<char> = s.chars().collect();
    let text = |budget: &mut Budget, out: String| budget.alloc_string(out);
    match method {
        "toUpperCase" => text(budget, s.to_uppercase()),
        "toLowerCase" => text(budget, s.to_lowercase()),
        "trim" => text(budget, s.trim().to_string()),
        "trimStart" => text(budget, s.trim_start().to_string()),
        "trimEnd" => text(budget, s.trim_end().to_string()),
        "toString" | "valueOf" => text(budget, s.to_string()),
        "includes" => Ok(ScriptValue::Bool(s.contains(arg(args, 0).to_display().as_str()))),
        "startsWith" => Ok(ScriptValue::Bool(s.starts_with(arg(args, 0).to_display().as_str()))),
        "endsWith" => Ok(ScriptValue::Bool(s.ends_with(arg(args, 0).to_display().as_str()))),
        "indexOf" => {
            let needle = arg(args, 0).to_display();
            Ok(ScriptValue::Number(match s.find(needle.as_str()) {
                Some(byte) => s[..byte].chars().count() as f64,
                None => -1.0,
            }))
        }
        "charAt" => {
            let index = integer_arg(args, 0, 0);
            let out = usize::try_from(index)
                .ok()
                .and_then(|i| chars.get(i))
                .map(char::to_string)
                .unwrap_or_default();
            text(budget, out)
        }
        "slice" => {
            let start = relative_index(integer_arg(args, 0, 0), chars.len());
            let end = relative_index(integer_arg(args, 1, chars.len() as i64), chars.len());
            text(budget, chars.get(start..end.max(start)).unwrap_or_default().iter().collect())
        }
        "substring" => {
            let clamp = |i: i64| i.clamp(0, chars.len() as i64) as usize;
            let a = clamp(integer_arg(args, 0, 0));
            let b = clamp(integer_arg(args, 1, chars.len() as i64));
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            text(budget, chars[start..end].iter().collect())
        }
        "split" => {
            let parts: Vec<String> = match args.first() {
                None | Some(ScriptValue::Undefined) => vec![s.to_string()],
                Some(separator) => {
                    let separator = separator.to_display();
                    if separator.is_empty() {
                        chars.iter().map(char::to_string).collect()
                    } else {
                        s.split(separator.as_str()).map(str::to_string).collect()
                    }
                }
            };
            let limit = integer_arg(args, 1, i64::MAX).max(0) as usize;
            let mut items = Vec::new();
            for part in parts.into_iter().take(limit) {
                items.push(budget.alloc_string(part)?);
            }
            budget.alloc_array(items)
        }
        "replace" | "replaceAll" => {
            let pattern = arg(args, 0).to_display();
            let replacement = arg(args, 1).to_display();
            let out = if method == "replace" {
                s.replacen(pattern.as_str(), &replacement, 1)
            } else {
                s.replace(pattern.as_str(), &replacement)
            };
            budget.ensure(out.len())?;
            text(budget, out)
        }
        "padStart" | "padEnd" => {
            let target = integer_arg(args, 0, 0).max(0) as usize;
            let filler = match args.get(1) {
                None | Some(ScriptValue::Undefined) => " ".to_string(),
                Some(v) => v.to_display(),
            };
            if target <= chars.len() || filler.is_empty() {
                return text(budget, s.to_string());
            }
            budget.ensure(target.saturating_mul(4))?;
            let pad: String = filler.chars().cycle().take(target - chars.len()).collect();
            text(
                budget,
                if method == "padStart" { pad + s } else { s.to_string() + &pad },
            )
        }
        "repeat" => {
            let count = integer_arg(args, 0, 0);
            if count < 0 {
                return Err(SandboxError::type_error("invalid count value"));
            }
            budget.ensure(s.len().saturating_mul(count as usize))?;
            text(budget, s.repeat(count as usize))
        }
        "concat" => {
            let mut out = s.to_string();
            for value in args {
                out.push_str(&value.to_display());
            }
            budget.ensure(out.len())?;
            text(budget, out)
        }
        other => Err(SandboxError::type_error(format!(
            "value.{} is not a function",
            other
        ))),
    }
}

/// Call a first-order method on an array receiver
pub(crate) fn call_array_method(
    items: &ArrayRef,
    method: &str,
    args: &[ScriptValue],
    budget: &mut Budget,
) -> BuiltinResult {
    match method {
        "push" => {
            budget.charge(args.len() * SLOT_BYTES)?;
            let mut items = items.borrow_mut();
            items.extend(args.iter().cloned());
            Ok(ScriptValue::Number(items.len() as f64))
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(ScriptValue::Undefined)),
        "shift" => {
            let mut items = items.borrow_mut();
            Ok(if items.is_empty() {
                ScriptValue::Undefined
            } else {
                items.remove(0)
            })
        }
        "join" => {
            let separator = match args.first() {
                None | Some(ScriptValue::Undefined) => ",".to_string(),
                Some(v) => v.to_display(),
            };
            let parts: Vec<String> = items
                .borrow()
                .iter()
                .map(|item| match item {
                    ScriptValue::Undefined | ScriptValue::Null => String::new(),
                    other => other.to_display(),
                })
                .collect();
            let size = parts.iter().map(String::len).sum::<usize>()
                + separator.len() * parts.len().saturating_sub(1);
            budget.ensure(size)?;
            budget.alloc_string(parts.join(&separator))
        }
        "includes" => {
            let needle = arg(args, 0);
            Ok(ScriptValue::Bool(items.borrow().iter().any(|item| {
                item.strict_equals(&needle)
                    || matches!((item, &needle), (ScriptValue::Number(a), ScriptValue::Number(b)) if a.is_nan() && b.is_nan())
            })))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Ok(ScriptValue::Number(
                items
                    .borrow()
                    .iter()
                    .position(|item| item.strict_equals(&needle))
                    .map_or(-1.0, |i| i as f64),
            ))
        }
        "slice" => {
            let items = items.borrow();
            let start = relative_index(integer_arg(args, 0, 0), items.len());
            let end = relative_index(integer_arg(args, 1, items.len() as i64), items.len());
            let copied = items.get(start..end.max(start)).unwrap_or_default().to_vec();
            budget.alloc_array(copied)
        }
        "concat" => {
            let mut combined = items.borrow().clone();
            for value in args {
                match value {
                    ScriptValue::Array(other) => combined.extend(other.borrow().iter().cloned()),
                    other => combined.push(other.clone()),
                }
            }
            budget.alloc_array(combined)
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(ScriptValue::Array(items.clone()))
        }
        "toString" => budget.alloc_string(ScriptValue::Array(items.clone()).to_display()),
        other => Err(SandboxError::type_error(format!(
            "value.{} is not a function",
            other
        ))),
    }
}

/// Call a method on a number receiver
pub(crate) fn call_number_method(
    n: f64,
    method: &str,
    args: &[ScriptValue],
    budget: &mut Budget,
) -> BuiltinResult {
    match method {
        "toFixed" => {
            let digits = integer_arg(args, 0, 0);
            if !(0..=100).contains(&digits) {
                return Err(SandboxError::type_error("toFixed() digits argument must be between 0 and 100"));
            }
            let out = if n.is_finite() {
                format!("{:.*}", digits as usize, n)
            } else {
                number_to_string(n)
            };
            budget.alloc_string(out)
        }
        "toString" => {
            let radix = integer_arg(args, 0, 10);
            if radix == 10 {
                return budget.alloc_string(number_to_string(n));
            }
            if !(2..=36).contains(&radix) || n.fract() != 0.0 || !n.is_finite() {
                return Err(SandboxError::type_error("toString() radix must be between 2 and 36"));
            }
            budget.alloc_string(integer_to_radix(n as i64, radix as u32))
        }
        "valueOf" => Ok(ScriptValue::Number(n)),
        other => Err(SandboxError::type_error(format!(
            "value.{} is not a function",
            other
        ))),
    }
}

fn integer_to_radix(n: i64, radix: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    let mut rest = n.unsigned_abs();
    while rest > 0 {
        let d = (rest % u64::from(radix)) as u32;
        digits.push(char::from_digit(d, radix).unwrap_or('?'));
        rest /= u64::from(radix);
    }
    if n < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> Budget {
        Budget::new(1 << 20)
    }

    fn s(text: &str) -> ScriptValue {
        ScriptValue::string(text)
    }

    #[test]
    fn test_parse_int_and_float() {
        assert_eq!(parse_int("42px", 10), 42.0);
        assert_eq!(parse_int("  -0x1f", 0), -31.0);
        assert_eq!(parse_int("101", 2), 5.0);
        assert!(parse_int("abc", 10).is_nan());
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn test_string_methods() {
        let mut b = budget();
        let out = call_string_method("  Hello ", "trim", &[], &mut b).unwrap();
        assert_eq!(out.to_display(), "Hello");
        let out = call_string_method("a,b,c", "split", &[s(",")], &mut b).unwrap();
        assert_eq!(out.to_display(), "a,b,c");
        let out = call_string_method("5", "padStart", &[ScriptValue::Number(3.0), s("0")], &mut b).unwrap();
        assert_eq!(out.to_display(), "005");
        let out = call_string_method("héllo", "slice", &[ScriptValue::Number(-3.0)], &mut b).unwrap();
        assert_eq!(out.to_display(), "llo");
        assert!(call_string_method("x", "exec", &[], &mut b).is_err());
    }

    #[test]
    fn test_repeat_respects_budget() {
        let mut b = Budget::new(1024);
        let err = call_string_method("abc", "repeat", &[ScriptValue::Number(1e6)], &mut b).unwrap_err();
        assert_eq!(err, SandboxError::MemoryLimit { limit_bytes: 1024 });
    }

    #[test]
    fn test_math_and_number_methods() {
        let mut b = budget();
        let round = |n: f64, b: &mut Budget| call_builtin("Math.round", &[ScriptValue::Number(n)], b).unwrap().to_number();
        assert_eq!(round(2.5, &mut b), 3.0);
        assert_eq!(round(-2.5, &mut b), -2.0);
        let max = call_builtin("Math.max", &[ScriptValue::Number(1.0), s("7")], &mut b).unwrap();
        assert_eq!(max.to_number(), 7.0);
        let fixed = call_number_method(1.005, "toFixed", &[ScriptValue::Number(1.0)], &mut b).unwrap();
        assert_eq!(fixed.to_display(), "1.0");
        let hex = call_number_method(255.0, "toString", &[ScriptValue::Number(16.0)], &mut b).unwrap();
        assert_eq!(hex.to_display(), "ff");
    }

    #[test]
    fn test_globals_are_fixed() {
        assert!(global("Math").is_some());
        assert!(global("process").is_none());
        assert!(global("require").is_none());
        assert!(matches!(builtin_member("Math", "PI"), ScriptValue::Number(_)));
        assert!(matches!(builtin_member("Math", "random"), ScriptValue::Undefined));
    }
}
