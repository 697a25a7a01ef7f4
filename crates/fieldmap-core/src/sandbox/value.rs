//! Interpreter-owned values and the allocation budget
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::interpreter::Closure;
use super::SandboxError;
use crate::transformer::functions::number_to_string;
use serde_json::{Map, Number, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Bytes charged per value slot in arrays and objects
pub(crate) const SLOT_BYTES: usize = 16;

/// Deepest structure converted back to JSON before assuming a cycle
const MAX_OUTPUT_DEPTH: usize = 256;

pub(crate) type ArrayRef = Rc<RefCell<Vec<ScriptValue>>>;
pub(crate) type ObjectRef = Rc<RefCell<Vec<(String, ScriptValue)>>>;

#[derive(Debug, Clone)]
pub(crate) enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    /// Insertion-ordered properties
    Object(ObjectRef),
    /// Global function or namespace, by qualified name (`Math.max`)
    Builtin(&'static str),
    Closure(Rc<Closure>),
}

impl ScriptValue {
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        ScriptValue::Str(text.into())
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null | ScriptValue::Array(_) | ScriptValue::Object(_) => "object",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::Str(_) => "string",
            ScriptValue::Builtin(name) if !is_callable_builtin(name) => "object",
            ScriptValue::Builtin(_) | ScriptValue::Closure(_) => "function",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => false,
            ScriptValue::Bool(b) => *b,
            ScriptValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ScriptValue::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            ScriptValue::Undefined => f64::NAN,
            ScriptValue::Null => 0.0,
            ScriptValue::Bool(b) => f64::from(u8::from(*b)),
            ScriptValue::Number(n) => *n,
            ScriptValue::Str(s) => string_to_number(s),
            ScriptValue::Array(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion as performed by `+` and `String(...)`
    pub fn to_display(&self) -> String {
        self.display_at(0)
    }

    fn display_at(&self, depth: usize) -> String {
        match self {
            ScriptValue::Undefined => "undefined".to_string(),
            ScriptValue::Null => "null".to_string(),
            ScriptValue::Bool(b) => b.to_string(),
            ScriptValue::Number(n) => number_to_string(*n),
            ScriptValue::Str(s) => s.to_string(),
            ScriptValue::Array(_) if depth > MAX_OUTPUT_DEPTH => String::new(),
            ScriptValue::Array(items) => items
                .borrow()
                .iter()
                .map(|item| match item {
                    ScriptValue::Undefined | ScriptValue::Null => String::new(),
                    other => other.display_at(depth + 1),
                })
                .collect::<Vec<_>>()
                .join(","),
            ScriptValue::Object(_) => "[object Object]".to_string(),
            ScriptValue::Builtin(name) => format!("function {}() {{ [native code] }}", name),
            ScriptValue::Closure(_) => "(arrow function)".to_string(),
        }
    }

    pub fn strict_equals(&self, other: &ScriptValue) -> bool {
        match (self, other) {
            (ScriptValue::Undefined, ScriptValue::Undefined) => true,
            (ScriptValue::Null, ScriptValue::Null) => true,
            (ScriptValue::Bool(a), ScriptValue::Bool(b)) => a == b,
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            (ScriptValue::Str(a), ScriptValue::Str(b)) => a == b,
            (ScriptValue::Array(a), ScriptValue::Array(b)) => Rc::ptr_eq(a, b),
            (ScriptValue::Object(a), ScriptValue::Object(b)) => Rc::ptr_eq(a, b),
            (ScriptValue::Builtin(a), ScriptValue::Builtin(b)) => a == b,
            (ScriptValue::Closure(a), ScriptValue::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &ScriptValue) -> bool {
        use ScriptValue::*;
        match (self, other) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(_), Str(_)) | (Str(_), Number(_)) | (Bool(_), _) | (_, Bool(_)) => {
                self.to_number() == other.to_number()
            }
            (Array(_) | Object(_), Str(_) | Number(_)) => {
                ScriptValue::string(self.to_display()).loose_equals(other)
            }
            (Str(_) | Number(_), Array(_) | Object(_)) => {
                self.loose_equals(&ScriptValue::string(other.to_display()))
            }
            _ => self.strict_equals(other),
        }
    }

    /// Convert to JSON; `undefined` and non-finite numbers become `null`
    pub fn to_json(&self) -> Result<Value, SandboxError> {
        self.json_at(0)
    }

    fn json_at(&self, depth: usize) -> Result<Value, SandboxError> {
        if depth > MAX_OUTPUT_DEPTH {
            return Err(SandboxError::type_error(
                "cannot convert circular structure to JSON",
            ));
        }
        Ok(match self {
            ScriptValue::Undefined | ScriptValue::Null => Value::Null,
            ScriptValue::Bool(b) => Value::Bool(*b),
            ScriptValue::Number(n) => number_to_json(*n),
            ScriptValue::Str(s) => Value::String(s.to_string()),
            ScriptValue::Array(items) => Value::Array(
                items
                    .borrow()
                    .iter()
                    .map(|item| match item {
                        ScriptValue::Builtin(_) | ScriptValue::Closure(_) => Ok(Value::Null),
                        other => other.json_at(depth + 1),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            ScriptValue::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries.borrow().iter() {
                    // functions and undefined are dropped like JSON.stringify does
                    if matches!(
                        value,
                        ScriptValue::Undefined | ScriptValue::Builtin(_) | ScriptValue::Closure(_)
                    ) {
                        continue;
                    }
                    map.insert(key.clone(), value.json_at(depth + 1)?);
                }
                Value::Object(map)
            }
            ScriptValue::Builtin(_) | ScriptValue::Closure(_) => Value::Null,
        })
    }
}

/// Globals that are plain namespaces rather than functions
fn is_callable_builtin(name: &str) -> bool {
    !matches!(name, "Math" | "JSON" | "Array" | "Object")
}

/// JavaScript `Number(string)`: whitespace-trimmed, empty is zero
pub(crate) fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Property key for a numeric literal in an object literal
pub(crate) fn number_to_key(n: f64) -> String {
    number_to_string(n)
}

fn number_to_json(n: f64) -> Value {
    if !n.is_finite() {
        Value::Null
    } else if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Cumulative allocation accounting for one execution
#[derive(Debug)]
pub(crate) struct Budget {
    used: usize,
    limit: usize,
}

impl Budget {
    pub fn new(limit: usize) -> Self {
        Self { used: 0, limit }
    }

    pub fn charge(&mut self, bytes: usize) -> Result<(), SandboxError> {
        self.used = self.used.saturating_add(bytes);
        if self.used > self.limit {
            return Err(SandboxError::MemoryLimit {
                limit_bytes: self.limit,
            });
        }
        Ok(())
    }

    /// Fail before building a value of `bytes` that would not fit
    pub fn ensure(&self, bytes: usize) -> Result<(), SandboxError> {
        if self.used.saturating_add(bytes) > self.limit {
            return Err(SandboxError::MemoryLimit {
                limit_bytes: self.limit,
            });
        }
        Ok(())
    }

    pub fn alloc_string(&mut self, text: String) -> Result<ScriptValue, SandboxError> {
        self.charge(text.len() + SLOT_BYTES)?;
        Ok(ScriptValue::string(text))
    }

    pub fn alloc_array(&mut self, items: Vec<ScriptValue>) -> Result<ScriptValue, SandboxError> {
        self.charge((items.len() + 1) * SLOT_BYTES)?;
        Ok(ScriptValue::Array(Rc::new(RefCell::new(items))))
    }

    pub fn alloc_object(
        &mut self,
        entries: Vec<(String, ScriptValue)>,
    ) -> Result<ScriptValue, SandboxError> {
        let keys: usize = entries.iter().map(|(k, _)| k.len()).sum();
        self.charge(keys + (entries.len() + 1) * 2 * SLOT_BYTES)?;
        Ok(ScriptValue::Object(Rc::new(RefCell::new(entries))))
    }

    /// Deep-copy a JSON value into the sandbox heap
    pub fn import(&mut self, value: &Value) -> Result<ScriptValue, SandboxError> {
        Ok(match value {
            Value::Null => ScriptValue::Null,
            Value::Bool(b) => ScriptValue::Bool(*b),
            Value::Number(n) => ScriptValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => self.alloc_string(s.clone())?,
            Value::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.import(item))
                    .collect::<Result<Vec<_>, _>>()?;
                self.alloc_array(items)?
            }
            Value::Object(map) => {
                let entries = map
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.import(v)?)))
                    .collect::<Result<Vec<_>, SandboxError>>()?;
                self.alloc_object(entries)?
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversions() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert!(string_to_number("12px").is_nan());
        assert_eq!(ScriptValue::Number(1.5).to_display(), "1.5");
        assert_eq!(ScriptValue::Number(-0.0).to_display(), "0");
        assert!(!ScriptValue::string("").truthy());
        assert!(ScriptValue::string("0").truthy());
    }

    #[test]
    fn test_loose_equality() {
        assert!(ScriptValue::Null.loose_equals(&ScriptValue::Undefined));
        assert!(ScriptValue::Number(1.0).loose_equals(&ScriptValue::string("1")));
        assert!(ScriptValue::Bool(true).loose_equals(&ScriptValue::Number(1.0)));
        assert!(!ScriptValue::Null.loose_equals(&ScriptValue::Number(0.0)));
        assert!(!ScriptValue::Number(f64::NAN).strict_equals(&ScriptValue::Number(f64::NAN)));
    }

    #[test]
    fn test_import_export_preserves_shape() {
        let mut budget = Budget::new(1 << 20);
        let input = json!({"a": [1, 2.5, "x", null], "b": {"c": true}});
        let value = budget.import(&input).unwrap();
        assert_eq!(value.to_json().unwrap(), input);
    }

    #[test]
    fn test_budget_rejects_oversized_import() {
        let mut budget = Budget::new(64);
        let err = budget.import(&json!("x".repeat(100))).unwrap_err();
        assert_eq!(err, SandboxError::MemoryLimit { limit_bytes: 64 });
    }

    #[test]
    fn test_cycle_is_a_type_error() {
        let mut budget = Budget::new(1 << 20);
        let array = budget.alloc_array(Vec::new()).unwrap();
        if let ScriptValue::Array(items) = &array {
            items.borrow_mut().push(array.clone());
        }
        assert!(matches!(array.to_json(), Err(SandboxError::Type { .. })));
    }
}
