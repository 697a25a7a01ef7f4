//! Built-in transform functions
//!
//! Every function here is pure and synchronous. `lookup` and `custom` need a
//! store or the sandbox and are dispatched by the pipeline instead.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::types::{
    json_type_name, parse_config, ConcatenateConfig, ConditionOperator, ConditionalConfig,
    ConstantConfig, FormatDateConfig, FormatNumberConfig, SplitConfig, TransformError,
    TransformKind,
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Run a synchronous built-in transform
pub fn apply_builtin(
    kind: TransformKind,
    input: &Value,
    config: &Value,
) -> Result<Value, TransformError> {
    match kind {
        TransformKind::Direct => Ok(input.clone()),
        TransformKind::FormatDate => format_date(input, &parse_config(kind, config)?),
        TransformKind::FormatNumber => format_number(input, &parse_config(kind, config)?),
        TransformKind::Split => split(input, &parse_config(kind, config)?),
        TransformKind::Concatenate => concatenate(input, &parse_config(kind, config)?),
        TransformKind::Conditional => Ok(conditional(input, &parse_config(kind, config)?)),
        TransformKind::Constant => {
            let config: ConstantConfig = parse_config(kind, config)?;
            Ok(config.value.unwrap_or(Value::Null))
        }
        TransformKind::Lookup | TransformKind::Custom => Err(TransformError::invalid_config(
            format!("{} needs an execution context", kind),
        )),
    }
}

/// Render a number the way JavaScript's `String(n)` does
///
/// Magnitudes below `1e-6` or from `1e21` up use exponent form with the
/// shortest round-trip mantissa (`1e-7`, `1.5e+21`); `-0` renders as `0`.
pub fn number_to_string(value: f64) -> String {
    let magnitude = value.abs();
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else if magnitude < 1e-6 || magnitude >= 1e21 {
        let text = format!("{:e}", value);
        match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => text,
        }
    } else {
        format!("{}", value)
    }
}

/// Text form of a value when joined into a string; `null` renders empty
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.to_string(),
            (_, Some(u)) => u.to_string(),
            _ => number_to_string(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

// ---------------------------------------------------------------------------
// format_date
// ---------------------------------------------------------------------------

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %B %Y", "%d %b %Y", "%B %d, %Y", "%b %d, %Y",
];

pub fn format_date(input: &Value, config: &FormatDateConfig) -> Result<Value, TransformError> {
    let parsed = match input {
        Value::Number(n) => n
            .as_f64()
            .filter(|ms| ms.is_finite())
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
            .map(|dt| dt.fixed_offset()),
        Value::String(text) => match config.from.as_deref() {
            Some(pattern) if pattern != "iso" => parse_with_pattern(text.trim(), pattern)?,
            _ => parse_free_form(text.trim()),
        },
        _ => None,
    };
    let parsed = parsed.ok_or_else(|| TransformError::UnparseableDate {
        value: display_string(input),
    })?;
    render_date(&parsed, &config.to).map(Value::String)
}

fn naive_to_fixed(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    naive.and_utc().fixed_offset()
}

fn parse_free_form(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt);
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive_to_fixed(naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(naive_to_fixed(date.and_time(NaiveTime::MIN)));
        }
    }
    None
}

fn parse_with_pattern(
    text: &str,
    pattern: &str,
) -> Result<Option<DateTime<FixedOffset>>, TransformError> {
    let format = translate_pattern(pattern)?;
    if let Ok(dt) = DateTime::parse_from_str(text, &format) {
        return Ok(Some(dt));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, &format) {
        return Ok(Some(naive_to_fixed(naive)));
    }
    Ok(NaiveDate::parse_from_str(text, &format)
        .ok()
        .map(|date| naive_to_fixed(date.and_time(NaiveTime::MIN))))
}

fn render_date(date: &DateTime<FixedOffset>, pattern: &str) -> Result<String, TransformError> {
    if pattern == "iso" {
        return Ok(date.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    let format = translate_pattern(pattern)?;
    let mut out = String::new();
    write!(out, "{}", date.format(&format))
        .map_err(|_| TransformError::invalid_config(format!("cannot render date pattern '{}'", pattern)))?;
    Ok(out)
}

/// strftime equivalent of one run of a pattern letter
fn token_spec(letter: char, run: usize) -> Option<&'static str> {
    let spec = match (letter, run) {
        ('y', 2) => "%y",
        ('y', _) => "%Y",
        ('M', 1) => "%-m",
        ('M', 2) => "%m",
        ('M', 3) => "%b",
        ('M', 4) => "%B",
        ('d', 1) => "%-d",
        ('d', 2) => "%d",
        ('E', 1..=3) => "%a",
        ('E', 4) => "%A",
        ('H', 1) => "%-H",
        ('H', 2) => "%H",
        ('h', 1) => "%-I",
        ('h', 2) => "%I",
        ('m', 1) => "%-M",
        ('m', 2) => "%M",
        ('s', 1) => "%-S",
        ('s', 2) => "%S",
        ('S', 3) => "%3f",
        ('a', 1..=3) => "%p",
        ('X' | 'x', 3) => "%:z",
        ('X' | 'x', 1..=2) => "%z",
        _ => return None,
    };
    Some(spec)
}

/// Translate a Unicode-style date pattern (`yyyy-MM-dd HH:mm`) to strftime
///
/// Quoted text is literal and `''` is a single quote. Unknown letters are a
/// configuration error rather than being copied through.
pub fn translate_pattern(pattern: &str) -> Result<String, TransformError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    let push_literal = |out: &mut String, c: char| {
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
    };

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        out.push('\'');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }
        if c.is_ascii_alphabetic() {
            let run = chars[i..].iter().take_while(|&&next| next == c).count();
            let spec = token_spec(c, run).ok_or_else(|| {
                TransformError::invalid_config(format!(
                    "unsupported date token '{}' in pattern '{}'",
                    c.to_string().repeat(run),
                    pattern
                ))
            })?;
            out.push_str(spec);
            i += run;
            continue;
        }
        push_literal(&mut out, c);
        i += 1;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// format_number
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolPlacement {
    Prefix,
    PrefixSpaced,
    Suffix,
}

/// Separators and currency placement for a locale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocaleStyle {
    group: &'static str,
    decimal: &'static str,
    placement: SymbolPlacement,
}

impl LocaleStyle {
    fn for_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_lowercase().replace('_', "-");
        let language = tag.split('-').next().unwrap_or("en");
        let style = |group, decimal, placement| LocaleStyle {
            group,
            decimal,
            placement,
        };
        if tag.ends_with("-ch") && matches!(language, "de" | "it" | "fr") {
            return style("\u{2019}", ".", SymbolPlacement::PrefixSpaced);
        }
        match language {
            "de" | "es" | "it" | "da" | "el" | "ro" | "hr" | "sl" => {
                style(".", ",", SymbolPlacement::Suffix)
            }
            "nl" | "pt" | "id" => style(".", ",", SymbolPlacement::PrefixSpaced),
            "tr" => style(".", ",", SymbolPlacement::Prefix),
            "fr" => style("\u{202F}", ",", SymbolPlacement::Suffix),
            "nb" | "no" | "sv" | "fi" | "cs" | "sk" | "pl" | "ru" | "uk" | "hu" | "bg" => {
                style("\u{A0}", ",", SymbolPlacement::Suffix)
            }
            _ => style(",", ".", SymbolPlacement::Prefix),
        }
    }
}

fn currency_symbol(code: &str) -> &str {
    match code {
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        "INR" => "₹",
        "KRW" => "₩",
        "CNY" => "CN¥",
        "BRL" => "R$",
        "CAD" => "CA$",
        "AUD" => "A$",
        other => other,
    }
}

fn currency_minor_units(code: &str) -> u32 {
    match code {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "UGX" | "PYG" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" | "IQD" | "LYD" => 3,
        _ => 2,
    }
}

/// Maximum fraction digits accepted, as in standard number formatting
const MAX_FRACTION_DIGITS: u32 = 20;

/// Numeric value of a number or a numeric string
pub fn coerce_number(input: &Value) -> Result<f64, TransformError> {
    let parsed = match input {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| n.is_finite())
        .ok_or_else(|| TransformError::NotNumeric {
            value: match input {
                Value::String(s) => s.clone(),
                other => format!("{} ({})", display_string(other), json_type_name(other)),
            },
        })
}

pub fn format_number(input: &Value, config: &FormatNumberConfig) -> Result<Value, TransformError> {
    let number = coerce_number(input)?;
    let style = LocaleStyle::for_tag(config.locale.as_deref().unwrap_or("en-US"));
    let currency = config.currency.as_deref().map(|c| c.trim().to_ascii_uppercase());

    let (default_min, default_max) = match currency.as_deref() {
        Some(code) => (currency_minor_units(code), currency_minor_units(code)),
        None => (0, 3),
    };
    let min = config.minimum_fraction_digits.unwrap_or(default_min);
    let max = config
        .maximum_fraction_digits
        .unwrap_or_else(|| default_max.max(min));
    if min > MAX_FRACTION_DIGITS || max > MAX_FRACTION_DIGITS {
        return Err(TransformError::invalid_config(format!(
            "fraction digits must be between 0 and {}",
            MAX_FRACTION_DIGITS
        )));
    }
    if max < min {
        return Err(TransformError::invalid_config(
            "maximumFractionDigits is smaller than minimumFractionDigits",
        ));
    }

    let digits = render_decimal(number.abs(), min, max, config.use_grouping.unwrap_or(true), &style);
    let negative = number < 0.0 && digits.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if negative { "-" } else { "" };

    let rendered = match currency.as_deref() {
        None => format!("{}{}", sign, digits),
        Some(code) => {
            let symbol = currency_symbol(code);
            let is_code = symbol.chars().all(|c| c.is_ascii_alphabetic());
            match style.placement {
                SymbolPlacement::Suffix => format!("{}{}\u{A0}{}", sign, digits, symbol),
                SymbolPlacement::PrefixSpaced => format!("{}{}\u{A0}{}", sign, symbol, digits),
                SymbolPlacement::Prefix if is_code => format!("{}{}\u{A0}{}", sign, symbol, digits),
                SymbolPlacement::Prefix => format!("{}{}{}", sign, symbol, digits),
            }
        }
    };
    Ok(Value::String(rendered))
}

fn render_decimal(value: f64, min: u32, max: u32, grouping: bool, style: &LocaleStyle) -> String {
    // Round half away from zero before rendering; values too large to scale
    // carry no fraction digits anyway
    let scale = 10f64.powi(max as i32);
    let rounded = if max <= 15 && (value * scale).is_finite() {
        (value * scale).round() / scale
    } else {
        value
    };
    let fixed = format!("{:.*}", max as usize, rounded);
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

    let mut fraction = fraction.to_string();
    while fraction.len() > min as usize && fraction.ends_with('0') {
        fraction.pop();
    }

    let integer = if grouping {
        group_digits(integer, style.group)
    } else {
        integer.to_string()
    };
    if fraction.is_empty() {
        integer
    } else {
        format!("{}{}{}", integer, style.decimal, fraction)
    }
}

fn group_digits(digits: &str, separator: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3 * separator.len());
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push_str(separator);
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// split / concatenate
// ---------------------------------------------------------------------------

fn safe_pattern_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| Regex::new(r"^\[[^\[\]]+\]$").expect("Valid regex pattern"))
}

/// Compile a split pattern, refusing anything but a single character class
pub fn compile_split_pattern(pattern: &str) -> Result<Regex, TransformError> {
    if !safe_pattern_shape().is_match(pattern) {
        return Err(TransformError::UnsafePattern {
            pattern: pattern.to_string(),
        });
    }
    Regex::new(pattern).map_err(|e| TransformError::invalid_config(format!("invalid split pattern: {}", e)))
}

pub fn split(input: &Value, config: &SplitConfig) -> Result<Value, TransformError> {
    let Value::String(text) = input else {
        return Err(TransformError::invalid_input(TransformKind::Split, "a string", input));
    };
    let parts: Vec<Value> = if config.use_regex {
        let pattern = compile_split_pattern(&config.delimiter)?;
        pattern.split(text).map(|p| Value::String(p.to_string())).collect()
    } else if config.delimiter.is_empty() {
        text.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        text.split(config.delimiter.as_str())
            .map(|p| Value::String(p.to_string()))
            .collect()
    };
    Ok(Value::Array(parts))
}

pub fn concatenate(input: &Value, config: &ConcatenateConfig) -> Result<Value, TransformError> {
    let Value::Array(items) = input else {
        return Err(TransformError::invalid_input(TransformKind::Concatenate, "an array", input));
    };
    let parts: Vec<String> = items
        .iter()
        .map(|item| {
            let text = display_string(item);
            if config.trim {
                text.trim().to_string()
            } else {
                text
            }
        })
        .collect();
    Ok(Value::String(parts.join(&config.separator)))
}

// ---------------------------------------------------------------------------
// conditional
// ---------------------------------------------------------------------------

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Equality that also matches a number against its numeric string
fn loose_equals(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (numeric_value(left), numeric_value(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => false,
    }
}

fn text_operand(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(display_string(value)),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (numeric_value(left), numeric_value(right)) {
        return a.partial_cmp(&b);
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Evaluate an operator; mismatched operand types simply do not match
pub fn evaluate_condition(operator: ConditionOperator, input: &Value, operand: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => loose_equals(input, operand),
        ConditionOperator::NotEquals => !loose_equals(input, operand),
        ConditionOperator::Contains => match input {
            Value::String(text) => text_operand(operand).is_some_and(|needle| text.contains(&needle)),
            Value::Array(items) => items.iter().any(|item| loose_equals(item, operand)),
            _ => false,
        },
        ConditionOperator::StartsWith => match (input, text_operand(operand)) {
            (Value::String(text), Some(prefix)) => text.starts_with(&prefix),
            _ => false,
        },
        ConditionOperator::EndsWith => match (input, text_operand(operand)) {
            (Value::String(text), Some(suffix)) => text.ends_with(&suffix),
            _ => false,
        },
        ConditionOperator::GreaterThan => compare(input, operand) == Some(Ordering::Greater),
        ConditionOperator::LessThan => compare(input, operand) == Some(Ordering::Less),
    }
}

pub fn conditional(input: &Value, config: &ConditionalConfig) -> Value {
    let operand = config.value.as_ref().unwrap_or(&Value::Null);
    let branch = if evaluate_condition(config.operator, input, operand) {
        &config.then_value
    } else {
        &config.else_value
    };
    branch.clone().unwrap_or(Value::Null)
}
