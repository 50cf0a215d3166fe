//! Field coercers
//!
//! Every function here is total: malformed or absent input degrades to the
//! documented default instead of failing.

use serde::{Deserialize, Serialize};

use crate::record::{RawValue, COMPOSITE_SEPARATOR};

/// Words that stay lower-case inside a person's name (unless first).
pub const NAME_PARTICLES: &[&str] = &[
    "a", "o", "as", "os", "de", "da", "do", "das", "dos", "em", "na", "no", "nas", "nos", "por",
    "para", "com", "e",
];

/// Separator used when a list field is flattened into one string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinSeparator {
    #[default]
    Comma,
    Newline,
}

impl JoinSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinSeparator::Comma => ", ",
            JoinSeparator::Newline => "\n",
        }
    }
}

/// Split a composite string and return the segment at `index`.
///
/// Falls back to the whole string when `index` is out of range, and to an
/// empty string when the input is empty.
pub fn split_composite_str(value: &str, index: usize) -> String {
    if value.is_empty() {
        return String::new();
    }
    value
        .split(COMPOSITE_SEPARATOR)
        .nth(index)
        .unwrap_or(value)
        .to_string()
}

/// [`split_composite_str`] over a raw value.
///
/// A list yields the value part of each element (see [`join_list_values`]);
/// other non-text values yield `""`.
pub fn split_composite(value: &RawValue, index: usize) -> String {
    match value {
        RawValue::Text(text) => split_composite_str(text, index),
        RawValue::List(items) => join_list_values(items),
        _ => String::new(),
    }
}

/// Join the value part of each list element with `", "`.
///
/// Elements in `id;#value` form contribute their value; plain elements are
/// taken as they are. Empty values are skipped.
pub fn join_list_values(items: &[String]) -> String {
    items
        .iter()
        .map(|item| {
            if item.contains(COMPOSITE_SEPARATOR) {
                split_composite_str(item, 1)
            } else {
                item.clone()
            }
        })
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a date/time value as `dd/mm/yyyy`; anything else yields `""`.
pub fn format_date(value: &RawValue) -> String {
    match value {
        RawValue::DateTime(dt) => dt.format("%d/%m/%Y").to_string(),
        _ => String::new(),
    }
}

/// Coerce to an integer, truncating any fractional part.
///
/// Text goes through [`split_composite_str`] (index 1) first, so `"2;#5.0"`
/// becomes `5`. Anything unparseable returns `default`.
pub fn coerce_int(value: &RawValue, default: i64) -> i64 {
    let number = match value {
        RawValue::Number(n) => Some(*n),
        RawValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        RawValue::Text(text) => split_composite_str(text, 1).trim().parse::<f64>().ok(),
        RawValue::Null | RawValue::List(_) | RawValue::DateTime(_) => None,
    };
    match number {
        Some(n) if n.is_finite() && n.abs() < i64::MAX as f64 => n.trunc() as i64,
        _ => default,
    }
}

/// Coerce to a float; text is split like [`coerce_int`].
pub fn coerce_number(value: &RawValue, default: f64) -> f64 {
    let number = match value {
        RawValue::Number(n) => Some(*n),
        RawValue::Text(text) => split_composite_str(text, 1).trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite()).unwrap_or(default)
}

/// Flatten a list field, taking segment 1 of every element.
///
/// Plain strings pass through unchanged; empty input yields `""`.
pub fn join_list_split(value: &RawValue, separator: JoinSeparator) -> String {
    match value {
        RawValue::List(items) => items
            .iter()
            .map(|item| split_composite_str(item, 1))
            .collect::<Vec<_>>()
            .join(separator.as_str()),
        RawValue::Text(text) => text.clone(),
        RawValue::Null => String::new(),
        other => other.to_plain_string(),
    }
}

/// Drop the leading and trailing encoding segments of a multi-value string.
///
/// `";#x;#y;#"` becomes `"x, y"`; a string with no separator is returned as-is.
pub fn multi_split_trim(value: &RawValue) -> String {
    let text = match value {
        RawValue::Text(text) => text,
        RawValue::List(items) => return join_list_values(items),
        _ => return String::new(),
    };
    let parts: Vec<&str> = text.split(COMPOSITE_SEPARATOR).collect();
    if parts.len() <= 1 {
        return text.to_string();
    }
    join_non_empty(&parts[1..parts.len() - 1])
}

/// Keep the odd-indexed segments (`"id;#value;#id;#value"` → `"value, value"`).
pub fn alternate_split(value: &RawValue) -> String {
    let text = match value {
        RawValue::Text(text) => text,
        RawValue::List(items) => return join_list_values(items),
        _ => return String::new(),
    };
    let values: Vec<&str> = text
        .split(COMPOSITE_SEPARATOR)
        .skip(1)
        .step_by(2)
        .collect();
    join_non_empty(&values)
}

/// Split on the separator and join every non-empty segment.
pub fn split_join_all(value: &RawValue) -> String {
    let text = match value {
        RawValue::Text(text) => text,
        RawValue::List(items) => return join_list_values(items),
        _ => return String::new(),
    };
    let parts: Vec<&str> = text.split(COMPOSITE_SEPARATOR).collect();
    join_non_empty(&parts)
}

fn join_non_empty(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render an amount as Brazilian Real (`R$ 1.234,56`).
///
/// Empty or unparseable input is treated as zero. The space after the symbol
/// is a non-breaking space, as in the pt-BR locale data.
pub fn format_currency(value: &RawValue) -> String {
    format_brl(coerce_number(value, 0.0))
}

/// Format a number as pt-BR currency.
pub fn format_brl(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (integer, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let digits: Vec<char> = integer.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}R$\u{a0}{grouped},{cents}")
}

/// Title-case a person's name, keeping Portuguese particles lower-case.
///
/// Accents are kept. The first word is always capitalized.
pub fn format_person_name(value: &str) -> String {
    value
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && NAME_PARTICLES.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(&lower)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
