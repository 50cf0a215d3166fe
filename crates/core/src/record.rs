//! Raw source records and the normalized attribute map

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Token the list source uses to pack several logical values into one string
/// (`"12;#Town A"`, `";#x;#y;#"`).
pub const COMPOSITE_SEPARATOR: &str = ";#";

/// One raw field value as delivered by the list source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    List(Vec<String>),
    DateTime(NaiveDateTime),
    Number(f64),
    Bool(bool),
}

impl RawValue {
    /// Text content, if this is a non-empty text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Whether the value counts as "absent" for coercion purposes.
    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(s) => s.is_empty(),
            RawValue::List(items) => items.is_empty(),
            RawValue::DateTime(_) | RawValue::Number(_) | RawValue::Bool(_) => false,
        }
    }

    /// Plain string rendering used when comparing values for equality filters.
    pub fn to_plain_string(&self) -> String {
        match self {
            RawValue::Null => String::new(),
            RawValue::Text(s) => s.clone(),
            RawValue::List(items) => items.join(", "),
            RawValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            RawValue::Number(n) if n.is_finite() && n.fract() == 0.0 => format!("{n:.0}"),
            RawValue::Number(n) => n.to_string(),
            RawValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(value: NaiveDateTime) -> Self {
        RawValue::DateTime(value)
    }
}

impl From<Vec<&str>> for RawValue {
    fn from(value: Vec<&str>) -> Self {
        RawValue::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<serde_json::Value> for RawValue {
    /// Convert a JSON value from the list source.
    ///
    /// Strings that are complete ISO-8601 timestamps become [`RawValue::DateTime`];
    /// arrays keep their scalar elements as strings; objects collapse to `Null`
    /// since no field in the schema is an object.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Bool(b) => RawValue::Bool(b),
            serde_json::Value::Number(n) => {
                n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Null)
            }
            serde_json::Value::String(s) => match parse_timestamp(&s) {
                Some(dt) => RawValue::DateTime(dt),
                None => RawValue::Text(s),
            },
            serde_json::Value::Array(items) => RawValue::List(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        serde_json::Value::Bool(b) => Some(b.to_string()),
                        _ => None,
                    })
                    .collect(),
            ),
            serde_json::Value::Object(_) => RawValue::Null,
        }
    }
}

/// Parse full timestamps only; bare dates and free text stay text.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// A raw record: source field label → raw value.
///
/// Labels are free text defined by the source (`"Unidades Fiscalizadas"`,
/// `"Proposta de benefícios potenciais "` with its trailing space).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<RawValue>) {
        self.fields.insert(label.into(), value.into());
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with(mut self, label: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(label, value);
        self
    }

    pub fn get(&self, label: &str) -> Option<&RawValue> {
        self.fields.get(label)
    }

    /// The value for `label`, or [`RawValue::Null`] when the label is absent.
    pub fn value(&self, label: &str) -> &RawValue {
        static NULL: RawValue = RawValue::Null;
        self.fields.get(label).unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a record from a JSON object; non-object input yields an empty record.
    pub fn from_json(value: serde_json::Value) -> Self {
        let mut record = RawRecord::new();
        if let serde_json::Value::Object(map) = value {
            for (label, value) in map {
                record.insert(label, RawValue::from(value));
            }
        }
        record
    }
}

impl FromIterator<(String, RawValue)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (String, RawValue)>>(iter: T) -> Self {
        RawRecord {
            fields: iter.into_iter().collect(),
        }
    }
}

/// One normalized output value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    Int(i64),
    Number(f64),
    Text(String),
}

impl NormalizedValue {
    /// Render the value the way it appears in the document.
    pub fn render(&self) -> String {
        match self {
            NormalizedValue::Int(n) => n.to_string(),
            NormalizedValue::Number(n) => format_number(*n),
            NormalizedValue::Text(s) => s.clone(),
        }
    }
}

impl Default for NormalizedValue {
    fn default() -> Self {
        NormalizedValue::Text(String::new())
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.1}")
    } else {
        n.to_string()
    }
}

/// The normalized attribute map for one record.
///
/// Every attribute declared in [`crate::schema::OUTPUT_ATTRIBUTES`] is present
/// once built by [`crate::normalize::Normalizer::normalize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedRecord {
    attributes: BTreeMap<String, NormalizedValue>,
}

impl NormalizedRecord {
    pub(crate) fn set(&mut self, key: &str, value: NormalizedValue) {
        self.attributes.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&NormalizedValue> {
        self.attributes.get(key)
    }

    /// Rendered text for `key`, empty when the key is unknown.
    pub fn text(&self, key: &str) -> String {
        self.attributes
            .get(key)
            .map(NormalizedValue::render)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NormalizedValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Placeholder name → rendered text, the input of template substitution.
pub type TemplateContext = BTreeMap<String, String>;

/// Today's date in the `dd/mm/yyyy` form used across the document.
pub fn format_day(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
