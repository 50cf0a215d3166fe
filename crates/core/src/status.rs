//! Status resolution
//!
//! The status table maps a report type to an ordered list of process-type
//! fragments, each with a status label, closed by a `"default"` entry:
//!
//! ```json
//! {
//!   "recurso": {
//!     "tomada de contas": "Em análise de recurso",
//!     "default": "Recurso"
//!   }
//! }
//! ```
//!
//! Resolution is first-match in declaration order. Fragments may be
//! substrings of one another, so the order in the file is significant.

use crate::ConfigError;

/// Reserved closing key of every sub-table.
pub const DEFAULT_KEY: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
struct StatusRules {
    /// (lowercased fragment, label) in declaration order, `"default"` excluded.
    fragments: Vec<(String, String)>,
    default: String,
}

/// Report type → ordered fragment rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTable {
    rules: Vec<(String, StatusRules)>,
}

impl StatusTable {
    /// Parse the table, keeping declaration order.
    ///
    /// Every sub-table must be an object of string labels whose last key is
    /// `"default"`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let invalid = |e: serde_json::Error| ConfigError::InvalidJson {
            table: "status".to_string(),
            message: e.to_string(),
        };
        let root: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json).map_err(invalid)?;

        let mut rules = Vec::with_capacity(root.len());
        for (report_type, entries) in root {
            let serde_json::Value::Object(entries) = entries else {
                return Err(ConfigError::InvalidStatusEntry(report_type));
            };

            let mut pairs = Vec::with_capacity(entries.len());
            for (fragment, label) in entries {
                let serde_json::Value::String(label) = label else {
                    return Err(ConfigError::InvalidStatusEntry(report_type));
                };
                pairs.push((fragment.to_lowercase(), label));
            }

            let default = match pairs.pop() {
                Some((key, label)) if key == DEFAULT_KEY => label,
                _ => return Err(ConfigError::MissingDefault(report_type)),
            };

            rules.push((
                report_type.to_lowercase(),
                StatusRules {
                    fragments: pairs,
                    default,
                },
            ));
        }

        Ok(Self { rules })
    }

    /// Resolve the status label for a report type and process type.
    ///
    /// Unknown report types resolve to `""`; a known report type with no
    /// matching fragment resolves to its `"default"` label.
    pub fn resolve(&self, report_type: &str, process_type: &str) -> String {
        let report_type = report_type.to_lowercase();
        let process_type = process_type.to_lowercase();

        let Some((_, rules)) = self.rules.iter().find(|(name, _)| *name == report_type) else {
            return String::new();
        };

        rules
            .fragments
            .iter()
            .find(|(fragment, _)| process_type.contains(fragment.as_str()))
            .map(|(_, label)| label.clone())
            .unwrap_or_else(|| rules.default.clone())
    }

    /// Known report types, in declaration order.
    pub fn report_types(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
