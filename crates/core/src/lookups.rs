//! Directorate and division code tables
//!
//! Both tables are flat JSON objects of code → display label, loaded once
//! at startup.

use std::collections::BTreeMap;

use crate::coerce::split_composite;
use crate::record::RawValue;
use crate::ConfigError;

/// Separator between the directorate and division codes of an org unit.
pub const ORG_UNIT_SEPARATOR: char = '/';

/// Code → label table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTable {
    entries: BTreeMap<String, String>,
}

impl CodeTable {
    /// Parse a `{"CODE": "Label", ...}` object; `table` names it in errors.
    pub fn from_json(table: &str, json: &str) -> Result<Self, ConfigError> {
        let entries: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidJson {
                table: table.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { entries })
    }

    /// Label for `code`, or `""` on a miss.
    pub fn label(&self, code: &str) -> String {
        self.entries.get(code.trim()).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CodeTable {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The two organizational lookup tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgLookups {
    pub directorate: CodeTable,
    pub division: CodeTable,
}

impl OrgLookups {
    pub fn new(directorate: CodeTable, division: CodeTable) -> Self {
        Self {
            directorate,
            division,
        }
    }

    pub fn from_json(directorate: &str, division: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            directorate: CodeTable::from_json("directorate", directorate)?,
            division: CodeTable::from_json("division", division)?,
        })
    }

    /// Resolve the directorate label of an org-unit value such as `"DFAM/DFAM2"`.
    pub fn directorate_of(&self, org_unit: &RawValue) -> String {
        let (code, _) = split_org_unit(org_unit);
        self.directorate.label(&code)
    }

    /// Resolve the division label of an org-unit value.
    pub fn division_of(&self, org_unit: &RawValue) -> String {
        match split_org_unit(org_unit) {
            (_, Some(code)) => self.division.label(&code),
            (_, None) => String::new(),
        }
    }
}

/// Split an org-unit value into its directorate and optional division code.
///
/// Composite values (`"4;#DFAM/DFAM2"`) are unwrapped first.
pub fn split_org_unit(value: &RawValue) -> (String, Option<String>) {
    let unit = split_composite(value, 1);
    match unit.split_once(ORG_UNIT_SEPARATOR) {
        Some((left, right)) => (left.trim().to_string(), Some(right.trim().to_string())),
        None => (unit.trim().to_string(), None),
    }
}
