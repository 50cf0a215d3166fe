//! Record normalization and template context assembly

use chrono::NaiveDate;

use crate::coerce::{self, JoinSeparator};
use crate::lookups::OrgLookups;
use crate::record::{
    format_day, NormalizedRecord, NormalizedValue, RawRecord, RawValue, TemplateContext,
};
use crate::schema::{CoercerKind, FieldSpec, FIELD_SCHEMA, PROCESS_TYPE_ATTRIBUTE};
use crate::status::StatusTable;

/// Context key for the requested report type.
pub const REPORT_TYPE_KEY: &str = "tipo_relatorio";
/// Context key for the resolved status label.
pub const STATUS_KEY: &str = "status_processo";
/// Context key for the generation date.
pub const TODAY_KEY: &str = "data_atual";

/// Applies the field schema to raw records.
///
/// Holds the lookup tables by value; build it once and share it.
#[derive(Debug, Clone)]
pub struct Normalizer {
    lookups: OrgLookups,
    separator: JoinSeparator,
    schema: &'static [FieldSpec],
}

impl Normalizer {
    pub fn new(lookups: OrgLookups, separator: JoinSeparator) -> Self {
        Self {
            lookups,
            separator,
            schema: FIELD_SCHEMA,
        }
    }

    /// Normalize one record. Every schema attribute is present in the result.
    pub fn normalize(&self, raw: &RawRecord) -> NormalizedRecord {
        let mut record = NormalizedRecord::default();
        for spec in self.schema {
            let value = self.coerce(spec.kind, raw.value(spec.source));
            record.set(spec.output, value);
        }
        record
    }

    fn coerce(&self, kind: CoercerKind, value: &RawValue) -> NormalizedValue {
        use NormalizedValue::{Int, Number, Text};

        match kind {
            CoercerKind::Raw => passthrough(value, self.separator),
            CoercerKind::Split => Text(coerce::split_composite(value, 1)),
            CoercerKind::FirstOfListName => Text(match value {
                RawValue::List(items) => items
                    .first()
                    .map(|first| {
                        coerce::format_person_name(&coerce::split_composite_str(first, 1))
                    })
                    .unwrap_or_default(),
                _ => String::new(),
            }),
            CoercerKind::Date => Text(coerce::format_date(value)),
            CoercerKind::Int => Int(coerce::coerce_int(value, 0)),
            CoercerKind::ListSplit => Text(coerce::join_list_split(value, self.separator)),
            CoercerKind::MultiSplitTrim => Text(coerce::multi_split_trim(value)),
            CoercerKind::AlternateSplit => Text(coerce::alternate_split(value)),
            CoercerKind::SplitJoinAll => Text(coerce::split_join_all(value)),
            CoercerKind::Currency => Text(coerce::format_currency(value)),
            CoercerKind::Number => Number(coerce::coerce_number(value, 0.0)),
            CoercerKind::PersonName => Text(coerce::format_person_name(
                &coerce::split_composite(value, 1),
            )),
            CoercerKind::Directorate => Text(self.lookups.directorate_of(value)),
            CoercerKind::Division => Text(self.lookups.division_of(value)),
        }
    }
}

/// Keep the value as it came, converted to the closest normalized type.
fn passthrough(value: &RawValue, separator: JoinSeparator) -> NormalizedValue {
    match value {
        RawValue::Null => NormalizedValue::default(),
        RawValue::Text(s) => NormalizedValue::Text(s.clone()),
        RawValue::List(items) => NormalizedValue::Text(items.join(separator.as_str())),
        RawValue::DateTime(_) => NormalizedValue::Text(coerce::format_date(value)),
        RawValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
            NormalizedValue::Int(*n as i64)
        }
        RawValue::Number(n) => NormalizedValue::Number(*n),
        RawValue::Bool(true) => NormalizedValue::Text("Sim".to_string()),
        RawValue::Bool(false) => NormalizedValue::Text("Não".to_string()),
    }
}

/// Build the placeholder context for one report.
///
/// The normalized attributes come first. When a report type is given, its
/// name and the status resolved from the record's process type are added.
/// `extra` entries (free-form report parameters) override attributes of the
/// same name, and `data_atual` is always set from `today`.
pub fn build_context<'a>(
    record: &NormalizedRecord,
    report_type: Option<&str>,
    statuses: &StatusTable,
    extra: impl IntoIterator<Item = (&'a str, String)>,
    today: NaiveDate,
) -> TemplateContext {
    let mut context: TemplateContext = record
        .iter()
        .map(|(key, value)| (key.to_string(), value.render()))
        .collect();

    if let Some(report_type) = report_type.filter(|r| !r.trim().is_empty()) {
        let status = statuses.resolve(report_type, &record.text(PROCESS_TYPE_ATTRIBUTE));
        context.insert(REPORT_TYPE_KEY.to_string(), report_type.to_string());
        context.insert(STATUS_KEY.to_string(), status);
    }

    for (key, value) in extra {
        context.insert(key.to_string(), value);
    }

    context.insert(TODAY_KEY.to_string(), format_day(today));
    context
}
