use crate::config::{ReportConfig, ServiceConfig};
use crate::prelude::{println, *};
use crate::source::RecordSource;
use colored::Colorize;
use relatorio_core::record::NormalizedRecord;

#[derive(Debug, clap::Args)]
#[command(about = "Print the normalized attributes of a record")]
pub struct App {
    /// Record ID in the source list
    record_id: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Only show attributes with a value
    #[arg(long)]
    non_empty: bool,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let config = ServiceConfig::resolve(&global)?;
    let report_config = ReportConfig::load(&config)?;
    let source = RecordSource::from_options(global.records_file.as_deref())?;

    let record = source
        .fetch_record(&report_config.list_name, &app.record_id)
        .await?;
    let normalized = report_config.normalizer.normalize(&record);

    if app.json {
        println!("{}", serde_json::to_string_pretty(&normalized)?);
        return Ok(());
    }

    if global.verbose {
        println!("Source record has {} field(s)", record.len());
    }

    println!(
        "\n{} {}\n",
        "Record".bold(),
        app.record_id.as_str().cyan()
    );
    rows(&normalized, app.non_empty)
        .into_iter()
        .fold(new_table(), |mut table, (key, value)| {
            table.add_row(prettytable::row![key.as_str().green(), value]);
            table
        })
        .printstd();
    Ok(())
}

/// Attribute rows in key order, optionally without empty values.
fn rows(record: &NormalizedRecord, non_empty: bool) -> Vec<(String, String)> {
    record
        .iter()
        .map(|(key, value)| (key.to_string(), value.render()))
        .filter(|(_, value)| !non_empty || !value.is_empty())
        .collect()
}
