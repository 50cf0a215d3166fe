use crate::prelude::{eprintln, println, *};
use colored::Colorize;
use relatorio_core::status::StatusTable;

#[derive(Debug, clap::Args)]
#[command(about = "Resolve the status label for a report type and process type")]
pub struct App {
    /// Report type (e.g. "Recurso")
    report_type: String,

    /// Process type as found in the record (e.g. "TOMADA DE CONTAS ESPECIAL")
    process_type: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let config = crate::config::ServiceConfig::resolve(&global)?;
    let text = std::fs::read_to_string(&config.status_table).with_context(|| {
        format!("Failed to read status table {}", config.status_table.display())
    })?;
    let table = StatusTable::from_json(&text)?;

    let label = table.resolve(&app.report_type, &app.process_type);

    if app.json {
        let output = serde_json::json!({
            "report_type": app.report_type,
            "process_type": app.process_type,
            "status": label,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if label.is_empty() {
        let known: Vec<&str> = table.report_types().collect();
        eprintln!(
            "{} '{}' (known: {})",
            "Unknown report type".yellow(),
            app.report_type,
            known.join(", ")
        );
        return Ok(());
    }

    println!("{}", label.as_str().green().bold());
    Ok(())
}
