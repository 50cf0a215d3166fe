use crate::config::{ReportConfig, ServiceConfig};
use crate::prelude::{println, *};
use crate::report::{assemble, ReportInput};
use crate::source::RecordSource;
use chrono::Local;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use relatorio_core::job::{report_filename, ReportParams};
use relatorio_core::outline::OutlineNode;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, clap::Args)]
#[command(about = "Generate one report and write it to disk")]
pub struct App {
    /// Record ID in the source list
    record_id: String,

    /// Report parameters JSON (same shape as `report_params` in the API)
    #[arg(long)]
    params: Option<PathBuf>,

    /// Heading outline JSON: a list of {title, subtitles}
    #[arg(long)]
    outline: Option<PathBuf>,

    /// Report type, overriding the one in --params
    #[arg(long = "report-type")]
    report_type: Option<String>,

    /// Cover image
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Output file (defaults to a generated name in the reports directory)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Report parameters from the command line.
fn params(app: &App) -> Result<ReportParams> {
    let mut params: ReportParams = match &app.params {
        Some(path) => read_json(path)?,
        None => ReportParams::default(),
    };
    if let Some(path) = &app.outline {
        params.outline = Some(read_json::<Vec<OutlineNode>>(path)?);
        params.sections = None;
    }
    if let Some(report_type) = &app.report_type {
        params.tipo_relatorio = Some(report_type.clone());
    }
    Ok(params)
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let config = ServiceConfig::resolve(&global)?;
    let report_config = Arc::new(ReportConfig::load(&config)?);
    let params = params(&app)?;
    let source = RecordSource::from_options(global.records_file.as_deref())?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .map_err(|e| eyre!("Invalid spinner template: {e}"))?,
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    spinner.set_message(format!("Fetching record {}...", app.record_id));
    let record = source
        .fetch_record(&report_config.list_name, &app.record_id)
        .await;
    let record = match record {
        Ok(record) => record,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    spinner.set_message("Generating report...");
    let now = Local::now().naive_local();
    let input = ReportInput::prepare(&report_config, &record, &params, app.cover.clone(), now.date());
    let output = match &app.output {
        Some(output) => output.clone(),
        None => {
            std::fs::create_dir_all(&config.reports_dir)
                .with_context(|| format!("Failed to create {}", config.reports_dir.display()))?;
            config
                .reports_dir
                .join(report_filename(now, &uuid::Uuid::new_v4().to_string()))
        }
    };

    let result = tokio::task::spawn_blocking({
        let output = output.clone();
        let report_config = report_config.clone();
        move || assemble(&report_config, &input, &output)
    })
    .await;

    spinner.finish_and_clear();
    result.map_err(|e| eyre!("Report task failed: {e}"))??;

    println!(
        "{} {}",
        "Report written to".green().bold(),
        output.display()
    );
    Ok(())
}
