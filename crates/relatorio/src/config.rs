//! Service configuration.
//!
//! Values come from three layers: built-in defaults, an optional TOML file
//! and command-line/environment overrides, each overriding the previous one.
//! The JSON lookup tables are read once into a [`ReportConfig`].

use crate::prelude::*;
use docx::CoverStrategy;
use relatorio_core::coerce::JoinSeparator;
use relatorio_core::lookups::OrgLookups;
use relatorio_core::normalize::Normalizer;
use relatorio_core::schema::{validate_schema, FIELD_SCHEMA, OUTPUT_ATTRIBUTES};
use relatorio_core::status::StatusTable;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Paragraph text the heading outline replaces.
pub const DEFAULT_OUTLINE_MARKER: &str = "[[ESTRUTURA_RELATORIO]]";

/// How the cover image is applied.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CoverMode {
    /// Insert a new zero-margin first page holding the image
    #[default]
    FullPage,
    /// Overwrite an image resource the template already embeds
    ReplaceResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub template: PathBuf,
    pub directorate_table: PathBuf,
    pub division_table: PathBuf,
    pub status_table: PathBuf,
    pub cover_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub status_dir: PathBuf,
    pub workers: usize,
    pub report_expiration_minutes: u64,
    pub cleanup_interval_seconds: u64,
    pub cover_strategy: CoverMode,
    pub cover_resource: String,
    pub outline_marker: String,
    pub heading_style_prefix: String,
    pub list_name: String,
    pub join_separator: JoinSeparator,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("templates/relatorio_padrao.docx"),
            directorate_table: PathBuf::from("config/diretorias.json"),
            division_table: PathBuf::from("config/divisoes.json"),
            status_table: PathBuf::from("config/status.json"),
            cover_dir: PathBuf::from("static/capas"),
            reports_dir: PathBuf::from("reports"),
            status_dir: PathBuf::from("reports/pending"),
            workers: 5,
            report_expiration_minutes: 30,
            cleanup_interval_seconds: 300,
            cover_strategy: CoverMode::FullPage,
            cover_resource: "word/media/image1.png".to_string(),
            outline_marker: DEFAULT_OUTLINE_MARKER.to_string(),
            heading_style_prefix: "Heading".to_string(),
            list_name: "Cadastro de Ação de Controle".to_string(),
            join_separator: JoinSeparator::Comma,
        }
    }
}

/// Command-line and environment overrides of [`ServiceConfig`].
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// Report template (.docx)
    #[clap(long, env = "RELATORIO_TEMPLATE", global = true)]
    pub template: Option<PathBuf>,

    /// Directorate code → label JSON table
    #[clap(long, env = "RELATORIO_DIRECTORATE_TABLE", global = true)]
    pub directorate_table: Option<PathBuf>,

    /// Division code → label JSON table
    #[clap(long, env = "RELATORIO_DIVISION_TABLE", global = true)]
    pub division_table: Option<PathBuf>,

    /// Report type → process type → status JSON table
    #[clap(long, env = "RELATORIO_STATUS_TABLE", global = true)]
    pub status_table: Option<PathBuf>,

    /// Directory cover image references are resolved against
    #[clap(long, env = "RELATORIO_COVER_DIR", global = true)]
    pub cover_dir: Option<PathBuf>,

    /// Directory generated reports are written to
    #[clap(long, env = "RELATORIO_REPORTS_DIR", global = true)]
    pub reports_dir: Option<PathBuf>,

    /// Directory job status files are written to
    #[clap(long, env = "RELATORIO_STATUS_DIR", global = true)]
    pub status_dir: Option<PathBuf>,

    /// Cover image strategy
    #[clap(long, env = "RELATORIO_COVER_STRATEGY", global = true, value_enum)]
    pub cover_strategy: Option<CoverMode>,

    /// Package part replaced by the replace-resource strategy
    #[clap(long, env = "RELATORIO_COVER_RESOURCE", global = true)]
    pub cover_resource: Option<String>,

    /// Paragraph text replaced by the heading outline
    #[clap(long, env = "RELATORIO_OUTLINE_MARKER", global = true)]
    pub outline_marker: Option<String>,

    /// Heading style id prefix; the level is appended (Heading1, Heading2, ...)
    #[clap(long, env = "RELATORIO_HEADING_STYLE_PREFIX", global = true)]
    pub heading_style_prefix: Option<String>,

    /// SharePoint list holding the records
    #[clap(long, env = "RELATORIO_LIST_NAME", global = true)]
    pub list_name: Option<String>,

    /// Separator for flattened list fields (comma or newline)
    #[clap(long, env = "RELATORIO_JOIN_SEPARATOR", global = true, value_parser = parse_separator)]
    pub join_separator: Option<JoinSeparator>,
}

fn parse_separator(value: &str) -> std::result::Result<JoinSeparator, String> {
    match value.trim().to_lowercase().as_str() {
        "comma" => Ok(JoinSeparator::Comma),
        "newline" => Ok(JoinSeparator::Newline),
        other => Err(format!("expected 'comma' or 'newline', got '{other}'")),
    }
}

impl ServiceConfig {
    /// Read a TOML file; `None` yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| eyre!("{e}"))
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut self.template, &overrides.template);
        set(&mut self.directorate_table, &overrides.directorate_table);
        set(&mut self.division_table, &overrides.division_table);
        set(&mut self.status_table, &overrides.status_table);
        set(&mut self.cover_dir, &overrides.cover_dir);
        set(&mut self.reports_dir, &overrides.reports_dir);
        set(&mut self.status_dir, &overrides.status_dir);
        set(&mut self.cover_strategy, &overrides.cover_strategy);
        set(&mut self.cover_resource, &overrides.cover_resource);
        set(&mut self.outline_marker, &overrides.outline_marker);
        set(&mut self.heading_style_prefix, &overrides.heading_style_prefix);
        set(&mut self.list_name, &overrides.list_name);
        set(&mut self.join_separator, &overrides.join_separator);
        self
    }

    /// Defaults, then the file named by `global`, then its overrides.
    pub fn resolve(global: &crate::Global) -> Result<Self> {
        Ok(Self::load(global.config.as_deref())?.with_overrides(&global.overrides))
    }

    pub fn report_ttl(&self) -> Duration {
        Duration::from_secs(self.report_expiration_minutes.saturating_mul(60))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }

    pub fn cover(&self) -> CoverStrategy {
        match self.cover_strategy {
            CoverMode::FullPage => CoverStrategy::FullPage,
            CoverMode::ReplaceResource => CoverStrategy::ReplaceResource {
                part: self.cover_resource.clone(),
            },
        }
    }
}

/// Everything report assembly needs, loaded once at start.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub normalizer: Normalizer,
    pub statuses: StatusTable,
    pub template: PathBuf,
    pub cover: CoverStrategy,
    pub cover_dir: PathBuf,
    pub outline_marker: String,
    pub heading_style_prefix: String,
    pub list_name: String,
}

impl ReportConfig {
    pub fn load(config: &ServiceConfig) -> Result<Self> {
        validate_schema(FIELD_SCHEMA, OUTPUT_ATTRIBUTES)?;

        let lookups = OrgLookups::from_json(
            &read_table(&config.directorate_table)?,
            &read_table(&config.division_table)?,
        )?;
        let statuses = StatusTable::from_json(&read_table(&config.status_table)?)?;

        log::info!(
            "Loaded lookup tables ({} status report types)",
            statuses.len()
        );

        Ok(Self {
            normalizer: Normalizer::new(lookups, config.join_separator),
            statuses,
            template: config.template.clone(),
            cover: config.cover(),
            cover_dir: config.cover_dir.clone(),
            outline_marker: config.outline_marker.clone(),
            heading_style_prefix: config.heading_style_prefix.clone(),
            list_name: config.list_name.clone(),
        })
    }
}

fn read_table(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lookup table {}", path.display()))
}
