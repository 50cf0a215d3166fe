use crate::prelude::*;
use clap::Parser;

mod config;
mod error;
mod generate;
mod jobs;
mod normalize;
mod prelude;
mod report;
mod serve;
mod source;
mod status;
mod sweep;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Generate audit reports from SharePoint list records"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// TOML service configuration file
    #[clap(long, env = "RELATORIO_CONFIG", global = true)]
    config: Option<std::path::PathBuf>,

    /// Read records from a JSON file instead of SharePoint
    #[clap(long, env = "RELATORIO_RECORDS_FILE", global = true)]
    records_file: Option<std::path::PathBuf>,

    #[clap(flatten)]
    overrides: crate::config::Overrides,

    /// Whether to display additional information.
    #[clap(long, env = "RELATORIO_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Run the HTTP API with its worker pool and expiry sweep
    Serve(crate::serve::App),

    /// Generate one report and write it to disk
    Generate(crate::generate::App),

    /// Print the normalized attributes of a record
    Normalize(crate::normalize::App),

    /// Resolve a process status label
    Status(crate::status::App),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Serve(sub_app) => crate::serve::run(sub_app, app.global).await,
        SubCommands::Generate(sub_app) => crate::generate::run(sub_app, app.global).await,
        SubCommands::Normalize(sub_app) => crate::normalize::run(sub_app, app.global).await,
        SubCommands::Status(sub_app) => crate::status::run(sub_app, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
