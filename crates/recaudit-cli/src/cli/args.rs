use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "recaudit",
    version,
    about = "Batch orchestration for video-platform recommendation audits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a batch experiment from a config file
    Run(RunArgs),
    /// Validate a config file and print diagnostics
    Validate(ValidateArgs),
    /// Write a starter config
    Init(InitArgs),
    /// Convert a legacy pair-list JSON file into a config
    Import(ImportArgs),
    /// Show the live status of an experiment and recent run history
    Status(StatusArgs),
    /// Poll the status file and re-render on change
    Watch(WatchArgs),
    Version,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = "recaudit.yaml")]
    pub config: PathBuf,

    /// Run/result history database
    #[arg(long, default_value = "recaudit.db")]
    pub db: PathBuf,

    /// Override settings.output_dir
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Override settings.retries (total attempts per task)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Disable the incremental fingerprint skip
    #[arg(long)]
    pub no_cache: bool,

    /// Resolve and print the task plan without launching browsers
    #[arg(long)]
    pub dry_run: bool,

    /// Treat flaky tasks as failures
    #[arg(long)]
    pub strict: bool,

    /// Override settings.webdriver_url
    #[arg(long, env = "RECAUDIT_WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Shard collected video ids into this many metadata queue buckets
    #[arg(long, default_value_t = 0)]
    pub shards: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Clone)]
pub struct ValidateArgs {
    #[arg(long, default_value = "recaudit.yaml")]
    pub config: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "recaudit.yaml")]
    pub config: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Clone)]
pub struct ImportArgs {
    /// Legacy pair-list JSON file
    #[arg(long)]
    pub pairs: PathBuf,

    /// Which side of each pair to import: paired | long | short
    #[arg(long, default_value = "paired")]
    pub mode: String,

    /// Output config path (defaults to the pairs file with a .yaml extension)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct StatusArgs {
    /// Experiment directory holding status.json
    #[arg(long, default_value = ".")]
    pub experiment_dir: PathBuf,

    /// History database for recent runs
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Clone)]
pub struct WatchArgs {
    /// Experiment directory holding status.json
    #[arg(long, default_value = ".")]
    pub experiment_dir: PathBuf,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Clear the screen before each render
    #[arg(long)]
    pub clear: bool,
}
