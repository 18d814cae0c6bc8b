use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "assize",
    version,
    about = "LLM-as-judge evaluation runner"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a starter config, guideline file and sample dataset
    Init(InitArgs),
    /// Manage stored guidelines
    Guideline(GuidelineArgs),
    /// Submit a run and wait for it to finish
    Run(RunArgs),
    /// Show a run's status and summary
    Status(StatusArgs),
    /// Print or export a run's event log
    Events(EventsArgs),
    Version,
}

/// Store location: the `storage` block of the config file (`assize.yaml` in
/// the current directory when present), overridden by `--db` / `--blobs`.
#[derive(Parser, Clone)]
pub struct StoreArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub db: Option<PathBuf>,
    #[arg(long)]
    pub blobs: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// generate .gitignore for the local store
    #[arg(long)]
    pub gitignore: bool,
}

#[derive(Parser)]
pub struct GuidelineArgs {
    #[command(subcommand)]
    pub cmd: GuidelineSub,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Subcommand)]
pub enum GuidelineSub {
    /// Validate and store every guideline in a YAML file
    Add {
        #[arg(long, default_value = "guidelines.yaml")]
        file: PathBuf,
    },
    List,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = "assize.yaml")]
    pub config: PathBuf,

    /// import this JSONL file as the config's dataset before running
    #[arg(long)]
    pub dataset_file: Option<PathBuf>,

    /// print the final run record as JSON on stdout
    #[arg(long)]
    pub json: bool,

    #[arg(long, default_value_t = 500)]
    pub poll_ms: u64,
}

#[derive(Parser, Clone)]
pub struct StatusArgs {
    pub run_id: String,
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Parser, Clone)]
pub struct EventsArgs {
    pub run_id: String,

    /// write the log to the blob store instead of stdout
    #[arg(long)]
    pub export: bool,
    #[command(flatten)]
    pub store: StoreArgs,
}
