//! ProtoML CLI: register templates and datasets, induce transforms, inspect
//! the pipeline graph and run tasks.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// ProtoML: persistence and orchestration for ML transform pipelines
#[derive(Parser, Debug)]
#[command(name = "protoml", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage the data type lattice
    Datatype {
        #[command(subcommand)]
        action: DataTypeAction,
    },
    /// Register transform templates
    Transform {
        #[command(subcommand)]
        action: TransformAction,
    },
    /// Ingest dataset files
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },
    /// Create or update induced transforms
    Induce {
        #[command(subcommand)]
        action: InduceAction,
    },
    /// Print the pipeline graph as JSON
    Graph {
        /// Print induced transform ids in execution order instead
        #[arg(long)]
        order: bool,
    },
    /// Run induced transforms and wait for them to finish
    Run {
        /// Induced transform ids, launched together
        ids: Vec<String>,
        /// Run every induced transform one at a time in execution order
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },
    /// Show a stored induced transform, including its validation error
    Show { id: String },
    /// Print the run log of an induced transform
    Log { id: String },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default `.protoml/config.toml`
    Init,
    /// Print the effective configuration
    Show,
}

#[derive(clap::Subcommand, Debug)]
pub enum DataTypeAction {
    /// Add a data type
    Add {
        name: String,
        /// Parent type (repeatable)
        #[arg(short, long = "parent")]
        parents: Vec<String>,
    },
    /// List data types with their ancestors
    List,
}

#[derive(clap::Subcommand, Debug)]
pub enum TransformAction {
    /// Register a JSON template file
    Add { file: PathBuf },
}

#[derive(clap::Subcommand, Debug)]
pub enum DatasetAction {
    /// Split a JSON dataset description into data groups
    Add { file: PathBuf },
}

#[derive(clap::Subcommand, Debug)]
pub enum InduceAction {
    /// Store a JSON induced transform
    Add { file: PathBuf },
    /// Replace a stored induced transform
    Update { id: String, file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = match &cli.config {
        Some(path) => protoml_core::load_config_file(path, Some(&workspace)),
        None => protoml_core::load_config(Some(&workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = config.log_dir(&workspace);
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "protoml.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, &workspace, &config).await
}
