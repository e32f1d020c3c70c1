//! Level-1b to Level-2 chain runner.
//!
//! Runs the configured chain over the L1b files selected for a date range,
//! or over an explicit list of files.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use l2chain::events::LoggingEventSink;
use l2chain::observability::init_tracing;
use l2chain::output::JsonProductWriter;
use l2chain::selectors::SelectorQuery;
use l2chain::stages::StageRegistry;
use l2chain::ChainConfig;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "run_chain")]
#[command(about = "Run the L1b to L2 processing chain", long_about = None)]
struct Cli {
    /// Path to the chain configuration file (YAML or JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// First day to process (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day to process, inclusive (defaults to --start)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Process this L1b file instead of selecting by date (repeatable)
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// Override the worker limit
    #[arg(long)]
    max_workers: Option<usize>,

    /// Abort the run at the first failed file
    #[arg(long)]
    stop_on_error: bool,

    /// Log level or filter directive
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write one JSON product per completed file into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs)?;

    let mut config = ChainConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(workers) = cli.max_workers {
        config.chain.use_multi_processing = workers > 1;
        config.chain.max_processes_for_multiprocessing = Some(workers);
    }
    if cli.stop_on_error {
        config.chain.stop_on_error = true;
    }

    let registry = StageRegistry::with_builtins();
    let mut builder = config
        .orchestrator(&registry)?
        .event_sink(Arc::new(LoggingEventSink::default()))
        .label(cli.config.display().to_string());
    if let Some(dir) = &cli.output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        builder = builder.product_writer(Arc::new(JsonProductWriter::new(dir)));
    }
    let orchestrator = builder.build()?;

    let summary = if cli.files.is_empty() {
        let Some(start) = cli.start else {
            bail!("either --start or at least one --file is required");
        };
        let query = SelectorQuery::new(start, cli.end.unwrap_or(start));
        orchestrator.run(&query).await?
    } else {
        orchestrator.run_files(cli.files.clone()).await?
    };

    println!("{summary}");
    if let Some(path) = &cli.summary {
        let json = serde_json::to_string_pretty(&summary)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing summary to {}", path.display()))?;
    }
    Ok(())
}
