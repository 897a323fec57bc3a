//! message-export
//!
//! Exports channel message histories into chunked CSV or JSON Lines files.
//!
//! # Usage
//!
//! ```bash
//! # Export everything from a JSON Lines dump into ./exports
//! message-export export -i general.jsonl -o exports
//!
//! # Only moderators in March, with attachments and reactions
//! message-export export -i general.jsonl --role Moderator \
//!     --date-from 2024-03-01 --date-to 2024-03-31 --data-options 1,2
//!
//! # Show the effective configuration
//! message-export config
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Level, debug};

use message_export::cli::{CliInterface, Commands, ExportArgs, ensure_output_dir};
use message_export::error::Result;
use message_export::utils::number::format_bytes;
use message_export::utils::time::format_duration;
use message_export::export::{
    DirectorySink, ExportOrchestrator, ExportStatistics, JsonLinesSource, MemoryMonitor,
    NullProgress, ProgressSink, SystemMemoryProbe, TerminalProgress,
};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments
/// 2. Load configuration
/// 3. Initialize logging
/// 4. Dispatch the subcommand
///
/// # Returns
/// * `Result<()>` - Success or error
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    match &cli.args().command {
        Commands::Export(export) => run_export(&cli, export).await,
        Commands::Config { path } => {
            println!("{}", cli.render_config(*path)?);
            Ok(())
        }
    }
}

/// Run a single export and print its report
async fn run_export(cli: &CliInterface, export: &ExportArgs) -> Result<()> {
    let config = cli.config().clone();

    let source = JsonLinesSource::open(&export.input).await?;
    debug!("Loaded {} records from {}", source.len(), export.input.display());

    ensure_output_dir(&export.output_dir)?;
    let sink = DirectorySink::new(&export.output_dir, &export.label(), config.export.format);

    let memory = MemoryMonitor::new(&config.memory, Arc::new(SystemMemoryProbe::new())).shared();
    let stats = Arc::new(ExportStatistics::new());
    let progress: Arc<dyn ProgressSink> = if cli.show_progress(export) {
        Arc::new(TerminalProgress::new())
    } else {
        Arc::new(NullProgress)
    };
    let orchestrator =
        ExportOrchestrator::new(config, memory, stats.clone())?.with_progress_sink(progress);

    // Ctrl+C cancels the run cooperatively
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel_clone.cancel(),
            Err(err) => eprintln!("Failed to listen for Ctrl+C: {}", err),
        }
    });

    let result = orchestrator
        .run(&export.to_request(), Arc::new(source), Arc::new(sink), cancel)
        .await;
    ctrl_c_handle.abort();
    let report = result?;

    println!("{}", report.summary());
    for artifact in &report.artifacts {
        println!(
            "  part {}: {} ({} messages, {})",
            artifact.part,
            artifact.path.display(),
            artifact.records,
            format_bytes(artifact.bytes)
        );
    }
    for warning in &report.warnings {
        eprintln!("Warning: {}", warning);
    }
    debug!(
        "Estimated {} messages, fetched {} in {}",
        report.estimated_total,
        report.counters.fetched(),
        format_duration(report.elapsed)
    );
    if export.stats {
        println!();
        println!("{}", stats.snapshot_with(orchestrator.registry()).render());
    }

    report.into_result().map(|_| ())
}

/// Initialize logging system based on verbosity level
///
/// # Arguments
/// * `cli` - CLI interface with verbosity settings
fn initialize_logging(cli: &CliInterface) {
    let level = if cli.args().very_verbose {
        Level::TRACE
    } else if cli.args().verbose {
        Level::DEBUG
    } else {
        cli.config().logging.level.to_tracing_level()
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
