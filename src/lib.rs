//! Message Export Library
//!
//! Streaming export of large message histories into bounded output files.
//! Records are fetched newest-first from a paginated source, filtered and
//! projected, and written in chunks while retries, memory pressure,
//! admission and cancellation are handled along the way.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `export`: Fetching, filtering, chunking and run orchestration
//! - `utils`: Formatting and filename helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use message_export::config::{Config, ExportFormat};
//! use message_export::export::{
//!     DirectorySink, ExportOrchestrator, ExportRequest, ExportStatistics, JsonLinesSource,
//!     MemoryMonitor, SystemMemoryProbe,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let memory = MemoryMonitor::new(&config.memory, Arc::new(SystemMemoryProbe::new())).shared();
//!     let orchestrator = ExportOrchestrator::new(config, memory, Arc::new(ExportStatistics::new()))?;
//!
//!     let source = JsonLinesSource::open("general.jsonl").await?;
//!     let sink = DirectorySink::new("exports", "general", ExportFormat::Csv);
//!     let report = orchestrator
//!         .run(
//!             &ExportRequest::new("ana", "general"),
//!             Arc::new(source),
//!             Arc::new(sink),
//!             CancellationToken::new(),
//!         )
//!         .await?;
//!
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExporterError, Result};
pub use export::{ExportOrchestrator, ExportRequest, RunOutcome, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
