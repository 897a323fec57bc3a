//! Streaming export pipeline
//!
//! A run walks a paginated [`RecordSource`] newest-first, filters and
//! projects every record through a [`FilterPipeline`], and hands bounded
//! chunks to a [`ChunkSink`]. Around that core:
//!
//! - [`RetryPolicy`] classifies fetch failures and decides on backoff
//! - [`MemoryMonitor`] guards admission and the processing loop
//! - [`ProgressReporter`] renders throttled status lines
//! - [`ExportRegistry`] enforces cooldowns, maintenance and concurrency
//! - [`ExportStatistics`] aggregates outcomes across runs
//!
//! [`ExportOrchestrator`] drives a single run through its phases.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use message_export::config::{Config, ExportFormat};
//! use message_export::export::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo(records: Vec<RawRecord>) -> message_export::error::Result<()> {
//! let config = Config::default();
//! let memory = MemoryMonitor::new(&config.memory, Arc::new(SystemMemoryProbe::new())).shared();
//! let orchestrator = ExportOrchestrator::new(config, memory, Arc::new(ExportStatistics::new()))?;
//!
//! let request = ExportRequest::new("ana", "general");
//! let sink = DirectorySink::new("exports", "general", ExportFormat::Csv);
//! let report = orchestrator
//!     .run(
//!         &request,
//!         Arc::new(MemorySource::new(records)),
//!         Arc::new(sink),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod estimate;
pub mod fetcher;
pub mod filter;
pub mod memory;
pub mod orchestrator;
pub mod progress;
pub mod record;
pub mod registry;
pub mod retry;
pub mod sink;
pub mod source;
pub mod stats;

#[cfg(test)]
mod tests;

pub use chunk::{ChunkOutcome, ChunkStats, ChunkWriter};
pub use estimate::{DEFAULT_ESTIMATE, EstimateSettings, estimate_total};
pub use fetcher::{FetchObserver, FetchOutcome, FetchSettings, PageStep, PaginatedFetcher};
pub use filter::{DataOptions, DateRange, FilterPipeline, FilterSpec};
pub use memory::{
    LogReclaim, MemoryCheck, MemoryMonitor, MemoryProbe, MemoryStatus, ReclaimHook,
    SharedMemoryMonitor, SystemMemoryProbe,
};
pub use orchestrator::{
    ExportOrchestrator, ExportRequest, RunCounters, RunOutcome, RunPhase, RunReport, RunState,
};
pub use progress::{
    LogProgress, NullProgress, ProgressReporter, ProgressSink, SharedProgress, TerminalProgress,
};
pub use record::{
    Attachment, Author, ChannelRef, ExportedRecord, FieldValue, RawRecord, Reaction, RecordId,
};
pub use registry::{ActiveRunInfo, AdmissionTicket, ExportRegistry};
pub use retry::{Classify, FailureKind, RetryDecision, RetryPolicy, with_retry};
pub use sink::{ArtifactHandle, ChunkSink, CsvWriter, DirectorySink, FormatWriter, JsonLWriter};
pub use source::{JsonLinesSource, MemorySource, Page, RecordSource, SourceError};
pub use stats::{ExportStatistics, StatisticsSink, StatsSnapshot};
