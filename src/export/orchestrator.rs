//! Export orchestrator
//!
//! Drives one run through its phases:
//!
//! ```text
//! Admitted -> Fetching -> Processing -> Flushing -> Completed
//!     \           \            \            \
//!      +-----------+------------+------------+--> Cancelled | Failed
//! ```
//!
//! `Empty` is reached from Fetching or Processing when nothing matched.
//! Requests are validated and admitted before any state is created; every
//! admitted run reports its outcome to the statistics sink exactly once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ConfigError, ExporterError, Result};
use crate::utils::number::group_thousands;

use super::chunk::{ChunkOutcome, ChunkStats, ChunkWriter};
use super::estimate::{EstimateSettings, estimate_total};
use super::fetcher::{FetchSettings, PaginatedFetcher};
use super::filter::{DataOptions, DateRange, FilterPipeline, FilterSpec};
use super::memory::{MemoryStatus, SharedMemoryMonitor};
use super::progress::{NullProgress, ProgressReporter, ProgressSink, SharedProgress};
use super::record::RawRecord;
use super::registry::ExportRegistry;
use super::retry::RetryPolicy;
use super::sink::{ArtifactHandle, ChunkSink};
use super::source::RecordSource;
use super::stats::StatisticsSink;

/// Parameters of one export request
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    /// Identity of the requester, used for cooldown and cancellation
    pub actor: String,
    /// Short description of what is exported, usually the channel name
    pub label: String,
    pub role: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    /// Inclusive start date, `YYYY-MM-DD`
    pub date_from: Option<String>,
    /// Inclusive end date, `YYYY-MM-DD`
    pub date_to: Option<String>,
    /// Overrides the configured chunk size
    pub chunk_size: Option<usize>,
    /// Comma-separated optional columns, e.g. `"1,2,4"`
    pub data_options: Option<String>,
}

impl ExportRequest {
    pub fn new(actor: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            label: label.into(),
            ..Self::default()
        }
    }

    /// Parse and validate the filters of this request
    ///
    /// # Returns
    /// * `Result<FilterSpec>` - Filters, or `ConfigError` for bad dates
    pub fn filter_spec(&self) -> Result<FilterSpec> {
        Ok(FilterSpec {
            role: non_empty(&self.role),
            category: non_empty(&self.category),
            search: non_empty(&self.search),
            date_range: DateRange::parse(self.date_from.as_deref(), self.date_to.as_deref())?,
            data_options: self
                .data_options
                .as_deref()
                .map(DataOptions::parse)
                .unwrap_or_default(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Admitted,
    Fetching,
    Processing,
    Flushing,
    Completed,
    Empty,
    Cancelled,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::Empty | RunPhase::Cancelled | RunPhase::Failed
        )
    }

    /// Whether `next` may follow this phase
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;

        if self.is_terminal() {
            return false;
        }
        match next {
            Cancelled | Failed => true,
            Fetching => *self == Admitted,
            Processing => *self == Fetching,
            Flushing => *self == Processing,
            Completed => *self == Flushing,
            Empty => matches!(self, Fetching | Processing),
            Admitted => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Admitted => "admitted",
            RunPhase::Fetching => "fetching",
            RunPhase::Processing => "processing",
            RunPhase::Flushing => "flushing",
            RunPhase::Completed => "completed",
            RunPhase::Empty => "empty",
            RunPhase::Cancelled => "cancelled",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Monotonic counters of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    fetched: u64,
    filtered_in: u64,
    filtered_out: u64,
    chunks_flushed: u32,
    chunks_failed: u32,
}

impl RunCounters {
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    pub fn filtered_in(&self) -> u64 {
        self.filtered_in
    }

    pub fn filtered_out(&self) -> u64 {
        self.filtered_out
    }

    pub fn chunks_flushed(&self) -> u32 {
        self.chunks_flushed
    }

    pub fn chunks_failed(&self) -> u32 {
        self.chunks_failed
    }

    fn add_fetched(&mut self, n: u64) {
        self.fetched += n;
    }

    fn add_filtered_in(&mut self) {
        self.filtered_in += 1;
    }

    fn add_filtered_out(&mut self) {
        self.filtered_out += 1;
    }

    fn add_chunk(&mut self, delivered: bool) {
        if delivered {
            self.chunks_flushed += 1;
        } else {
            self.chunks_failed += 1;
        }
    }
}

/// Live state of an admitted run
#[derive(Debug)]
pub struct RunState {
    pub run_id: Uuid,
    pub actor: String,
    pub started_at: DateTime<Utc>,
    pub filters: FilterSpec,
    counters: RunCounters,
    phase: RunPhase,
    cancel: CancellationToken,
}

impl RunState {
    fn new(run_id: Uuid, actor: &str, filters: FilterSpec, cancel: CancellationToken) -> Self {
        Self {
            run_id,
            actor: actor.to_string(),
            started_at: Utc::now(),
            filters,
            counters: RunCounters::default(),
            phase: RunPhase::Admitted,
            cancel,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to `next` if the transition is legal
    ///
    /// # Returns
    /// * `bool` - Whether the phase changed
    pub fn transition(&mut self, next: RunPhase) -> bool {
        if !self.phase.can_transition_to(next) {
            warn!(
                "Run {}: refusing transition {} -> {}",
                self.run_id, self.phase, next
            );
            return false;
        }
        debug!("Run {}: {} -> {}", self.run_id, self.phase, next);
        self.phase = next;
        true
    }
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// At least one record passed the filters and was handed to the sink
    Completed,
    /// Nothing to export; `fetched` tells whether the source was empty
    Empty { fetched: u64 },
    Cancelled,
    /// Memory reached the critical threshold mid-run
    ResourceExhausted(String),
    Failed(ExporterError),
}

impl RunOutcome {
    fn phase(&self) -> RunPhase {
        match self {
            RunOutcome::Completed => RunPhase::Completed,
            RunOutcome::Empty { .. } => RunPhase::Empty,
            RunOutcome::Cancelled => RunPhase::Cancelled,
            RunOutcome::ResourceExhausted(_) | RunOutcome::Failed(_) => RunPhase::Failed,
        }
    }
}

/// Final report of an admitted run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub actor: String,
    pub outcome: RunOutcome,
    pub phase: RunPhase,
    pub counters: RunCounters,
    pub chunks: ChunkStats,
    /// Delivered artifacts in part order
    pub artifacts: Vec<ArtifactHandle>,
    /// Advisory messages raised during the run
    pub warnings: Vec<String>,
    pub estimated_total: u64,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }

    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        match &self.outcome {
            RunOutcome::Completed => {
                let mut line = format!(
                    "Processed {} out of {} messages in {} part(s)",
                    group_thousands(self.counters.filtered_in),
                    group_thousands(self.counters.fetched),
                    self.counters.chunks_flushed
                );
                if self.counters.chunks_failed > 0 {
                    line.push_str(&format!(
                        ", {} part(s) could not be saved",
                        self.counters.chunks_failed
                    ));
                }
                line
            }
            RunOutcome::Empty { fetched: 0 } => "No messages found".to_string(),
            RunOutcome::Empty { .. } => "No messages matched the filters".to_string(),
            RunOutcome::Cancelled => format!(
                "Export cancelled after {} messages ({} part(s) delivered)",
                group_thousands(self.counters.filtered_in),
                self.counters.chunks_flushed
            ),
            RunOutcome::ResourceExhausted(msg) => {
                ExporterError::ResourceExhausted(msg.clone()).to_string()
            }
            RunOutcome::Failed(e) => format!("Export failed: {e}"),
        }
    }

    /// Turn failed outcomes into errors
    pub fn into_result(self) -> Result<RunReport> {
        match self.outcome {
            RunOutcome::Failed(e) => Err(e),
            RunOutcome::ResourceExhausted(msg) => Err(ExporterError::ResourceExhausted(msg)),
            _ => Ok(self),
        }
    }
}

/// Side output collected while a run executes
#[derive(Default)]
struct RunLog {
    warnings: Vec<String>,
    artifacts: Vec<ArtifactHandle>,
    chunks: ChunkStats,
    estimated_total: u64,
}

impl RunLog {
    fn warn(&mut self, message: String) {
        if self.warnings.last() != Some(&message) {
            self.warnings.push(message);
        }
    }
}

/// Runs exports against shared admission, memory and statistics state
pub struct ExportOrchestrator {
    config: Config,
    registry: Arc<ExportRegistry>,
    memory: SharedMemoryMonitor,
    stats: Arc<dyn StatisticsSink>,
    progress_sink: Arc<dyn ProgressSink>,
}

impl ExportOrchestrator {
    /// Create a new orchestrator
    ///
    /// # Arguments
    /// * `config` - Configuration, validated here
    /// * `memory` - Process-wide memory monitor
    /// * `stats` - Receives the outcome of every admitted run
    ///
    /// # Returns
    /// * `Result<Self>` - Orchestrator, or the configuration error
    pub fn new(
        config: Config,
        memory: SharedMemoryMonitor,
        stats: Arc<dyn StatisticsSink>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ExportRegistry::new(&config, Arc::clone(&memory)));
        Ok(Self {
            config,
            registry,
            memory,
            stats,
            progress_sink: Arc::new(NullProgress),
        })
    }

    /// Set the destination of progress lines
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<ExportRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one export
    ///
    /// Validation and admission failures return `Err` and leave no trace.
    /// Once admitted, the run always produces a [`RunReport`]; use
    /// [`RunReport::into_result`] to treat failed outcomes as errors.
    ///
    /// # Arguments
    /// * `request` - What to export and for whom
    /// * `source` - Paginated record source
    /// * `sink` - Destination of flushed chunks
    /// * `cancel` - Token that stops the run cooperatively
    ///
    /// # Returns
    /// * `Result<RunReport>` - Report of the admitted run, or rejection
    pub async fn run(
        &self,
        request: &ExportRequest,
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn ChunkSink>,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let filters = request.filter_spec()?;
        let chunk_size = request.chunk_size.unwrap_or(self.config.export.chunk_size);
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunk_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let ticket = self
            .registry
            .admit(&request.actor, &request.label, cancel.clone())?;

        let started = Instant::now();
        let mut state = RunState::new(ticket.run_id(), &request.actor, filters, cancel);
        let mut log = RunLog::default();

        info!(
            "Starting export run {} for {} ({})",
            state.run_id, state.actor, request.label
        );

        let outcome = self
            .execute(&mut state, &mut log, source, sink, chunk_size)
            .await;
        state.transition(outcome.phase());

        let filtered_in = state.counters.filtered_in();
        self.stats
            .record_run(matches!(outcome, RunOutcome::Completed), filtered_in);

        match &outcome {
            RunOutcome::Completed => info!(
                "Run {} completed: {} of {} records exported in {} part(s)",
                state.run_id,
                filtered_in,
                state.counters.fetched(),
                state.counters.chunks_flushed()
            ),
            RunOutcome::Empty { fetched } => {
                info!("Run {} found nothing to export ({} fetched)", state.run_id, fetched)
            }
            RunOutcome::Cancelled => info!("Run {} cancelled", state.run_id),
            RunOutcome::ResourceExhausted(msg) => {
                error!("Run {} stopped: {}", state.run_id, msg);
                self.stats.record_error(msg);
            }
            RunOutcome::Failed(e) => {
                error!("Run {} failed: {}", state.run_id, e);
                self.stats.record_error(&e.to_string());
            }
        }

        drop(ticket);

        Ok(RunReport {
            run_id: state.run_id,
            actor: state.actor.clone(),
            outcome,
            phase: state.phase(),
            counters: state.counters(),
            chunks: log.chunks,
            artifacts: log.artifacts,
            warnings: log.warnings,
            estimated_total: log.estimated_total,
            elapsed: started.elapsed(),
        })
    }

    async fn execute(
        &self,
        state: &mut RunState,
        log: &mut RunLog,
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn ChunkSink>,
        chunk_size: usize,
    ) -> RunOutcome {
        if state.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let pipeline = FilterPipeline::new(state.filters.clone());
        state.transition(RunPhase::Fetching);

        log.estimated_total = estimate_total(
            source.as_ref(),
            &pipeline,
            &EstimateSettings::from_config(&self.config),
            &state.cancel,
        )
        .await;

        let progress = ProgressReporter::new(
            Some(log.estimated_total),
            &self.config.progress,
            Arc::clone(&self.progress_sink),
        )
        .shared();

        let mut fetcher = PaginatedFetcher::new(
            source,
            FetchSettings::from_config(&self.config),
            RetryPolicy::from_config(&self.config.retry),
        )
        .with_observer(Arc::new(progress.clone()));

        let fetched = match fetcher.collect_all(&state.cancel).await {
            Ok(fetched) => fetched,
            Err(e) => {
                progress.with(|p| p.finish());
                return RunOutcome::Failed(e.into());
            }
        };
        state.counters.add_fetched(fetched.records.len() as u64);

        if fetched.cancelled {
            progress.with(|p| p.finish());
            return RunOutcome::Cancelled;
        }
        if fetched.records.is_empty() {
            progress.with(|p| p.finish());
            return RunOutcome::Empty { fetched: 0 };
        }

        info!(
            "Run {}: processing {} records",
            state.run_id,
            fetched.records.len()
        );
        state.transition(RunPhase::Processing);
        progress.with(|p| p.restart(Some(fetched.records.len() as u64)));

        let mut writer = ChunkWriter::new(chunk_size, state.run_id, sink);
        let outcome = self
            .process(state, log, &pipeline, &mut writer, &progress, &fetched.records)
            .await;

        log.chunks = writer.stats();
        progress.with(|p| {
            p.force_update();
            p.finish();
        });
        outcome
    }

    async fn process(
        &self,
        state: &mut RunState,
        log: &mut RunLog,
        pipeline: &FilterPipeline,
        writer: &mut ChunkWriter,
        progress: &SharedProgress,
        records: &[RawRecord],
    ) -> RunOutcome {
        let check_every = self.config.export.memory_check_every.max(1);

        for (index, raw) in records.iter().enumerate() {
            if state.is_cancelled() {
                writer.discard();
                return RunOutcome::Cancelled;
            }

            if index % check_every == 0 {
                let check = {
                    let mut monitor = match self.memory.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    monitor.check()
                };
                if check.status == MemoryStatus::Critical {
                    writer.discard();
                    return RunOutcome::ResourceExhausted(check.message);
                }
                if !check.message.is_empty() {
                    log.warn(check.message);
                }
                tokio::task::yield_now().await;
            }

            let matched = match pipeline.apply(raw) {
                Some(record) => {
                    state.counters.add_filtered_in();
                    if let Some(outcome) = writer.add(record).await {
                        Self::record_chunk(state, log, outcome);
                    }
                    true
                }
                None => {
                    state.counters.add_filtered_out();
                    false
                }
            };
            progress.with(|p| p.update(1, matched));
        }

        if state.is_cancelled() {
            writer.discard();
            return RunOutcome::Cancelled;
        }

        if state.counters.filtered_in() == 0 {
            return RunOutcome::Empty {
                fetched: state.counters.fetched(),
            };
        }

        state.transition(RunPhase::Flushing);
        if let Some(outcome) = writer.finish().await {
            Self::record_chunk(state, log, outcome);
        }

        RunOutcome::Completed
    }

    fn record_chunk(state: &mut RunState, log: &mut RunLog, outcome: ChunkOutcome) {
        state.counters.add_chunk(outcome.is_delivered());
        match outcome {
            ChunkOutcome::Delivered(artifact) => log.artifacts.push(artifact),
            ChunkOutcome::Failed {
                part,
                records,
                error,
            } => log.warn(format!("Part {part} ({records} messages) was not saved: {error}")),
        }
    }
}
