//! End-to-end runs through the orchestrator

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{Config, ExportFormat};
use crate::error::{AdmissionError, ConfigError, ErrorKind, ExporterError, SinkError};

use super::chunk::tests::RecordingSink;
use super::estimate::DEFAULT_ESTIMATE;
use super::memory::tests::{ScriptedProbe, unthrottled};
use super::memory::MemoryMonitor;
use super::orchestrator::{ExportOrchestrator, ExportRequest, RunOutcome, RunPhase};
use super::progress::ProgressSink;
use super::record::{ExportedRecord, RawRecord, RecordId};
use super::retry::FailureKind;
use super::sink::{ArtifactHandle, ChunkSink, DirectorySink};
use super::source::tests::record;
use super::source::{MemorySource, Page, RecordSource, SourceError};
use super::stats::ExportStatistics;

/// Memory source that counts calls and fails or stalls the chosen ones
struct FlakySource {
    inner: MemorySource,
    calls: AtomicUsize,
    failures: Mutex<Vec<(usize, SourceError)>>,
    hangs: Vec<usize>,
}

impl FlakySource {
    fn new(records: Vec<RawRecord>) -> Self {
        Self {
            inner: MemorySource::new(records),
            calls: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            hangs: Vec::new(),
        }
    }

    /// Never answer the `call`-th request
    fn hang_on(mut self, call: usize) -> Self {
        self.hangs.push(call);
        self
    }

    /// Fail the `call`-th request (0-based; call 0 is the estimate sample)
    fn fail_on(self, call: usize, kind: FailureKind, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .push((call, SourceError::new(kind, message)));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSource for FlakySource {
    async fn list_page(
        &self,
        before: Option<RecordId>,
        limit: usize,
    ) -> std::result::Result<Page, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hangs.contains(&call) {
            return std::future::pending().await;
        }
        let failure = {
            let mut failures = self.failures.lock().unwrap();
            failures
                .iter()
                .position(|(n, _)| *n == call)
                .map(|i| failures.remove(i).1)
        };
        match failure {
            Some(error) => Err(error),
            None => self.inner.list_page(before, limit).await,
        }
    }
}

/// Sink that cancels the run once the given part has been written
struct CancellingSink {
    inner: RecordingSink,
    after_part: u32,
    cancel: CancellationToken,
}

#[async_trait]
impl ChunkSink for CancellingSink {
    async fn write_chunk(
        &self,
        records: &[ExportedRecord],
        run_id: Uuid,
        part: u32,
    ) -> std::result::Result<ArtifactHandle, SinkError> {
        let artifact = self.inner.write_chunk(records, run_id, part).await?;
        if part == self.after_part {
            self.cancel.cancel();
        }
        Ok(artifact)
    }

    async fn deliver(
        &self,
        artifact: ArtifactHandle,
    ) -> std::result::Result<ArtifactHandle, SinkError> {
        self.inner.deliver(artifact).await
    }
}

#[derive(Default)]
struct CapturingProgress {
    lines: Mutex<Vec<String>>,
    finished: AtomicUsize,
}

/// Progress sink that cancels the run when a line with `prefix` is emitted
struct CancellingProgress {
    prefix: String,
    cancel: CancellationToken,
}

impl ProgressSink for CancellingProgress {
    fn emit(&self, line: &str) {
        if line.starts_with(&self.prefix) {
            self.cancel.cancel();
        }
    }
}

impl ProgressSink for CapturingProgress {
    fn emit(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.memory = unthrottled();
    config.export.chunk_size = 2;
    config.export.page_size = 2;
    config.export.estimate_sample_size = 2;
    config
}

fn records(n: u64) -> Vec<RawRecord> {
    (1..=n).map(|id| record(id, &format!("message {id}"))).collect()
}

struct Harness {
    orchestrator: ExportOrchestrator,
    stats: Arc<ExportStatistics>,
}

fn harness(config: Config, usage: &[f64]) -> Harness {
    let memory = MemoryMonitor::new(&config.memory, ScriptedProbe::new(usage)).shared();
    let stats = Arc::new(ExportStatistics::new());
    Harness {
        orchestrator: ExportOrchestrator::new(config, memory, stats.clone()).unwrap(),
        stats,
    }
}

#[tokio::test(start_paused = true)]
async fn test_chunks_in_fetch_order() {
    let h = harness(test_config(), &[40.0]);
    let sink = Arc::new(RecordingSink::default());

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(records(5))),
                sink.clone(),
                CancellationToken::new(),
            )
            .await
    );

    assert!(report.is_success());
    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(
        sink.parts(),
        vec![vec!["5", "4"], vec!["3", "2"], vec!["1"]]
    );
    assert_eq!(report.counters.fetched(), 5);
    assert_eq!(report.counters.filtered_in(), 5);
    assert_eq!(report.counters.chunks_flushed(), 3);
    assert_eq!(report.artifacts.len(), 3);
    assert_eq!(report.chunks.records_flushed, 5);
    assert_eq!(report.summary(), "Processed 5 out of 5 messages in 3 part(s)");

    let snapshot = h.stats.snapshot();
    assert_eq!(snapshot.total_runs, 1);
    assert_eq!(snapshot.successful_runs, 1);
    assert_eq!(snapshot.records_processed, 5);
    assert_eq!(h.orchestrator.registry().active_count(), 0);
}

#[test]
fn test_invalid_config_rejected_by_constructor() {
    let mut config = test_config();
    config.export.timeout = -1.0;
    let memory = MemoryMonitor::new(&config.memory, ScriptedProbe::new(&[40.0])).shared();

    let Err(err) = ExportOrchestrator::new(config, memory, Arc::new(ExportStatistics::new())) else {
        panic!("negative timeout accepted");
    };
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let mut config = test_config();
    config.export.rate_limit_delay = f64::NAN;
    let memory = MemoryMonitor::new(&config.memory, ScriptedProbe::new(&[40.0])).shared();
    assert!(ExportOrchestrator::new(config, memory, Arc::new(ExportStatistics::new())).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_dates_rejected_before_admission() {
    let h = harness(test_config(), &[40.0]);
    let source = Arc::new(FlakySource::new(records(3)));

    let mut request = ExportRequest::new("ana", "general");
    request.date_from = Some("2024-03-10".into());
    request.date_to = Some("2024-03-01".into());

    let err = assert_err!(
        h.orchestrator
            .run(
                &request,
                source.clone(),
                Arc::new(RecordingSink::default()),
                CancellationToken::new(),
            )
            .await
    );
    assert!(matches!(
        err,
        ExporterError::Config(ConfigError::InvalidDateRange { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(source.calls(), 0);
    assert_eq!(h.stats.snapshot().total_runs, 0);

    // The rejected request did not start a cooldown
    let valid = ExportRequest::new("ana", "general");
    assert_ok!(
        h.orchestrator
            .run(
                &valid,
                source.clone(),
                Arc::new(RecordingSink::default()),
                CancellationToken::new(),
            )
            .await
    );
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_rejects_second_request() {
    let h = harness(test_config(), &[40.0]);
    let source = Arc::new(MemorySource::new(records(2)));
    let request = ExportRequest::new("ana", "general");

    let first = h
        .orchestrator
        .run(
            &request,
            source.clone(),
            Arc::new(RecordingSink::default()),
            CancellationToken::new(),
        )
        .await;
    assert_ok!(first);

    let second = h
        .orchestrator
        .run(
            &request,
            source.clone(),
            Arc::new(RecordingSink::default()),
            CancellationToken::new(),
        )
        .await;
    let err = assert_err!(second);
    assert!(matches!(
        err,
        ExporterError::Admission(AdmissionError::Cooldown { .. })
    ));
    assert_eq!(h.stats.snapshot().total_runs, 1);
    assert_eq!(h.orchestrator.registry().active_count(), 0);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_ok!(
        h.orchestrator
            .run(
                &request,
                source,
                Arc::new(RecordingSink::default()),
                CancellationToken::new(),
            )
            .await
    );
}

#[tokio::test]
async fn test_maintenance_rejects() {
    let h = harness(test_config(), &[40.0]);
    h.orchestrator.registry().set_maintenance(true);

    let err = assert_err!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(records(2))),
                Arc::new(RecordingSink::default()),
                CancellationToken::new(),
            )
            .await
    );
    assert_eq!(err.kind(), ErrorKind::Admission);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_then_success() {
    let h = harness(test_config(), &[40.0]);
    let source = Arc::new(FlakySource::new(records(3)).fail_on(
        1,
        FailureKind::RateLimited {
            retry_after: Some(Duration::from_secs(1)),
        },
        "slow down",
    ));
    let sink = Arc::new(RecordingSink::default());

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                source.clone(),
                sink.clone(),
                CancellationToken::new(),
            )
            .await
    );

    assert!(report.is_success());
    assert_eq!(report.counters.fetched(), 3);
    assert_eq!(sink.parts(), vec![vec!["3", "2"], vec!["1"]]);
    // estimate, rate-limited page, retried page, second page
    assert_eq!(source.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_permission_failure_fails_run() {
    let h = harness(test_config(), &[40.0]);
    let source = Arc::new(FlakySource::new(records(3)).fail_on(
        1,
        FailureKind::PermissionDenied,
        "missing read access",
    ));
    let sink = Arc::new(RecordingSink::default());

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                source,
                sink.clone(),
                CancellationToken::new(),
            )
            .await
    );

    assert_eq!(report.phase, RunPhase::Failed);
    assert!(matches!(report.outcome, RunOutcome::Failed(_)));
    assert!(sink.parts().is_empty());

    let snapshot = h.stats.snapshot();
    assert_eq!(snapshot.failed_runs, 1);
    assert!(snapshot.last_error.is_some());

    let err = assert_err!(report.into_result());
    assert_eq!(err.kind(), ErrorKind::Permission);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_discards_pending_records() {
    let mut config = test_config();
    config.export.page_size = 100;
    let h = harness(config, &[40.0]);
    let cancel = CancellationToken::new();
    let sink = Arc::new(CancellingSink {
        inner: RecordingSink::default(),
        after_part: 1,
        cancel: cancel.clone(),
    });

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(records(5))),
                sink.clone(),
                cancel,
            )
            .await
    );

    assert!(matches!(report.outcome, RunOutcome::Cancelled));
    assert_eq!(report.phase, RunPhase::Cancelled);
    assert_eq!(sink.inner.parts(), vec![vec!["5", "4"]]);
    assert_eq!(report.counters.filtered_in(), 2);
    assert_eq!(report.counters.chunks_flushed(), 1);
    assert!(!report.is_success());
    assert_eq!(h.orchestrator.registry().active_count(), 0);

    // The delivered part still counts towards processed records
    let snapshot = h.stats.snapshot();
    assert_eq!(snapshot.failed_runs, 1);
    assert_eq!(snapshot.records_processed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_fetch() {
    let h = harness(test_config(), &[40.0]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let source = Arc::new(FlakySource::new(records(4)));
    let sink = Arc::new(RecordingSink::default());

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                source.clone(),
                sink.clone(),
                cancel,
            )
            .await
    );

    assert!(matches!(report.outcome, RunOutcome::Cancelled));
    assert_eq!(report.phase, RunPhase::Cancelled);
    assert_eq!(report.counters.fetched(), 0);
    assert_eq!(source.calls(), 0);
    assert!(sink.parts().is_empty());
    assert_eq!(h.stats.snapshot().total_runs, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_last_record_wins_over_empty() {
    let mut config = test_config();
    config.progress.batch_size = 1;
    config.progress.update_interval = 0.0;
    // Keeps fetch lines ("3/1") apart from processing lines ("3/3")
    config.export.estimate_cap = 1;
    let cancel = CancellationToken::new();
    let progress = Arc::new(CancellingProgress {
        prefix: "Progress: 3/3 ".to_string(),
        cancel: cancel.clone(),
    });
    let h = harness(config, &[40.0]);
    let orchestrator = h.orchestrator.with_progress_sink(progress);

    let mut request = ExportRequest::new("ana", "general");
    request.search = Some("nothing like this".into());

    let report = assert_ok!(
        orchestrator
            .run(
                &request,
                Arc::new(MemorySource::new(records(3))),
                Arc::new(RecordingSink::default()),
                cancel,
            )
            .await
    );

    assert!(matches!(report.outcome, RunOutcome::Cancelled));
    assert_eq!(report.counters.filtered_out(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_estimate_does_not_stall_run() {
    let mut config = test_config();
    config.export.timeout = 1.0;
    config.export.max_retries = 2;
    let h = harness(config, &[40.0]);
    let source = Arc::new(FlakySource::new(records(3)).hang_on(0));
    let sink = Arc::new(RecordingSink::default());

    let request = ExportRequest::new("ana", "general");
    let run = h.orchestrator.run(
        &request,
        source.clone(),
        sink.clone(),
        CancellationToken::new(),
    );
    let report = assert_ok!(assert_ok!(
        tokio::time::timeout(Duration::from_secs(3600), run).await
    ));

    assert!(report.is_success());
    assert_eq!(report.estimated_total, DEFAULT_ESTIMATE);
    assert_eq!(sink.parts(), vec![vec!["3", "2"], vec!["1"]]);
    // stalled sample, then two pages
    assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_fetch_fails_within_attempt_budget() {
    let mut config = test_config();
    config.export.timeout = 1.0;
    config.export.max_retries = 2;
    config.retry.timeout_base_delay = 0.5;
    let h = harness(config, &[40.0]);
    let source = Arc::new(FlakySource::new(records(3)).hang_on(1).hang_on(2));

    let request = ExportRequest::new("ana", "general");
    let run = h.orchestrator.run(
        &request,
        source.clone(),
        Arc::new(RecordingSink::default()),
        CancellationToken::new(),
    );
    let report = assert_ok!(assert_ok!(
        tokio::time::timeout(Duration::from_secs(3600), run).await
    ));

    assert_eq!(report.phase, RunPhase::Failed);
    // two timed out attempts and one backoff
    assert!(report.elapsed <= Duration::from_millis(2500));
    assert_eq!(source.calls(), 3);

    let err = assert_err!(report.into_result());
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_registry_cancels_active_run() {
    let mut config = test_config();
    config.export.page_size = 100;
    let h = harness(config, &[40.0]);
    let registry = Arc::clone(h.orchestrator.registry());

    struct ActorCancellingSink {
        inner: RecordingSink,
        registry: Arc<super::registry::ExportRegistry>,
    }

    #[async_trait]
    impl ChunkSink for ActorCancellingSink {
        async fn write_chunk(
            &self,
            records: &[ExportedRecord],
            run_id: Uuid,
            part: u32,
        ) -> std::result::Result<ArtifactHandle, SinkError> {
            self.registry.cancel_actor("ana");
            self.inner.write_chunk(records, run_id, part).await
        }

        async fn deliver(
            &self,
            artifact: ArtifactHandle,
        ) -> std::result::Result<ArtifactHandle, SinkError> {
            self.inner.deliver(artifact).await
        }
    }

    let sink = Arc::new(ActorCancellingSink {
        inner: RecordingSink::default(),
        registry,
    });

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(records(6))),
                sink.clone(),
                CancellationToken::new(),
            )
            .await
    );

    assert!(matches!(report.outcome, RunOutcome::Cancelled));
    assert_eq!(sink.inner.parts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_memory_critical_mid_run() {
    let mut config = test_config();
    config.export.memory_check_every = 2;
    config.export.page_size = 100;
    // admission, first processing check, second processing check
    let h = harness(config, &[40.0, 40.0, 95.0]);
    let sink = Arc::new(RecordingSink::default());

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(records(6))),
                sink.clone(),
                CancellationToken::new(),
            )
            .await
    );

    assert!(matches!(report.outcome, RunOutcome::ResourceExhausted(_)));
    assert_eq!(report.phase, RunPhase::Failed);
    // The chunk flushed before the critical check is kept
    assert_eq!(sink.parts(), vec![vec!["6", "5"]]);
    assert_eq!(report.artifacts.len(), 1);

    let snapshot = h.stats.snapshot();
    assert_eq!(snapshot.failed_runs, 1);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("Critical memory usage: 95.0%")
    );

    let err = assert_err!(report.into_result());
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
}

#[tokio::test(start_paused = true)]
async fn test_memory_warning_is_reported() {
    let h = harness(test_config(), &[40.0, 75.0]);

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(records(3))),
                Arc::new(RecordingSink::default()),
                CancellationToken::new(),
            )
            .await
    );

    assert!(report.is_success());
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.starts_with("High memory usage: 75.0%"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_source() {
    let h = harness(test_config(), &[40.0]);
    let sink = Arc::new(RecordingSink::default());

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(Vec::new())),
                sink.clone(),
                CancellationToken::new(),
            )
            .await
    );

    assert!(matches!(report.outcome, RunOutcome::Empty { fetched: 0 }));
    assert_eq!(report.phase, RunPhase::Empty);
    assert_eq!(report.summary(), "No messages found");
    assert!(!report.is_success());
    assert_eq!(h.stats.snapshot().failed_runs, 1);
    assert!(assert_ok!(report.into_result()).artifacts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_matches_is_empty() {
    let h = harness(test_config(), &[40.0]);
    let sink = Arc::new(RecordingSink::default());

    let mut request = ExportRequest::new("ana", "general");
    request.search = Some("nothing like this".into());

    let report = assert_ok!(
        h.orchestrator
            .run(
                &request,
                Arc::new(MemorySource::new(records(4))),
                sink.clone(),
                CancellationToken::new(),
            )
            .await
    );

    assert!(matches!(report.outcome, RunOutcome::Empty { fetched: 4 }));
    assert_eq!(report.summary(), "No messages matched the filters");
    assert_eq!(report.counters.filtered_out(), 4);
    assert!(sink.parts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_counters_are_conserved() {
    let h = harness(test_config(), &[40.0]);
    let mixed: Vec<RawRecord> = records(6)
        .into_iter()
        .map(|mut r| {
            if r.id.0 % 2 == 0 {
                r.author.roles = vec!["Guest".to_string()];
            }
            r
        })
        .collect();

    let mut request = ExportRequest::new("ana", "general");
    request.role = Some("Member".into());

    let report = assert_ok!(
        h.orchestrator
            .run(
                &request,
                Arc::new(MemorySource::new(mixed)),
                Arc::new(RecordingSink::default()),
                CancellationToken::new(),
            )
            .await
    );

    let counters = report.counters;
    assert_eq!(counters.fetched(), 6);
    assert_eq!(counters.filtered_in(), 3);
    assert_eq!(
        counters.fetched(),
        counters.filtered_in() + counters.filtered_out()
    );
    assert_eq!(h.stats.snapshot().records_processed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_chunk_does_not_stop_run() {
    let h = harness(test_config(), &[40.0]);
    let sink = Arc::new(RecordingSink::failing(&[2]));

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(records(5))),
                sink.clone(),
                CancellationToken::new(),
            )
            .await
    );

    assert!(report.is_success());
    assert_eq!(sink.parts(), vec![vec!["5", "4"], vec!["1"]]);
    assert_eq!(report.counters.chunks_flushed(), 2);
    assert_eq!(report.counters.chunks_failed(), 1);
    assert!(report.warnings.iter().any(|w| w.starts_with("Part 2")));
    assert!(report.summary().ends_with("1 part(s) could not be saved"));
}

#[tokio::test(start_paused = true)]
async fn test_progress_lines_are_emitted() {
    let config = test_config();
    let progress = Arc::new(CapturingProgress::default());
    let h = harness(config, &[40.0]);
    let orchestrator = h.orchestrator.with_progress_sink(progress.clone());

    assert_ok!(
        orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(records(4))),
                Arc::new(RecordingSink::default()),
                CancellationToken::new(),
            )
            .await
    );

    let lines = progress.lines.lock().unwrap().clone();
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|l| l.starts_with("Progress: ")));
    assert!(progress.finished.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_directory_sink_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.export.chunk_size = 3;
    let h = harness(config, &[40.0]);
    let sink = Arc::new(DirectorySink::new(dir.path(), "general", ExportFormat::JsonL));

    let report = assert_ok!(
        h.orchestrator
            .run(
                &ExportRequest::new("ana", "general"),
                Arc::new(MemorySource::new(records(7))),
                sink,
                CancellationToken::new(),
            )
            .await
    );

    assert_eq!(report.artifacts.len(), 3);
    let names: HashSet<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 3);
    for artifact in &report.artifacts {
        assert!(names.contains(&artifact.file_name));
        assert!(artifact.file_name.ends_with(&format!("_part{}.jsonl", artifact.part)));
    }

    let first = report.artifacts.iter().find(|a| a.part == 1).unwrap();
    let content = std::fs::read_to_string(&first.path).unwrap();
    assert_eq!(content.lines().count(), 3);
}
