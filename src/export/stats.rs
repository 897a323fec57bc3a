//! Process-wide export statistics
//!
//! Every admitted run reports its terminal outcome exactly once through
//! [`StatisticsSink::record_run`]. [`ExportStatistics::snapshot`] turns the
//! counters into a status view; [`ExportStatistics::snapshot_with`] adds the
//! admission state of a registry.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use super::registry::ExportRegistry;
use crate::utils::number::group_thousands;
use crate::utils::time::format_uptime;

/// Receives the outcome of every finished run
pub trait StatisticsSink: Send + Sync {
    /// # Arguments
    /// * `success` - Whether the run completed with at least one record exported
    /// * `records_processed` - Records that passed the filters, counted whatever the outcome
    fn record_run(&self, success: bool, records_processed: u64);

    /// Remember the message of the latest failure
    fn record_error(&self, _message: &str) {}
}

#[derive(Debug, Default)]
struct Counters {
    total_runs: u64,
    successful_runs: u64,
    failed_runs: u64,
    records_processed: u64,
    last_error: Option<String>,
    last_run_at: Option<DateTime<Utc>>,
}

/// In-memory statistics for the current process
pub struct ExportStatistics {
    started: Instant,
    counters: Mutex<Counters>,
}

/// Point-in-time view of the statistics
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime: String,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Percentage of successful runs, 0 when nothing ran yet
    pub success_rate: f64,
    pub records_processed: u64,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Whether new runs are refused for maintenance
    pub maintenance: bool,
}

impl ExportStatistics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = self.lock();
        let success_rate = if counters.total_runs > 0 {
            counters.successful_runs as f64 / counters.total_runs as f64 * 100.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime: format_uptime(self.uptime()),
            total_runs: counters.total_runs,
            successful_runs: counters.successful_runs,
            failed_runs: counters.failed_runs,
            success_rate,
            records_processed: counters.records_processed,
            last_error: counters.last_error.clone(),
            last_run_at: counters.last_run_at,
            maintenance: false,
        }
    }

    /// Snapshot including the maintenance flag of `registry`
    pub fn snapshot_with(&self, registry: &ExportRegistry) -> StatsSnapshot {
        StatsSnapshot {
            maintenance: registry.is_maintenance(),
            ..self.snapshot()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ExportStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsSink for ExportStatistics {
    fn record_run(&self, success: bool, records_processed: u64) {
        let mut counters = self.lock();
        counters.total_runs += 1;
        counters.records_processed += records_processed;
        if success {
            counters.successful_runs += 1;
        } else {
            counters.failed_runs += 1;
        }
        counters.last_run_at = Some(Utc::now());
    }

    fn record_error(&self, message: &str) {
        self.lock().last_error = Some(message.to_string());
    }
}

impl StatsSnapshot {
    /// Multi-line human-readable summary
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("Uptime: {}", self.uptime),
            format!(
                "Exports: {} total, {} successful, {} failed ({:.1}% success)",
                group_thousands(self.total_runs),
                group_thousands(self.successful_runs),
                group_thousands(self.failed_runs),
                self.success_rate
            ),
            format!("Messages exported: {}", group_thousands(self.records_processed)),
        ];
        if self.maintenance {
            lines.push("Maintenance mode: on".to_string());
        }
        if let Some(ref error) = self.last_error {
            lines.push(format!("Last error: {error}"));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::export::memory::MemoryMonitor;
    use crate::export::memory::tests::ScriptedProbe;

    #[test]
    fn test_empty_snapshot() {
        let stats = ExportStatistics::new();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_runs, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.uptime, "0d 0h 0m");
    }

    #[test]
    fn test_record_runs() {
        let stats = ExportStatistics::new();
        stats.record_run(true, 120);
        stats.record_run(true, 30);
        stats.record_run(false, 0);
        stats.record_error("Operation timed out after 5 retries");
        stats.record_run(false, 10);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_runs, 4);
        assert_eq!(snapshot.successful_runs, 2);
        assert_eq!(snapshot.failed_runs, 2);
        // Records of unsuccessful runs still count
        assert_eq!(snapshot.records_processed, 160);
        assert_eq!(snapshot.success_rate, 50.0);
        assert!(snapshot.last_run_at.is_some());

        let text = snapshot.render();
        assert!(text.contains("4 total, 2 successful, 2 failed (50.0% success)"));
        assert!(text.contains("Messages exported: 160"));
        assert!(text.contains("Last error: Operation timed out after 5 retries"));
        assert!(!text.contains("Maintenance"));
    }

    #[test]
    fn test_snapshot_reports_maintenance() {
        let config = Config::default();
        let memory = MemoryMonitor::new(&config.memory, ScriptedProbe::new(&[40.0])).shared();
        let registry = ExportRegistry::new(&config, memory);
        let stats = ExportStatistics::new();

        assert!(!stats.snapshot_with(&registry).maintenance);

        registry.set_maintenance(true);
        let snapshot = stats.snapshot_with(&registry);
        assert!(snapshot.maintenance);
        assert!(snapshot.render().contains("Maintenance mode: on"));
        assert!(!stats.snapshot().maintenance);
    }
}
