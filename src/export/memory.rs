//! Memory pressure monitoring
//!
//! The monitor samples memory usage at most once per check interval, keeps a
//! short trailing window of samples to detect upward trends, and classifies
//! the latest sample against warning and critical thresholds. Only a
//! critical reading stops work; warnings are advisory.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::System;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;

/// Share of the warning threshold at which a rising trend is reported
const TREND_NOTICE_RATIO: f64 = 0.8;

/// Source of memory usage readings
pub trait MemoryProbe: Send + Sync {
    /// Current memory usage in percent (0-100)
    fn usage_percent(&self) -> f64;
}

/// Probe reading system memory usage
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn usage_percent(&self) -> f64 {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        system.used_memory() as f64 / total as f64 * 100.0
    }
}

/// Called when the monitor asks for memory to be given back
pub trait ReclaimHook: Send + Sync {
    fn reclaim(&self, usage_percent: f64);
}

/// Reclaim hook that only records the request
pub struct LogReclaim;

impl ReclaimHook for LogReclaim {
    fn reclaim(&self, usage_percent: f64) {
        info!("Memory reclamation requested at {:.1}% usage", usage_percent);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    pub at: Instant,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStatus {
    Ok,
    Warning,
    Critical,
}

/// Verdict of a single check
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCheck {
    pub status: MemoryStatus,
    /// Human-readable message, empty when there is nothing to report
    pub message: String,
    /// `None` when the check was throttled and no sample was taken
    pub usage_percent: Option<f64>,
    pub trending_up: bool,
    pub reclaim_requested: bool,
}

impl MemoryCheck {
    fn throttled() -> Self {
        Self {
            status: MemoryStatus::Ok,
            message: String::new(),
            usage_percent: None,
            trending_up: false,
            reclaim_requested: false,
        }
    }

    /// Whether work may continue
    pub fn is_ok(&self) -> bool {
        self.status != MemoryStatus::Critical
    }
}

/// Memory monitor shared by every run in the process
pub type SharedMemoryMonitor = Arc<Mutex<MemoryMonitor>>;

pub struct MemoryMonitor {
    warning_threshold: f64,
    critical_threshold: f64,
    check_interval: Duration,
    trend_samples: usize,
    history: VecDeque<MemorySample>,
    last_check: Option<Instant>,
    probe: Arc<dyn MemoryProbe>,
    reclaim: Arc<dyn ReclaimHook>,
}

impl MemoryMonitor {
    /// Create a new monitor
    ///
    /// # Arguments
    /// * `config` - Thresholds, interval and trend window length
    /// * `probe` - Source of usage readings
    pub fn new(config: &MemoryConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            warning_threshold: config.warning_threshold,
            critical_threshold: config.critical_threshold,
            check_interval: Duration::from_secs_f64(config.check_interval),
            trend_samples: config.trend_samples.max(1),
            history: VecDeque::with_capacity(config.trend_samples.max(1)),
            last_check: None,
            probe,
            reclaim: Arc::new(LogReclaim),
        }
    }

    /// Replace the reclaim hook
    pub fn with_reclaim_hook(mut self, hook: Arc<dyn ReclaimHook>) -> Self {
        self.reclaim = hook;
        self
    }

    /// Wrap the monitor for sharing across runs
    pub fn shared(self) -> SharedMemoryMonitor {
        Arc::new(Mutex::new(self))
    }

    /// Throttled check
    ///
    /// Returns an empty `Ok` verdict unless the check interval has elapsed
    /// since the previous real check. The first call always samples.
    pub fn check(&mut self) -> MemoryCheck {
        if let Some(last) = self.last_check {
            if last.elapsed() < self.check_interval {
                return MemoryCheck::throttled();
            }
        }
        self.check_now()
    }

    /// Sample and classify immediately
    pub fn check_now(&mut self) -> MemoryCheck {
        let now = Instant::now();
        let percent = self.probe.usage_percent();
        self.last_check = Some(now);

        self.history.push_back(MemorySample { at: now, percent });
        while self.history.len() > self.trend_samples {
            self.history.pop_front();
        }

        let trending_up = self.is_trending_up();
        debug!(
            "Memory usage {:.1}% (trending up: {}, samples: {})",
            percent,
            trending_up,
            self.history.len()
        );

        let (status, message, reclaim) = if percent >= self.critical_threshold {
            (
                MemoryStatus::Critical,
                format!("Critical memory usage: {percent:.1}%"),
                true,
            )
        } else if percent >= self.warning_threshold {
            let mut message = format!("High memory usage: {percent:.1}%");
            if trending_up {
                message.push_str(" (trending up)");
            }
            (MemoryStatus::Warning, message, trending_up)
        } else if trending_up && percent >= self.warning_threshold * TREND_NOTICE_RATIO {
            (
                MemoryStatus::Ok,
                format!("Memory usage trending up: {percent:.1}%"),
                false,
            )
        } else {
            (MemoryStatus::Ok, String::new(), false)
        };

        match status {
            MemoryStatus::Critical | MemoryStatus::Warning => warn!("{}", message),
            MemoryStatus::Ok if !message.is_empty() => info!("{}", message),
            MemoryStatus::Ok => {}
        }

        if reclaim {
            self.reclaim.reclaim(percent);
        }

        MemoryCheck {
            status,
            message,
            usage_percent: Some(percent),
            trending_up,
            reclaim_requested: reclaim,
        }
    }

    /// Whether the trailing window is strictly increasing
    pub fn is_trending_up(&self) -> bool {
        self.history.len() > 1
            && self
                .history
                .iter()
                .zip(self.history.iter().skip(1))
                .all(|(a, b)| b.percent > a.percent)
    }

    pub fn history(&self) -> impl Iterator<Item = &MemorySample> {
        self.history.iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe replaying a fixed sequence, repeating the last value
    pub(crate) struct ScriptedProbe {
        values: Mutex<VecDeque<f64>>,
        last: Mutex<f64>,
    }

    impl ScriptedProbe {
        pub(crate) fn new(values: &[f64]) -> Arc<Self> {
            Arc::new(Self {
                values: Mutex::new(values.iter().copied().collect()),
                last: Mutex::new(0.0),
            })
        }
    }

    impl MemoryProbe for ScriptedProbe {
        fn usage_percent(&self) -> f64 {
            let mut last = self.last.lock().unwrap();
            if let Some(v) = self.values.lock().unwrap().pop_front() {
                *last = v;
            }
            *last
        }
    }

    struct CountingReclaim(AtomicUsize);

    impl ReclaimHook for CountingReclaim {
        fn reclaim(&self, _usage_percent: f64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn unthrottled() -> MemoryConfig {
        MemoryConfig {
            check_interval: 0.0,
            ..MemoryConfig::default()
        }
    }

    #[test]
    fn test_rising_samples_above_warning() {
        let reclaim = Arc::new(CountingReclaim(AtomicUsize::new(0)));
        let mut monitor = MemoryMonitor::new(
            &unthrottled(),
            ScriptedProbe::new(&[71.0, 72.0, 73.0, 74.0, 75.0]),
        )
        .with_reclaim_hook(reclaim.clone());

        let mut last = None;
        for _ in 0..5 {
            last = Some(monitor.check());
        }
        let last = last.unwrap();

        assert_eq!(last.status, MemoryStatus::Warning);
        assert!(last.trending_up);
        assert_eq!(last.message, "High memory usage: 75.0% (trending up)");
        assert!(last.reclaim_requested);
        assert!(last.is_ok());
        assert!(reclaim.0.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_flat_warning_does_not_reclaim() {
        let mut monitor =
            MemoryMonitor::new(&unthrottled(), ScriptedProbe::new(&[75.0, 75.0]));

        monitor.check();
        let check = monitor.check();
        assert_eq!(check.status, MemoryStatus::Warning);
        assert!(!check.trending_up);
        assert!(!check.reclaim_requested);
        assert_eq!(check.message, "High memory usage: 75.0%");
    }

    #[test]
    fn test_critical_sample() {
        let mut monitor = MemoryMonitor::new(&unthrottled(), ScriptedProbe::new(&[90.0]));

        let check = monitor.check();
        assert_eq!(check.status, MemoryStatus::Critical);
        assert_eq!(check.message, "Critical memory usage: 90.0%");
        assert!(!check.is_ok());
        assert!(check.reclaim_requested);
    }

    #[test]
    fn test_trend_notice_below_warning() {
        let mut monitor =
            MemoryMonitor::new(&unthrottled(), ScriptedProbe::new(&[50.0, 57.0, 60.0]));

        monitor.check();
        monitor.check();
        let check = monitor.check();
        assert_eq!(check.status, MemoryStatus::Ok);
        assert_eq!(check.message, "Memory usage trending up: 60.0%");

        let mut calm = MemoryMonitor::new(&unthrottled(), ScriptedProbe::new(&[40.0, 30.0]));
        calm.check();
        assert!(calm.check().message.is_empty());
    }

    #[test]
    fn test_window_is_bounded() {
        let config = MemoryConfig {
            trend_samples: 3,
            ..unthrottled()
        };
        let mut monitor =
            MemoryMonitor::new(&config, ScriptedProbe::new(&[10.0, 20.0, 5.0, 6.0, 7.0]));

        for _ in 0..5 {
            monitor.check();
        }
        assert_eq!(monitor.history().count(), 3);
        assert!(monitor.is_trending_up());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_is_throttled() {
        let config = MemoryConfig {
            check_interval: 60.0,
            ..MemoryConfig::default()
        };
        let mut monitor = MemoryMonitor::new(&config, ScriptedProbe::new(&[90.0, 95.0]));

        assert_eq!(monitor.check().status, MemoryStatus::Critical);

        let skipped = monitor.check();
        assert_eq!(skipped.status, MemoryStatus::Ok);
        assert!(skipped.message.is_empty());
        assert_eq!(skipped.usage_percent, None);

        tokio::time::advance(Duration::from_secs(61)).await;
        let real = monitor.check();
        assert_eq!(real.usage_percent, Some(95.0));

        // check_now bypasses the throttle
        assert!(monitor.check_now().usage_percent.is_some());
    }

    #[test]
    fn test_system_probe_reports_percentage() {
        let usage = SystemMemoryProbe::new().usage_percent();
        assert!((0.0..=100.0).contains(&usage));
    }
}
