//! Display-only estimate of the number of records a run will touch
//!
//! Recent records are sampled page by page and the matching share is
//! extrapolated over the requested time span, assuming the sample covers
//! about a week. The figure only feeds the progress bar.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;

use super::filter::FilterPipeline;
use super::record::RawRecord;
use super::source::RecordSource;

/// Estimate used when the sample says nothing useful
pub const DEFAULT_ESTIMATE: u64 = 1000;

const SAMPLE_WINDOW_DAYS: i64 = 7;

/// Sampling settings of the estimate
#[derive(Debug, Clone)]
pub struct EstimateSettings {
    /// Records to sample
    pub sample_size: usize,
    /// Records requested per sample page
    pub page_size: usize,
    /// Timeout of a single sample request
    pub timeout: Duration,
    /// Upper bound of the estimate
    pub cap: u64,
}

impl EstimateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sample_size: config.export.estimate_sample_size,
            page_size: config.export.page_size.max(1),
            timeout: config.request_timeout(),
            cap: config.export.estimate_cap,
        }
    }
}

/// Estimate the number of records a run will process
///
/// Every sample request is bounded by the request timeout and abandoned as
/// soon as `cancel` fires. Failures are not retried; they fall back to
/// [`DEFAULT_ESTIMATE`].
///
/// # Arguments
/// * `source` - Source to sample
/// * `pipeline` - Filters of the run (author and date checks are applied)
/// * `settings` - Sample size, paging and timeout
/// * `cancel` - Cancellation token of the run
///
/// # Returns
/// * `u64` - Estimated total, never below the matching sample count
pub async fn estimate_total(
    source: &dyn RecordSource,
    pipeline: &FilterPipeline,
    settings: &EstimateSettings,
    cancel: &CancellationToken,
) -> u64 {
    estimate_total_at(source, pipeline, settings, cancel, Utc::now()).await
}

pub(crate) async fn estimate_total_at(
    source: &dyn RecordSource,
    pipeline: &FilterPipeline,
    settings: &EstimateSettings,
    cancel: &CancellationToken,
    now: DateTime<Utc>,
) -> u64 {
    let Some(sample) = collect_sample(source, settings, cancel).await else {
        return DEFAULT_ESTIMATE;
    };

    let range = pipeline.spec().date_range;
    let count = sample
        .iter()
        .filter(|r| pipeline.matches_author(r) && range.contains(r.created_at.date_naive()))
        .count() as u64;

    if count == 0 {
        return DEFAULT_ESTIMATE;
    }

    let Some(oldest) = sample.iter().map(|r| r.created_at).min() else {
        return DEFAULT_ESTIMATE;
    };

    let end = range
        .to
        .map(|d| d.and_time(NaiveTime::MIN).and_utc() + ChronoDuration::days(1))
        .unwrap_or(now);
    let start = range
        .from
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(oldest);

    let span = (end - start).num_seconds().max(0) as f64;
    let window = ChronoDuration::days(SAMPLE_WINDOW_DAYS).num_seconds() as f64;
    let extrapolated = (count as f64 * span / window) as u64;

    let estimate = extrapolated.max(count).min(settings.cap);
    debug!(
        "Estimated {} records from {} matching samples over {:.1} days",
        estimate,
        count,
        span / 86_400.0
    );
    estimate
}

/// Page through the newest records until the sample is full
///
/// Returns `None` when cancelled or when a request fails or times out.
async fn collect_sample(
    source: &dyn RecordSource,
    settings: &EstimateSettings,
    cancel: &CancellationToken,
) -> Option<Vec<RawRecord>> {
    let mut sample = Vec::new();
    let mut cursor = None;

    while sample.len() < settings.sample_size {
        if cancel.is_cancelled() {
            return None;
        }

        let limit = settings.page_size.min(settings.sample_size - sample.len());
        let request = tokio::time::timeout(settings.timeout, source.list_page(cursor, limit));
        let page = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Estimate sample interrupted by cancellation");
                return None;
            }
            result = request => match result {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    warn!("Could not sample records for the estimate: {}", e.message);
                    return None;
                }
                Err(_) => {
                    warn!(
                        "Estimate sample exceeded {:.1}s, using the default",
                        settings.timeout.as_secs_f64()
                    );
                    return None;
                }
            },
        };

        let done = page.records.is_empty() || page.next_cursor.is_none();
        cursor = page.next_cursor;
        sample.extend(page.records);
        if done {
            break;
        }
    }

    Some(sample)
}
