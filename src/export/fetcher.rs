//! Paginated fetching with retry and pacing
//!
//! [`PaginatedFetcher`] walks a [`RecordSource`] backwards page by page,
//! retrying failed requests through the [`RetryPolicy`] and sleeping between
//! batches so the source's rate limits are respected.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::error::FetchError;

use super::record::{RawRecord, RecordId};
use super::retry::{RetryPolicy, with_retry};
use super::source::RecordSource;

/// Paging and pacing settings
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Records requested per page
    pub page_size: usize,
    /// Pacing delay per batch fetched so far
    pub rate_limit_delay: Duration,
    /// Upper bound of the pacing delay
    pub rate_limit_cap: Duration,
    /// Timeout of a single request
    pub timeout: Duration,
    /// Attempt budget of a single request
    pub max_retries: u32,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.export.page_size,
            rate_limit_delay: config.rate_limit_delay(),
            rate_limit_cap: config.rate_limit_cap(),
            timeout: config.request_timeout(),
            max_retries: config.export.max_retries,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Notified after every successfully fetched batch
pub trait FetchObserver: Send + Sync {
    /// # Arguments
    /// * `fetched` - Records in this batch
    /// * `total` - Records fetched so far
    fn on_batch(&self, fetched: usize, total: u64);
}

/// Result of a single page step
#[derive(Debug)]
pub enum PageStep {
    Records(Vec<RawRecord>),
    Exhausted,
    Cancelled,
}

/// Everything fetched by [`PaginatedFetcher::collect_all`]
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub batches: u32,
    pub cancelled: bool,
}

/// Finite, non-restartable walk over a paginated source
pub struct PaginatedFetcher {
    source: Arc<dyn RecordSource>,
    settings: FetchSettings,
    policy: RetryPolicy,
    observer: Option<Arc<dyn FetchObserver>>,
    cursor: Option<RecordId>,
    batches: u32,
    total_fetched: u64,
    exhausted: bool,
}

impl PaginatedFetcher {
    /// Create a new fetcher positioned at the newest record
    pub fn new(source: Arc<dyn RecordSource>, settings: FetchSettings, policy: RetryPolicy) -> Self {
        Self {
            source,
            settings,
            policy,
            observer: None,
            cursor: None,
            batches: 0,
            total_fetched: 0,
            exhausted: false,
        }
    }

    /// Attach a batch observer
    pub fn with_observer(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn total_fetched(&self) -> u64 {
        self.total_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page
    ///
    /// Cancellation is observed before the request and during the pacing
    /// sleep. Once exhausted, every further call returns [`PageStep::Exhausted`].
    ///
    /// # Arguments
    /// * `cancel` - Cancellation token of the run
    ///
    /// # Returns
    /// * `Result<PageStep, FetchError>` - Next records, end of stream, or cancellation
    pub async fn next_page(&mut self, cancel: &CancellationToken) -> Result<PageStep, FetchError> {
        if self.exhausted {
            return Ok(PageStep::Exhausted);
        }
        if cancel.is_cancelled() {
            return Ok(PageStep::Cancelled);
        }

        let source = self.source.as_ref();
        let before = self.cursor;
        let limit = self.settings.page_size;

        let page = with_retry(
            &self.policy,
            self.settings.max_retries,
            self.settings.timeout,
            cancel,
            move || source.list_page(before, limit),
        )
        .await?;

        let Some(page) = page else {
            return Ok(PageStep::Cancelled);
        };

        let Some(last) = page.records.last() else {
            debug!(
                "Source exhausted after {} records in {} batches",
                self.total_fetched, self.batches
            );
            self.exhausted = true;
            return Ok(PageStep::Exhausted);
        };

        self.cursor = Some(last.id);
        self.batches += 1;
        self.total_fetched += page.records.len() as u64;
        debug!(
            "Fetched batch #{} of {} records (total: {})",
            self.batches,
            page.records.len(),
            self.total_fetched
        );

        if let Some(ref observer) = self.observer {
            observer.on_batch(page.records.len(), self.total_fetched);
        }

        if page.next_cursor.is_none() {
            self.exhausted = true;
        } else {
            let pause = self
                .settings
                .rate_limit_delay
                .saturating_mul(self.batches)
                .min(self.settings.rate_limit_cap);
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Pacing sleep interrupted by cancellation");
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        Ok(PageStep::Records(page.records))
    }

    /// Drive the fetcher to the end and materialize every record
    ///
    /// # Arguments
    /// * `cancel` - Cancellation token of the run
    ///
    /// # Returns
    /// * `Result<FetchOutcome, FetchError>` - Records fetched in order, or terminal error
    pub async fn collect_all(&mut self, cancel: &CancellationToken) -> Result<FetchOutcome, FetchError> {
        let mut outcome = FetchOutcome::default();

        loop {
            match self.next_page(cancel).await? {
                PageStep::Records(records) => outcome.records.extend(records),
                PageStep::Exhausted => break,
                PageStep::Cancelled => {
                    outcome.cancelled = true;
                    break;
                }
            }
        }

        outcome.batches = self.batches;
        Ok(outcome)
    }

    /// Expose the remaining records as a lazy stream
    ///
    /// The stream ends on exhaustion or cancellation and yields the terminal
    /// error if the retry policy gives up.
    pub fn into_stream(
        self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<RawRecord, FetchError>> {
        stream::try_unfold(self, move |mut fetcher| {
            let cancel = cancel.clone();
            async move {
                match fetcher.next_page(&cancel).await? {
                    PageStep::Records(records) => Ok(Some((records, fetcher))),
                    PageStep::Exhausted | PageStep::Cancelled => Ok(None),
                }
            }
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, FetchError>)))
        .try_flatten()
    }
}
