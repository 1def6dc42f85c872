//! Consumer-side polling of the proxy endpoint.
//!
//! One cycle is `Idle -> InFlight -> Settled`, with `Deferred -> InFlight`
//! when the proxy answers 429 with a `Retry-After`. A new cycle is only
//! scheduled once the previous one has settled, so at most one request is
//! in flight per subscription.

use crate::error::PollError;
use crate::models::{NowPlayingResponse, NowPlayingState};
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polling more often than this is clamped.
pub const MIN_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_DEFERRALS: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest `Retry-After` honoured as a deferral; anything above is a plain failure.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);
const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct PollOptions {
    interval: Duration,
    /// Retries after the first failed attempt of a cycle. 0 disables retries.
    pub retry_count: u32,
    /// How long a successful result counts as fresh for a new subscriber.
    pub stale_time: Duration,
    /// Rate-limit deferrals allowed per cycle before a 429 counts as a failure.
    pub max_deferrals: u32,
    /// Deadline for a single request to the proxy.
    pub request_timeout: Duration,
}

impl PollOptions {
    pub fn new(interval_ms: u64, retry_count: u32) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms).max(MIN_INTERVAL),
            retry_count,
            stale_time: DEFAULT_STALE_TIME,
            max_deferrals: DEFAULT_MAX_DEFERRALS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_MS, DEFAULT_RETRY_COUNT)
    }
}

/// Delay before retry `attempt` (0-indexed): `min(1000 * 2^attempt, 30000)` ms.
pub fn backoff_delay(attempt: u32) -> Duration {
    let ms = 2u64
        .checked_pow(attempt)
        .and_then(|p| p.checked_mul(1000))
        .map_or(MAX_BACKOFF_MS, |ms| ms.min(MAX_BACKOFF_MS));
    Duration::from_millis(ms)
}

/// What the consumer observes.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    /// Last successful state; kept while a new request is in flight or after a failed cycle.
    pub data: Option<NowPlayingState>,
    /// No data yet and the first cycle has not settled.
    pub is_loading: bool,
    /// A cycle is in flight.
    pub is_fetching: bool,
    /// The most recent cycle exhausted its retries.
    pub is_error: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PollResult {
    fn loading() -> Self {
        Self {
            data: None,
            is_loading: true,
            is_fetching: false,
            is_error: false,
            updated_at: None,
        }
    }
}

/// Per-cycle retry bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Backoff retries performed so far.
    pub attempt: u32,
    /// Rate-limit deferrals performed so far.
    pub deferrals: u32,
    pub deferred_until: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Success(NowPlayingState),
    Failure(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub retry: RetryState,
}

struct Cached {
    data: NowPlayingState,
    fetched_at: Instant,
    updated_at: DateTime<Utc>,
}

/// Polls one proxy URL on behalf of a single consumer.
#[derive(Clone)]
pub struct PollingClient {
    http: Client,
    url: String,
    options: PollOptions,
    cache: Arc<Mutex<Option<Cached>>>,
}

impl PollingClient {
    pub fn new(url: impl Into<String>, options: PollOptions) -> Self {
        let http = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });
        Self::with_client(http, url, options)
    }

    pub fn with_client(http: Client, url: impl Into<String>, options: PollOptions) -> Self {
        Self {
            http,
            url: url.into(),
            options,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Last successful state, fresh or not.
    pub fn cached(&self) -> Option<NowPlayingState> {
        self.cache
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|c| c.data.clone()))
    }

    fn cached_entry(&self) -> Option<(NowPlayingState, DateTime<Utc>, bool)> {
        let g = self.cache.lock().ok()?;
        g.as_ref().map(|c| {
            let fresh = c.fetched_at.elapsed() < self.options.stale_time;
            (c.data.clone(), c.updated_at, fresh)
        })
    }

    fn store(&self, data: &NowPlayingState) {
        if let Ok(mut g) = self.cache.lock() {
            *g = Some(Cached {
                data: data.clone(),
                fetched_at: Instant::now(),
                updated_at: Utc::now(),
            });
        }
    }

    /// One request to the proxy.
    async fn fetch_once(&self) -> Result<NowPlayingState, PollError> {
        let resp = self
            .http
            .get(&self.url)
            .timeout(self.options.request_timeout)
            .send()
            .await
            .map_err(PollError::Transport)?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .filter(|d| *d <= MAX_RETRY_AFTER);
            return Err(PollError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }
        let body: NowPlayingResponse = resp
            .json()
            .await
            .map_err(|e| PollError::Decode(e.to_string()))?;
        Ok(NowPlayingState::from(body))
    }

    /// Run a single poll cycle to settlement (or cancellation).
    /// A successful outcome is stored as the client's cached result.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let mut retry = RetryState::default();
        loop {
            let res = tokio::select! {
                _ = cancel.cancelled() => {
                    return CycleReport { outcome: CycleOutcome::Cancelled, retry };
                }
                r = self.fetch_once() => r,
            };

            let wait = match res {
                Ok(state) => {
                    if cancel.is_cancelled() {
                        return CycleReport { outcome: CycleOutcome::Cancelled, retry };
                    }
                    self.store(&state);
                    return CycleReport { outcome: CycleOutcome::Success(state), retry };
                }
                Err(PollError::RateLimited { retry_after: Some(delay) })
                    if retry.deferrals < self.options.max_deferrals
                        && Instant::now().checked_add(delay).is_some() =>
                {
                    retry.deferrals += 1;
                    retry.deferred_until = Instant::now().checked_add(delay);
                    debug!("Rate limited by {}; deferring {:?}", self.url, delay);
                    delay
                }
                Err(e) => {
                    if retry.attempt >= self.options.retry_count {
                        warn!(
                            "Poll of {} failed after {} retries: {}",
                            self.url, retry.attempt, e
                        );
                        return CycleReport { outcome: CycleOutcome::Failure(e.to_string()), retry };
                    }
                    let delay = backoff_delay(retry.attempt);
                    retry.attempt += 1;
                    retry.deferred_until = None;
                    warn!(
                        "Poll attempt {} of {} failed: {}. Retrying in {:?}",
                        retry.attempt, self.url, e, delay
                    );
                    delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    return CycleReport { outcome: CycleOutcome::Cancelled, retry };
                }
                _ = sleep(wait) => {}
            }
        }
    }

    /// Start polling for one consumer. Polling stops when the subscription is dropped.
    pub fn subscribe(&self) -> Subscription {
        let (initial, first_delay) = match self.cached_entry() {
            Some((data, updated_at, true)) => (
                PollResult {
                    data: Some(data),
                    is_loading: false,
                    is_fetching: false,
                    is_error: false,
                    updated_at: Some(updated_at),
                },
                self.options.interval,
            ),
            Some((data, updated_at, false)) => (
                PollResult {
                    data: Some(data),
                    is_loading: false,
                    is_fetching: true,
                    is_error: false,
                    updated_at: Some(updated_at),
                },
                Duration::ZERO,
            ),
            None => (PollResult::loading(), Duration::ZERO),
        };

        let (tx, rx) = watch::channel(initial);
        let cancel = CancellationToken::new();
        let client = self.clone();
        let handle = tokio::spawn(client.run_loop(tx, cancel.clone(), first_delay));
        info!("Polling {} every {:?}", self.url, self.options.interval);
        Subscription { rx, cancel, handle: Some(handle) }
    }

    async fn run_loop(
        self,
        tx: watch::Sender<PollResult>,
        cancel: CancellationToken,
        first_delay: Duration,
    ) {
        let mut delay = first_delay;
        loop {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return;
            }
            tx.send_modify(|r| r.is_fetching = true);

            let report = self.run_cycle(&cancel).await;
            if cancel.is_cancelled() {
                return;
            }
            match report.outcome {
                CycleOutcome::Success(state) => {
                    tx.send_replace(PollResult {
                        data: Some(state),
                        is_loading: false,
                        is_fetching: false,
                        is_error: false,
                        updated_at: Some(Utc::now()),
                    });
                }
                CycleOutcome::Failure(_) => {
                    tx.send_modify(|r| {
                        r.is_loading = false;
                        r.is_fetching = false;
                        r.is_error = true;
                    });
                }
                CycleOutcome::Cancelled => return,
            }
            delay = self.options.interval;
        }
    }
}

/// A consumer's view of a running poll loop.
pub struct Subscription {
    rx: watch::Receiver<PollResult>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn current(&self) -> PollResult {
        self.rx.borrow().clone()
    }

    /// Wait for the next published state. `None` once polling has stopped.
    pub async fn changed(&mut self) -> Option<PollResult> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the published state satisfies `pred`.
    pub async fn wait_for(&mut self, pred: impl FnMut(&PollResult) -> bool) -> Option<PollResult> {
        self.rx.wait_for(pred).await.ok().map(|r| PollResult::clone(&r))
    }

    /// Stop polling and wait for the loop to exit. Nothing is published afterwards.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
