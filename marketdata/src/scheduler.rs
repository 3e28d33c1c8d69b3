//! Collection scheduler.
//!
//! Drives periodic candle and ticker collection across every configured
//! `(exchange, symbol, interval)` tuple, fills historical gaps on demand,
//! and coordinates a per-exchange pause gate that suspends all work for a
//! venue that signalled a rate limit.
//!
//! Jobs are independent tokio tasks racing a shutdown channel. A missed
//! fire is skipped, never coalesced into a burst. Long gap fills observe
//! the shutdown signal and the pause gate between batches and never hold a
//! store session across their courtesy sleep.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::{
    sync::{watch, Semaphore},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    basetypes::now_ms,
    exchange::Exchange,
    repository::{CandleRepository, TickerRepository},
    store::CandleStore,
    Error, Interval, Symbol,
};

/// Fire interval of the ticker jobs.
pub const TICKER_INTERVAL: Duration = Duration::from_secs(10);

/// Candles fetched by the periodic tail refresh. Re-fetching the tail keeps
/// overwriting the not-yet-closed candle until it finalizes and tolerates up
/// to that many missed fires; longer outages are handled by gap fill.
pub const TAIL_FETCH_LIMIT: u32 = 10;

/// Largest page requested from a venue during gap fill.
const GAP_BATCH_LIMIT: i64 = 1000;

/// Courtesy throttle between gap-fill batches, independent of the venue's
/// own limiter.
const GAP_BATCH_PAUSE: Duration = Duration::from_secs(1);

const MS_PER_DAY: i64 = 86_400_000;

/// The symbols collected on one exchange.
#[derive(Clone, Debug, Deserialize)]
pub struct ExchangeSymbols {
    /// Exchange id.
    pub id: String,
    /// Trading pairs collected on the exchange.
    pub symbols: Vec<Symbol>,
}

/// Gap-fill settings.
#[derive(Clone, Debug, Deserialize)]
pub struct GapFillConfig {
    /// Whether one gap-fill task per tuple is dispatched at start.
    #[serde(default = "default_gap_fill_enabled")]
    pub enabled: bool,
    /// Days of history the fill reconciles.
    #[serde(default = "default_gap_fill_days")]
    pub days: u32,
    /// Gap-fill tasks allowed to run at once.
    #[serde(default = "default_gap_fill_concurrency")]
    pub concurrency: usize,
}

const fn default_gap_fill_enabled() -> bool {
    true
}

const fn default_gap_fill_days() -> u32 {
    7
}

const fn default_gap_fill_concurrency() -> usize {
    4
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self {
            enabled: default_gap_fill_enabled(),
            days: default_gap_fill_days(),
            concurrency: default_gap_fill_concurrency(),
        }
    }
}

/// Per-exchange suspension state.
///
/// An entry maps an exchange id to the monotonic instant collection may
/// resume. Past-due entries are cleaned lazily on read. Entries are written
/// by jobs observing a rate-limit signal and by the admin surface.
#[derive(Clone, Default)]
pub struct PauseGate {
    inner: Arc<RwLock<HashMap<String, Instant>>>,
}

impl PauseGate {
    /// Whether the exchange is currently gated.
    #[must_use]
    pub fn is_paused(&self, exchange: &str) -> bool {
        let now = Instant::now();
        {
            let inner = self.inner.read();
            match inner.get(exchange) {
                Some(resume_at) if *resume_at > now => return true,
                Some(_) => {}
                None => return false,
            }
        }
        // The pause expired; drop the entry.
        self.inner.write().remove(exchange);
        false
    }

    /// Gate the exchange for the given duration.
    pub fn pause(&self, exchange: &str, duration: Duration) {
        let resume_at = Instant::now() + duration;
        self.inner.write().insert(exchange.to_owned(), resume_at);
        warn!(
            exchange,
            duration_secs = duration.as_secs(),
            "exchange paused"
        );
    }

    /// Lift the gate for the exchange.
    pub fn resume(&self, exchange: &str) {
        if self.inner.write().remove(exchange).is_some() {
            info!(exchange, "exchange resumed");
        }
    }

    /// Currently gated exchanges with the seconds remaining until resume.
    ///
    /// Expired entries are cleaned as a side effect.
    #[must_use]
    pub fn paused(&self) -> Vec<(String, u64)> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        inner.retain(|_, resume_at| *resume_at > now);
        inner
            .iter()
            .map(|(exchange, resume_at)| {
                (exchange.clone(), resume_at.duration_since(now).as_secs())
            })
            .collect()
    }
}

/// All expected timestamps in the window that the store does not hold,
/// ascending. The window starts at `aligned_start` and covers every step up
/// to and including `now`.
fn missing_timestamps(
    aligned_start: i64,
    now: i64,
    step: i64,
    present: &HashSet<i64>,
) -> Vec<i64> {
    let mut missing = Vec::new();
    let mut timestamp = aligned_start;
    while timestamp <= now {
        if !present.contains(&timestamp) {
            missing.push(timestamp);
        }
        timestamp += step;
    }
    missing
}

/// Collapse sorted missing timestamps into maximal contiguous runs. Two
/// timestamps belong to the same run iff they are exactly one step apart.
fn contiguous_runs(missing: &[i64], step: i64) -> Vec<(i64, i64)> {
    let mut runs = Vec::new();
    let Some((&first, rest)) = missing.split_first() else {
        return runs;
    };

    let mut start = first;
    let mut end = first;
    for &timestamp in rest {
        if timestamp == end + step {
            end = timestamp;
        } else {
            runs.push((start, end));
            start = timestamp;
            end = timestamp;
        }
    }
    runs.push((start, end));
    runs
}

/// Rows to request for the remainder of a run, capped at the venue page
/// size.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn batch_limit(since: i64, run_end: i64, step: i64) -> u32 {
    let remaining = (run_end - since) / step + 1;
    remaining.min(GAP_BATCH_LIMIT) as u32
}

/// Periodic collection driver.
///
/// Cheap to clone; all state is shared. One instance is started at boot and
/// handed to the admin surface for on-demand gap fills.
#[derive(Clone)]
pub struct Collector {
    store: CandleStore,
    candles: CandleRepository,
    tickers: TickerRepository,
    clients: Arc<HashMap<String, Arc<dyn Exchange>>>,
    pause: PauseGate,
    gap_slots: Arc<Semaphore>,
    gap_fill: GapFillConfig,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Collector {
    /// Create the collector.
    #[must_use]
    pub fn new(
        store: CandleStore,
        candles: CandleRepository,
        tickers: TickerRepository,
        clients: Arc<HashMap<String, Arc<dyn Exchange>>>,
        gap_fill: GapFillConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            candles,
            tickers,
            clients,
            pause: PauseGate::default(),
            gap_slots: Arc::new(Semaphore::new(gap_fill.concurrency.max(1))),
            gap_fill,
            shutdown: Arc::new(shutdown),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The pause gate shared with the admin surface.
    #[must_use]
    pub const fn pause_gate(&self) -> &PauseGate {
        &self.pause
    }

    /// Register and start the periodic job set.
    ///
    /// One candle job per `(exchange, symbol, interval)` tuple firing every
    /// interval duration, one ticker job per `(exchange, symbol)` firing
    /// every ten seconds. When gap fill is enabled, one fill task per tuple
    /// is dispatched immediately, bounded by the worker semaphore, without
    /// blocking startup.
    pub fn start(&self, exchanges: &[ExchangeSymbols], intervals: &[Interval]) {
        let mut job_count = 0usize;

        for spec in exchanges {
            for symbol in &spec.symbols {
                for &interval in intervals {
                    self.spawn_candle_job(spec.id.clone(), symbol.clone(), interval);
                    job_count += 1;

                    if self.gap_fill.enabled {
                        self.spawn_gap_fill(
                            spec.id.clone(),
                            symbol.clone(),
                            interval,
                            self.gap_fill.days,
                        );
                    }
                }

                self.spawn_ticker_job(spec.id.clone(), symbol.clone());
                job_count += 1;
            }
        }

        info!(
            job_count,
            gap_fill_enabled = self.gap_fill.enabled,
            gap_fill_days = self.gap_fill.days,
            "collector started"
        );
    }

    /// Stop accepting fires and wait for in-flight jobs to finish.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handles: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            let _ = handle.await;
        }
        info!("collector stopped");
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    fn spawn_candle_job(&self, exchange: String, symbol: Symbol, interval: Interval) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut shutdown = this.shutdown.subscribe();
            let period = interval.duration();
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticks.tick() => this.collect_candles(&exchange, &symbol, interval).await,
                    _ = shutdown.changed() => break,
                }
            }
        });
        self.track(handle);
    }

    fn spawn_ticker_job(&self, exchange: String, symbol: Symbol) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut shutdown = this.shutdown.subscribe();
            let mut ticks = tokio::time::interval_at(
                tokio::time::Instant::now() + TICKER_INTERVAL,
                TICKER_INTERVAL,
            );
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticks.tick() => this.collect_ticker(&exchange, &symbol).await,
                    _ = shutdown.changed() => break,
                }
            }
        });
        self.track(handle);
    }

    /// Dispatch one gap-fill task, fire and forget. Used by startup and by
    /// the admin surface; the worker semaphore bounds how many fills run at
    /// once.
    pub fn spawn_gap_fill(&self, exchange: String, symbol: Symbol, interval: Interval, days: u32) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&this.gap_slots).acquire_owned().await else {
                return;
            };
            if let Err(err) = this.fill_gaps(&exchange, &symbol, interval, days).await {
                error!(
                    exchange = %exchange,
                    symbol = %symbol,
                    interval = %interval,
                    error = %err,
                    "gap fill failed"
                );
            }
        });
        self.track(handle);
    }

    #[instrument(skip(self))]
    async fn collect_candles(&self, exchange: &str, symbol: &Symbol, interval: Interval) {
        if self.pause.is_paused(exchange) {
            debug!("candle collection skipped, exchange paused");
            return;
        }
        let Some(client) = self.clients.get(exchange) else {
            error!("candle collection failed, no client for exchange");
            return;
        };

        match client
            .fetch_candles(symbol, interval, None, TAIL_FETCH_LIMIT)
            .await
        {
            Ok(candles) => match self.candles.save(&candles).await {
                Ok(count) => info!(count, "candles collected"),
                Err(err) => error!(error = %err, "candle save failed"),
            },
            Err(Error::RateLimited {
                retry_after_secs, ..
            }) => {
                self.pause
                    .pause(exchange, Duration::from_secs(retry_after_secs));
            }
            Err(err) => error!(error = %err, "candle collection failed"),
        }
    }

    #[instrument(skip(self))]
    async fn collect_ticker(&self, exchange: &str, symbol: &Symbol) {
        if self.pause.is_paused(exchange) {
            debug!("ticker collection skipped, exchange paused");
            return;
        }
        let Some(client) = self.clients.get(exchange) else {
            error!("ticker collection failed, no client for exchange");
            return;
        };

        match client.fetch_ticker(symbol).await {
            Ok(ticker) => {
                if let Err(err) = self.tickers.save(&ticker).await {
                    error!(error = %err, "ticker save failed");
                } else {
                    debug!(last = %ticker.last, "ticker collected");
                }
            }
            Err(Error::RateLimited {
                retry_after_secs, ..
            }) => {
                self.pause
                    .pause(exchange, Duration::from_secs(retry_after_secs));
            }
            Err(err) => error!(error = %err, "ticker collection failed"),
        }
    }

    /// Reconcile the canonical timeline of the last `days` days against the
    /// store and back-fill what is missing, in contiguous runs.
    ///
    /// Per run, pages of at most 1000 candles are fetched and upserted,
    /// advancing past the last returned timestamp, with a one-second
    /// courtesy sleep between remote calls. A run ends early when the venue
    /// returns an empty or short page. A rate-limit signal engages the pause
    /// gate and abandons the whole fill; any other error abandons the
    /// current run and continues with the next. Returns the number of
    /// records written.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange is unknown or the timestamp
    /// projection cannot be read.
    #[instrument(skip(self))]
    pub async fn fill_gaps(
        &self,
        exchange: &str,
        symbol: &Symbol,
        interval: Interval,
        days: u32,
    ) -> Result<u64, Error> {
        if *self.shutdown.borrow() {
            return Ok(0);
        }
        if self.pause.is_paused(exchange) {
            debug!("gap fill skipped, exchange paused");
            return Ok(0);
        }
        let client = self
            .clients
            .get(exchange)
            .ok_or_else(|| Error::UnknownExchange(exchange.to_owned()))?;

        let step = interval.duration_ms();
        let now = now_ms();
        let aligned_start = interval.align_down(now - i64::from(days) * MS_PER_DAY);

        let present = self
            .store
            .timestamps(exchange, symbol, interval, aligned_start)
            .await?;
        let missing = missing_timestamps(aligned_start, now, step, &present);

        if missing.is_empty() {
            debug!(checked_days = days, "no gaps found");
            return Ok(0);
        }

        let runs = contiguous_runs(&missing, step);
        info!(
            missing = missing.len(),
            runs = runs.len(),
            "gap fill planned"
        );

        let mut shutdown = self.shutdown.subscribe();
        let mut total_filled = 0u64;

        for (run_start, run_end) in runs {
            let mut since = run_start;
            while since <= run_end {
                if *shutdown.borrow() {
                    return Ok(total_filled);
                }

                let limit = batch_limit(since, run_end, step);
                let candles = match client
                    .fetch_candles(symbol, interval, Some(since), limit)
                    .await
                {
                    Ok(candles) => candles,
                    Err(Error::RateLimited {
                        retry_after_secs, ..
                    }) => {
                        self.pause
                            .pause(exchange, Duration::from_secs(retry_after_secs));
                        warn!(filled_so_far = total_filled, "gap fill rate limited");
                        return Ok(total_filled);
                    }
                    Err(err) => {
                        // Abandon the run, continue with the next.
                        error!(since, error = %err, "gap batch failed");
                        break;
                    }
                };

                if candles.is_empty() {
                    warn!(since, "venue has no data for gap");
                    break;
                }

                let fetched = candles.len();
                match self.candles.save(&candles).await {
                    Ok(count) => total_filled += count,
                    Err(err) => {
                        error!(since, error = %err, "gap batch save failed");
                        break;
                    }
                }

                // The slice is non-empty, checked above.
                since = candles.last().map_or(run_end + step, |candle| {
                    candle.timestamp + step
                });

                if fetched < limit as usize {
                    // The venue has nothing newer for this run.
                    break;
                }

                tokio::select! {
                    () = tokio::time::sleep(GAP_BATCH_PAUSE) => {}
                    _ = shutdown.changed() => return Ok(total_filled),
                }
            }
        }

        if total_filled > 0 {
            info!(records_filled = total_filled, "gaps filled");
        } else {
            warn!("gap fill wrote no records");
        }
        Ok(total_filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: i64 = 3_600_000;

    #[test]
    fn missing_respects_present_set() {
        let present: HashSet<i64> =
            [0, STEP, 2 * STEP, 4 * STEP, 5 * STEP].into_iter().collect();
        let missing = missing_timestamps(0, 6 * STEP, STEP, &present);
        assert_eq!(missing, vec![3 * STEP, 6 * STEP]);
    }

    #[test]
    fn missing_covers_full_window_when_store_empty() {
        let missing = missing_timestamps(0, 3 * STEP, STEP, &HashSet::new());
        assert_eq!(missing, vec![0, STEP, 2 * STEP, 3 * STEP]);
    }

    #[test]
    fn runs_collapse_adjacent_timestamps() {
        let missing = vec![0, STEP, 2 * STEP, 4 * STEP];
        assert_eq!(
            contiguous_runs(&missing, STEP),
            vec![(0, 2 * STEP), (4 * STEP, 4 * STEP)]
        );
    }

    #[test]
    fn runs_for_isolated_gaps() {
        // The selective-fill shape: holes at 3Δ and 6Δ become two
        // single-element runs.
        let missing = vec![3 * STEP, 6 * STEP];
        assert_eq!(
            contiguous_runs(&missing, STEP),
            vec![(3 * STEP, 3 * STEP), (6 * STEP, 6 * STEP)]
        );
    }

    #[test]
    fn runs_empty_input() {
        assert!(contiguous_runs(&[], STEP).is_empty());
    }

    #[test]
    fn batch_limit_counts_inclusive_remainder() {
        assert_eq!(batch_limit(0, 0, STEP), 1);
        assert_eq!(batch_limit(0, 9 * STEP, STEP), 10);
        assert_eq!(batch_limit(5 * STEP, 9 * STEP, STEP), 5);
    }

    #[test]
    fn batch_limit_caps_at_page_size() {
        assert_eq!(batch_limit(0, 5000 * STEP, STEP), 1000);
    }

    #[test]
    fn pause_gate_blocks_until_resume_time() {
        let gate = PauseGate::default();
        assert!(!gate.is_paused("okx"));

        gate.pause("okx", Duration::from_secs(30));
        assert!(gate.is_paused("okx"));
        assert!(!gate.is_paused("binance"));

        let paused = gate.paused();
        assert_eq!(paused.len(), 1);
        assert_eq!(paused[0].0, "okx");

        gate.resume("okx");
        assert!(!gate.is_paused("okx"));
    }

    #[test]
    fn pause_gate_expires() {
        let gate = PauseGate::default();
        gate.pause("okx", Duration::from_millis(10));
        assert!(gate.is_paused("okx"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(!gate.is_paused("okx"));
        assert!(gate.paused().is_empty());
    }
}
