//! Repositories over the store, the cache and the exchange adapters.
//!
//! The candle repository owns store/cache coherence: writes go to the store
//! first and are then written through to the cache, reads consult the cache
//! before the store. The ticker repository has no store at all; the cache is
//! authoritative for tickers, bounded by its TTL, and misses fall through to
//! the venue.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use tracing::{debug, instrument, warn};

use crate::{
    cache::Cache, exchange::Exchange, store::CandleStore, Candle, Error, Interval, Symbol, Ticker,
};

/// Largest number of candles a single read returns.
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Largest limit the cache is consulted for; bigger reads (and every cursor
/// continuation) go straight to the store.
pub const CACHE_QUERY_LIMIT: u32 = 500;

/// Candle reads and writes with write-through caching.
#[derive(Clone)]
pub struct CandleRepository {
    store: CandleStore,
    cache: Cache,
}

impl CandleRepository {
    /// Create the repository.
    #[must_use]
    pub const fn new(store: CandleStore, cache: Cache) -> Self {
        Self { store, cache }
    }

    /// Upsert candles into the store, then write through to the cache.
    ///
    /// The cache write happens after the store commit and its failure is
    /// swallowed: the store is the system of record and must not be gated by
    /// cache availability.
    ///
    /// # Errors
    ///
    /// Returns an error if the store upsert fails.
    #[instrument(skip(self, candles), fields(count = candles.len()))]
    pub async fn save(&self, candles: &[Candle]) -> Result<u64, Error> {
        let count = self.store.upsert(candles).await?;

        if let Err(err) = self.cache.put_candles(candles).await {
            warn!(error = %err, "candle cache write failed");
        }

        Ok(count)
    }

    /// Cache-first read with cursor pagination.
    ///
    /// The limit is clamped to `[1, 1000]`. The cache is skipped when a
    /// cursor is present or the limit exceeds 500. A non-empty cache hit is
    /// returned as-is even when it covers less than the requested window;
    /// callers that need guaranteed completeness force the store by passing
    /// a cursor or a larger limit. Cache errors never fail the read.
    ///
    /// Returns the candles in ascending timestamp order, the cursor of the
    /// next page if one exists, and whether the result came from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self))]
    pub async fn find(
        &self,
        exchange: &str,
        symbol: &Symbol,
        interval: Interval,
        start: Option<i64>,
        end: Option<i64>,
        cursor: Option<i64>,
        limit: u32,
    ) -> Result<(Vec<Candle>, Option<i64>, bool), Error> {
        let limit = limit.clamp(1, MAX_QUERY_LIMIT);

        if cursor.is_none() && limit <= CACHE_QUERY_LIMIT {
            match self
                .cache
                .range_candles(exchange, symbol, interval, start, end, limit)
                .await
            {
                Ok(candles) if !candles.is_empty() => {
                    debug!(count = candles.len(), "candle cache hit");
                    return Ok((candles, None, true));
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "candle cache read failed"),
            }
        }

        let (candles, next_cursor) = self
            .store
            .query(exchange, symbol, interval, start, end, cursor, limit)
            .await?;

        Ok((candles, next_cursor, false))
    }
}

/// Ticker reads with cache-through to the venue.
#[derive(Clone)]
pub struct TickerRepository {
    cache: Cache,
    clients: Arc<HashMap<String, Arc<dyn Exchange>>>,
}

impl TickerRepository {
    /// Create the repository.
    #[must_use]
    pub const fn new(cache: Cache, clients: Arc<HashMap<String, Arc<dyn Exchange>>>) -> Self {
        Self { cache, clients }
    }

    /// Store a ticker in the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache write fails.
    pub async fn save(&self, ticker: &Ticker) -> Result<(), Error> {
        self.cache.put_ticker(ticker).await
    }

    /// Cache-first ticker read.
    ///
    /// On a miss the venue is queried and the result written back; a failed
    /// write-back is swallowed since the ticker itself is already in hand.
    /// Returns the ticker and whether it came from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown exchange or a failed venue call.
    #[instrument(skip(self))]
    pub async fn find(&self, exchange: &str, symbol: &Symbol) -> Result<(Ticker, bool), Error> {
        match self.cache.get_ticker(exchange, symbol).await {
            Ok(Some(ticker)) => return Ok((ticker, true)),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "ticker cache read failed"),
        }

        let client = self
            .clients
            .get(exchange)
            .ok_or_else(|| Error::UnknownExchange(exchange.to_owned()))?;
        let ticker = client.fetch_ticker(symbol).await?;

        if let Err(err) = self.cache.put_ticker(&ticker).await {
            warn!(error = %err, "ticker cache write failed");
        }

        Ok((ticker, false))
    }

    /// Sequential per-symbol lookup; failures do not abort the batch.
    ///
    /// Returns the tickers that resolved and, per failed symbol, the error
    /// message.
    #[instrument(skip(self, symbols), fields(count = symbols.len()))]
    pub async fn find_all(
        &self,
        exchange: &str,
        symbols: &[Symbol],
    ) -> (BTreeMap<String, Ticker>, Vec<(String, String)>) {
        let mut tickers = BTreeMap::new();
        let mut errors = Vec::new();

        for symbol in symbols {
            match self.find(exchange, symbol).await {
                Ok((ticker, _)) => {
                    tickers.insert(symbol.to_string(), ticker);
                }
                Err(err) => errors.push((symbol.to_string(), err.to_string())),
            }
        }

        (tickers, errors)
    }
}
