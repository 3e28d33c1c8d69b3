//! Redis cache for candles and tickers.
//!
//! Two namespaces:
//!
//! - `ohlcv:{exchange}:{symbol}:{interval}` — a sorted set of serialized
//!   candles scored by open timestamp, trimmed to a fixed number of newest
//!   entries per key, no TTL.
//! - `ticker:{exchange}:{symbol}` — a single serialized ticker with a TTL.
//!   The residual TTL doubles as the age measurement exposed by the API.
//!
//! All operations are best effort from the caller's point of view: the store
//! is the system of record for candles, and a cache failure must never fail
//! a read that the store can serve.

use std::collections::HashMap;

use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::Deserialize;
use tracing::instrument;

use crate::{Candle, Error, Interval, Symbol, Ticker};

/// The default number of candles kept per cache key.
pub const DEFAULT_OHLCV_CACHE_SIZE: usize = 500;
/// The default ticker TTL in seconds.
pub const DEFAULT_TICKER_TTL_SECS: u64 = 10;

/// The configuration for the cache.
///
/// The fields are deserialized from a configuration file using the `serde`
/// crate. The `url` may be overridden by the environment at load time; see
/// the server configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL.
    pub url: String,
    /// Maximum candles kept per `(exchange, symbol, interval)` key.
    #[serde(default = "default_ohlcv_cache_size")]
    pub ohlcv_cache_size: usize,
    /// Ticker TTL in seconds.
    #[serde(default = "default_ticker_ttl")]
    pub ticker_ttl_seconds: u64,
}

const fn default_ohlcv_cache_size() -> usize {
    DEFAULT_OHLCV_CACHE_SIZE
}

const fn default_ticker_ttl() -> u64 {
    DEFAULT_TICKER_TTL_SECS
}

/// Cache over a shared, pipelined Redis connection.
///
/// Cloning is cheap; the connection manager multiplexes and reconnects
/// internally.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    ohlcv_cache_size: usize,
    ticker_ttl_secs: u64,
}

fn ohlcv_key(exchange: &str, symbol: &Symbol, interval: Interval) -> String {
    format!("ohlcv:{exchange}:{symbol}:{interval}")
}

fn ticker_key(exchange: &str, symbol: &Symbol) -> String {
    format!("ticker:{exchange}:{symbol}")
}

impl Cache {
    /// Connect to the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    #[instrument(skip(config))]
    pub async fn connect(config: &CacheConfig) -> Result<Self, Error> {
        let client = Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            ohlcv_cache_size: config.ohlcv_cache_size,
            ticker_ttl_secs: config.ticker_ttl_seconds,
        })
    }

    /// The configured ticker TTL in seconds.
    #[must_use]
    pub const fn ticker_ttl_secs(&self) -> u64 {
        self.ticker_ttl_secs
    }

    /// Add candles to their per-tuple sorted sets and trim each set to the
    /// configured size, evicting the lowest timestamps first.
    ///
    /// # Errors
    ///
    /// Returns an error if a candle cannot be serialized or the pipeline
    /// fails.
    #[instrument(skip(self, candles), fields(count = candles.len()))]
    pub async fn put_candles(&self, candles: &[Candle]) -> Result<(), Error> {
        if candles.is_empty() {
            return Ok(());
        }

        let mut by_key: HashMap<String, Vec<&Candle>> = HashMap::new();
        for candle in candles {
            let key = ohlcv_key(&candle.exchange, &candle.symbol, candle.interval);
            by_key.entry(key).or_default().push(candle);
        }

        let mut pipe = redis::pipe();
        for (key, group) in &by_key {
            for candle in group {
                let member = serde_json::to_string(candle)
                    .map_err(|err| Error::CacheCodec(Box::new(err)))?;
                pipe.zadd(key, member, candle.timestamp).ignore();
            }
            #[allow(clippy::cast_possible_wrap)]
            pipe.zremrangebyrank(key, 0, -(self.ohlcv_cache_size as isize + 1))
                .ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Range read by timestamp, ascending, capped at `limit` entries.
    ///
    /// Missing bounds default to the full range of the set.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or a cached entry cannot be
    /// decoded.
    #[allow(clippy::cast_possible_wrap)]
    #[instrument(skip(self))]
    pub async fn range_candles(
        &self,
        exchange: &str,
        symbol: &Symbol,
        interval: Interval,
        start: Option<i64>,
        end: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Candle>, Error> {
        let key = ohlcv_key(exchange, symbol, interval);
        let min = start.map_or_else(|| "-inf".to_owned(), |v| v.to_string());
        let max = end.map_or_else(|| "+inf".to_owned(), |v| v.to_string());

        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .zrangebyscore_limit(key, min, max, 0, limit as isize)
            .await?;

        members
            .iter()
            .map(|member| {
                serde_json::from_str(member).map_err(|err| Error::CacheCodec(Box::new(err)))
            })
            .collect()
    }

    /// Store a ticker under its key with the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticker cannot be serialized or the command
    /// fails.
    #[instrument(skip(self, ticker), fields(exchange = %ticker.exchange, symbol = %ticker.symbol))]
    pub async fn put_ticker(&self, ticker: &Ticker) -> Result<(), Error> {
        let key = ticker_key(&ticker.exchange, &ticker.symbol);
        let value =
            serde_json::to_string(ticker).map_err(|err| Error::CacheCodec(Box::new(err)))?;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, self.ticker_ttl_secs)
            .await?;
        Ok(())
    }

    /// Read a ticker; `None` when the key is absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the cached entry cannot be
    /// decoded.
    #[instrument(skip(self))]
    pub async fn get_ticker(
        &self,
        exchange: &str,
        symbol: &Symbol,
    ) -> Result<Option<Ticker>, Error> {
        let key = ticker_key(exchange, symbol);
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;

        value
            .map(|value| {
                serde_json::from_str(&value).map_err(|err| Error::CacheCodec(Box::new(err)))
            })
            .transpose()
    }

    /// Age of a cached ticker in milliseconds, derived from the residual TTL.
    ///
    /// This measures time in cache, not venue age: the full TTL minus the
    /// remaining TTL. `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    #[allow(clippy::cast_possible_wrap)]
    #[instrument(skip(self))]
    pub async fn ticker_age_ms(
        &self,
        exchange: &str,
        symbol: &Symbol,
    ) -> Result<Option<i64>, Error> {
        let key = ticker_key(exchange, symbol);
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(key).await?;

        if ttl > 0 {
            let age_secs = (self.ticker_ttl_secs as i64 - ttl).max(0);
            Ok(Some(age_secs * 1000))
        } else {
            Ok(None)
        }
    }

    /// Check the cache connection.
    pub async fn health(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
