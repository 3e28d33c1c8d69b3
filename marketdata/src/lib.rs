#![allow(clippy::doc_markdown, clippy::multiple_crate_versions)]
//! # marketdata
//!
//! ## Overview
//!
//! Marketdata is the collection core of a market-data service for
//! cryptocurrency exchanges. For each configured tuple of
//! `(exchange, symbol, interval)` it periodically pulls candlestick (OHLCV)
//! history into a PostgreSQL store and ticker snapshots into a Redis cache,
//! and serves both back through repositories with cursor pagination.
//!
//! Price values are handled as
//! [`Decimal`](https://crates.io/crates/rust_decimal) values throughout and
//! serialized as strings, so the data round-trips without rounding errors.
//!
//! The library uses the [SQLx](https://crates.io/crates/sqlx) crate for
//! database access and [redis](https://crates.io/crates/redis) for the
//! cache.
//!
//! ## Data model
//!
//! The data model mainly consists of the following types:
//!
//! - [`Candle`]: One OHLCV interval summary of a trading pair.
//! - [`Ticker`]: The most recent quote snapshot of a trading pair.
//! - [`Interval`]: A candle interval from the closed set `1m` to `1M`.
//! - [`Symbol`]: A validated `BASE/QUOTE` trading pair.
//!
//! Candles live in a single `ohlcv` table keyed by
//! `(exchange, symbol, interval, timestamp)`; a write on an existing key
//! overwrites the price and volume fields, so collection is idempotent.
//! Tickers are never persisted; the cache holds them under a freshness TTL.
//!
//! ## Collection
//!
//! The [`scheduler::Collector`] registers one candle job per configured
//! tuple, firing at the tuple's own interval, and one ticker job per pair,
//! firing every ten seconds. Every job consults a per-exchange pause gate
//! before calling out; when a venue signals a rate limit, the gate suspends
//! all work for that venue until the advertised resume time.
//!
//! Historical holes are repaired by gap fill: the canonical set of expected
//! open times for a window is reconciled against the store, the missing
//! timestamps are collapsed into contiguous runs, and only those runs are
//! fetched, batch by batch, with a courtesy throttle between calls.

mod basetypes;
pub use basetypes::{now_ms, Interval, Symbol};

pub mod cache;
pub use cache::Cache;

mod candle;
pub use candle::{Candle, PRICE_SCALE, VOLUME_SCALE};

mod error;
pub use error::Error;

pub mod exchange;
pub use exchange::Exchange;

pub mod repository;
pub use repository::{CandleRepository, TickerRepository};

pub mod scheduler;
pub use scheduler::Collector;

pub mod store;
pub use store::CandleStore;

mod ticker;
pub use ticker::Ticker;
