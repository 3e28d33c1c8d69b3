//! PostgreSQL candle store.
//!
//! One table, `ohlcv`, keyed by the identity tuple
//! `(exchange, symbol, interval, timestamp)`. A unique constraint enforces
//! the identity; a composite index serves both the range read and the
//! timestamp projection used by gap filling. Pagination is cursor based
//! (strictly-greater-than lower bound on the timestamp), which stays stable
//! under concurrent writes where offset paging would not.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use tracing::{info, instrument};

use crate::{Candle, Error, Interval, Symbol};

/// The default number of pooled connections.
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// The configuration for the candle store.
///
/// The fields are deserialized from a configuration file using the `serde`
/// crate. The `url` may be overridden by the environment at load time; see
/// the server configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Size of the connection pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

const fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

/// Candle store over a PostgreSQL connection pool.
///
/// Cloning is cheap; the pool is shared. Connections are held only for the
/// duration of a single statement.
#[derive(Clone, Debug)]
pub struct CandleStore {
    pool: PgPool,
}

const SELECT_COLUMNS: &str =
    r#"exchange, symbol, "interval", "timestamp", open, high, low, close, volume"#;

type CandleRow = (
    String,
    String,
    String,
    i64,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
);

fn candle_from_row(row: CandleRow) -> Result<Candle, Error> {
    let (exchange, symbol, interval, timestamp, open, high, low, close, volume) = row;
    Ok(Candle {
        exchange,
        symbol: symbol.parse::<Symbol>()?,
        interval: interval.parse::<Interval>()?,
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    })
}

impl CandleStore {
    /// Connect to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be established.
    #[instrument(skip(config))]
    pub async fn connect(config: &StoreConfig) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|err| Error::SqlConnect(Box::new(err)))?;

        Ok(Self { pool })
    }

    /// Initialize the candle schema.
    ///
    /// The statements are idempotent; running them against an initialized
    /// database is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema could not be created.
    #[instrument(skip(self))]
    pub async fn init_schema(&self) -> Result<(), Error> {
        info!("initializing candle schema");
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS ohlcv (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                exchange VARCHAR(32) NOT NULL,
                symbol VARCHAR(32) NOT NULL,
                "interval" VARCHAR(8) NOT NULL,
                "timestamp" BIGINT NOT NULL,
                open DECIMAL(18, 8) NOT NULL,
                high DECIMAL(18, 8) NOT NULL,
                low DECIMAL(18, 8) NOT NULL,
                close DECIMAL(18, 8) NOT NULL,
                volume DECIMAL(18, 4) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                CONSTRAINT uq_ohlcv_key UNIQUE (exchange, symbol, "interval", "timestamp")
            )"#,
        )
        .execute(&self.pool)
        .await
        .map_err(|err| Error::SqlSchema(Box::new(err)))?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_ohlcv_lookup
                ON ohlcv (exchange, symbol, "interval", "timestamp")"#,
        )
        .execute(&self.pool)
        .await
        .map_err(|err| Error::SqlSchema(Box::new(err)))?;

        Ok(())
    }

    /// Batch upsert candles on their identity key.
    ///
    /// The whole batch is a single statement: it either commits completely
    /// or fails completely. On conflict the price and volume fields are
    /// overwritten, so replaying a batch is idempotent and the last write
    /// for an identity wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    #[instrument(skip(self, candles), fields(count = candles.len()))]
    pub async fn upsert(&self, candles: &[Candle]) -> Result<u64, Error> {
        if candles.is_empty() {
            return Ok(0);
        }

        let mut query = QueryBuilder::<Postgres>::new(
            r#"INSERT INTO ohlcv
             (exchange, symbol, "interval", "timestamp", open, high, low, close, volume) "#,
        );
        query.push_values(candles, |mut row, candle| {
            row.push_bind(&candle.exchange)
                .push_bind(candle.symbol.as_str())
                .push_bind(candle.interval.to_string())
                .push_bind(candle.timestamp)
                .push_bind(candle.open)
                .push_bind(candle.high)
                .push_bind(candle.low)
                .push_bind(candle.close)
                .push_bind(candle.volume);
        });
        query.push(
            r#" ON CONFLICT (exchange, symbol, "interval", "timestamp") DO UPDATE SET
             open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low,
             close = EXCLUDED.close, volume = EXCLUDED.volume"#,
        );

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(|err| Error::SqlUpsert(Box::new(err)))?;

        Ok(result.rows_affected())
    }

    /// Range query with cursor pagination.
    ///
    /// `start` and `end` are inclusive bounds on the timestamp; `cursor` is a
    /// strictly-greater-than lower bound. Rows come back in ascending
    /// timestamp order. One extra row beyond `limit` is fetched to decide
    /// whether a next page exists; when it does, the returned cursor is the
    /// timestamp of the last kept row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self))]
    pub async fn query(
        &self,
        exchange: &str,
        symbol: &Symbol,
        interval: Interval,
        start: Option<i64>,
        end: Option<i64>,
        cursor: Option<i64>,
        limit: u32,
    ) -> Result<(Vec<Candle>, Option<i64>), Error> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {SELECT_COLUMNS} FROM ohlcv WHERE exchange = "
        ));
        query.push_bind(exchange);
        query.push(" AND symbol = ");
        query.push_bind(symbol.as_str());
        query.push(r#" AND "interval" = "#);
        query.push_bind(interval.to_string());
        if let Some(start) = start {
            query.push(r#" AND "timestamp" >= "#);
            query.push_bind(start);
        }
        if let Some(end) = end {
            query.push(r#" AND "timestamp" <= "#);
            query.push_bind(end);
        }
        if let Some(cursor) = cursor {
            query.push(r#" AND "timestamp" > "#);
            query.push_bind(cursor);
        }
        query.push(r#" ORDER BY "timestamp" ASC LIMIT "#);
        query.push_bind(i64::from(limit) + 1);

        let rows: Vec<CandleRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| Error::SqlSelect(Box::new(err)))?;

        let has_more = rows.len() > limit as usize;
        let mut candles = rows
            .into_iter()
            .map(candle_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        if has_more {
            candles.truncate(limit as usize);
        }

        let next_cursor = if has_more {
            candles.last().map(|candle| candle.timestamp)
        } else {
            None
        };

        Ok((candles, next_cursor))
    }

    /// Project the stored timestamps of a tuple at or after `since_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self))]
    pub async fn timestamps(
        &self,
        exchange: &str,
        symbol: &Symbol,
        interval: Interval,
        since_ms: i64,
    ) -> Result<HashSet<i64>, Error> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"SELECT "timestamp" FROM ohlcv
             WHERE exchange = $1 AND symbol = $2 AND "interval" = $3 AND "timestamp" >= $4"#,
        )
        .bind(exchange)
        .bind(symbol.as_str())
        .bind(interval.to_string())
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| Error::SqlSelect(Box::new(err)))?;

        Ok(rows.into_iter().map(|(timestamp,)| timestamp).collect())
    }

    /// Check the database connection.
    pub async fn health(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
