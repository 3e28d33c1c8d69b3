use std::{error::Error as StdError, fmt};

/// Error type.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum Error {
    /// Failed to connect to the database.
    SqlConnect(Box<sqlx::Error>),
    /// Failed to initialize the database schema.
    SqlSchema(Box<sqlx::Error>),
    /// Failed to upsert candles.
    SqlUpsert(Box<sqlx::Error>),
    /// Failed to select rows.
    SqlSelect(Box<sqlx::Error>),
    /// Cache command failed.
    Cache(Box<redis::RedisError>),
    /// Failed to serialize or deserialize a cached record.
    CacheCodec(Box<serde_json::Error>),
    /// The venue signalled that its rate limit was exceeded.
    RateLimited {
        /// Exchange id the signal came from.
        exchange: String,
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },
    /// A venue call failed in a way that is expected to succeed on retry.
    ExchangeTransient {
        /// Exchange id the call was made against.
        exchange: String,
        /// Description of the failure.
        cause: String,
    },
    /// A venue call failed in a way that retrying will not fix, such as an
    /// unknown instrument or a malformed response.
    ExchangeFatal {
        /// Exchange id the call was made against.
        exchange: String,
        /// Description of the failure.
        cause: String,
    },
    /// The exchange id is not configured.
    UnknownExchange(String),
    /// The symbol is not of the form `BASE/QUOTE`.
    SymbolFormat(String),
    /// The interval token is not in the supported set.
    IntervalFormat(String),
    /// A candle violated its price/volume bounds.
    InvalidCandle(String),
    /// A ticker violated its bid/ask bounds.
    InvalidTicker(String),
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::SqlConnect(err)
            | Self::SqlSchema(err)
            | Self::SqlUpsert(err)
            | Self::SqlSelect(err) => Some(err.as_ref()),
            Self::Cache(err) => Some(err.as_ref()),
            Self::CacheCodec(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SqlConnect(err) => {
                write!(f, "failed to connect to the database: {err}")
            }
            Self::SqlSchema(err) => {
                write!(f, "failed to initialize the schema: {err}")
            }
            Self::SqlUpsert(err) => {
                write!(f, "failed to upsert candles: {err}")
            }
            Self::SqlSelect(err) => {
                write!(f, "failed to select rows: {err}")
            }
            Self::Cache(err) => {
                write!(f, "cache command failed: {err}")
            }
            Self::CacheCodec(err) => {
                write!(f, "failed to encode cached record: {err}")
            }
            Self::RateLimited {
                exchange,
                retry_after_secs,
            } => {
                write!(
                    f,
                    "rate limit exceeded for `{exchange}`, retry after {retry_after_secs}s"
                )
            }
            Self::ExchangeTransient { exchange, cause } => {
                write!(f, "transient error from `{exchange}`: {cause}")
            }
            Self::ExchangeFatal { exchange, cause } => {
                write!(f, "fatal error from `{exchange}`: {cause}")
            }
            Self::UnknownExchange(exchange) => {
                write!(f, "unknown exchange: `{exchange}`")
            }
            Self::SymbolFormat(symbol) => {
                write!(f, "invalid symbol `{symbol}`, expected BASE/QUOTE")
            }
            Self::IntervalFormat(interval) => {
                write!(f, "invalid interval: `{interval}`")
            }
            Self::InvalidCandle(detail) => {
                write!(f, "invalid candle: {detail}")
            }
            Self::InvalidTicker(detail) => {
                write!(f, "invalid ticker: {detail}")
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    #[inline]
    fn from(err: sqlx::Error) -> Self {
        Self::SqlSelect(Box::new(err))
    }
}

impl From<redis::RedisError> for Error {
    #[inline]
    fn from(err: redis::RedisError) -> Self {
        Self::Cache(Box::new(err))
    }
}
