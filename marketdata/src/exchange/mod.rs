//! Exchange adapters.
//!
//! One adapter instance per configured exchange id, all behind the
//! [`Exchange`] trait. Adapters translate per-venue payloads into the domain
//! types and normalize every remote failure into one of three kinds before
//! returning: [`Error::RateLimited`], [`Error::ExchangeTransient`] or
//! [`Error::ExchangeFatal`]. Callers never see raw venue or transport
//! errors.
//!
//! Numeric values enter the domain by parsing the venue's string form with
//! [`Decimal::from_str`], so no binary float drift occurs.

use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::{Candle, Error, Interval, Symbol, Ticker};

mod binance;
pub use binance::Binance;

mod okx;
pub use okx::Okx;

/// Seconds to back off when a venue rate-limits without a `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Unified access to one venue's public market data.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// The configured exchange id.
    fn id(&self) -> &'static str;

    /// Check the venue connection.
    async fn ping(&self) -> bool;

    /// Fetch at most `limit` candles starting at or after `since`, in
    /// ascending timestamp order.
    ///
    /// # Errors
    ///
    /// Returns a normalized adapter error.
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        interval: Interval,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Candle>, Error>;

    /// Fetch the current quote snapshot of the pair.
    ///
    /// # Errors
    ///
    /// Returns a normalized adapter error.
    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, Error>;
}

/// Build the adapter for a configured exchange id.
///
/// # Errors
///
/// Returns an error if the id is not a supported venue or the HTTP client
/// cannot be built.
pub fn connect(id: &str) -> Result<Arc<dyn Exchange>, Error> {
    match id {
        binance::ID => Ok(Arc::new(Binance::connect()?)),
        okx::ID => Ok(Arc::new(Okx::connect()?)),
        _ => Err(Error::UnknownExchange(id.to_owned())),
    }
}

fn http_client(exchange: &'static str) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|err| Error::ExchangeFatal {
            exchange: exchange.to_owned(),
            cause: format!("failed to build HTTP client: {err}"),
        })
}

fn transient(exchange: &str, cause: impl Into<String>) -> Error {
    Error::ExchangeTransient {
        exchange: exchange.to_owned(),
        cause: cause.into(),
    }
}

fn fatal(exchange: &str, cause: impl Into<String>) -> Error {
    Error::ExchangeFatal {
        exchange: exchange.to_owned(),
        cause: cause.into(),
    }
}

fn retry_after(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Send a request and normalize transport and status failures.
///
/// 429 (and 418, which Binance uses for bans) map to a rate-limit signal
/// carrying the venue's `Retry-After`; 5xx to a transient error; any other
/// client error to a fatal one.
async fn send(
    exchange: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, Error> {
    let response = request
        .send()
        .await
        .map_err(|err| transient(exchange, err.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::IM_A_TEAPOT
    {
        return Err(Error::RateLimited {
            exchange: exchange.to_owned(),
            retry_after_secs: retry_after(&response),
        });
    }
    if status.is_server_error() {
        return Err(transient(exchange, format!("HTTP {status}")));
    }
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(fatal(exchange, format!("HTTP {status}: {body}")));
    }

    Ok(response)
}

async fn read_json<T: DeserializeOwned>(
    exchange: &str,
    response: reqwest::Response,
) -> Result<T, Error> {
    response
        .json()
        .await
        .map_err(|err| fatal(exchange, format!("malformed response: {err}")))
}

fn decimal(exchange: &str, field: &str, raw: &str) -> Result<Decimal, Error> {
    Decimal::from_str(raw)
        .map_err(|err| fatal(exchange, format!("bad decimal in `{field}`: `{raw}` ({err})")))
}

fn optional_decimal(
    exchange: &str,
    field: &str,
    raw: Option<&str>,
) -> Result<Option<Decimal>, Error> {
    raw.filter(|raw| !raw.is_empty())
        .map(|raw| decimal(exchange, field, raw))
        .transpose()
}
