//! Binance venue adapter.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::{basetypes::now_ms, Candle, Error, Interval, Symbol, Ticker};

use super::{decimal, fatal, http_client, optional_decimal, read_json, send, Exchange};

/// The exchange id of the venue.
pub const ID: &str = "binance";

const BASE_URL: &str = "https://api.binance.com";

/// Binance public REST API client.
///
/// Symbols are mangled from `BASE/QUOTE` into the venue's `BASEQUOTE`
/// notation; interval tokens map one to one.
pub struct Binance {
    client: reqwest::Client,
}

impl Binance {
    /// Build the venue client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn connect() -> Result<Self, Error> {
        Ok(Self {
            client: http_client(ID)?,
        })
    }

    fn instrument_id(symbol: &Symbol) -> String {
        format!("{}{}", symbol.base(), symbol.quote())
    }
}

/// One kline row is a heterogeneous array; index 0 is the open time and
/// indexes 1..=5 are stringified open/high/low/close/volume.
fn parse_klines(symbol: &Symbol, interval: Interval, rows: &[Value]) -> Result<Vec<Candle>, Error> {
    rows.iter()
        .map(|row| {
            let timestamp = row
                .get(0)
                .and_then(Value::as_i64)
                .ok_or_else(|| fatal(ID, "kline row without open time"))?;
            let field = |index: usize, name: &str| {
                row.get(index)
                    .and_then(Value::as_str)
                    .ok_or_else(|| fatal(ID, format!("kline row without `{name}`")))
                    .and_then(|raw| decimal(ID, name, raw))
            };

            let candle = Candle {
                exchange: ID.to_owned(),
                symbol: symbol.clone(),
                interval,
                timestamp,
                open: field(1, "open")?,
                high: field(2, "high")?,
                low: field(3, "low")?,
                close: field(4, "close")?,
                volume: field(5, "volume")?,
            }
            .normalize();
            candle
                .validate()
                .map_err(|err| fatal(ID, err.to_string()))?;
            Ok(candle)
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    bid_price: Option<String>,
    ask_price: Option<String>,
    high_price: Option<String>,
    low_price: Option<String>,
    quote_volume: Option<String>,
    price_change_percent: Option<String>,
    close_time: Option<i64>,
}

fn ticker_from_payload(symbol: &Symbol, payload: &Ticker24h) -> Result<Ticker, Error> {
    let ticker = Ticker {
        exchange: ID.to_owned(),
        symbol: symbol.clone(),
        last: decimal(ID, "lastPrice", &payload.last_price)?,
        bid: optional_decimal(ID, "bidPrice", payload.bid_price.as_deref())?,
        ask: optional_decimal(ID, "askPrice", payload.ask_price.as_deref())?,
        high_24h: optional_decimal(ID, "highPrice", payload.high_price.as_deref())?,
        low_24h: optional_decimal(ID, "lowPrice", payload.low_price.as_deref())?,
        volume_24h: optional_decimal(ID, "quoteVolume", payload.quote_volume.as_deref())?,
        change_pct_24h: optional_decimal(
            ID,
            "priceChangePercent",
            payload.price_change_percent.as_deref(),
        )?,
        timestamp: payload.close_time.unwrap_or_else(now_ms),
    };
    ticker
        .validate()
        .map_err(|err| fatal(ID, err.to_string()))?;
    Ok(ticker)
}

#[async_trait]
impl Exchange for Binance {
    fn id(&self) -> &'static str {
        ID
    }

    async fn ping(&self) -> bool {
        let request = self.client.get(format!("{BASE_URL}/api/v3/ping"));
        send(ID, request).await.is_ok()
    }

    #[instrument(skip(self))]
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        interval: Interval,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Candle>, Error> {
        let mut request = self.client.get(format!("{BASE_URL}/api/v3/klines")).query(&[
            ("symbol", Self::instrument_id(symbol)),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ]);
        if let Some(since) = since {
            request = request.query(&[("startTime", since.to_string())]);
        }

        let response = send(ID, request).await?;
        let rows: Vec<Value> = read_json(ID, response).await?;

        parse_klines(symbol, interval, &rows)
    }

    #[instrument(skip(self))]
    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, Error> {
        let request = self
            .client
            .get(format!("{BASE_URL}/api/v3/ticker/24hr"))
            .query(&[("symbol", Self::instrument_id(symbol))]);

        let response = send(ID, request).await?;
        let payload: Ticker24h = read_json(ID, response).await?;

        ticker_from_payload(symbol, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol() -> Symbol {
        "BTC/USDT".parse().unwrap()
    }

    #[test]
    fn instrument_notation() {
        assert_eq!(Binance::instrument_id(&symbol()), "BTCUSDT");
    }

    #[test]
    fn parse_klines_rows() {
        let rows: Vec<Value> = serde_json::from_str(
            r#"[
                [1700000000000, "43000.10000000", "43100.00000000", "42900.00000000",
                 "43050.50000000", "120.4900", 1700003599999, "5187000.00", 1000,
                 "60.2", "2590000.00", "0"],
                [1700003600000, "43050.50000000", "43200.00000000", "43000.00000000",
                 "43150.00000000", "98.1200", 1700007199999, "4230000.00", 900,
                 "49.0", "2110000.00", "0"]
            ]"#,
        )
        .unwrap();

        let candles = parse_klines(&symbol(), Interval::Hour1, &rows).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_700_000_000_000);
        assert_eq!(candles[0].open, "43000.1".parse().unwrap());
        assert_eq!(candles[1].close, "43150".parse().unwrap());
        assert_eq!(candles[1].volume, "98.12".parse().unwrap());
    }

    #[test]
    fn parse_klines_rejects_malformed_rows() {
        let rows: Vec<Value> =
            serde_json::from_str(r#"[["not-a-timestamp", "1", "2", "0.5", "1.5", "10"]]"#).unwrap();
        let err = parse_klines(&symbol(), Interval::Hour1, &rows).unwrap_err();
        assert!(matches!(err, Error::ExchangeFatal { .. }));
    }

    #[test]
    fn ticker_conversion() {
        let payload: Ticker24h = serde_json::from_str(
            r#"{
                "lastPrice": "43050.50",
                "bidPrice": "43050.00",
                "askPrice": "43051.00",
                "highPrice": "43500.00",
                "lowPrice": "42000.00",
                "quoteVolume": "812345678.1234",
                "priceChangePercent": "1.52",
                "closeTime": 1700000000123
            }"#,
        )
        .unwrap();

        let ticker = ticker_from_payload(&symbol(), &payload).unwrap();
        assert_eq!(ticker.last, "43050.50".parse().unwrap());
        assert_eq!(ticker.bid, Some("43050.00".parse().unwrap()));
        assert_eq!(ticker.change_pct_24h, Some("1.52".parse().unwrap()));
        assert_eq!(ticker.timestamp, 1_700_000_000_123);
    }

    #[test]
    fn ticker_without_venue_timestamp_uses_wall_clock() {
        let payload: Ticker24h =
            serde_json::from_str(r#"{"lastPrice": "1.00000000"}"#).unwrap();
        let before = now_ms();
        let ticker = ticker_from_payload(&symbol(), &payload).unwrap();
        assert!(ticker.timestamp >= before);
        assert_eq!(ticker.bid, None);
    }
}
