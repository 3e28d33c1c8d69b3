//! OKX venue adapter.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use crate::{basetypes::now_ms, Candle, Error, Interval, Symbol, Ticker};

use super::{
    decimal, fatal, http_client, optional_decimal, read_json, send, Exchange,
    DEFAULT_RETRY_AFTER_SECS,
};

/// The exchange id of the venue.
pub const ID: &str = "okx";

const BASE_URL: &str = "https://www.okx.com";

/// Largest page the candles endpoint serves.
const MAX_PAGE: u32 = 300;

/// Venue error code for a breached request rate.
const CODE_RATE_LIMIT: &str = "50011";

/// OKX public REST API client.
///
/// Symbols are mangled from `BASE/QUOTE` into the venue's `BASE-QUOTE`
/// instrument ids. Candle rows arrive newest first and are reversed on
/// ingest. Every response is wrapped in a `code`/`msg` envelope that is
/// checked before the payload is used.
pub struct Okx {
    client: reqwest::Client,
}

impl Okx {
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
        format!("{}-{}", symbol.base(), symbol.quote())
    }

    /// The venue's bar token for an interval. Hour and day bars are
    /// upper-case; day and longer use the UTC-aligned variants. OKX has no
    /// 8-hour bar.
    const fn bar(interval: Interval) -> Option<&'static str> {
        match interval {
            Interval::Min1 => Some("1m"),
            Interval::Min3 => Some("3m"),
            Interval::Min5 => Some("5m"),
            Interval::Min15 => Some("15m"),
            Interval::Min30 => Some("30m"),
            Interval::Hour1 => Some("1H"),
            Interval::Hour2 => Some("2H"),
            Interval::Hour4 => Some("4H"),
            Interval::Hour6 => Some("6H"),
            Interval::Hour8 => None,
            Interval::Hour12 => Some("12H"),
            Interval::Day1 => Some("1Dutc"),
            Interval::Day3 => Some("3Dutc"),
            Interval::Week1 => Some("1Wutc"),
            Interval::Month1 => Some("1Mutc"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<T>,
}

fn check_envelope<T>(envelope: Envelope<T>) -> Result<Vec<T>, Error> {
    if envelope.code == "0" {
        return Ok(envelope.data);
    }
    if envelope.code == CODE_RATE_LIMIT {
        return Err(Error::RateLimited {
            exchange: ID.to_owned(),
            retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
        });
    }
    Err(fatal(
        ID,
        format!("code {}: {}", envelope.code, envelope.msg),
    ))
}

/// Candle rows are string arrays `[ts, open, high, low, close, vol, ..]`,
/// newest first. Rows older than `since` are dropped, the rest reversed
/// into ascending order and capped at `limit`.
fn parse_rows(
    symbol: &Symbol,
    interval: Interval,
    rows: &[Vec<String>],
    since: Option<i64>,
    limit: u32,
) -> Result<Vec<Candle>, Error> {
    let mut candles = rows
        .iter()
        .map(|row| {
            if row.len() < 6 {
                return Err(fatal(ID, format!("short candle row: {} fields", row.len())));
            }
            let timestamp = row[0]
                .parse::<i64>()
                .map_err(|err| fatal(ID, format!("bad candle timestamp `{}`: {err}", row[0])))?;
            let candle = Candle {
                exchange: ID.to_owned(),
                symbol: symbol.clone(),
                interval,
                timestamp,
                open: decimal(ID, "open", &row[1])?,
                high: decimal(ID, "high", &row[2])?,
                low: decimal(ID, "low", &row[3])?,
                close: decimal(ID, "close", &row[4])?,
                volume: decimal(ID, "vol", &row[5])?,
            }
            .normalize();
            candle
                .validate()
                .map_err(|err| fatal(ID, err.to_string()))?;
            Ok(candle)
        })
        .filter(|candle| match (candle, since) {
            (Ok(candle), Some(since)) => candle.timestamp >= since,
            _ => true,
        })
        .collect::<Result<Vec<_>, _>>()?;

    candles.reverse();
    candles.truncate(limit as usize);
    Ok(candles)
}

#[derive(Debug, Default, Deserialize)]
struct TickerPayload {
    last: String,
    #[serde(rename = "bidPx")]
    bid_px: Option<String>,
    #[serde(rename = "askPx")]
    ask_px: Option<String>,
    #[serde(rename = "high24h")]
    high_24h: Option<String>,
    #[serde(rename = "low24h")]
    low_24h: Option<String>,
    #[serde(rename = "volCcy24h")]
    vol_ccy_24h: Option<String>,
    #[serde(rename = "open24h")]
    open_24h: Option<String>,
    ts: Option<String>,
}

fn ticker_from_payload(symbol: &Symbol, payload: &TickerPayload) -> Result<Ticker, Error> {
    let last = decimal(ID, "last", &payload.last)?;
    let open_24h = optional_decimal(ID, "open24h", payload.open_24h.as_deref())?;
    // The venue reports no 24h percentage; derive it from the 24h open.
    let change_pct_24h = open_24h
        .filter(|open| !open.is_zero())
        .map(|open| ((last - open) / open * Decimal::ONE_HUNDRED).round_dp(4));
    let timestamp = payload
        .ts
        .as_deref()
        .and_then(|ts| ts.parse::<i64>().ok())
        .unwrap_or_else(now_ms);

    let ticker = Ticker {
        exchange: ID.to_owned(),
        symbol: symbol.clone(),
        last,
        bid: optional_decimal(ID, "bidPx", payload.bid_px.as_deref())?,
        ask: optional_decimal(ID, "askPx", payload.ask_px.as_deref())?,
        high_24h: optional_decimal(ID, "high24h", payload.high_24h.as_deref())?,
        low_24h: optional_decimal(ID, "low24h", payload.low_24h.as_deref())?,
        volume_24h: optional_decimal(ID, "volCcy24h", payload.vol_ccy_24h.as_deref())?,
        change_pct_24h,
        timestamp,
    };
    ticker
        .validate()
        .map_err(|err| fatal(ID, err.to_string()))?;
    Ok(ticker)
}

#[async_trait]
impl Exchange for Okx {
    fn id(&self) -> &'static str {
        ID
    }

    async fn ping(&self) -> bool {
        let request = self.client.get(format!("{BASE_URL}/api/v5/public/time"));
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
        let Some(bar) = Self::bar(interval) else {
            return Err(fatal(ID, format!("no `{interval}` bar on this venue")));
        };

        let page = limit.min(MAX_PAGE);
        let mut request = self
            .client
            .get(format!("{BASE_URL}/api/v5/market/candles"))
            .query(&[
                ("instId", Self::instrument_id(symbol)),
                ("bar", bar.to_owned()),
                ("limit", page.to_string()),
            ]);
        if let Some(since) = since {
            // The endpoint pages newest-first with an exclusive upper bound;
            // bounding at `since + page * duration` yields the page that
            // starts at `since` once reversed.
            let after = since + i64::from(page) * interval.duration_ms();
            request = request.query(&[("after", after.to_string())]);
        }

        let response = send(ID, request).await?;
        let envelope: Envelope<Vec<String>> = read_json(ID, response).await?;
        let rows = check_envelope(envelope)?;

        parse_rows(symbol, interval, &rows, since, page)
    }

    #[instrument(skip(self))]
    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, Error> {
        let request = self
            .client
            .get(format!("{BASE_URL}/api/v5/market/ticker"))
            .query(&[("instId", Self::instrument_id(symbol))]);

        let response = send(ID, request).await?;
        let envelope: Envelope<TickerPayload> = read_json(ID, response).await?;
        let payload = check_envelope(envelope)?
            .into_iter()
            .next()
            .ok_or_else(|| fatal(ID, "empty ticker payload"))?;

        ticker_from_payload(symbol, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol() -> Symbol {
        "ETH/USDT".parse().unwrap()
    }

    #[test]
    fn instrument_notation() {
        assert_eq!(Okx::instrument_id(&symbol()), "ETH-USDT");
    }

    #[test]
    fn bar_tokens() {
        assert_eq!(Okx::bar(Interval::Min15), Some("15m"));
        assert_eq!(Okx::bar(Interval::Hour4), Some("4H"));
        assert_eq!(Okx::bar(Interval::Day1), Some("1Dutc"));
        assert_eq!(Okx::bar(Interval::Hour8), None);
    }

    #[test]
    fn rows_reverse_into_ascending_order() {
        let rows = vec![
            vec![
                "1700003600000".to_owned(),
                "2302".to_owned(),
                "2310".to_owned(),
                "2295".to_owned(),
                "2305".to_owned(),
                "512.3".to_owned(),
            ],
            vec![
                "1700000000000".to_owned(),
                "2300".to_owned(),
                "2305".to_owned(),
                "2290".to_owned(),
                "2302".to_owned(),
                "498.7".to_owned(),
            ],
        ];

        let candles = parse_rows(&symbol(), Interval::Hour1, &rows, None, 10).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[0].open, "2300".parse().unwrap());
    }

    #[test]
    fn rows_older_than_since_are_dropped() {
        let rows = vec![
            vec![
                "1700003600000".to_owned(),
                "2302".to_owned(),
                "2310".to_owned(),
                "2295".to_owned(),
                "2305".to_owned(),
                "512.3".to_owned(),
            ],
            vec![
                "1700000000000".to_owned(),
                "2300".to_owned(),
                "2305".to_owned(),
                "2290".to_owned(),
                "2302".to_owned(),
                "498.7".to_owned(),
            ],
        ];

        let candles =
            parse_rows(&symbol(), Interval::Hour1, &rows, Some(1_700_003_600_000), 10).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, 1_700_003_600_000);
    }

    #[test]
    fn envelope_rate_limit_code() {
        let envelope: Envelope<Vec<String>> = serde_json::from_str(
            r#"{"code": "50011", "msg": "Too Many Requests", "data": []}"#,
        )
        .unwrap();
        let err = check_envelope(envelope).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[test]
    fn ticker_derives_change_pct() {
        let payload: TickerPayload = serde_json::from_str(
            r#"{
                "last": "2310",
                "bidPx": "2309.9",
                "askPx": "2310.1",
                "high24h": "2350",
                "low24h": "2250",
                "volCcy24h": "123456.78",
                "open24h": "2200",
                "ts": "1700000000456"
            }"#,
        )
        .unwrap();

        let ticker = ticker_from_payload(&symbol(), &payload).unwrap();
        assert_eq!(ticker.change_pct_24h, Some("5".parse().unwrap()));
        assert_eq!(ticker.timestamp, 1_700_000_000_456);
    }
}
