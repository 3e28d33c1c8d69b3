use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Symbol};

/// Represents the most recent quote snapshot of a trading pair.
///
/// A ticker carries the last traded price and, when the venue reports them,
/// the current bid/ask and the rolling 24-hour statistics. Tickers are never
/// persisted to the relational store; they live in the cache, bounded by a
/// freshness TTL, and are overwritten by every successful poll.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Ticker {
    /// Exchange the snapshot was taken from
    pub exchange: String,
    /// Trading pair of the snapshot
    pub symbol: Symbol,
    /// Last traded price
    pub last: Decimal,
    /// Best bid, if reported
    pub bid: Option<Decimal>,
    /// Best ask, if reported
    pub ask: Option<Decimal>,
    /// 24-hour high, if reported
    pub high_24h: Option<Decimal>,
    /// 24-hour low, if reported
    pub low_24h: Option<Decimal>,
    /// 24-hour volume in quote currency, if reported
    pub volume_24h: Option<Decimal>,
    /// 24-hour change in percent, if reported
    pub change_pct_24h: Option<Decimal>,
    /// Snapshot time in UTC milliseconds; the venue's clock when provided,
    /// the local wall clock at fetch otherwise
    pub timestamp: i64,
}

impl Ticker {
    /// Checks the quote bounds of the ticker.
    ///
    /// # Errors
    ///
    /// Returns an error if both bid and ask are present and the bid exceeds
    /// the ask.
    pub fn validate(&self) -> Result<(), Error> {
        if let (Some(bid), Some(ask)) = (self.bid, self.ask) {
            if bid > ask {
                return Err(Error::InvalidTicker(format!("bid {bid} above ask {ask}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker() -> Ticker {
        Ticker {
            exchange: "binance".to_owned(),
            symbol: "ETH/USDT".parse().unwrap(),
            last: "2301.55".parse().unwrap(),
            bid: Some("2301.50".parse().unwrap()),
            ask: Some("2301.60".parse().unwrap()),
            high_24h: Some("2350".parse().unwrap()),
            low_24h: Some("2250.01".parse().unwrap()),
            volume_24h: Some("98765.4321".parse().unwrap()),
            change_pct_24h: None,
            timestamp: 1_700_000_123_456,
        }
    }

    #[test]
    fn serde_round_trip() {
        let original = ticker();
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"2301.55\""));
        assert!(json.contains("\"change_pct_24h\":null"));
        let parsed: Ticker = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn validate_quote_bounds() {
        assert!(ticker().validate().is_ok());

        let mut crossed = ticker();
        crossed.bid = Some("2302".parse().unwrap());
        assert!(crossed.validate().is_err());

        // One-sided books are fine.
        let mut one_sided = ticker();
        one_sided.ask = None;
        assert!(one_sided.validate().is_ok());
    }
}
