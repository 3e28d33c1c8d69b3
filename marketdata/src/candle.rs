use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Interval, Symbol};

/// Represents one candle (OHLCV) of a trading pair on an exchange.
///
/// A candle summarizes the trades of a single interval: the open, high, low
/// and close prices and the traded volume. `timestamp` is the open time of
/// the interval in UTC milliseconds, aligned to an exact multiple of the
/// interval's duration.
///
/// The identity of a candle is the tuple
/// `(exchange, symbol, interval, timestamp)`; writes on the same identity
/// replace the price and volume fields.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Candle {
    /// Exchange the candle was collected from
    pub exchange: String,
    /// Trading pair of the candle
    pub symbol: Symbol,
    /// Interval of the candle
    pub interval: Interval,
    /// Open time of the candle in UTC milliseconds
    pub timestamp: i64,
    /// Open price of the candle in quote currency
    pub open: Decimal,
    /// High price of the candle in quote currency
    pub high: Decimal,
    /// Low price of the candle in quote currency
    pub low: Decimal,
    /// Close price of the candle in quote currency
    pub close: Decimal,
    /// Volume of the candle
    pub volume: Decimal,
}

/// Fractional digits kept for prices.
pub const PRICE_SCALE: u32 = 8;
/// Fractional digits kept for volumes.
pub const VOLUME_SCALE: u32 = 4;

impl Candle {
    /// Checks the price and volume bounds of the candle.
    ///
    /// # Errors
    ///
    /// Returns an error if `low > high`, if `open` or `close` fall outside
    /// `[low, high]`, or if the volume is negative.
    pub fn validate(&self) -> Result<(), Error> {
        if self.low > self.high {
            return Err(Error::InvalidCandle(format!(
                "low {} above high {}",
                self.low, self.high
            )));
        }
        if self.open < self.low || self.open > self.high {
            return Err(Error::InvalidCandle(format!(
                "open {} outside [{}, {}]",
                self.open, self.low, self.high
            )));
        }
        if self.close < self.low || self.close > self.high {
            return Err(Error::InvalidCandle(format!(
                "close {} outside [{}, {}]",
                self.close, self.low, self.high
            )));
        }
        if self.volume.is_sign_negative() {
            return Err(Error::InvalidCandle(format!(
                "negative volume {}",
                self.volume
            )));
        }
        Ok(())
    }

    /// Rounds prices to [`PRICE_SCALE`] and the volume to [`VOLUME_SCALE`]
    /// fractional digits, matching the precision of the relational store.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.open = self.open.round_dp(PRICE_SCALE);
        self.high = self.high.round_dp(PRICE_SCALE);
        self.low = self.low.round_dp(PRICE_SCALE);
        self.close = self.close.round_dp(PRICE_SCALE);
        self.volume = self.volume.round_dp(VOLUME_SCALE);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle() -> Candle {
        Candle {
            exchange: "binance".to_owned(),
            symbol: "BTC/USDT".parse().unwrap(),
            interval: Interval::Hour1,
            timestamp: 1_700_000_000_000 - 1_700_000_000_000 % 3_600_000,
            open: "43000.12345678".parse().unwrap(),
            high: "43500.5".parse().unwrap(),
            low: "42800".parse().unwrap(),
            close: "43210.87654321".parse().unwrap(),
            volume: "1234.5678".parse().unwrap(),
        }
    }

    #[test]
    fn serde_round_trip_preserves_precision() {
        let original = candle();
        let json = serde_json::to_string(&original).unwrap();
        // Decimals travel as strings so no binary float drift can occur.
        assert!(json.contains("\"43000.12345678\""));
        assert!(json.contains("\"1234.5678\""));
        let parsed: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn validate_bounds() {
        assert!(candle().validate().is_ok());

        let mut bad = candle();
        bad.low = "44000".parse().unwrap();
        assert!(bad.validate().is_err());

        let mut bad = candle();
        bad.close = "50000".parse().unwrap();
        assert!(bad.validate().is_err());

        let mut bad = candle();
        bad.volume = "-1".parse().unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn normalize_rounds_to_store_precision() {
        let mut raw = candle();
        raw.open = "43000.123456789999".parse().unwrap();
        raw.volume = "10.00005".parse().unwrap();
        let normalized = raw.normalize();
        assert_eq!(normalized.open, "43000.12345679".parse().unwrap());
        assert_eq!(normalized.volume, "10.0001".parse().unwrap());
    }
}
