use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::Error;

/// The candle interval.
///
/// Intervals are used to group trades into candles of a fixed duration. The
/// set is closed; venues that do not support an element report it as a fatal
/// error on fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "3m")]
    Min3,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "6h")]
    Hour6,
    #[serde(rename = "8h")]
    Hour8,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "3d")]
    Day3,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

impl Interval {
    /// All intervals, shortest first.
    pub const ALL: [Self; 15] = [
        Self::Min1,
        Self::Min3,
        Self::Min5,
        Self::Min15,
        Self::Min30,
        Self::Hour1,
        Self::Hour2,
        Self::Hour4,
        Self::Hour6,
        Self::Hour8,
        Self::Hour12,
        Self::Day1,
        Self::Day3,
        Self::Week1,
        Self::Month1,
    ];

    /// Get the duration of the interval in milliseconds.
    ///
    /// `1M` is 30 days. True month boundaries would require calendar math;
    /// the value is only used to align timestamps, and the identity key of a
    /// stored candle is always the venue's reported open time.
    #[must_use]
    pub const fn duration_ms(self) -> i64 {
        match self {
            Self::Min1 => MINUTE_MS,
            Self::Min3 => 3 * MINUTE_MS,
            Self::Min5 => 5 * MINUTE_MS,
            Self::Min15 => 15 * MINUTE_MS,
            Self::Min30 => 30 * MINUTE_MS,
            Self::Hour1 => HOUR_MS,
            Self::Hour2 => 2 * HOUR_MS,
            Self::Hour4 => 4 * HOUR_MS,
            Self::Hour6 => 6 * HOUR_MS,
            Self::Hour8 => 8 * HOUR_MS,
            Self::Hour12 => 12 * HOUR_MS,
            Self::Day1 => DAY_MS,
            Self::Day3 => 3 * DAY_MS,
            Self::Week1 => 7 * DAY_MS,
            Self::Month1 => 30 * DAY_MS,
        }
    }

    /// Get the duration of the interval.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn duration(self) -> Duration {
        Duration::from_millis(self.duration_ms() as u64)
    }

    /// Round the given timestamp in milliseconds down to the nearest interval
    /// boundary.
    #[must_use]
    pub const fn align_down(self, timestamp_ms: i64) -> i64 {
        timestamp_ms - timestamp_ms.rem_euclid(self.duration_ms())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Min1 => write!(f, "1m"),
            Self::Min3 => write!(f, "3m"),
            Self::Min5 => write!(f, "5m"),
            Self::Min15 => write!(f, "15m"),
            Self::Min30 => write!(f, "30m"),
            Self::Hour1 => write!(f, "1h"),
            Self::Hour2 => write!(f, "2h"),
            Self::Hour4 => write!(f, "4h"),
            Self::Hour6 => write!(f, "6h"),
            Self::Hour8 => write!(f, "8h"),
            Self::Hour12 => write!(f, "12h"),
            Self::Day1 => write!(f, "1d"),
            Self::Day3 => write!(f, "3d"),
            Self::Week1 => write!(f, "1w"),
            Self::Month1 => write!(f, "1M"),
        }
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::Min1),
            "3m" => Ok(Self::Min3),
            "5m" => Ok(Self::Min5),
            "15m" => Ok(Self::Min15),
            "30m" => Ok(Self::Min30),
            "1h" => Ok(Self::Hour1),
            "2h" => Ok(Self::Hour2),
            "4h" => Ok(Self::Hour4),
            "6h" => Ok(Self::Hour6),
            "8h" => Ok(Self::Hour8),
            "12h" => Ok(Self::Hour12),
            "1d" => Ok(Self::Day1),
            "3d" => Ok(Self::Day3),
            "1w" => Ok(Self::Week1),
            "1M" => Ok(Self::Month1),
            _ => Err(Error::IntervalFormat(s.to_owned())),
        }
    }
}

impl Ord for Interval {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.duration_ms().cmp(&other.duration_ms())
    }
}

impl PartialOrd for Interval {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A trading pair in `BASE/QUOTE` form.
///
/// Both sides must be non-empty. The symbol is kept verbatim; venue adapters
/// translate it into their own instrument notation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(Box<str>);

impl Symbol {
    /// The symbol as a string slice.
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base currency of the pair.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn base(&self) -> &str {
        // The separator is validated on construction.
        self.0.split_once('/').unwrap().0
    }

    /// The quote currency of the pair.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn quote(&self) -> &str {
        self.0.split_once('/').unwrap().1
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(Self(s.into()))
            }
            _ => Err(Error::SymbolFormat(s.to_owned())),
        }
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0.into()
    }
}

/// Current UTC wall clock in milliseconds since the Unix epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_round_trip() {
        for interval in Interval::ALL {
            assert_eq!(interval.to_string().parse::<Interval>().ok(), Some(interval));
        }
        assert!("2w".parse::<Interval>().is_err());
        assert!("1 m".parse::<Interval>().is_err());
    }

    #[test]
    fn interval_serde_token() {
        let json = serde_json::to_string(&Interval::Month1).unwrap();
        assert_eq!(json, "\"1M\"");
        let parsed: Interval = serde_json::from_str("\"15m\"").unwrap();
        assert_eq!(parsed, Interval::Min15);
    }

    #[test]
    fn interval_durations_ascend() {
        for pair in Interval::ALL.windows(2) {
            assert!(pair[0].duration_ms() < pair[1].duration_ms());
        }
    }

    #[test]
    fn align_down_to_boundary() {
        let interval = Interval::Hour1;
        assert_eq!(interval.align_down(3_600_000), 3_600_000);
        assert_eq!(interval.align_down(3_599_999), 0);
        assert_eq!(interval.align_down(7_300_123), 7_200_000);
    }

    #[test]
    fn symbol_parse() {
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        assert_eq!(symbol.base(), "BTC");
        assert_eq!(symbol.quote(), "USDT");
        assert_eq!(symbol.as_str(), "BTC/USDT");

        assert!("BTCUSDT".parse::<Symbol>().is_err());
        assert!("/USDT".parse::<Symbol>().is_err());
        assert!("BTC/".parse::<Symbol>().is_err());
    }

    #[test]
    fn symbol_serde() {
        let symbol: Symbol = serde_json::from_str("\"ETH/USDT\"").unwrap();
        assert_eq!(symbol.as_str(), "ETH/USDT");
        assert!(serde_json::from_str::<Symbol>("\"ETHUSDT\"").is_err());
        assert_eq!(serde_json::to_string(&symbol).unwrap(), "\"ETH/USDT\"");
    }
}
