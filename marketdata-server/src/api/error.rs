//! API error envelope.
//!
//! Every failure leaves the API as `{"error": {code, message, details}}`.
//! Input errors map to 400, authentication to 401, venue rate limits to 429
//! with a `Retry-After` header, everything else to 500.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Machine-readable error codes of the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidSymbol,
    InvalidTimeframe,
    InvalidTimeRange,
    InvalidExchange,
    BatchSizeExceeded,
    ValidationError,
    Unauthorized,
    ExchangeError,
    RateLimitError,
    DatabaseError,
    CacheError,
    InternalError,
}

impl ErrorCode {
    /// The wire token of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSymbol => "INVALID_SYMBOL",
            Self::InvalidTimeframe => "INVALID_TIMEFRAME",
            Self::InvalidTimeRange => "INVALID_TIME_RANGE",
            Self::InvalidExchange => "INVALID_EXCHANGE",
            Self::BatchSizeExceeded => "BATCH_SIZE_EXCEEDED",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::ExchangeError => "EXCHANGE_ERROR",
            Self::RateLimitError => "RATE_LIMIT_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::CacheError => "CACHE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// A failure ready to leave the API.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
    details: Value,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Build an error with an empty details object.
    #[must_use]
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: json!({}),
            retry_after_secs: None,
        }
    }

    /// Attach a details object.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// The error message, used when collecting per-symbol batch failures.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 400 with [`ErrorCode::InvalidTimeRange`].
    #[must_use]
    pub fn invalid_time_range(message: impl Into<String>, details: Value) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidTimeRange, message)
            .with_details(details)
    }

    /// 400 with [`ErrorCode::BatchSizeExceeded`].
    #[must_use]
    pub fn batch_size_exceeded(requested: usize, maximum: usize) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::BatchSizeExceeded,
            format!("Maximum {maximum} symbols per batch request"),
        )
        .with_details(json!({"requested": requested, "maximum": maximum}))
    }

    /// 400 with [`ErrorCode::InvalidExchange`].
    #[must_use]
    pub fn invalid_exchange(exchange: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidExchange,
            format!("Unknown exchange: {exchange}"),
        )
        .with_details(json!({"exchange": exchange}))
    }

    /// 400 with [`ErrorCode::ValidationError`].
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, message)
    }

    /// 401 with a `WWW-Authenticate` challenge.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ErrorCode::Unauthorized,
            "Invalid authentication token",
        )
    }

    /// 500 with [`ErrorCode::InternalError`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            message,
        )
    }
}

impl From<marketdata::Error> for ApiError {
    fn from(err: marketdata::Error) -> Self {
        use marketdata::Error;

        match err {
            Error::RateLimited {
                ref exchange,
                retry_after_secs,
            } => {
                let mut api = Self::new(
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorCode::RateLimitError,
                    format!("Rate limit exceeded for {exchange}"),
                )
                .with_details(json!({
                    "exchange": exchange,
                    "retry_after_seconds": retry_after_secs,
                }));
                api.retry_after_secs = Some(retry_after_secs);
                api
            }
            Error::SqlConnect(_)
            | Error::SqlSchema(_)
            | Error::SqlUpsert(_)
            | Error::SqlSelect(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::DatabaseError,
                err.to_string(),
            ),
            Error::Cache(_) | Error::CacheCodec(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::CacheError,
                err.to_string(),
            ),
            Error::ExchangeTransient { .. }
            | Error::ExchangeFatal { .. }
            | Error::InvalidCandle(_)
            | Error::InvalidTicker(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::ExchangeError,
                err.to_string(),
            ),
            Error::UnknownExchange(ref exchange) => Self::invalid_exchange(exchange),
            Error::SymbolFormat(ref symbol) => Self::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidSymbol,
                format!("Invalid symbol format: {symbol}. Expected format: BASE/QUOTE"),
            )
            .with_details(json!({"symbol": symbol, "expected_format": "BASE/QUOTE"})),
            Error::IntervalFormat(ref interval) => Self::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidTimeframe,
                format!("Invalid interval: {interval}"),
            )
            .with_details(json!({"interval": interval})),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "details": self.details,
            }
        }));
        let mut response = (self.status, body).into_response();

        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_maps_to_429_with_retry_after() {
        let err = marketdata::Error::RateLimited {
            exchange: "okx".to_owned(),
            retry_after_secs: 30,
        };
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(api.code, ErrorCode::RateLimitError);
        assert_eq!(api.retry_after_secs, Some(30));

        let response = api.into_response();
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("30"))
        );
    }

    #[test]
    fn input_errors_map_to_400() {
        let api = ApiError::from(marketdata::Error::SymbolFormat("BTCUSDT".to_owned()));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code, ErrorCode::InvalidSymbol);

        let api = ApiError::from(marketdata::Error::IntervalFormat("2w".to_owned()));
        assert_eq!(api.code, ErrorCode::InvalidTimeframe);

        let api = ApiError::from(marketdata::Error::UnknownExchange("kraken".to_owned()));
        assert_eq!(api.code, ErrorCode::InvalidExchange);
    }

    #[test]
    fn unauthorized_carries_challenge() {
        let response = ApiError::unauthorized().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static("Bearer"))
        );
    }
}
