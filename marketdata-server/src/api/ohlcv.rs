//! Candle read endpoints.

use std::{collections::BTreeMap, time::Instant};

use axum::{
    extract::{Path, Query, State},
    Json,
};
use marketdata::{Candle, Interval, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ensure_exchange, ApiError};
use crate::AppState;

/// Default page size of a candle read.
const DEFAULT_LIMIT: u32 = 500;

/// Largest page size of a candle read; the batch endpoint always uses it.
const MAX_LIMIT: u32 = 1000;

/// Largest span between `start` and `end` (30 days).
const MAX_TIME_RANGE_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Largest number of symbols in one batch request.
const MAX_BATCH_SYMBOLS: usize = 20;

fn validate_time_range(start: Option<i64>, end: Option<i64>) -> Result<(), ApiError> {
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(());
    };
    if end < start {
        return Err(ApiError::invalid_time_range(
            "End timestamp must be greater than or equal to start timestamp",
            json!({"start": start, "end": end}),
        ));
    }
    if end - start > MAX_TIME_RANGE_MS {
        return Err(ApiError::invalid_time_range(
            "Time range exceeds maximum of 30 days",
            json!({
                "start": start,
                "end": end,
                "range_days": (end - start) / (24 * 60 * 60 * 1000),
                "max_days": 30,
            }),
        ));
    }
    Ok(())
}

fn parse_cursor(cursor: Option<&str>) -> Result<Option<i64>, ApiError> {
    cursor
        .map(|cursor| {
            cursor
                .parse::<i64>()
                .map_err(|_| ApiError::validation(format!("Invalid cursor: {cursor}")))
        })
        .transpose()
}

#[derive(Debug, Deserialize)]
pub struct OhlcvQuery {
    interval: String,
    start: Option<i64>,
    end: Option<i64>,
    limit: Option<u32>,
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryMeta {
    cached: bool,
    query_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct OhlcvListResponse {
    data: Vec<Candle>,
    pagination: Pagination,
    meta: QueryMeta,
}

/// `GET /api/v1/ohlcv/{exchange}/{symbol}`
///
/// Candle history with inclusive time-range filters and cursor pagination.
/// The limit defaults to 500 and is clamped to `[1, 1000]`; a request
/// spanning more than 30 days is rejected.
///
/// # Errors
///
/// Returns a 400 for invalid parameters and a 500 for store failures.
#[allow(clippy::cast_possible_truncation)]
pub async fn get_ohlcv(
    State(state): State<AppState>,
    Path((exchange, symbol)): Path<(String, String)>,
    Query(query): Query<OhlcvQuery>,
) -> Result<Json<OhlcvListResponse>, ApiError> {
    let started = Instant::now();

    ensure_exchange(&state, &exchange)?;
    let symbol: Symbol = symbol.parse()?;
    let interval: Interval = query.interval.parse()?;
    validate_time_range(query.start, query.end)?;
    let cursor = parse_cursor(query.cursor.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    let (candles, next_cursor, cached) = state
        .candles
        .find(
            &exchange,
            &symbol,
            interval,
            query.start,
            query.end,
            cursor,
            limit,
        )
        .await?;

    Ok(Json(OhlcvListResponse {
        data: candles,
        pagination: Pagination {
            next_cursor: next_cursor.map(|cursor| cursor.to_string()),
        },
        meta: QueryMeta {
            cached,
            query_ms: started.elapsed().as_millis() as u64,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    exchange: String,
    symbols: Vec<String>,
    interval: String,
    start: Option<i64>,
    end: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BatchErrorItem {
    symbol: String,
    error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    data: BTreeMap<String, Vec<Candle>>,
    errors: Vec<BatchErrorItem>,
}

/// `POST /api/v1/ohlcv/batch`
///
/// Query up to 20 symbols in one request. Every symbol is read with the
/// maximum limit and no pagination; a failing symbol becomes an entry in
/// `errors` instead of failing the batch.
///
/// # Errors
///
/// Returns a 400 for an invalid exchange, interval, time range or an
/// oversized batch.
pub async fn batch_ohlcv(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    if request.symbols.len() > MAX_BATCH_SYMBOLS {
        return Err(ApiError::batch_size_exceeded(
            request.symbols.len(),
            MAX_BATCH_SYMBOLS,
        ));
    }
    ensure_exchange(&state, &request.exchange)?;
    let interval: Interval = request.interval.parse()?;
    validate_time_range(request.start, request.end)?;

    let mut data = BTreeMap::new();
    let mut errors = Vec::new();

    for raw in &request.symbols {
        let symbol = match raw.parse::<Symbol>() {
            Ok(symbol) => symbol,
            Err(err) => {
                errors.push(BatchErrorItem {
                    symbol: raw.clone(),
                    error: err.to_string(),
                });
                continue;
            }
        };

        match state
            .candles
            .find(
                &request.exchange,
                &symbol,
                interval,
                request.start,
                request.end,
                None,
                MAX_LIMIT,
            )
            .await
        {
            Ok((candles, _, _)) => {
                data.insert(raw.clone(), candles);
            }
            Err(err) => errors.push(BatchErrorItem {
                symbol: raw.clone(),
                error: err.to_string(),
            }),
        }
    }

    Ok(Json(BatchResponse { data, errors }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_accepts_open_bounds() {
        assert!(validate_time_range(None, None).is_ok());
        assert!(validate_time_range(Some(0), None).is_ok());
        assert!(validate_time_range(None, Some(1)).is_ok());
    }

    #[test]
    fn time_range_rejects_inverted_bounds() {
        assert!(validate_time_range(Some(10), Some(9)).is_err());
        assert!(validate_time_range(Some(10), Some(10)).is_ok());
    }

    #[test]
    fn time_range_rejects_spans_over_30_days() {
        assert!(validate_time_range(Some(0), Some(MAX_TIME_RANGE_MS)).is_ok());
        assert!(validate_time_range(Some(0), Some(MAX_TIME_RANGE_MS + 1)).is_err());
    }

    #[test]
    fn cursor_must_be_numeric() {
        assert_eq!(parse_cursor(None).unwrap(), None);
        assert_eq!(
            parse_cursor(Some("1700000000000")).unwrap(),
            Some(1_700_000_000_000)
        );
        assert!(parse_cursor(Some("abc")).is_err());
    }
}
