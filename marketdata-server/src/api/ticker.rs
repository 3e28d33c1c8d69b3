//! Ticker read endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use marketdata::{Symbol, Ticker};
use serde::Serialize;
use tracing::warn;

use super::{ensure_exchange, ApiError};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TickerMeta {
    cached: bool,
    age_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct TickerSingleResponse {
    data: Ticker,
    meta: TickerMeta,
}

/// `GET /api/v1/ticker/{exchange}/{symbol}`
///
/// Cache-first quote snapshot. A cached response reports `age_ms` derived
/// from the cache's residual TTL; a fresh fetch reports zero.
///
/// # Errors
///
/// Returns a 400 for an invalid exchange or symbol, a 429 when the venue
/// rate-limits, and a 500 for venue failures.
pub async fn get_ticker(
    State(state): State<AppState>,
    Path((exchange, symbol)): Path<(String, String)>,
) -> Result<Json<TickerSingleResponse>, ApiError> {
    ensure_exchange(&state, &exchange)?;
    let symbol: Symbol = symbol.parse()?;

    let (ticker, cached) = state.tickers.find(&exchange, &symbol).await?;

    let age_ms = if cached {
        match state.cache.ticker_age_ms(&exchange, &symbol).await {
            Ok(age) => age.unwrap_or(0),
            Err(err) => {
                warn!(error = %err, "ticker age lookup failed");
                0
            }
        }
    } else {
        0
    };

    Ok(Json(TickerSingleResponse {
        data: ticker,
        meta: TickerMeta { cached, age_ms },
    }))
}

#[derive(Debug, Serialize)]
pub struct TickerErrorItem {
    symbol: String,
    error: String,
}

#[derive(Debug, Serialize)]
pub struct TickerListResponse {
    data: BTreeMap<String, Ticker>,
    errors: Vec<TickerErrorItem>,
}

/// `GET /api/v1/tickers/{exchange}`
///
/// Every configured symbol of the exchange. Per-symbol failures land in
/// `errors` without failing the request.
///
/// # Errors
///
/// Returns a 400 for an exchange that is not configured.
pub async fn list_tickers(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
) -> Result<Json<TickerListResponse>, ApiError> {
    ensure_exchange(&state, &exchange)?;

    let symbols = state.config.symbols_for(&exchange);
    let (data, errors) = state.tickers.find_all(&exchange, symbols).await;

    Ok(Json(TickerListResponse {
        data,
        errors: errors
            .into_iter()
            .map(|(symbol, error)| TickerErrorItem { symbol, error })
            .collect(),
    }))
}
