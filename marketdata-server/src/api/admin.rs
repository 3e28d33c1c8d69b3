//! Administrative endpoints.
//!
//! Gap-fill dispatch is fire and forget: the task is handed to the
//! collector's bounded worker pool and the response returns immediately
//! with the dispatch descriptor. Completion is observable in the logs, not
//! through the API.

use axum::{extract::State, Json};
use marketdata::{Interval, Symbol};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ensure_exchange, ApiError};
use crate::AppState;

const MIN_DAYS: u32 = 1;
const MAX_DAYS: u32 = 365;

const fn default_days() -> u32 {
    30
}

fn validate_days(days: u32) -> Result<(), ApiError> {
    if (MIN_DAYS..=MAX_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(ApiError::validation(format!(
            "days must be between {MIN_DAYS} and {MAX_DAYS}, got {days}"
        )))
    }
}

#[derive(Debug, Deserialize)]
pub struct GapFillRequest {
    exchange: String,
    symbol: String,
    interval: String,
    #[serde(default = "default_days")]
    days: u32,
}

#[derive(Debug, Serialize)]
pub struct GapFillResponse {
    status: &'static str,
    message: String,
    exchange: String,
    symbol: String,
    interval: String,
    days: u32,
}

/// `POST /api/v1/admin/gap-fill`
///
/// Dispatch one gap-fill task for a tuple.
///
/// # Errors
///
/// Returns a 400 for an unknown exchange, a malformed symbol or interval,
/// or a day count outside `[1, 365]`.
pub async fn gap_fill(
    State(state): State<AppState>,
    Json(request): Json<GapFillRequest>,
) -> Result<Json<GapFillResponse>, ApiError> {
    ensure_exchange(&state, &request.exchange)?;
    let symbol: Symbol = request.symbol.parse()?;
    let interval: Interval = request.interval.parse()?;
    validate_days(request.days)?;

    state
        .collector
        .spawn_gap_fill(request.exchange.clone(), symbol, interval, request.days);

    info!(
        exchange = %request.exchange,
        symbol = %request.symbol,
        interval = %request.interval,
        days = request.days,
        "gap fill triggered"
    );

    Ok(Json(GapFillResponse {
        status: "started",
        message: format!(
            "Gap filling started for {}/{}/{}",
            request.exchange, request.symbol, request.interval
        ),
        exchange: request.exchange,
        symbol: request.symbol,
        interval: request.interval,
        days: request.days,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BatchGapFillRequest {
    #[serde(default = "default_days")]
    days: u32,
    exchanges: Option<Vec<String>>,
    intervals: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct BatchGapFillResponse {
    status: &'static str,
    message: String,
    total_tasks: usize,
    days: u32,
}

/// `POST /api/v1/admin/gap-fill/batch`
///
/// Dispatch gap-fill tasks for the cross product of the selected exchanges,
/// their configured symbols and the selected intervals. Unknown exchanges
/// and unsupported intervals in the filter are skipped with a warning.
///
/// # Errors
///
/// Returns a 400 for a day count outside `[1, 365]`.
pub async fn batch_gap_fill(
    State(state): State<AppState>,
    Json(request): Json<BatchGapFillRequest>,
) -> Result<Json<BatchGapFillResponse>, ApiError> {
    validate_days(request.days)?;

    let intervals: Vec<Interval> = request.intervals.map_or_else(
        || state.config.collection.intervals.clone(),
        |tokens| {
            tokens
                .iter()
                .filter_map(|token| match token.parse() {
                    Ok(interval) => Some(interval),
                    Err(_) => {
                        warn!(interval = %token, "interval not supported, skipped");
                        None
                    }
                })
                .collect()
        },
    );

    let exchanges: Vec<String> = request.exchanges.map_or_else(
        || state.clients.keys().cloned().collect(),
        |ids| {
            ids.into_iter()
                .filter(|id| {
                    if state.clients.contains_key(id) {
                        true
                    } else {
                        warn!(exchange = %id, "exchange not configured, skipped");
                        false
                    }
                })
                .collect()
        },
    );

    let mut total_tasks = 0usize;
    for exchange in &exchanges {
        for symbol in state.config.symbols_for(exchange) {
            for &interval in &intervals {
                state.collector.spawn_gap_fill(
                    exchange.clone(),
                    symbol.clone(),
                    interval,
                    request.days,
                );
                total_tasks += 1;
            }
        }
    }

    info!(total_tasks, days = request.days, "batch gap fill triggered");

    Ok(Json(BatchGapFillResponse {
        status: "started",
        message: format!("Batch gap filling started for {total_tasks} tasks"),
        total_tasks,
        days: request.days,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_bounds() {
        assert!(validate_days(1).is_ok());
        assert!(validate_days(365).is_ok());
        assert!(validate_days(0).is_err());
        assert!(validate_days(366).is_err());
    }
}
