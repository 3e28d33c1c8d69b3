//! HTTP surface of the service.
//!
//! The health endpoint is open; everything under `/api/v1` is behind the
//! bearer check. Every request carries an `X-Request-ID`, generated when the
//! client did not send one, echoed on the response and attached to the
//! request's tracing span so all log records correlate.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::{auth, AppState};

pub mod admin;
mod error;
pub mod health;
pub mod ohlcv;
pub mod ticker;

pub use error::{ApiError, ErrorCode};

/// Correlation header carried by every request and response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/ohlcv/:exchange/:symbol", get(ohlcv::get_ohlcv))
        .route("/ohlcv/batch", post(ohlcv::batch_ohlcv))
        .route("/ticker/:exchange/:symbol", get(ticker::get_ticker))
        .route("/tickers/:exchange", get(ticker::list_tickers))
        .route("/admin/gap-fill", post(admin::gap_fill))
        .route("/admin/gap-fill/batch", post(admin::batch_gap_fill))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", protected)
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

/// Reject exchanges that are not part of the configured collection set.
pub(crate) fn ensure_exchange(state: &AppState, exchange: &str) -> Result<(), ApiError> {
    if state.clients.contains_key(exchange) {
        Ok(())
    } else {
        Err(ApiError::invalid_exchange(exchange))
    }
}

async fn request_id(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

    let span = tracing::info_span!(
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
