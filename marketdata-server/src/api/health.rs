//! Health endpoint.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::AppState;

/// `GET /health`
///
/// 200 when the store and the cache are both reachable, 503 otherwise.
/// Per-exchange reachability is reported alongside but does not gate the
/// overall status; the service degrades rather than dies when a venue is
/// down.
pub async fn health(State(state): State<AppState>) -> Response {
    let store_ok = state.store.health().await;
    let cache_ok = state.cache.health().await;

    let mut exchanges = BTreeMap::new();
    for (id, client) in state.clients.iter() {
        let status = if client.ping().await { "ok" } else { "error" };
        exchanges.insert(id.clone(), status);
    }

    let healthy = store_ok && cache_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = Json(json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "components": {
            "store": if store_ok { "ok" } else { "error" },
            "cache": if cache_ok { "ok" } else { "error" },
            "exchanges": exchanges,
        }
    }));

    (status, body).into_response()
}
