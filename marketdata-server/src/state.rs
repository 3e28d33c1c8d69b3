use std::{collections::HashMap, sync::Arc};

use marketdata::{
    Cache, CandleRepository, CandleStore, Collector, Exchange, TickerRepository,
};

use crate::Config;

/// Shared state handed to every request handler.
///
/// Everything inside is cheaply clonable; axum clones the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Candle store.
    pub store: CandleStore,
    /// Candle and ticker cache.
    pub cache: Cache,
    /// Exchange adapters by id.
    pub clients: Arc<HashMap<String, Arc<dyn Exchange>>>,
    /// Candle repository.
    pub candles: CandleRepository,
    /// Ticker repository.
    pub tickers: TickerRepository,
    /// Collection driver, used by the admin surface.
    pub collector: Collector,
}
