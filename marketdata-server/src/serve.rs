//! Startup and shutdown.

use std::{collections::HashMap, sync::Arc};

use marketdata::{
    exchange, Cache, CandleRepository, CandleStore, Collector, TickerRepository,
};
use tracing::{info, warn};

use crate::{api, AppState, Config, Error};

/// Run the service until a shutdown signal arrives.
///
/// Startup order: store (with schema init), cache, exchange adapters,
/// repositories, collector, listener. Shutdown reverses it: the listener
/// drains, the collector stops accepting fires and waits for in-flight
/// jobs, then the pool closes.
///
/// # Errors
///
/// Returns an error if any component fails to initialize or the listen
/// address cannot be served.
pub async fn serve(config: Config) -> Result<(), Error> {
    let config = Arc::new(config);

    let store = CandleStore::connect(&config.database).await?;
    store.init_schema().await?;
    let cache = Cache::connect(&config.cache).await?;

    let mut clients = HashMap::new();
    for spec in &config.collection.exchanges {
        let client = exchange::connect(&spec.id)?;
        if !client.ping().await {
            warn!(exchange = %spec.id, "exchange not reachable at startup");
        }
        clients.insert(spec.id.clone(), client);
    }
    let clients = Arc::new(clients);

    let candles = CandleRepository::new(store.clone(), cache.clone());
    let tickers = TickerRepository::new(cache.clone(), Arc::clone(&clients));
    let collector = Collector::new(
        store.clone(),
        candles.clone(),
        tickers.clone(),
        Arc::clone(&clients),
        config.collection.gap_fill.clone(),
    );
    collector.start(&config.collection.exchanges, &config.collection.intervals);

    let state = AppState {
        config: Arc::clone(&config),
        store: store.clone(),
        cache,
        clients,
        candles,
        tickers,
        collector: collector.clone(),
    };

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(Error::Serve)?;
    info!(addr = %addr, "listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::Serve)?;

    collector.stop().await;
    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received, shutting down"),
        () = terminate => info!("terminate received, shutting down"),
    }
}
