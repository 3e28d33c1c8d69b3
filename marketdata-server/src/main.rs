#![allow(clippy::doc_markdown, clippy::multiple_crate_versions)]

use marketdata_server::{clargs, serve, Config};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let matches = clargs();
    let config = matches.get_one::<std::path::PathBuf>("config");

    let config = match Config::load(config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = serve(config).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
