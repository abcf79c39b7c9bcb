//! Entry point for the Tax Engine binary.
//!
//! Running this binary starts an HTTP server exposing the tax engine.
//! The directory containing the yearly rule-set JSON files may be set
//! via `TAX_ENGINE_LAW_DIR`; if unset the server looks for a
//! `tax_laws` folder relative to the current working directory.  Log
//! verbosity follows `RUST_LOG` (default `info`).

use tax_engine::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(
        law_dir = %config.tax_law_dir.display(),
        addr = %config.bind_addr,
        "starting tax engine"
    );
    if let Err(err) = tax_engine::api::serve(&config).await {
        tracing::error!(error = %err, "server terminated");
        std::process::exit(1);
    }
}
