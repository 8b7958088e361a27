//! Quote service entry point

use anyhow::{Context, Result};
use clap::Parser;
use dexroute::config::RouterConfig;
use dexroute::engine::QuoteEngine;
use dexroute::rpc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dexroute", about = "DEX swap route quoting service")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, env = "DEXROUTE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dexroute=info,tower_http=info".into()),
        )
        .init();

    let config = RouterConfig::load(args.config.as_deref())?;
    info!(
        "Starting dexroute on {} ({} chains configured)",
        config.listen_addr,
        config.rpc_urls.len()
    );

    let listen_addr = config.listen_addr.clone();
    let engine = QuoteEngine::from_config(config).await?;

    // Periodic metric snapshot
    {
        let metrics = engine.metrics.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                metrics.log_snapshot();
            }
        });
    }

    let app = rpc::router(engine);
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    info!("Listening on {}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;
    Ok(())
}
