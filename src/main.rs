mod cli;
mod config;
mod models;
mod monitor;
mod probe;
mod report;
mod storage;
mod web;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::probe::SystemPing;
use crate::storage::LogStore;
use crate::web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    if cli.summary {
        let snapshot = LogStore::read_snapshot(&config.storage).await?;
        report::print_summary(&config, &snapshot);
        return Ok(());
    }

    let store = Arc::new(LogStore::open(&config.storage).await?);

    let addr = SocketAddr::new(config.listen_addr, config.listen_port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router = web::build_router(AppState::new(&config, store.clone()));
    let server = tokio::spawn(web::serve(listener, router, shutdown_rx.clone()));

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        let _ = signal_tx.send(true);
    });

    let prober = SystemPing::new(config.ping_command.clone());
    let result = monitor::run_monitor(&config, &prober, &store, shutdown_rx).await;
    if let Err(e) = &result {
        error!("monitor terminated: {e:#}");
    }

    let _ = shutdown_tx.send(true);
    server.await??;
    result.map(|_| ())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
