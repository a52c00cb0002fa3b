use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{MonitorConfig, Schedule};
use crate::models::{ProbeOutcome, ProbeStatus};
use crate::probe::Prober;
use crate::storage::LogStore;

/// Runs one probe and records its outcome.
pub(crate) async fn record_probe<P: Prober>(
    config: &MonitorConfig,
    prober: &P,
    store: &LogStore,
) -> Result<ProbeOutcome> {
    let timestamp = Local::now();
    let status = prober
        .probe(&config.target, config.probe_timeout)
        .await
        .context("probing is unavailable")?;
    let outcome = ProbeOutcome::new(timestamp, status);

    match outcome.status {
        ProbeStatus::Success { latency_ms } => {
            debug!(host = %config.target, latency_ms, "reply")
        }
        ProbeStatus::Loss => warn!(host = %config.target, "packet loss"),
    }

    store
        .append(&outcome)
        .await
        .context("failed to record probe outcome")?;
    Ok(outcome)
}

/// Probes the target at the configured cadence until `shutdown` flips to
/// `true` (or its sender goes away). Returns an error as soon as a probe
/// cannot be run or recorded.
pub(crate) async fn run_monitor<P: Prober>(
    config: &MonitorConfig,
    prober: &P,
    store: &LogStore,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64> {
    info!(
        host = %config.target,
        interval = ?config.probe_interval,
        timeout = ?config.probe_timeout,
        schedule = ?config.schedule,
        "monitor started"
    );

    let mut ticker = time::interval(config.probe_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut iterations: u64 = 0;

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let proceed = match config.schedule {
            Schedule::FixedRate => tokio::select! {
                _ = ticker.tick() => true,
                _ = shutdown.changed() => false,
            },
            Schedule::FixedDelay if iterations == 0 => true,
            Schedule::FixedDelay => tokio::select! {
                _ = time::sleep(config.probe_interval) => true,
                _ = shutdown.changed() => false,
            },
        };
        if !proceed || *shutdown.borrow() {
            break;
        }

        record_probe(config, prober, store).await?;
        iterations += 1;
    }

    info!(iterations, "monitor stopped");
    Ok(iterations)
}
