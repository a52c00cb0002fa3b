use colored::*;
use statistical::{mean, median};

use crate::config::MonitorConfig;
use crate::models::{LogSnapshot, ProbeStatus, parse_ping_line};

/// Figures over the entries retained in the ping log.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WindowSummary {
    pub(crate) samples: usize,
    pub(crate) losses: usize,
    pub(crate) loss_percent: f64,
    pub(crate) mean_latency_ms: Option<f64>,
    pub(crate) median_latency_ms: Option<f64>,
    pub(crate) total_losses_logged: usize,
}

pub(crate) fn summarize(snapshot: &LogSnapshot) -> WindowSummary {
    let statuses: Vec<ProbeStatus> = snapshot
        .ping_log
        .iter()
        .filter_map(|line| parse_ping_line(line).map(|(_, status)| status))
        .collect();
    let latencies: Vec<f64> = statuses
        .iter()
        .filter_map(|status| match status {
            ProbeStatus::Success { latency_ms } => Some(*latency_ms),
            ProbeStatus::Loss => None,
        })
        .collect();

    let samples = statuses.len();
    let losses = samples - latencies.len();
    let loss_percent = if samples > 0 {
        losses as f64 / samples as f64 * 100.0
    } else {
        0.0
    };
    let (mean_latency_ms, median_latency_ms) = if latencies.is_empty() {
        (None, None)
    } else {
        (Some(mean(&latencies)), Some(median(&latencies)))
    };

    WindowSummary {
        samples,
        losses,
        loss_percent,
        mean_latency_ms,
        median_latency_ms,
        total_losses_logged: snapshot.loss_log.len(),
    }
}

pub(crate) fn print_summary(config: &MonitorConfig, snapshot: &LogSnapshot) {
    println!("Ping monitor: {}", config.target.bold());
    println!("-----------------");
    for line in &snapshot.ping_log {
        match parse_ping_line(line) {
            Some((_, ProbeStatus::Loss)) => println!("{}", line.red()),
            Some(_) => println!("{}", line),
            None => println!("{}", line.dimmed()),
        }
    }
    println!("-----------------");

    let summary = summarize(snapshot);
    let loss_str = format!("{:.1}%", summary.loss_percent);
    let loss_colored = if summary.losses > 0 {
        loss_str.red()
    } else {
        loss_str.green()
    };
    let fmt_ms = |value: Option<f64>| {
        value.map_or("N/A".to_string(), |ms| format!("{:.2}ms", ms))
    };

    println!(
        "Window: {} samples, {} lost ({})",
        summary.samples, summary.losses, loss_colored
    );
    println!(
        "Latency - Avg: {}, Median: {}",
        fmt_ms(summary.mean_latency_ms),
        fmt_ms(summary.median_latency_ms)
    );
    println!("Packet loss events logged: {}", summary.total_losses_logged);
}
