use chrono::{DateTime, Local, Timelike};

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const LINE_SEPARATOR: &str = " \u{2013} ";
pub(crate) const PING_LOSS_TEXT: &str = "PACKET LOSS";
pub(crate) const LOSS_LOG_TEXT: &str = "100% Packet Loss";

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ProbeStatus {
    Success { latency_ms: f64 },
    Loss,
}

impl ProbeStatus {
    /// Negative or non-finite latencies are not measurements; they count as loss.
    pub(crate) fn success(latency_ms: f64) -> Self {
        if latency_ms.is_finite() && latency_ms >= 0.0 {
            ProbeStatus::Success { latency_ms }
        } else {
            ProbeStatus::Loss
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProbeOutcome {
    pub(crate) timestamp: DateTime<Local>,
    pub(crate) status: ProbeStatus,
}

impl ProbeOutcome {
    pub(crate) fn new(timestamp: DateTime<Local>, status: ProbeStatus) -> Self {
        Self {
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            status,
        }
    }

    pub(crate) fn is_loss(&self) -> bool {
        matches!(self.status, ProbeStatus::Loss)
    }

    fn stamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Line written to the ping log for every outcome.
    pub(crate) fn ping_line(&self) -> String {
        match self.status {
            ProbeStatus::Success { latency_ms } => {
                format!("{}{}{} ms", self.stamp(), LINE_SEPARATOR, format_latency(latency_ms))
            }
            ProbeStatus::Loss => format!("{}{}{}", self.stamp(), LINE_SEPARATOR, PING_LOSS_TEXT),
        }
    }

    /// Line written to the loss log, only for lost probes.
    pub(crate) fn loss_line(&self) -> Option<String> {
        self.is_loss()
            .then(|| format!("{}{}{}", self.stamp(), LINE_SEPARATOR, LOSS_LOG_TEXT))
    }
}

/// Renders a latency with the precision iputils `ping` uses for the same magnitude,
/// so `12.0` stays `12.0` and `1.5` becomes `1.50`.
pub(crate) fn format_latency(ms: f64) -> String {
    if ms >= 99.95 {
        format!("{ms:.0}")
    } else if ms >= 9.995 {
        format!("{ms:.1}")
    } else if ms >= 1.0 {
        format!("{ms:.2}")
    } else {
        format!("{ms:.3}")
    }
}

/// Point-in-time copy of both logs, oldest entry first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LogSnapshot {
    pub(crate) ping_log: Vec<String>,
    pub(crate) loss_log: Vec<String>,
}

/// Splits a persisted ping log line back into its timestamp text and status.
pub(crate) fn parse_ping_line(line: &str) -> Option<(&str, ProbeStatus)> {
    let (stamp, value) = line.split_once(LINE_SEPARATOR)?;
    if value == PING_LOSS_TEXT {
        return Some((stamp, ProbeStatus::Loss));
    }
    let latency = value.strip_suffix(" ms")?.trim().parse::<f64>().ok()?;
    match ProbeStatus::success(latency) {
        status @ ProbeStatus::Success { .. } => Some((stamp, status)),
        ProbeStatus::Loss => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, h, m, s).single().unwrap()
    }

    #[test]
    fn latency_keeps_ping_precision() {
        assert_eq!(format_latency(12.0), "12.0");
        assert_eq!(format_latency(12.3), "12.3");
        assert_eq!(format_latency(1.5), "1.50");
        assert_eq!(format_latency(0.045), "0.045");
        assert_eq!(format_latency(123.0), "123");
        let outcome = ProbeOutcome::new(at(14, 5, 9), ProbeStatus::success(12.0));
        assert_eq!(outcome.ping_line(), "2024-03-09 14:05:09 \u{2013} 12.0 ms");
    }

    #[test]
    fn ping_line_for_success_uses_ms_suffix() {
        let outcome = ProbeOutcome::new(at(14, 5, 9), ProbeStatus::success(12.3));
        assert_eq!(outcome.ping_line(), "2024-03-09 14:05:09 \u{2013} 12.3 ms");
        assert_eq!(outcome.loss_line(), None);
    }

    #[test]
    fn loss_writes_both_lines() {
        let outcome = ProbeOutcome::new(at(0, 0, 1), ProbeStatus::Loss);
        assert_eq!(outcome.ping_line(), "2024-03-09 00:00:01 \u{2013} PACKET LOSS");
        assert_eq!(
            outcome.loss_line().as_deref(),
            Some("2024-03-09 00:00:01 \u{2013} 100% Packet Loss")
        );
    }

    #[test]
    fn timestamp_is_truncated_to_seconds() {
        let precise = at(8, 30, 0) + chrono::Duration::milliseconds(750);
        let outcome = ProbeOutcome::new(precise, ProbeStatus::Loss);
        assert_eq!(outcome.timestamp, at(8, 30, 0));
    }

    #[test]
    fn invalid_latency_is_loss() {
        assert_eq!(ProbeStatus::success(-1.0), ProbeStatus::Loss);
        assert_eq!(ProbeStatus::success(f64::NAN), ProbeStatus::Loss);
        assert_eq!(ProbeStatus::success(0.0), ProbeStatus::Success { latency_ms: 0.0 });
    }

    #[test]
    fn parses_persisted_lines() {
        assert_eq!(
            parse_ping_line("2024-03-09 14:05:09 \u{2013} 0.045 ms"),
            Some(("2024-03-09 14:05:09", ProbeStatus::Success { latency_ms: 0.045 }))
        );
        assert_eq!(
            parse_ping_line("2024-03-09 14:05:10 \u{2013} PACKET LOSS"),
            Some(("2024-03-09 14:05:10", ProbeStatus::Loss))
        );
        assert_eq!(parse_ping_line("2024-03-09 14:05:10 - 3 ms"), None);
        assert_eq!(parse_ping_line("garbage"), None);
    }
}
