use std::future::Future;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

use crate::models::ProbeStatus;

/// Extra time granted to the `ping` process beyond its own deadline.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Raised only when probing is impossible altogether. Lost packets are
/// reported as [`ProbeStatus::Loss`].
#[derive(Debug, Error)]
pub(crate) enum ProbeError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` is not allowed to send ICMP echo requests: {message}")]
    NotPermitted { program: String, message: String },
}

pub(crate) trait Prober: Send + Sync {
    fn probe(
        &self,
        target: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProbeStatus, ProbeError>> + Send;
}

/// Sends a single ICMP echo through the system `ping` utility (iputils flags).
#[derive(Debug, Clone)]
pub(crate) struct SystemPing {
    program: String,
}

impl SystemPing {
    pub(crate) fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Prober for SystemPing {
    async fn probe(&self, target: &str, timeout: Duration) -> Result<ProbeStatus, ProbeError> {
        // `-W` takes whole seconds on older iputils
        let wait_secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        let child = Command::new(&self.program)
            .arg("-n")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait_secs.to_string())
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let output = match time::timeout(timeout + EXIT_GRACE, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(host = target, error = %e, "ping did not complete");
                return Ok(ProbeStatus::Loss);
            }
            Err(_) => {
                debug!(host = target, "ping exceeded its deadline");
                return Ok(ProbeStatus::Loss);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            if is_permission_failure(message) {
                return Err(ProbeError::NotPermitted {
                    program: self.program.clone(),
                    message: message.to_string(),
                });
            }
            debug!(host = target, status = %output.status, stderr = message, "no reply");
            return Ok(ProbeStatus::Loss);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_round_trip(&stdout).map_or(ProbeStatus::Loss, ProbeStatus::success))
    }
}

/// `ping` reports a missing raw-socket capability on stderr; retrying cannot fix it.
fn is_permission_failure(stderr: &str) -> bool {
    stderr.contains("Operation not permitted") || stderr.contains("Permission denied")
}

/// Extracts the round-trip time from a reply line such as
/// `64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.3 ms`.
pub(crate) fn parse_round_trip(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let idx = line.find("time=").or_else(|| line.find("time<"))?;
        let rest = &line[idx + 5..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        rest[..end].parse::<f64>().ok()
    })
}
