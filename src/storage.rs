use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs::{File as StdFile, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use scopeguard::guard;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info, warn};

use crate::config::StorageSettings;
use crate::models::{LogSnapshot, ProbeOutcome};

#[derive(Debug, Default)]
struct Logs {
    ping: VecDeque<String>,
    loss: Vec<String>,
}

/// Durable ping and loss logs.
///
/// Both logs are mirrored in memory. An append hits the disk first and only
/// then swaps the in-memory state under the write lock, so readers see either
/// the state before the append or after it.
#[derive(Debug)]
pub(crate) struct LogStore {
    ping_path: PathBuf,
    loss_path: PathBuf,
    max_ping_entries: usize,
    logs: RwLock<Logs>,
    writer: Mutex<()>,
}

impl LogStore {
    pub(crate) async fn open(settings: &StorageSettings) -> Result<Self> {
        let log_dir = settings.log_dir.clone();
        let ping_path = settings.ping_log_path();
        let loss_path = settings.loss_log_path();
        let max_ping_entries = settings.max_ping_entries.max(1);

        let logs = {
            let ping_path = ping_path.clone();
            let loss_path = loss_path.clone();
            task::spawn_blocking(move || -> Result<Logs> {
                std::fs::create_dir_all(&log_dir)
                    .with_context(|| format!("failed to create {}", log_dir.display()))?;
                remove_stale_tmp_files(&ping_path);
                load_logs(&ping_path, &loss_path, max_ping_entries)
            })
            .await??
        };

        info!(
            ping_entries = logs.ping.len(),
            loss_entries = logs.loss.len(),
            path = %ping_path.display(),
            "log store opened"
        );

        Ok(Self {
            ping_path,
            loss_path,
            max_ping_entries,
            logs: RwLock::new(logs),
            writer: Mutex::new(()),
        })
    }

    /// Persists `outcome` and publishes it to readers.
    ///
    /// On error nothing is published and the files keep their previous lines.
    pub(crate) async fn append(&self, outcome: &ProbeOutcome) -> Result<()> {
        let _writer = self.writer.lock().await;

        let ping_line = outcome.ping_line();
        let loss_line = outcome.loss_line();

        let mut ping = self.logs.read().ping.clone();
        ping.push_back(ping_line);
        while ping.len() > self.max_ping_entries {
            ping.pop_front();
        }

        let ping_path = self.ping_path.clone();
        let loss_path = self.loss_path.clone();
        let persisted_loss = loss_line.clone();
        let ping = task::spawn_blocking(move || -> Result<VecDeque<String>> {
            if let Some(line) = &persisted_loss {
                append_line(&loss_path, line)
                    .with_context(|| format!("failed to append to {}", loss_path.display()))?;
            }
            replace_lines(&ping_path, &ping)
                .with_context(|| format!("failed to rewrite {}", ping_path.display()))?;
            Ok(ping)
        })
        .await??;

        let mut logs = self.logs.write();
        logs.ping = ping;
        if let Some(line) = loss_line {
            logs.loss.push(line);
        }
        debug!(ping_entries = logs.ping.len(), loss_entries = logs.loss.len(), "appended");
        Ok(())
    }

    /// Reads both log files without creating, trimming or cleaning anything,
    /// so it is safe to run next to a live writer.
    pub(crate) async fn read_snapshot(settings: &StorageSettings) -> Result<LogSnapshot> {
        let ping_path = settings.ping_log_path();
        let loss_path = settings.loss_log_path();
        let max_ping_entries = settings.max_ping_entries.max(1);
        let logs = task::spawn_blocking(move || load_logs(&ping_path, &loss_path, max_ping_entries))
            .await??;
        Ok(LogSnapshot {
            ping_log: logs.ping.into(),
            loss_log: logs.loss,
        })
    }

    pub(crate) fn snapshot(&self) -> LogSnapshot {
        let logs = self.logs.read();
        LogSnapshot {
            ping_log: logs.ping.iter().cloned().collect(),
            loss_log: logs.loss.clone(),
        }
    }
}

/// Temporary files older than this belong to a writer that died mid-replace.
const STALE_TMP_AGE: Duration = Duration::from_secs(60);

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn tmp_prefix(path: &Path) -> OsString {
    let mut prefix = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    prefix.push(".");
    prefix
}

/// A sibling of `path` that no other process or append uses.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = tmp_prefix(path);
    name.push(format!(
        "{}.{}.tmp",
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    path.with_file_name(name)
}

fn remove_stale_tmp_files(path: &Path) {
    let Some(dir) = path.parent() else { return };
    let prefix = tmp_prefix(path).to_string_lossy().into_owned();
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(prefix.as_str()) || !name.ends_with(".tmp") {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age >= STALE_TMP_AGE);
        if stale && std::fs::remove_file(entry.path()).is_ok() {
            debug!(file = %entry.path().display(), "removed stale temporary file");
        }
    }
}

fn load_logs(ping_path: &Path, loss_path: &Path, max_ping_entries: usize) -> Result<Logs> {
    let mut ping: VecDeque<String> = read_lines(ping_path)?.into();
    while ping.len() > max_ping_entries {
        ping.pop_front();
    }
    let loss = read_lines(loss_path)?;
    Ok(Logs { ping, loss })
}

/// Non-empty lines of `path`; lines that are not valid UTF-8 are skipped
/// rather than rewritten with replacement characters.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let mut lines = Vec::new();
    let mut skipped = 0usize;
    for raw in bytes.split(|b| *b == b'\n') {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        match std::str::from_utf8(raw) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => lines.push(line.to_string()),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, path = %path.display(), "skipped lines that are not valid UTF-8");
    }
    Ok(lines)
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format!("{line}\n").as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Writes `lines` to a sibling temporary file and renames it over `path`.
fn replace_lines<'a>(path: &Path, lines: impl IntoIterator<Item = &'a String>) -> Result<()> {
    let tmp_file = tmp_path(path);
    let cleanup = guard(tmp_file.clone(), |tmp| {
        let _ = std::fs::remove_file(tmp);
    });
    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_file)?;
        let mut writer = BufWriter::new(&file);
        for line in lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_file, path)?;
    scopeguard::ScopeGuard::into_inner(cleanup);
    if let Some(dir) = path.parent() {
        if let Ok(dir) = StdFile::open(dir) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
