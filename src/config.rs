use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum Schedule {
    /// Ticks are measured from iteration start; missed ticks are skipped.
    #[default]
    FixedRate,
    /// A full interval is slept after every iteration.
    FixedDelay,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StorageSettings {
    #[serde(default = "default_log_dir")]
    pub(crate) log_dir: PathBuf,
    #[serde(default = "default_max_ping_entries")]
    pub(crate) max_ping_entries: usize,
    #[serde(default = "default_ping_log_file")]
    pub(crate) ping_log_file: String,
    #[serde(default = "default_loss_log_file")]
    pub(crate) loss_log_file: String,
}

impl StorageSettings {
    pub(crate) fn ping_log_path(&self) -> PathBuf {
        self.log_dir.join(&self.ping_log_file)
    }

    pub(crate) fn loss_log_path(&self) -> PathBuf {
        self.log_dir.join(&self.loss_log_file)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            max_ping_entries: default_max_ping_entries(),
            ping_log_file: default_ping_log_file(),
            loss_log_file: default_loss_log_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MonitorConfig {
    pub(crate) target: String,
    #[serde(default = "default_listen_addr")]
    pub(crate) listen_addr: IpAddr,
    #[serde(default = "default_listen_port")]
    pub(crate) listen_port: u16,
    #[serde(default = "default_one_second", with = "humantime_serde")]
    pub(crate) probe_interval: Duration,
    #[serde(default = "default_one_second", with = "humantime_serde")]
    pub(crate) probe_timeout: Duration,
    #[serde(default)]
    pub(crate) schedule: Schedule,
    #[serde(default = "default_page_refresh", with = "humantime_serde")]
    pub(crate) page_refresh: Duration,
    #[serde(default = "default_ping_command")]
    pub(crate) ping_command: String,
    #[serde(default)]
    pub(crate) storage: StorageSettings,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_max_ping_entries() -> usize {
    100
}

fn default_ping_log_file() -> String {
    "ping_log.txt".to_string()
}

fn default_loss_log_file() -> String {
    "packet_loss_log.txt".to_string()
}

fn default_listen_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_listen_port() -> u16 {
    8080
}

fn default_one_second() -> Duration {
    Duration::from_secs(1)
}

fn default_page_refresh() -> Duration {
    Duration::from_secs(3)
}

fn default_ping_command() -> String {
    "ping".to_string()
}

impl MonitorConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        let target = self.target.trim();
        if target.is_empty() {
            anyhow::bail!("target must not be empty");
        }
        if target.starts_with('-') || self.target.chars().any(char::is_whitespace) {
            anyhow::bail!("target {:?} is not a valid host name or address", self.target);
        }
        if self.probe_interval.is_zero() {
            anyhow::bail!("probe_interval must be greater than zero");
        }
        if self.probe_timeout.is_zero() {
            anyhow::bail!("probe_timeout must be greater than zero");
        }
        if self.page_refresh < Duration::from_secs(1) {
            anyhow::bail!("page_refresh must be at least one second");
        }
        if self.ping_command.trim().is_empty() {
            anyhow::bail!("ping_command must not be empty");
        }
        if self.storage.max_ping_entries == 0 {
            anyhow::bail!("storage.max_ping_entries must be greater than zero");
        }
        if self.storage.ping_log_file == self.storage.loss_log_file {
            anyhow::bail!("ping and loss logs must use different files");
        }
        Ok(())
    }
}

/// Loads the config file (explicit path, or `config/default.toml` when present)
/// and overlays `PINGWATCH_*` environment variables.
pub(crate) fn load(path: Option<&Path>) -> Result<MonitorConfig> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config/default").required(false),
    };
    let settings = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("PINGWATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read configuration")?;
    let config: MonitorConfig = settings
        .try_deserialize()
        .context("invalid configuration")?;
    config.validate()?;
    Ok(config)
}
