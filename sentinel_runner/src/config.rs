//! The runner's configuration file.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, `SENTINEL_*`
//! environment variables and command-line flags (clap resolves the last two).

use crate::cli::Cli;
use anyhow::{Context, Result, bail};
use posture_sentinel::{ClassifierConfig, ConnectorConfig, MonitorConfig, SentinelConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Ring the terminal bell on every alert.
    pub bell: bool,
    /// Shell command run on every alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Deliveries slower than this are abandoned.
    pub delivery_timeout_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            bell: true,
            command: None,
            delivery_timeout_ms: 10_000,
        }
    }
}

impl AlertConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Address for the web status server. Unset means no server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Every entry becomes its own session.
    pub sources: Vec<String>,
    pub connector: ConnectorConfig,
    pub classifier: ClassifierConfig,
    pub monitor: MonitorConfig,
    pub alerts: AlertConfig,
    pub status: StatusConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sources: vec![SentinelConfig::default().source],
            connector: ConnectorConfig::default(),
            classifier: ClassifierConfig::default(),
            monitor: MonitorConfig::default(),
            alerts: AlertConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("serializing config")?;
        fs::write(path, content).with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    /// Layers flag and environment values on top of the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if !cli.sources.is_empty() {
            self.sources = cli.sources.clone();
        }
        if let Some(secs) = cli.warning_threshold_secs {
            self.monitor.warning_threshold_secs = secs;
        }
        if let Some(secs) = cli.warning_cooldown_secs {
            self.monitor.warning_cooldown_secs = secs;
        }
        if let Some(deg) = cli.neck_threshold_deg {
            self.classifier.neck_threshold_deg = deg;
        }
        if let Some(deg) = cli.torso_threshold_deg {
            self.classifier.torso_threshold_deg = deg;
        }
        if let Some(retries) = cli.max_retries {
            self.connector.max_retries = retries;
        }
        if let Some(failures) = cli.max_consecutive_failures {
            self.connector.max_consecutive_failures = failures;
        }
        if let Some(ms) = cli.read_timeout_ms {
            self.connector.read_timeout_ms = ms;
        }
        if let Some(command) = &cli.alert_command {
            self.alerts.command = Some(command.clone());
        }
        if cli.no_bell {
            self.alerts.bell = false;
        }
        if let Some(addr) = &cli.status_addr {
            self.status.bind_addr = Some(addr.clone());
        }
    }

    pub fn sentinel_for(&self, source: &str) -> SentinelConfig {
        SentinelConfig {
            source: source.to_string(),
            connector: self.connector.clone(),
            classifier: self.classifier.clone(),
            monitor: self.monitor.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("no stream sources configured");
        }
        for (i, source) in self.sources.iter().enumerate() {
            if self.sources[..i].contains(source) {
                bail!("stream source {source} is listed twice");
            }
            self.sentinel_for(source)
                .validate()
                .with_context(|| format!("invalid settings for {source}"))?;
        }
        Ok(())
    }
}
