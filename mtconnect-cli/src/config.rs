//! Configuration loading and parsing

use anyhow::{Context, Result};
use mtconnect_stream::{MonitorConfig, RoleBindings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub roles: RoleBindings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub url: String,
    pub namespace: Option<String>,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Number of cycles to run (None = until stopped)
    pub iterations: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            max_history: default_max_history(),
            iterations: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalsConfig {
    pub track: SignalTrackMode,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            track: SignalTrackMode::List(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SignalTrackMode {
    All(String), // "all"
    List(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// CSV export of the history on exit
    pub csv: Option<PathBuf>,
    /// JSON export of the history on exit
    pub json: Option<PathBuf>,
    /// Pose log written by the `pose` command
    pub pose_log: Option<PathBuf>,
}

fn default_fetch_timeout() -> u64 {
    2000
}

fn default_interval() -> u64 {
    3000
}

fn default_max_history() -> usize {
    1000
}

impl AppConfig {
    /// Configuration for an agent URL with everything else defaulted
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            agent: AgentConfig {
                url: url.into(),
                namespace: None,
                fetch_timeout_ms: default_fetch_timeout(),
            },
            polling: PollingConfig::default(),
            signals: SignalsConfig::default(),
            output: OutputConfig::default(),
            roles: RoleBindings::default(),
        }
    }

    /// Library configuration derived from this file
    pub fn monitor_config(&self) -> MonitorConfig {
        let mut config = MonitorConfig::new(self.agent.url.clone()).with_roles(self.roles.clone());
        config.namespace = self.agent.namespace.clone();
        config.fetch_timeout_ms = self.agent.fetch_timeout_ms;
        config.poll_interval_ms = self.polling.interval_ms;
        config.max_history = self.polling.max_history;
        config
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if let SignalTrackMode::All(ref mode) = config.signals.track {
        if !mode.eq_ignore_ascii_case("all") {
            anyhow::bail!("signals.track must be \"all\" or a list of labels, got {:?}", mode);
        }
    }

    Ok(config)
}
