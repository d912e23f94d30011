//! Monitor configuration types
//!
//! This module defines the configuration the library needs to discover and
//! poll one MTConnect agent. Presentation concerns (which labels to show,
//! where to export) belong to the application layer.

use crate::catalog::RoleBindings;
use crate::types::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a stream monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Agent `current` endpoint, e.g. `http://localhost:5000/current`
    pub agent_url: String,

    /// MTConnect Streams namespace to expect (None = read it from the document)
    #[serde(default)]
    pub namespace: Option<String>,

    /// Poll cadence in milliseconds (default: 3000ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum number of records kept in history (default: 1000)
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// HTTP timeout for one fetch in milliseconds (default: 2000ms)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    /// Extra time granted to a stopping poll loop beyond one interval (default: 500ms)
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,

    /// Semantic role bindings used for the status panel
    #[serde(default)]
    pub roles: RoleBindings,
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_max_history() -> usize {
    1000
}

fn default_fetch_timeout() -> u64 {
    2000
}

fn default_stop_grace() -> u64 {
    500
}

impl MonitorConfig {
    /// Create a configuration for an agent URL with default settings
    pub fn new(agent_url: impl Into<String>) -> Self {
        Self {
            agent_url: agent_url.into(),
            namespace: None,
            poll_interval_ms: default_poll_interval(),
            max_history: default_max_history(),
            fetch_timeout_ms: default_fetch_timeout(),
            stop_grace_ms: default_stop_grace(),
            roles: RoleBindings::default(),
        }
    }

    /// Builder method: pin the expected Streams namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Builder method: set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method: set the history capacity
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Builder method: set the fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the stop grace period
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Builder method: replace the role bindings
    pub fn with_roles(mut self, roles: RoleBindings) -> Self {
        self.roles = roles;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// How long a restart waits for the previous loop to exit
    pub fn stop_timeout(&self) -> Duration {
        self.poll_interval() + Duration::from_millis(self.stop_grace_ms)
    }

    /// Reject configurations that can never poll successfully
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.agent_url).map_err(|e| {
            StreamError::Config(format!("invalid agent URL {:?}: {}", self.agent_url, e))
        })?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(StreamError::Config(format!(
                    "unsupported URL scheme {:?} (expected http or https)",
                    other
                )))
            }
        }

        if self.poll_interval_ms == 0 {
            return Err(StreamError::Config("poll interval must be non-zero".into()));
        }
        if self.max_history == 0 {
            return Err(StreamError::Config("history capacity must be non-zero".into()));
        }

        Ok(())
    }
}
