//! Main monitor API
//!
//! [`StreamMonitor`] is what a dashboard, CLI or exporter talks to. It runs
//! discovery once when connecting, then exposes the catalog, the selection
//! and history snapshots.

use crate::catalog::{discover, ResolvedRoles, SignalCatalog, SignalRole};
use crate::config::MonitorConfig;
use crate::history::HistoryStore;
use crate::poller::{PollTarget, PollerSession, StartOutcome};
use crate::source::{DocumentSource, HttpSource};
use crate::types::{Record, Result, SelectionSet};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Latest values of the status roles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusPanel {
    pub execution_state: Option<String>,
    pub availability: Option<String>,
    pub emergency_stop: Option<String>,
}

impl StatusPanel {
    pub fn get(&self, role: SignalRole) -> Option<&str> {
        match role {
            SignalRole::ExecutionState => self.execution_state.as_deref(),
            SignalRole::Availability => self.availability.as_deref(),
            SignalRole::EmergencyStop => self.emergency_stop.as_deref(),
        }
    }
}

impl fmt::Display for StatusPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = SignalRole::ALL
            .iter()
            .map(|role| format!("{}: {}", role, self.get(*role).unwrap_or("--")))
            .collect();
        f.write_str(&parts.join(" | "))
    }
}

/// Consumer-facing handle on one agent
pub struct StreamMonitor {
    config: MonitorConfig,
    catalog: SignalCatalog,
    roles: ResolvedRoles,
    session: PollerSession,
}

impl StreamMonitor {
    /// Validate the configuration, discover signals and prepare an idle session
    ///
    /// An unreachable agent is not an error here: the catalog is just empty.
    /// Only configuration errors fail.
    pub fn connect(config: MonitorConfig, source: Arc<dyn DocumentSource>) -> Result<Self> {
        config.validate()?;

        let catalog = discover(source.as_ref(), &config.agent_url, config.namespace.as_deref());
        if catalog.is_empty() {
            log::warn!("No signals available from {}", config.agent_url);
        }
        let roles = catalog.resolve_roles(&config.roles);

        let target = PollTarget {
            source,
            agent_url: config.agent_url.clone(),
            namespace: config.namespace.clone(),
            interval: config.poll_interval(),
        };
        let history = Arc::new(HistoryStore::new(config.max_history));
        let session = PollerSession::new(target, history, config.stop_timeout());

        Ok(Self {
            config,
            catalog,
            roles,
            session,
        })
    }

    /// Connect over HTTP using the configured fetch timeout
    pub fn connect_http(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let source = HttpSource::new(config.fetch_timeout())?;
        Self::connect(config, Arc::new(source))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The catalog discovered at connect time
    pub fn get_catalog(&self) -> &SignalCatalog {
        &self.catalog
    }

    /// Roles resolved against the catalog
    pub fn roles(&self) -> &ResolvedRoles {
        &self.roles
    }

    /// Replace the selection and (re)start polling
    ///
    /// Labels unknown to the catalog are skipped. History is cleared before
    /// the first record of the new selection is written.
    pub fn set_selection<I, S>(&self, labels: I) -> Result<StartOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selection = self.catalog.select(labels);
        log::info!("Selection set to {} signals", selection.len());
        self.session.start(selection)
    }

    /// Selection of the running poll loop
    pub fn selection(&self) -> Option<SelectionSet> {
        self.session.selection()
    }

    /// Copy of the history, oldest first
    pub fn get_latest_snapshot(&self) -> Vec<Record> {
        self.session.history().snapshot()
    }

    pub fn latest_record(&self) -> Option<Record> {
        self.session.history().latest()
    }

    /// Shared handle on the history store
    pub fn history(&self) -> Arc<HistoryStore> {
        Arc::clone(self.session.history())
    }

    /// Status roles read from the latest record
    ///
    /// A role shows `None` until it is both bound in the catalog and part of
    /// the current selection.
    pub fn status_panel(&self) -> StatusPanel {
        let latest = self.latest_record();
        let value = |role: SignalRole| -> Option<String> {
            let label = self.roles.get(&role)?;
            latest.as_ref()?.get(label).map(str::to_string)
        };

        StatusPanel {
            execution_state: value(SignalRole::ExecutionState),
            availability: value(SignalRole::Availability),
            emergency_stop: value(SignalRole::EmergencyStop),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.session.is_running()
    }

    /// Stop polling; returns false if the loop overran the stop timeout
    pub fn stop(&self) -> bool {
        self.session.stop()
    }
}
