//! Signal catalog and discovery
//!
//! Discovery reads one document and sorts every available data item into
//! numeric signals or status signals, keyed by display label. The catalog is
//! built once and then only read.

use crate::extractor::extract;
use crate::source::DocumentSource;
use crate::types::{ExtractedSignal, SelectionSet};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Ordered `display_label -> internal_name` mapping
///
/// Keeps discovery order so listings follow the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl SignalMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the label is already present; returns true if inserted
    pub fn insert_first(&mut self, label: &str, internal_name: &str) -> bool {
        if self.index.contains_key(label) {
            return false;
        }
        self.index.insert(label.to_string(), self.entries.len());
        self.entries.push((label.to_string(), internal_name.to_string()));
        true
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.index.get(label).map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Iterate `(label, internal_name)` in discovery order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, n)| (l.as_str(), n.as_str()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for SignalMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, name) in &self.entries {
            map.serialize_entry(label, name)?;
        }
        map.end()
    }
}

/// Semantic roles a status display cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalRole {
    ExecutionState,
    Availability,
    EmergencyStop,
}

impl SignalRole {
    pub const ALL: [SignalRole; 3] = [
        SignalRole::ExecutionState,
        SignalRole::Availability,
        SignalRole::EmergencyStop,
    ];
}

impl fmt::Display for SignalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalRole::ExecutionState => "Execution",
            SignalRole::Availability => "Availability",
            SignalRole::EmergencyStop => "E-Stop",
        };
        f.write_str(name)
    }
}

/// Explicit role -> internal_name bindings
///
/// Defaults follow the data item names most agents publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBindings {
    #[serde(default)]
    pub execution_state: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub emergency_stop: Option<String>,
}

impl Default for RoleBindings {
    fn default() -> Self {
        Self {
            execution_state: Some("execution".to_string()),
            availability: Some("avail".to_string()),
            emergency_stop: Some("estop".to_string()),
        }
    }
}

impl RoleBindings {
    /// Bindings with no role bound
    pub fn none() -> Self {
        Self {
            execution_state: None,
            availability: None,
            emergency_stop: None,
        }
    }

    /// Builder method: bind a role to an internal name
    pub fn bind(mut self, role: SignalRole, internal_name: impl Into<String>) -> Self {
        let slot = match role {
            SignalRole::ExecutionState => &mut self.execution_state,
            SignalRole::Availability => &mut self.availability,
            SignalRole::EmergencyStop => &mut self.emergency_stop,
        };
        *slot = Some(internal_name.into());
        self
    }

    pub fn get(&self, role: SignalRole) -> Option<&str> {
        match role {
            SignalRole::ExecutionState => self.execution_state.as_deref(),
            SignalRole::Availability => self.availability.as_deref(),
            SignalRole::EmergencyStop => self.emergency_stop.as_deref(),
        }
    }
}

/// Roles resolved against one catalog: role -> display label
pub type ResolvedRoles = HashMap<SignalRole, String>;

/// The discovered signal catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignalCatalog {
    numeric_signals: SignalMap,
    status_signals: SignalMap,
}

impl SignalCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify extracted items in traversal order
    ///
    /// A value that parses as `f64` makes the label numeric, anything else
    /// makes it a status signal. The first occurrence of a label decides and
    /// later items with the same label are ignored, even if their value would
    /// classify differently.
    pub fn from_signals(signals: &[ExtractedSignal]) -> Self {
        let mut catalog = Self::new();

        for signal in signals {
            let label = signal.identity.display_label.as_str();
            if catalog.contains(label) {
                log::trace!("Ignoring repeated label {:?}", label);
                continue;
            }

            let internal_name = signal.identity.internal_name.as_str();
            if signal.value.parse::<f64>().is_ok() {
                catalog.numeric_signals.insert_first(label, internal_name);
            } else {
                catalog.status_signals.insert_first(label, internal_name);
            }
        }

        catalog
    }

    pub fn numeric_signals(&self) -> &SignalMap {
        &self.numeric_signals
    }

    pub fn status_signals(&self) -> &SignalMap {
        &self.status_signals
    }

    pub fn contains(&self, label: &str) -> bool {
        self.numeric_signals.contains(label) || self.status_signals.contains(label)
    }

    pub fn is_numeric(&self, label: &str) -> bool {
        self.numeric_signals.contains(label)
    }

    /// Internal name behind a display label, from either partition
    pub fn internal_name(&self, label: &str) -> Option<&str> {
        self.numeric_signals
            .get(label)
            .or_else(|| self.status_signals.get(label))
    }

    pub fn len(&self) -> usize {
        self.numeric_signals.len() + self.status_signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a selection from labels, in the order given
    ///
    /// Labels missing from the catalog are skipped with a warning.
    pub fn select<I, S>(&self, labels: I) -> SelectionSet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pairs = Vec::new();
        for label in labels {
            let label = label.as_ref();
            match self.internal_name(label) {
                Some(name) => pairs.push((label.to_string(), name.to_string())),
                None => log::warn!("Signal {:?} is not in the catalog, skipping", label),
            }
        }
        SelectionSet::from_pairs(pairs)
    }

    /// Select every signal, numeric ones first
    pub fn select_all(&self) -> SelectionSet {
        SelectionSet::from_pairs(
            self.numeric_signals
                .iter()
                .chain(self.status_signals.iter()),
        )
    }

    /// Resolve role bindings to display labels
    ///
    /// Each role maps to the first catalog label whose internal name matches
    /// its binding, status signals searched before numeric ones.
    pub fn resolve_roles(&self, bindings: &RoleBindings) -> ResolvedRoles {
        let mut resolved = ResolvedRoles::new();

        for role in SignalRole::ALL {
            let Some(bound) = bindings.get(role) else {
                continue;
            };

            let label = self
                .status_signals
                .iter()
                .chain(self.numeric_signals.iter())
                .find(|(_, name)| *name == bound)
                .map(|(label, _)| label.to_string());

            match label {
                Some(label) => {
                    log::debug!("Role {} resolved to {:?}", role, label);
                    resolved.insert(role, label);
                }
                None => log::debug!("Role {} ({:?}) not present in catalog", role, bound),
            }
        }

        resolved
    }
}

/// Fetch one document and build the catalog from it
///
/// Fetch and parse failures are logged and produce an empty catalog so that
/// a caller sees "no signals available" rather than an error. The caller
/// decides whether an empty catalog is fatal.
pub fn discover(source: &dyn DocumentSource, agent_url: &str, namespace: Option<&str>) -> SignalCatalog {
    log::info!("Discovering signals at {}", agent_url);

    let document = match source.fetch(agent_url) {
        Ok(document) => document,
        Err(e) => {
            log::error!("Discovery failed: {}", e);
            return SignalCatalog::new();
        }
    };

    let extraction = match extract(&document, namespace) {
        Ok(extraction) => extraction,
        Err(e) => {
            log::error!("Discovery failed: {}", e);
            return SignalCatalog::new();
        }
    };

    let catalog = SignalCatalog::from_signals(&extraction.signals);
    log::info!(
        "Discovery complete: {} numeric, {} status signals",
        catalog.numeric_signals.len(),
        catalog.status_signals.len()
    );
    catalog
}
