//! Core types for the MTConnect stream library
//!
//! This module defines the values that flow between the extractor, the
//! catalog, the poller and the history store: signal identities, selections,
//! poll records and the error taxonomy.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Cell value written for a selected signal that was absent in a poll
pub const NOT_AVAILABLE: &str = "N/A";

/// Name of the first column of every record
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

pub(crate) const UNKNOWN_DEVICE: &str = "UnknownDevice";
pub(crate) const UNKNOWN_COMPONENT: &str = "UnknownComponent";
pub(crate) const UNKNOWN_COMPONENT_TYPE: &str = "UnknownType";

/// Errors that can occur while discovering or polling an agent
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to fetch agent document: {0}")]
    Fetch(String),

    #[error("Malformed MTConnect document: {0}")]
    MalformedDocument(String),

    #[error("Unexpected MTConnect schema: expected namespace {expected:?}, found {found:?}")]
    UnexpectedSchema { expected: String, found: String },

    #[error("No signals selected")]
    NoSelection,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// MTConnect data item category sections, in traversal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    /// Continuous measurements
    Samples,
    /// Discrete state changes
    Events,
    /// Health conditions
    Condition,
}

impl Category {
    /// All categories in the order they are walked inside a component stream
    pub const ALL: [Category; 3] = [Category::Samples, Category::Events, Category::Condition];

    /// XML element name of the section
    pub fn element_name(self) -> &'static str {
        match self {
            Category::Samples => "Samples",
            Category::Events => "Events",
            Category::Condition => "Condition",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Identity of one data item as discovered in a document
///
/// `internal_name` is the stable key used to find the same item again in
/// later documents. `display_label` is derived and only used for
/// presentation and selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SignalIdentity {
    pub device_name: String,
    pub component_name: String,
    pub component_type: String,
    pub internal_name: String,
    pub display_label: String,
}

impl SignalIdentity {
    /// Build an identity and derive its display label
    pub fn new(
        device_name: impl Into<String>,
        component_name: impl Into<String>,
        component_type: impl Into<String>,
        internal_name: impl Into<String>,
    ) -> Self {
        let device_name = device_name.into();
        let component_name = component_name.into();
        let internal_name = internal_name.into();
        let display_label = format!(
            "{} ({} - {})",
            humanize(&internal_name),
            component_name,
            device_name
        );

        Self {
            device_name,
            component_name,
            component_type: component_type.into(),
            internal_name,
            display_label,
        }
    }
}

/// One non-absent data item yielded by the extractor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedSignal {
    pub identity: SignalIdentity,
    /// Section the element was found in
    pub category: Category,
    /// Local tag name of the element (e.g. `RotaryVelocity`)
    pub element_name: String,
    /// Trimmed text content, never empty and never `UNAVAILABLE`
    pub value: String,
    /// The element's own `timestamp` attribute, if present
    pub timestamp: Option<String>,
}

/// Turn an internal data item name into words for a label
///
/// Splits on `_`, `-`, whitespace and camel-case boundaries, then
/// upper-cases the first letter of each word: `partCount` and `part_count`
/// both become `Part Count`.
pub fn humanize(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Caller-chosen subset of the catalog: ordered `(display_label, internal_name)` pairs
///
/// A selection is replaced as a whole; there is no incremental add/remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    entries: Vec<(String, String)>,
}

impl SelectionSet {
    /// Create an empty selection
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selection from label/internal-name pairs
    ///
    /// Order is kept; a repeated label keeps its first occurrence.
    pub fn from_pairs<I, L, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, N)>,
        L: Into<String>,
        N: Into<String>,
    {
        let mut selection = Self::new();
        for (label, internal_name) in pairs {
            let label = label.into();
            if selection.internal_name(&label).is_none() {
                selection.entries.push((label, internal_name.into()));
            }
        }
        selection
    }

    /// Internal name bound to a label
    pub fn internal_name(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, n)| n.as_str())
    }

    /// Labels in selection order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    /// Iterate `(label, internal_name)` pairs in selection order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, n)| (l.as_str(), n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of one poll cycle
///
/// Always holds exactly one value per label of the selection it was polled
/// with, in selection order, so that consecutive records share a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    timestamp: String,
    values: Vec<(String, String)>,
}

impl Record {
    /// Create a record from a timestamp and ordered label/value cells
    pub fn new(timestamp: impl Into<String>, values: Vec<(String, String)>) -> Self {
        Self {
            timestamp: timestamp.into(),
            values,
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Value for a column; `Timestamp` is addressable like any other column
    pub fn get(&self, column: &str) -> Option<&str> {
        if column == TIMESTAMP_COLUMN {
            return Some(&self.timestamp);
        }
        self.values
            .iter()
            .find(|(l, _)| l == column)
            .map(|(_, v)| v.as_str())
    }

    /// Column names: `Timestamp` followed by the selection labels
    pub fn columns(&self) -> Vec<&str> {
        std::iter::once(TIMESTAMP_COLUMN)
            .chain(self.values.iter().map(|(l, _)| l.as_str()))
            .collect()
    }

    /// Label/value cells without the timestamp
    pub fn values(&self) -> &[(String, String)] {
        &self.values
    }

    /// Number of keys including `Timestamp`
    pub fn key_count(&self) -> usize {
        self.values.len() + 1
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.key_count()))?;
        map.serialize_entry(TIMESTAMP_COLUMN, &self.timestamp)?;
        for (label, value) in &self.values {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}
