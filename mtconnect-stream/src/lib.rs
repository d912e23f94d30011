//! MTConnect Stream Library
//!
//! A reusable library for discovering and polling the data items an MTConnect
//! agent publishes on its `current` endpoint.
//!
//! # Architecture
//!
//! - The extractor flattens one Streams document into data items
//! - Discovery classifies every available item as numeric or status once
//! - The poller re-reads a chosen subset at a fixed cadence into records
//! - The history store keeps the latest records for concurrent readers
//!
//! The library does NOT:
//! - Render anything
//! - Retry failed fetches inside one cycle
//! - Persist history except through explicit export
//!
//! All presentation is in the application layer (mtconnect-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use mtconnect_stream::{MonitorConfig, StreamMonitor};
//! use std::time::Duration;
//!
//! let config = MonitorConfig::new("http://localhost:5000/current")
//!     .with_poll_interval(Duration::from_secs(3))
//!     .with_max_history(1000);
//!
//! let monitor = StreamMonitor::connect_http(config).unwrap();
//!
//! for (label, _) in monitor.get_catalog().numeric_signals().iter() {
//!     println!("numeric: {}", label);
//! }
//!
//! let labels: Vec<String> = monitor
//!     .get_catalog()
//!     .numeric_signals()
//!     .labels()
//!     .take(3)
//!     .map(str::to_string)
//!     .collect();
//! monitor.set_selection(&labels).unwrap();
//!
//! std::thread::sleep(Duration::from_secs(10));
//! for record in monitor.get_latest_snapshot() {
//!     println!("{:?}", record);
//! }
//! ```

// Public modules
pub mod catalog;
pub mod config;
pub mod export;
pub mod extractor;
pub mod history;
pub mod monitor;
pub mod poller;
pub mod pose;
pub mod source;
pub mod types;

// Re-export main types for convenience
pub use catalog::{discover, RoleBindings, SignalCatalog, SignalMap, SignalRole};
pub use config::MonitorConfig;
pub use extractor::{extract, Extraction};
pub use history::HistoryStore;
pub use monitor::{StatusPanel, StreamMonitor};
pub use poller::{poll_once, CancellationToken, PollTarget, PollerSession, RunStats, StartOutcome};
pub use pose::{PoseLog, PoseSample};
pub use source::{DocumentSource, HttpSource, StaticSource};
pub use types::{
    Category, ExtractedSignal, Record, Result, SelectionSet, SignalIdentity, StreamError,
    NOT_AVAILABLE, TIMESTAMP_COLUMN,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
