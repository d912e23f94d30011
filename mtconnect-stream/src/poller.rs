//! Selective poller
//!
//! Polls the agent at a fixed cadence for a caller-chosen selection and
//! appends one [`Record`] per cycle into the [`HistoryStore`].
//!
//! Locking rules:
//! - The history lock is only taken for the final append, never across a
//!   fetch or a parse.
//! - Cancellation is cooperative and checked at the top of each cycle. A
//!   fetch already in flight finishes first.

use crate::extractor::extract;
use crate::history::HistoryStore;
use crate::source::DocumentSource;
use crate::types::{Record, Result, SelectionSet, StreamError, NOT_AVAILABLE};
use chrono::{SecondsFormat, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Poll the agent once and build a record for `selection`
///
/// Every selected label gets a cell: the first matching item's value, or
/// `"N/A"` if the item is absent from this document.
///
/// # Returns
/// * `Err(StreamError::NoSelection)` - the selection is empty (nothing is fetched)
/// * `Err(StreamError::Fetch | StreamError::MalformedDocument)` - this cycle failed
pub fn poll_once(
    source: &dyn DocumentSource,
    agent_url: &str,
    namespace: Option<&str>,
    selection: &SelectionSet,
) -> Result<Record> {
    if selection.is_empty() {
        return Err(StreamError::NoSelection);
    }

    let document = source.fetch(agent_url)?;
    let extraction = extract(&document, namespace)?;

    let mut by_name: HashMap<&str, &str> = HashMap::new();
    for signal in &extraction.signals {
        by_name
            .entry(signal.identity.internal_name.as_str())
            .or_insert(signal.value.as_str());
    }

    let values = selection
        .iter()
        .map(|(label, internal_name)| {
            let value = by_name.get(internal_name).copied().unwrap_or(NOT_AVAILABLE);
            (label.to_string(), value.to_string())
        })
        .collect();

    let timestamp = extraction
        .creation_time
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

    Ok(Record::new(timestamp, values))
}

/// Cooperative cancellation flag with an interruptible wait
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake any waiter
    pub fn cancel(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock() = true;
        wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for up to `timeout`; returns true if cancelled
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = flag.lock();
        while !*cancelled {
            if wake.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

/// Counters returned when a poll loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Records appended to history
    pub records: u64,
    /// Cycles that failed to fetch or parse
    pub failures: u64,
    /// Cycles skipped because the selection was empty
    pub skipped: u64,
}

/// Everything a poll loop needs besides its selection
#[derive(Clone)]
pub struct PollTarget {
    pub source: Arc<dyn DocumentSource>,
    pub agent_url: String,
    pub namespace: Option<String>,
    pub interval: Duration,
}

/// Poll at a fixed cadence until `token` is cancelled
///
/// A failed cycle is logged and the loop sleeps a full interval before
/// trying again; failures never end the loop.
pub fn run(
    target: &PollTarget,
    selection: &SelectionSet,
    history: &HistoryStore,
    token: &CancellationToken,
) -> RunStats {
    let mut stats = RunStats::default();
    log::info!(
        "Poll loop started: {} signals every {:?} from {}",
        selection.len(),
        target.interval,
        target.agent_url
    );

    while !token.is_cancelled() {
        let started = Instant::now();

        let pause = match poll_once(
            target.source.as_ref(),
            &target.agent_url,
            target.namespace.as_deref(),
            selection,
        ) {
            Ok(record) => {
                log::debug!("Poll cycle at {}", record.timestamp());
                history.append(record);
                stats.records += 1;
                target.interval.saturating_sub(started.elapsed())
            }
            Err(StreamError::NoSelection) => {
                log::debug!("No signals selected, skipping cycle");
                stats.skipped += 1;
                target.interval
            }
            Err(e) => {
                log::warn!("Poll cycle failed: {}", e);
                stats.failures += 1;
                target.interval
            }
        };

        if token.wait_timeout(pause) {
            break;
        }
    }

    log::info!(
        "Poll loop stopped: {} records, {} failed cycles",
        stats.records,
        stats.failures
    );
    stats
}

/// How a session start related to the previous loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// No loop was running
    Fresh,
    /// The previous loop exited before the new one started
    Replaced,
    /// The previous loop did not exit in time and may still append once
    Overlapping,
}

struct ActiveLoop {
    token: CancellationToken,
    selection: SelectionSet,
    handle: JoinHandle<()>,
    done: Receiver<RunStats>,
}

/// Owns the background poll loop and its restart lifecycle
pub struct PollerSession {
    target: PollTarget,
    history: Arc<HistoryStore>,
    stop_timeout: Duration,
    active: Mutex<Option<ActiveLoop>>,
}

impl PollerSession {
    /// Create an idle session writing into `history`
    ///
    /// `stop_timeout` bounds how long a restart waits for the old loop and
    /// should be somewhat longer than one interval.
    pub fn new(target: PollTarget, history: Arc<HistoryStore>, stop_timeout: Duration) -> Self {
        Self {
            target,
            history,
            stop_timeout,
            active: Mutex::new(None),
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Start polling `selection`, replacing any running loop
    ///
    /// The old loop is cancelled and waited for, then history is cleared,
    /// then the new loop is spawned. If the old loop overruns the stop
    /// timeout the new loop starts anyway and the overlap is reported.
    pub fn start(&self, selection: SelectionSet) -> Result<StartOutcome> {
        let mut active = self.active.lock();

        let outcome = match active.take() {
            None => StartOutcome::Fresh,
            Some(previous) => {
                if self.shutdown(previous) {
                    StartOutcome::Replaced
                } else {
                    log::warn!(
                        "Previous poll loop did not stop within {:?}; two loops may write history",
                        self.stop_timeout
                    );
                    StartOutcome::Overlapping
                }
            }
        };

        self.history.clear();

        let token = CancellationToken::new();
        let (done_tx, done_rx) = bounded(1);
        let handle = {
            let target = self.target.clone();
            let history = Arc::clone(&self.history);
            let token = token.clone();
            let selection = selection.clone();
            thread::Builder::new()
                .name("mtconnect-poller".to_string())
                .spawn(move || {
                    let stats = run(&target, &selection, &history, &token);
                    let _ = done_tx.send(stats);
                })?
        };

        *active = Some(ActiveLoop {
            token,
            selection,
            handle,
            done: done_rx,
        });

        Ok(outcome)
    }

    /// Stop the running loop, if any; returns false if it overran the stop timeout
    pub fn stop(&self) -> bool {
        match self.active.lock().take() {
            Some(previous) => self.shutdown(previous),
            None => true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Selection of the running loop
    pub fn selection(&self) -> Option<SelectionSet> {
        self.active.lock().as_ref().map(|a| a.selection.clone())
    }

    fn shutdown(&self, previous: ActiveLoop) -> bool {
        previous.token.cancel();

        match previous.done.recv_timeout(self.stop_timeout) {
            Ok(stats) => {
                log::debug!("Previous poll loop exited: {:?}", stats);
                if previous.handle.join().is_err() {
                    log::error!("Poll loop thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("Poll loop thread exited without reporting");
                let _ = previous.handle.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

impl Drop for PollerSession {
    fn drop(&mut self) {
        if let Some(previous) = self.active.get_mut().take() {
            previous.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use crate::types::TIMESTAMP_COLUMN;

    const DOC: &str = r#"<MTConnectStreams xmlns="urn:mtconnect.org:MTConnectStreams:1.3">
      <Header creationTime="2025-03-01T10:00:00Z"/>
      <Streams><DeviceStream name="Mazak">
        <ComponentStream component="Rotary" name="C">
          <Samples>
            <RotaryVelocity dataItemId="c2" name="Srpm">1200</RotaryVelocity>
            <RotaryVelocity dataItemId="c3" name="Srpm">999</RotaryVelocity>
          </Samples>
        </ComponentStream>
        <ComponentStream component="Linear" name="X">
          <Samples><Position dataItemId="x1" name="Xpos">UNAVAILABLE</Position></Samples>
        </ComponentStream>
      </DeviceStream></Streams>
    </MTConnectStreams>"#;

    fn target(source: Arc<dyn DocumentSource>, interval_ms: u64) -> PollTarget {
        PollTarget {
            source,
            agent_url: "http://agent/current".to_string(),
            namespace: None,
            interval: Duration::from_millis(interval_ms),
        }
    }

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_poll_once_fills_missing_with_na() {
        let source = StaticSource::new(DOC);
        let selection = SelectionSet::from_pairs(vec![
            ("Spindle Speed", "Srpm"),
            ("X Position", "Xpos"),
            ("Tool Number", "tool"),
        ]);

        let record = poll_once(&source, "http://agent/current", None, &selection).unwrap();

        assert_eq!(record.key_count(), 4);
        assert_eq!(record.get(TIMESTAMP_COLUMN), Some("2025-03-01T10:00:00Z"));
        // First matching element wins
        assert_eq!(record.get("Spindle Speed"), Some("1200"));
        assert_eq!(record.get("X Position"), Some(NOT_AVAILABLE));
        assert_eq!(record.get("Tool Number"), Some(NOT_AVAILABLE));
    }

    #[test]
    fn test_poll_once_omitted_element() {
        let source = StaticSource::new(
            r#"<MTConnectStreams><Header creationTime="ts1"/><Streams/></MTConnectStreams>"#,
        );
        let selection = SelectionSet::from_pairs(vec![("Spindle Speed", "Srpm")]);

        let record = poll_once(&source, "http://agent/current", None, &selection).unwrap();
        assert_eq!(record.columns(), vec!["Timestamp", "Spindle Speed"]);
        assert_eq!(record.get("Timestamp"), Some("ts1"));
        assert_eq!(record.get("Spindle Speed"), Some("N/A"));
    }

    #[test]
    fn test_poll_once_empty_selection_skips_fetch() {
        let source = StaticSource::new(DOC);
        let result = poll_once(&source, "http://agent/current", None, &SelectionSet::new());

        assert!(matches!(result, Err(StreamError::NoSelection)));
        assert_eq!(source.fetch_count(), 0);
    }

    #[test]
    fn test_poll_once_without_header_uses_clock() {
        let source = StaticSource::new("<MTConnectStreams><Streams/></MTConnectStreams>");
        let selection = SelectionSet::from_pairs(vec![("S", "Srpm")]);

        let record = poll_once(&source, "http://agent/current", None, &selection).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(record.timestamp()).is_ok());
    }

    #[test]
    fn test_token_wait_interrupted() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || token.wait_timeout(Duration::from_secs(30)))
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(waiter.join().unwrap());
        assert!(token.is_cancelled());
        assert!(token.wait_timeout(Duration::from_secs(30)));
    }

    #[test]
    fn test_run_survives_failed_cycles() {
        let source = Arc::new(StaticSource::scripted(vec![
            None,
            Some("not xml <".to_string()),
            Some(DOC.to_string()),
        ]));
        let history = Arc::new(HistoryStore::new(100));
        let token = CancellationToken::new();
        let selection = SelectionSet::from_pairs(vec![("Spindle Speed", "Srpm")]);

        let handle = {
            let target = target(source.clone(), 5);
            let history = Arc::clone(&history);
            let token = token.clone();
            thread::spawn(move || run(&target, &selection, &history, &token))
        };

        wait_for(|| history.len() >= 2);
        token.cancel();
        let stats = handle.join().unwrap();

        assert_eq!(stats.failures, 2);
        assert!(stats.records >= 2);
        assert!(history.snapshot().iter().all(|r| r.get("Spindle Speed") == Some("1200")));
    }

    #[test]
    fn test_record_shape_is_constant() {
        let source = Arc::new(StaticSource::scripted(vec![
            Some(DOC.to_string()),
            Some("<MTConnectStreams><Streams/></MTConnectStreams>".to_string()),
            Some(DOC.to_string()),
        ]));
        let history = Arc::new(HistoryStore::new(100));
        let session = PollerSession::new(target(source, 5), Arc::clone(&history), Duration::from_secs(1));

        let selection = SelectionSet::from_pairs(vec![("Spindle Speed", "Srpm"), ("X", "Xpos")]);
        session.start(selection).unwrap();
        wait_for(|| history.len() >= 4);
        assert!(session.stop());

        for record in history.snapshot() {
            assert_eq!(record.key_count(), 3);
            assert_eq!(record.columns(), vec!["Timestamp", "Spindle Speed", "X"]);
        }
    }

    #[test]
    fn test_restart_clears_history_first() {
        let source: Arc<dyn DocumentSource> = Arc::new(StaticSource::new(DOC));
        let history = Arc::new(HistoryStore::new(100));
        // Long interval: the first loop is asleep when the restart happens
        let session = PollerSession::new(target(source, 10_000), Arc::clone(&history), Duration::from_secs(11));

        let outcome = session
            .start(SelectionSet::from_pairs(vec![("Old", "Srpm")]))
            .unwrap();
        assert_eq!(outcome, StartOutcome::Fresh);
        wait_for(|| history.len() == 1);

        let outcome = session
            .start(SelectionSet::from_pairs(vec![("New", "Srpm")]))
            .unwrap();
        assert_eq!(outcome, StartOutcome::Replaced);
        assert_eq!(session.selection().unwrap().labels().collect::<Vec<_>>(), vec!["New"]);

        wait_for(|| history.len() == 1);
        let snapshot = history.snapshot();
        assert!(snapshot.iter().all(|r| r.get("Old").is_none() && r.get("New").is_some()));

        assert!(session.stop());
        assert!(!session.is_running());
    }

    struct SlowSource;

    impl DocumentSource for SlowSource {
        fn fetch(&self, _url: &str) -> Result<String> {
            thread::sleep(Duration::from_millis(300));
            Ok(DOC.to_string())
        }
    }

    #[test]
    fn test_restart_overlap_is_reported() {
        let history = Arc::new(HistoryStore::new(100));
        let session = PollerSession::new(
            target(Arc::new(SlowSource), 10),
            Arc::clone(&history),
            Duration::from_millis(30),
        );

        session.start(SelectionSet::from_pairs(vec![("A", "Srpm")])).unwrap();
        thread::sleep(Duration::from_millis(50));

        // The first loop is inside its 300ms fetch and cannot observe the cancel in time
        let outcome = session.start(SelectionSet::from_pairs(vec![("B", "Srpm")])).unwrap();
        assert_eq!(outcome, StartOutcome::Overlapping);
        assert!(session.is_running());
        session.stop();
    }
}
