//! Agent document sources
//!
//! The network fetch is a seam: discovery and polling only need "give me the
//! document at this URL". [`HttpSource`] does it over HTTP; [`StaticSource`]
//! serves documents from memory for offline runs and tests.

use crate::types::{Result, StreamError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Anything that can return the current MTConnect document for a URL
///
/// Implementations do not retry; retry policy belongs to the caller.
pub trait DocumentSource: Send + Sync {
    /// Fetch the document text at `url`
    fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP GET source backed by a blocking reqwest client
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    /// Create a source whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl DocumentSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<String> {
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| StreamError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Fetch(format!("HTTP {} from {}", status, url)));
        }

        response
            .text()
            .map_err(|e| StreamError::Fetch(format!("failed to read body: {}", e)))
    }
}

/// In-memory source
///
/// Serves queued responses in order; once the queue is down to one entry,
/// that entry is served for every further fetch. `None` entries fail with
/// [`StreamError::Fetch`].
pub struct StaticSource {
    responses: Mutex<VecDeque<Option<String>>>,
    fetches: AtomicUsize,
}

impl StaticSource {
    /// Always serve `document`
    pub fn new(document: impl Into<String>) -> Self {
        Self::scripted(vec![Some(document.into())])
    }

    /// Always fail
    pub fn failing() -> Self {
        Self::scripted(vec![None])
    }

    /// Serve the given responses in order, repeating the last one
    pub fn scripted(responses: Vec<Option<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Replace whatever is queued with a single document
    pub fn set_document(&self, document: impl Into<String>) {
        let mut responses = self.responses.lock();
        responses.clear();
        responses.push_back(Some(document.into()));
    }

    /// Number of fetches served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl DocumentSource for StaticSource {
    fn fetch(&self, url: &str) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let mut responses = self.responses.lock();
        let response = if responses.len() > 1 {
            responses.pop_front().flatten()
        } else {
            responses.front().cloned().flatten()
        };

        response.ok_or_else(|| StreamError::Fetch(format!("no document for {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_script() {
        let source = StaticSource::scripted(vec![
            Some("<a/>".to_string()),
            None,
            Some("<b/>".to_string()),
        ]);

        assert_eq!(source.fetch("u").unwrap(), "<a/>");
        assert!(matches!(source.fetch("u"), Err(StreamError::Fetch(_))));
        assert_eq!(source.fetch("u").unwrap(), "<b/>");
        assert_eq!(source.fetch("u").unwrap(), "<b/>");
        assert_eq!(source.fetch_count(), 4);
    }

    #[test]
    fn test_set_document() {
        let source = StaticSource::failing();
        assert!(source.fetch("u").is_err());

        source.set_document("<c/>");
        assert_eq!(source.fetch("u").unwrap(), "<c/>");
    }
}
