//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use resource_cache::{
    CacheError, CacheOptions, ErrorReporter, FetchError, Fetcher, RequestCoordinator,
    RequestDescriptor,
};
use tempfile::TempDir;

/// Fetcher serving canned payloads per locator, counting every call.
#[derive(Default)]
pub struct MockFetcher {
    payloads: Mutex<HashMap<String, Bytes>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn serve(self, locator: &str, payload: &[u8]) -> Self {
        self.set(locator, payload);
        self
    }

    pub fn set(&self, locator: &str, payload: &[u8]) {
        self.payloads
            .lock()
            .unwrap()
            .insert(locator.to_string(), Bytes::copy_from_slice(payload));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let payload = self.payloads.lock().unwrap().get(descriptor.locator()).cloned();
        payload.ok_or_else(|| FetchError::Status {
            locator: descriptor.locator().to_string(),
            status: 404,
        })
    }
}

/// Reporter that records every reported error message.
pub fn recording_reporter() -> (ErrorReporter, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let reporter =
        ErrorReporter::new(move |e: &CacheError| sink.lock().unwrap().push(e.to_string()));
    (reporter, seen)
}

pub fn coordinator(
    dir: &TempDir,
    capacity: u64,
    fetcher: Arc<MockFetcher>,
    reporter: ErrorReporter,
) -> RequestCoordinator {
    RequestCoordinator::open(&CacheOptions::new(dir.path(), capacity), fetcher, reporter).unwrap()
}
