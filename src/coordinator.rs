//! Request Coordinator
//!
//! Public entry point: resolves a descriptor from the disk store, falling back
//! to the network on a miss. Concurrent misses for the same key share one
//! fetch.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{compute_key, CacheKey, CacheStats, DiskStore, RequestDescriptor};
use crate::config::CacheOptions;
use crate::error::{CacheError, ErrorReporter, FetchError, Result};
use crate::fetch::Fetcher;

// == Source ==
/// Where a resolved payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Network,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Network => "network",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub payload: Bytes,
    pub source: Source,
}

/// Result broadcast to every caller waiting on one fetch.
type Outcome = std::result::Result<Resolved, FetchError>;

/// An outstanding fetch: the broadcast receiver and the task producing it.
struct InFlight {
    id: u64,
    outcome: watch::Receiver<Option<Outcome>>,
    task: JoinHandle<()>,
}

// == Stats ==
#[derive(Debug, Default)]
struct FetchCounters {
    fetches: AtomicU64,
    coalesced: AtomicU64,
    direct_fetches: AtomicU64,
    fetch_failures: AtomicU64,
    write_failures: AtomicU64,
}

/// Snapshot of store and network-fallback counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoordinatorStats {
    pub store: CacheStats,
    /// Fetcher invocations
    pub fetches: u64,
    /// Callers that joined an outstanding fetch instead of starting one
    pub coalesced: u64,
    /// Uncached fetches made through `fetch_direct`
    pub direct_fetches: u64,
    pub fetch_failures: u64,
    /// Fetched payloads that could not be persisted
    pub write_failures: u64,
    pub in_flight: usize,
}

// == Request Coordinator ==
/// Cache-with-fallback front door. Cheap to clone; clones share state.
///
/// Outstanding fetches are aborted by [`RequestCoordinator::shutdown`] or
/// when the last clone is dropped. A single caller giving up never cancels a
/// fetch other callers are waiting on.
#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    shared: Arc<Shared>,
}

struct Shared {
    store: Arc<Mutex<DiskStore>>,
    fetcher: Arc<dyn Fetcher>,
    in_flight: std::sync::Mutex<HashMap<CacheKey, InFlight>>,
    next_flight_id: AtomicU64,
    reporter: ErrorReporter,
    counters: FetchCounters,
}

impl RequestCoordinator {
    // == Constructors ==
    pub fn new(store: DiskStore, fetcher: Arc<dyn Fetcher>, reporter: ErrorReporter) -> Self {
        let shared = Shared {
            store: Arc::new(Mutex::new(store)),
            fetcher,
            in_flight: std::sync::Mutex::new(HashMap::new()),
            next_flight_id: AtomicU64::new(0),
            reporter,
            counters: FetchCounters::default(),
        };
        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(shared),
            }),
        }
    }

    /// Opens the disk store described by `options` and wraps it.
    pub fn open(
        options: &CacheOptions,
        fetcher: Arc<dyn Fetcher>,
        reporter: ErrorReporter,
    ) -> Result<Self> {
        let store = DiskStore::open(options, reporter.clone())?;
        Ok(Self::new(store, fetcher, reporter))
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    // == Resolve ==
    /// Returns the payload for `descriptor`, from disk when possible.
    ///
    /// On a miss, joins the outstanding fetch for the same key or starts one.
    /// A fetched payload that cannot be stored is still returned; the write
    /// failure goes to the error reporter.
    pub async fn resolve(&self, descriptor: &RequestDescriptor) -> Result<Resolved> {
        let key = compute_key(descriptor)?;
        let shared = self.shared();

        match shared.with_store(move |store| store.get(&key)).await? {
            Ok(payload) => {
                debug!(%key, "Cache hit");
                return Ok(Resolved {
                    payload,
                    source: Source::Cache,
                });
            }
            Err(e) if e.is_miss() => debug!(%key, "Cache miss"),
            Err(e) => shared.reporter.report(&e),
        }

        let mut outcome = Shared::join_or_start(shared, key, descriptor);
        let outcome = match outcome.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };

        match outcome {
            Some(Ok(resolved)) => Ok(resolved),
            Some(Err(e)) => Err(CacheError::Fetch(e)),
            None => Err(FetchError::Abandoned(key.to_hex()).into()),
        }
    }

    // == Direct Fetch ==
    /// Fetches `descriptor` straight from the network. The store is neither
    /// read nor written and no in-flight fetch is shared.
    pub async fn fetch_direct(&self, descriptor: &RequestDescriptor) -> Result<Resolved> {
        descriptor.validate()?;
        let counters = &self.shared().counters;
        counters.direct_fetches.fetch_add(1, Ordering::Relaxed);

        match self.shared().fetcher.fetch(descriptor).await {
            Ok(payload) => Ok(Resolved {
                payload,
                source: Source::Network,
            }),
            Err(e) => {
                counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(locator = descriptor.locator(), error = %e, "Direct fetch failed");
                Err(e.into())
            }
        }
    }

    // == Store Operations ==
    /// Removes the stored entry for `key`.
    pub async fn remove(&self, key: CacheKey) -> Result<()> {
        self.shared().with_store(move |store| store.remove(&key)).await?
    }

    /// Drops every stored entry. Returns the number removed.
    pub async fn clear(&self) -> Result<usize> {
        self.shared().with_store(|store| store.clear()).await?
    }

    /// Flushes the metadata index to disk.
    pub async fn persist_index(&self) -> Result<()> {
        self.shared().with_store(|store| store.persist_index()).await?
    }

    /// Shared handle to the disk store, for maintenance tasks.
    pub fn store(&self) -> Arc<Mutex<DiskStore>> {
        Arc::clone(&self.shared().store)
    }

    pub async fn stats(&self) -> CoordinatorStats {
        let store = self.shared().store.lock().await.stats();
        let counters = &self.shared().counters;
        CoordinatorStats {
            store,
            fetches: counters.fetches.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            direct_fetches: counters.direct_fetches.load(Ordering::Relaxed),
            fetch_failures: counters.fetch_failures.load(Ordering::Relaxed),
            write_failures: counters.write_failures.load(Ordering::Relaxed),
            in_flight: self.in_flight_count(),
        }
    }

    /// Number of keys with a fetch currently outstanding.
    pub fn in_flight_count(&self) -> usize {
        self.shared().in_flight().len()
    }

    // == Shutdown ==
    /// Aborts every outstanding fetch. Waiting callers receive
    /// `FetchError::Abandoned`. Returns the number of fetches aborted.
    pub fn shutdown(&self) -> usize {
        self.shared().abort_all()
    }
}

impl fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let aborted = self.shared.abort_all();
        if aborted > 0 {
            info!(aborted, "Aborted outstanding fetches on release");
        }
    }
}

impl Shared {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<CacheKey, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the store on the blocking pool, holding the store
    /// lock for the whole call.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut DiskStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&mut store.blocking_lock()))
            .await
            .map_err(|e| CacheError::Internal(format!("store task failed: {e}")))
    }

    /// Joins the outstanding fetch for `key`, or registers and spawns one.
    /// Check and insert happen under one lock.
    fn join_or_start(
        this: &Arc<Self>,
        key: CacheKey,
        descriptor: &RequestDescriptor,
    ) -> watch::Receiver<Option<Outcome>> {
        let mut table = this.in_flight();
        if let Some(flight) = table.get(&key) {
            this.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "Joining outstanding fetch");
            return flight.outcome.clone();
        }

        let id = this.next_flight_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(Self::run_fetch(
            Arc::clone(this),
            id,
            key,
            descriptor.clone(),
            tx,
        ));
        table.insert(
            key,
            InFlight {
                id,
                outcome: rx.clone(),
                task,
            },
        );
        rx
    }

    async fn run_fetch(
        self: Arc<Self>,
        id: u64,
        key: CacheKey,
        descriptor: RequestDescriptor,
        tx: watch::Sender<Option<Outcome>>,
    ) {
        // Runs on drop, so a panicking or aborted fetch still frees the key
        let _release = FlightGuard {
            shared: Arc::clone(&self),
            id,
            key,
        };
        let outcome = self.fetch_and_store(key, &descriptor).await;
        tx.send_replace(Some(outcome));
    }

    /// Removes the entry for `key` if it still belongs to fetch `id`.
    fn release(&self, key: &CacheKey, id: u64) {
        let mut table = self.in_flight();
        if table.get(key).is_some_and(|flight| flight.id == id) {
            table.remove(key);
        }
    }

    async fn fetch_and_store(&self, key: CacheKey, descriptor: &RequestDescriptor) -> Outcome {
        // The key may have been stored between the caller's miss and this
        // fetch being registered.
        match self.with_store(move |store| store.get_uncounted(&key)).await {
            Ok(Ok(payload)) => {
                return Ok(Resolved {
                    payload,
                    source: Source::Cache,
                });
            }
            Ok(Err(e)) | Err(e) if !e.is_miss() => self.reporter.report(&e),
            _ => {}
        }

        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        let payload = match self.fetcher.fetch(descriptor).await {
            Ok(payload) => payload,
            Err(e) => {
                self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%key, error = %e, "Network fetch failed");
                return Err(e);
            }
        };

        let stored = payload.clone();
        match self.with_store(move |store| store.put(key, &stored)).await {
            Ok(Ok(())) => debug!(%key, size = payload.len(), "Fetched and stored"),
            Ok(Err(e)) | Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                self.reporter.report(&e);
            }
        }

        Ok(Resolved {
            payload,
            source: Source::Network,
        })
    }

    fn abort_all(&self) -> usize {
        // Abort outside the table lock: an aborted task releases its entry
        let flights: Vec<InFlight> = self.in_flight().drain().map(|(_, f)| f).collect();
        for flight in &flights {
            flight.task.abort();
        }
        flights.len()
    }
}

/// Releases an in-flight entry when its fetch task ends, however it ends.
struct FlightGuard {
    shared: Arc<Shared>,
    id: u64,
    key: CacheKey,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.shared.release(&self.key, self.id);
    }
}
