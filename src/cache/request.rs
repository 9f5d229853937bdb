//! Generic keyed request cache with shared in-flight requests.
//!
//! [`RequestCache`] answers "give me resource `K`" for one resource kind.
//! Each key moves through the states of [`CacheState`]:
//!
//! ```text
//! Idle ──fetch──▶ Loading ──ok──▶ Loaded(v)
//!                    │
//!                    └──err──▶ Failed(e)
//! Loaded/Failed ──stale or ForceRefresh──▶ Loading
//! ```
//!
//! # Flights
//!
//! A fetch that cannot be answered from a fresh value starts a *flight*: the
//! fetcher future is spawned on the runtime and its output is published
//! through a [`Shared`] future. While the flight is outstanding, every other
//! fetch for the same key joins it and receives the same `Result`, so there
//! is never more than one request per key on the wire.
//!
//! The flight is deregistered by a drop guard inside the spawned task. That
//! runs on success, on failure, and if the fetcher panics, so a failed
//! request always releases the key for the next attempt.
//!
//! # Invalidation
//!
//! [`invalidate`](RequestCache::invalidate) drops the stored value and marks
//! any outstanding flight for that key as superseded. A superseded flight
//! still answers the callers already waiting on it, but its result is not
//! stored: a response that started before a mutation cannot overwrite the
//! state that follows it.
//!
//! # Authentication failures
//!
//! [`MarketError::Unauthorized`] is handed back to callers but never
//! recorded as `Failed`. The session handler already reacted to it; there
//! is no per-resource error to show.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::oneshot;
use tracing::debug;

use crate::telemetry;
use crate::{MarketError, Result};

type Flight<V> = Shared<BoxFuture<'static, Result<Arc<V>>>>;

/// Whether a fetch may be answered from a fresh cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Return a fresh cached value when there is one.
    #[default]
    PreferCache,
    /// Always go to the network (joining a flight already in progress).
    ForceRefresh,
}

impl FetchMode {
    /// `ForceRefresh` when `force` is true.
    pub fn from_force(force: bool) -> Self {
        if force {
            FetchMode::ForceRefresh
        } else {
            FetchMode::PreferCache
        }
    }
}

/// Observable state of one cache key.
#[derive(Debug)]
pub enum CacheState<V> {
    /// Never fetched, or invalidated.
    Idle,
    /// A request is outstanding.
    Loading,
    /// The last request succeeded. The value may be stale.
    Loaded(Arc<V>),
    /// The last request failed.
    Failed(MarketError),
}

impl<V> CacheState<V> {
    pub fn is_loading(&self) -> bool {
        matches!(self, CacheState::Loading)
    }

    /// The loaded value, if any.
    pub fn value(&self) -> Option<&Arc<V>> {
        match self {
            CacheState::Loaded(v) => Some(v),
            _ => None,
        }
    }

    /// The recorded error, if any.
    pub fn error(&self) -> Option<&MarketError> {
        match self {
            CacheState::Failed(e) => Some(e),
            _ => None,
        }
    }
}

struct Stored<V> {
    value: Arc<V>,
    fetched_at: Instant,
}

struct InFlight<V> {
    id: u64,
    future: Flight<V>,
    superseded: Arc<AtomicBool>,
}

struct Inner<K, V> {
    name: &'static str,
    freshness: Duration,
    values: moka::sync::Cache<K, Arc<Stored<V>>>,
    failures: moka::sync::Cache<K, MarketError>,
    flights: Mutex<HashMap<K, InFlight<V>>>,
    next_flight: AtomicU64,
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq,
{
    fn flights(&self) -> MutexGuard<'_, HashMap<K, InFlight<V>>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keyed cache of server resources with request de-duplication.
///
/// Cloning is cheap; clones share the same entries and flights. See the
/// module docs for the state machine and flight semantics.
pub struct RequestCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for RequestCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> RequestCache<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a cache.
    ///
    /// `name` labels logs and metrics. Values older than `freshness` are
    /// refetched on the next `PreferCache` fetch. At most `max_entries`
    /// values are held; the least recently used are evicted beyond that.
    pub fn new(name: &'static str, freshness: Duration, max_entries: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                freshness,
                values: moka::sync::Cache::new(max_entries),
                failures: moka::sync::Cache::new(max_entries),
                flights: Mutex::new(HashMap::new()),
                next_flight: AtomicU64::new(0),
            }),
        }
    }

    /// Cache name, as used in metric labels.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Configured freshness window.
    pub fn freshness(&self) -> Duration {
        self.inner.freshness
    }

    /// Fetch `key`, going to the network through `fetcher` only when needed.
    ///
    /// With [`FetchMode::PreferCache`], a value younger than the freshness
    /// window is returned without calling `fetcher`. Otherwise the call
    /// joins the flight already outstanding for `key`, or starts one.
    /// `fetcher` is only invoked when a new flight starts.
    pub async fn fetch<F, Fut>(&self, key: K, mode: FetchMode, fetcher: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let name = self.inner.name;
        let flight = {
            let mut flights = self.inner.flights();

            if let Some(existing) = flights.get(&key) {
                metrics::counter!(telemetry::CACHE_DEDUPLICATED_TOTAL, "cache" => name)
                    .increment(1);
                debug!(cache = name, ?key, "joining in-flight request");
                existing.future.clone()
            } else {
                if mode == FetchMode::PreferCache {
                    if let Some(value) = self.fresh_value(&key) {
                        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => name)
                            .increment(1);
                        debug!(cache = name, ?key, "fresh cache hit");
                        return Ok(value);
                    }
                }

                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => name).increment(1);
                debug!(cache = name, ?key, ?mode, "starting request");
                let in_flight = self.spawn_flight(key.clone(), fetcher);
                let future = in_flight.future.clone();
                flights.insert(key, in_flight);
                future
            }
        };

        flight.await
    }

    /// Spawn the fetcher and wrap its output in a shared future.
    ///
    /// Must be called with the flights lock held, and the returned flight
    /// inserted before the lock is released: the spawned task removes it
    /// again on completion.
    fn spawn_flight<F, Fut>(&self, key: K, fetcher: F) -> InFlight<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let superseded = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = oneshot::channel();

        let guard = FlightGuard {
            inner: Arc::clone(&self.inner),
            key: Some(key.clone()),
            id,
        };
        let inner = Arc::clone(&self.inner);
        let flag = Arc::clone(&superseded);
        tokio::spawn(async move {
            let result = fetcher().await.map(Arc::new);
            {
                // Invalidation and insert take this lock too, so neither can
                // land between the check and the store.
                let _flights = inner.flights();
                if flag.load(Ordering::Acquire) {
                    debug!(cache = inner.name, ?key, "discarding superseded response");
                } else {
                    store_result(&inner, &key, &result);
                }
            }
            // Deregister before publishing: a caller arriving after this
            // point sees the stored value instead of a finished flight.
            drop(guard);
            sender.send(result).ok();
        });

        let future = async move {
            receiver
                .await
                .unwrap_or_else(|_dropped| Err(MarketError::Cancelled))
        }
        .boxed()
        .shared();

        InFlight {
            id,
            future,
            superseded,
        }
    }

    fn fresh_value(&self, key: &K) -> Option<Arc<V>> {
        let stored = self.inner.values.get(key)?;
        (stored.fetched_at.elapsed() < self.inner.freshness).then(|| Arc::clone(&stored.value))
    }

    /// Current state of `key`.
    pub fn state(&self, key: &K) -> CacheState<V> {
        if self.inner.flights().contains_key(key) {
            return CacheState::Loading;
        }
        if let Some(err) = self.inner.failures.get(key) {
            return CacheState::Failed(err);
        }
        match self.inner.values.get(key) {
            Some(stored) => CacheState::Loaded(Arc::clone(&stored.value)),
            None => CacheState::Idle,
        }
    }

    /// Last loaded value for `key`, however old.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.inner
            .values
            .get(key)
            .map(|stored| Arc::clone(&stored.value))
    }

    /// Whether `key` holds a value younger than the freshness window.
    pub fn is_fresh(&self, key: &K) -> bool {
        self.fresh_value(key).is_some()
    }

    /// Whether a request for `key` is outstanding.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inner.flights().contains_key(key)
    }

    /// Store a value directly, e.g. the resource returned by a create call.
    ///
    /// An outstanding flight for `key` will not overwrite it.
    pub fn insert(&self, key: K, value: V) {
        let flights = self.inner.flights();
        if let Some(flight) = flights.get(&key) {
            flight.superseded.store(true, Ordering::Release);
        }
        self.inner.failures.invalidate(&key);
        self.inner.values.insert(
            key,
            Arc::new(Stored {
                value: Arc::new(value),
                fetched_at: Instant::now(),
            }),
        );
    }

    /// Forget `key`. An outstanding flight for it will not be stored.
    pub fn invalidate(&self, key: &K) {
        let flights = self.inner.flights();
        if let Some(flight) = flights.get(key) {
            flight.superseded.store(true, Ordering::Release);
        }
        self.inner.values.invalidate(key);
        self.inner.failures.invalidate(key);
        drop(flights);
        debug!(cache = self.inner.name, ?key, "invalidated");
    }

    /// Forget every key. Outstanding flights will not be stored.
    pub fn invalidate_all(&self) {
        let flights = self.inner.flights();
        for flight in flights.values() {
            flight.superseded.store(true, Ordering::Release);
        }
        self.inner.values.invalidate_all();
        self.inner.failures.invalidate_all();
        drop(flights);
        debug!(cache = self.inner.name, "invalidated all entries");
    }
}

fn store_result<K, V>(inner: &Inner<K, V>, key: &K, result: &Result<Arc<V>>)
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    match result {
        Ok(value) => {
            inner.failures.invalidate(key);
            inner.values.insert(
                key.clone(),
                Arc::new(Stored {
                    value: Arc::clone(value),
                    fetched_at: Instant::now(),
                }),
            );
        }
        Err(MarketError::Unauthorized) => {
            debug!(cache = inner.name, ?key, "unauthorized; left to session handler");
        }
        Err(err) => {
            debug!(cache = inner.name, ?key, error = %err, "request failed");
            inner.failures.insert(key.clone(), err.clone());
        }
    }
}

/// Removes a flight from the map when the spawned task ends, however it ends.
struct FlightGuard<K, V>
where
    K: Hash + Eq,
{
    inner: Arc<Inner<K, V>>,
    key: Option<K>,
    id: u64,
}

impl<K, V> Drop for FlightGuard<K, V>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let mut flights = self.inner.flights();
        // A newer flight may already own the key.
        if flights.get(&key).is_some_and(|f| f.id == self.id) {
            flights.remove(&key);
        }
    }
}
