//! Integration tests for [`RequestCache`]: freshness, flight sharing,
//! failure release, invalidation, and metrics.

use std::sync::Arc;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tokio::sync::oneshot;

use atelier::telemetry;
use atelier::{CacheState, FetchMode, MarketError, RequestCache};

fn cache(freshness: Duration) -> RequestCache<String, u32> {
    RequestCache::new("test", freshness, 100)
}

fn key(s: &str) -> String {
    s.to_string()
}

/// Fetcher factory that counts calls and answers `value` after `delay`.
fn counting(
    calls: &Arc<AtomicUsize>,
    value: u32,
    delay: Duration,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = atelier::Result<u32>> + Send>>
+ Send
+ 'static {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        })
    }
}

async fn wait_until_in_flight(cache: &RequestCache<String, u32>, k: &String) {
    for _ in 0..100 {
        if cache.is_in_flight(k) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("flight for {k} never started");
}

// =============================================================================
// Freshness
// =============================================================================

#[tokio::test]
async fn fresh_value_answers_without_network() {
    let cache = cache(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache
        .fetch(key("a"), FetchMode::PreferCache, counting(&calls, 1, Duration::ZERO))
        .await
        .unwrap();
    let second = cache
        .fetch(key("a"), FetchMode::PreferCache, counting(&calls, 2, Duration::ZERO))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*first, 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn force_refresh_goes_to_network() {
    let cache = cache(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .fetch(key("a"), FetchMode::PreferCache, counting(&calls, 1, Duration::ZERO))
        .await
        .unwrap();
    let refreshed = cache
        .fetch(key("a"), FetchMode::ForceRefresh, counting(&calls, 2, Duration::ZERO))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*refreshed, 2);
    assert_eq!(cache.peek(&key("a")).map(|v| *v), Some(2));
}

#[tokio::test]
async fn stale_value_is_refetched() {
    let cache = cache(Duration::ZERO);
    let calls = Arc::new(AtomicUsize::new(0));

    for value in [1, 2] {
        cache
            .fetch(key("a"), FetchMode::PreferCache, counting(&calls, value, Duration::ZERO))
            .await
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn keys_are_independent() {
    let cache = cache(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .fetch(key("a"), FetchMode::PreferCache, counting(&calls, 1, Duration::ZERO))
        .await
        .unwrap();
    cache
        .fetch(key("b"), FetchMode::PreferCache, counting(&calls, 2, Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Flights
// =============================================================================

#[tokio::test]
async fn concurrent_fetches_share_one_request() {
    let cache = cache(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));
    let delay = Duration::from_millis(20);

    let (a, b, c) = tokio::join!(
        cache.fetch(key("a"), FetchMode::PreferCache, counting(&calls, 1, delay)),
        cache.fetch(key("a"), FetchMode::PreferCache, counting(&calls, 2, delay)),
        cache.fetch(key("a"), FetchMode::PreferCache, counting(&calls, 3, delay)),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(*a, 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
}

#[tokio::test]
async fn force_refresh_joins_outstanding_flight() {
    let cache = cache(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));
    let delay = Duration::from_millis(20);

    let (a, b) = tokio::join!(
        cache.fetch(key("a"), FetchMode::ForceRefresh, counting(&calls, 1, delay)),
        cache.fetch(key("a"), FetchMode::ForceRefresh, counting(&calls, 2, delay)),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*a.unwrap(), 1);
    assert_eq!(*b.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_callers_share_the_failure() {
    let cache = cache(Duration::from_secs(60));
    let fail = || async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err(MarketError::Api {
            status: 503,
            message: "maintenance".into(),
        })
    };

    let (a, b) = tokio::join!(
        cache.fetch(key("a"), FetchMode::PreferCache, fail),
        cache.fetch(key("a"), FetchMode::PreferCache, fail),
    );
    assert!(matches!(a, Err(MarketError::Api { status: 503, .. })));
    assert!(matches!(b, Err(MarketError::Api { status: 503, .. })));
}

#[tokio::test]
async fn failure_releases_the_key() {
    let cache = cache(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&calls);
    let result = cache
        .fetch(key("a"), FetchMode::PreferCache, move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Err(MarketError::Http("connection reset".into()))
        })
        .await;
    assert!(result.is_err());
    assert!(!cache.is_in_flight(&key("a")));
    assert!(matches!(
        cache.state(&key("a")),
        CacheState::Failed(MarketError::Http(_))
    ));

    // "Try again" goes back to the network and clears the failure.
    let value = cache
        .fetch(key("a"), FetchMode::PreferCache, counting(&calls, 5, Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(*value, 5);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(matches!(cache.state(&key("a")), CacheState::Loaded(_)));
}

#[tokio::test]
async fn panicking_fetcher_releases_the_key() {
    let cache = cache(Duration::from_secs(60));

    let result = cache
        .fetch(key("a"), FetchMode::PreferCache, || async {
            if true {
                panic!("fetcher bug");
            }
            Ok(0)
        })
        .await;
    assert!(matches!(result, Err(MarketError::Cancelled)));
    assert!(!cache.is_in_flight(&key("a")));

    let calls = Arc::new(AtomicUsize::new(0));
    let value = cache
        .fetch(key("a"), FetchMode::PreferCache, counting(&calls, 9, Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(*value, 9);
}

#[tokio::test]
async fn state_is_loading_during_flight() {
    let cache = cache(Duration::from_secs(60));
    let (release, gate) = oneshot::channel::<()>();

    let task = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .fetch(key("a"), FetchMode::PreferCache, || async move {
                    gate.await.ok();
                    Ok(3)
                })
                .await
        })
    };

    wait_until_in_flight(&cache, &key("a")).await;
    assert!(cache.state(&key("a")).is_loading());

    release.send(()).unwrap();
    assert_eq!(*task.await.unwrap().unwrap(), 3);
    assert_eq!(cache.state(&key("a")).value().map(|v| **v), Some(3));
}

// =============================================================================
// Invalidation
// =============================================================================

#[tokio::test]
async fn invalidation_during_flight_discards_the_response() {
    let cache = cache(Duration::from_secs(60));
    cache.insert(key("a"), 1);
    let (release, gate) = oneshot::channel::<()>();

    let task = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .fetch(key("a"), FetchMode::ForceRefresh, || async move {
                    gate.await.ok();
                    Ok(2)
                })
                .await
        })
    };

    wait_until_in_flight(&cache, &key("a")).await;
    cache.invalidate(&key("a"));
    release.send(()).unwrap();

    // The waiting caller still gets its answer...
    assert_eq!(*task.await.unwrap().unwrap(), 2);
    // ...but it is not stored over the invalidation.
    assert!(cache.peek(&key("a")).is_none());
    assert!(matches!(cache.state(&key("a")), CacheState::Idle));
}

#[tokio::test]
async fn invalidate_all_forgets_every_key() {
    let cache = cache(Duration::from_secs(60));
    cache.insert(key("a"), 1);
    cache.insert(key("b"), 2);

    cache.invalidate_all();

    assert!(cache.peek(&key("a")).is_none());
    assert!(cache.peek(&key("b")).is_none());
}

/// Key whose next hash blocks the calling thread once `stall` is set. Lets a
/// test hold a flight between its staleness check and its store.
#[derive(Clone, Debug)]
struct StallingKey {
    name: &'static str,
    stall: Arc<AtomicBool>,
}

impl PartialEq for StallingKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for StallingKey {}

impl Hash for StallingKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.stall.swap(false, Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(300));
        }
        self.name.hash(state);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalidate_racing_the_store_still_wins() {
    let stall = Arc::new(AtomicBool::new(false));
    let cache: RequestCache<StallingKey, u32> =
        RequestCache::new("test", Duration::from_secs(60), 100);
    let k = StallingKey {
        name: "a",
        stall: Arc::clone(&stall),
    };
    let (go, gate) = oneshot::channel::<()>();
    let (armed, is_armed) = oneshot::channel::<()>();

    let task = {
        let cache = cache.clone();
        let k = k.clone();
        tokio::spawn(async move {
            cache
                .fetch(k, FetchMode::PreferCache, move || async move {
                    gate.await.ok();
                    // The flight's next hash is the one storing this response.
                    stall.store(true, Ordering::SeqCst);
                    armed.send(()).ok();
                    Ok(1)
                })
                .await
        })
    };

    for _ in 0..100 {
        if cache.is_in_flight(&k) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(cache.is_in_flight(&k));
    go.send(()).unwrap();
    is_armed.await.unwrap();

    // Land inside the stalled store.
    tokio::time::sleep(Duration::from_millis(50)).await;
    cache.invalidate(&k);

    assert_eq!(*task.await.unwrap().unwrap(), 1);
    assert!(
        cache.peek(&k).is_none(),
        "response stored after invalidation"
    );
}

#[tokio::test]
async fn insert_during_flight_is_not_overwritten() {
    let cache = cache(Duration::from_secs(60));
    let (release, gate) = oneshot::channel::<()>();

    let task = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .fetch(key("a"), FetchMode::PreferCache, || async move {
                    gate.await.ok();
                    Ok(1)
                })
                .await
        })
    };

    wait_until_in_flight(&cache, &key("a")).await;
    cache.insert(key("a"), 2);
    release.send(()).unwrap();

    // The caller that started the flight gets the server's answer...
    assert_eq!(*task.await.unwrap().unwrap(), 1);
    // ...but the inserted value stays.
    assert_eq!(cache.peek(&key("a")).map(|v| *v), Some(2));
    assert!(cache.is_fresh(&key("a")));
}

#[tokio::test]
async fn unauthorized_is_not_recorded_as_failure() {
    let cache = cache(Duration::from_secs(60));

    let result = cache
        .fetch(key("a"), FetchMode::PreferCache, || async {
            Err(MarketError::Unauthorized)
        })
        .await;

    assert!(matches!(result, Err(MarketError::Unauthorized)));
    assert!(matches!(cache.state(&key("a")), CacheState::Idle));
}

// =============================================================================
// Metrics
// =============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Runs on a current-thread runtime inside the local recorder scope so
/// that spawned flights record into the same recorder.
#[test]
fn cache_decisions_record_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let cache = cache(Duration::from_secs(60));
            let calls = Arc::new(AtomicUsize::new(0));
            let delay = Duration::from_millis(10);

            // One miss plus one joined caller...
            let (a, b) = tokio::join!(
                cache.fetch(key("a"), FetchMode::PreferCache, counting(&calls, 1, delay)),
                cache.fetch(key("a"), FetchMode::PreferCache, counting(&calls, 1, delay)),
            );
            a.unwrap();
            b.unwrap();
            // ...then a hit.
            cache
                .fetch(key("a"), FetchMode::PreferCache, counting(&calls, 1, delay))
                .await
                .unwrap();
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_DEDUPLICATED_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 1);
}
