//! Telemetry metric name constants.
//!
//! Centralised metric names for atelier operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `atelier_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `cache`: request cache name (e.g. "job_listings", "negotiations")
//! - `method`: HTTP method
//! - `status`: HTTP status code, or "error" for transport failures

/// Total HTTP requests sent to the marketplace API.
///
/// Labels: `method`, `status`.
pub const REQUESTS_TOTAL: &str = "atelier_requests_total";

/// Request duration in seconds.
///
/// Labels: `method`.
pub const REQUEST_DURATION_SECONDS: &str = "atelier_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `method`.
pub const RETRIES_TOTAL: &str = "atelier_retries_total";

/// Fetches answered from a fresh cached value.
///
/// Labels: `cache`.
pub const CACHE_HITS_TOTAL: &str = "atelier_cache_hits_total";

/// Fetches that started a new request.
///
/// Labels: `cache`.
pub const CACHE_MISSES_TOTAL: &str = "atelier_cache_misses_total";

/// Fetches that joined a request already in flight for the same key.
///
/// Labels: `cache`.
pub const CACHE_DEDUPLICATED_TOTAL: &str = "atelier_cache_deduplicated_total";

/// Sessions cleared because the server answered 401.
pub const AUTH_FAILURES_TOTAL: &str = "atelier_auth_failures_total";

/// Optimistic updates reverted after the server refused them.
pub const OPTIMISTIC_ROLLBACKS_TOTAL: &str = "atelier_optimistic_rollbacks_total";
