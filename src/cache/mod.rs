//! Caching subsystem.
//!
//! - [`RequestCache`]: one generic keyed cache for server resources.
//!   Every resource the client reads (artisans, job listings, proposals,
//!   negotiations, categories) goes through an instance of it, so
//!   de-duplication, freshness, and failure tracking behave the same
//!   everywhere.
//!
//! - [`FreshnessConfig`]: how long a loaded value of each [`Resource`]
//!   kind counts as fresh. Loaded from the `[cache.freshness]` section of
//!   the config file; defaults in [`freshness`].

pub mod freshness;
pub mod request;

pub use freshness::{FreshnessConfig, Resource};
pub use request::{CacheState, FetchMode, RequestCache};
