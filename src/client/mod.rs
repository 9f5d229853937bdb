//! HTTP access to the marketplace API.
//!
//! [`ApiClient`] does transport, auth headers, and error normalisation;
//! [`retry`] holds the backoff policy applied to reads.

pub mod api;
pub mod retry;

pub use api::{ApiClient, ClientOptions, Query};
pub use retry::RetryConfig;
