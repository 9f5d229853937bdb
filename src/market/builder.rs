//! Builder for [`Marketplace`] instances.

use std::sync::Arc;
use std::time::Duration;

use super::Marketplace;
use crate::Result;
use crate::cache::FreshnessConfig;
use crate::client::{ApiClient, ClientOptions, RetryConfig};
use crate::config::DEFAULT_API_URL;
use crate::session::{SessionHandle, SessionStore};

/// Main entry point for creating marketplace clients.
pub struct Atelier;

impl Atelier {
    /// Create a new builder for configuring the client.
    pub fn builder() -> AtelierBuilder {
        AtelierBuilder::new()
    }
}

/// Builder for configuring [`Marketplace`] instances.
pub struct AtelierBuilder {
    base_url: String,
    options: ClientOptions,
    freshness: FreshnessConfig,
    max_entries: u64,
    session: Option<SessionHandle>,
}

impl Default for AtelierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AtelierBuilder {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            options: ClientOptions::default(),
            freshness: FreshnessConfig::default(),
            max_entries: 1_000,
            session: None,
        }
    }

    /// API base URL (default: `http://localhost:5000/api`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Per-request timeout (default: 30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Retry policy for reads.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.options.retry = retry;
        self
    }

    /// Freshness windows per resource kind.
    pub fn freshness(mut self, freshness: FreshnessConfig) -> Self {
        self.freshness = freshness;
        self
    }

    /// Maximum values held per resource cache (default: 1000).
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n.max(1);
        self
    }

    /// Persist the session through `store`. Replaces any handle set with
    /// [`session`](Self::session).
    pub fn session_store(mut self, store: impl SessionStore + 'static) -> Self {
        self.session = Some(SessionHandle::new(Arc::new(store)));
        self
    }

    /// Share an existing session handle.
    pub fn session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    /// Build the client. Without a session store the session lives in
    /// memory only.
    pub fn build(self) -> Result<Marketplace> {
        let session = self.session.unwrap_or_else(SessionHandle::in_memory);
        let client = ApiClient::new(self.base_url, session, self.options)?;
        Ok(Marketplace::new(client, self.freshness, self.max_entries))
    }
}
