//! Jobs offered to the signed-in artisan.
//!
//! Only the most recent load counts. Starting a load aborts the one still
//! waiting, whose caller gets [`MarketError::Cancelled`].
//!
//! Aborting does not cancel the network request. The request keeps running
//! inside its cache flight, and its response is still cached under its own
//! query. Only the superseded caller stops waiting for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;
use tracing::debug;

use super::Caches;
use crate::cache::FetchMode;
use crate::client::ApiClient;
use crate::types::{ArtisanJobsQuery, JobListing};
use crate::{MarketError, Result};

const AVAILABLE: &str = "/JobListing/available";

struct Current {
    id: u64,
    handle: AbortHandle,
}

/// Latest-wins loader for `/JobListing/available`.
#[derive(Clone)]
pub struct ArtisanJobsService {
    client: ApiClient,
    caches: Caches,
    current: Arc<Mutex<Option<Current>>>,
    next_load: Arc<AtomicU64>,
}

impl ArtisanJobsService {
    pub(crate) fn new(client: ApiClient, caches: Caches) -> Self {
        Self {
            client,
            caches,
            current: Arc::new(Mutex::new(None)),
            next_load: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Jobs matching `query`, from cache when fresh.
    pub async fn available(&self, query: &ArtisanJobsQuery) -> Result<Arc<Vec<JobListing>>> {
        self.load(query, FetchMode::PreferCache).await
    }

    /// Jobs matching `query`, always from the server.
    pub async fn refresh(&self, query: &ArtisanJobsQuery) -> Result<Arc<Vec<JobListing>>> {
        self.load(query, FetchMode::ForceRefresh).await
    }

    /// Stop waiting for the load in progress, if any. Returns whether one was
    /// aborted. The HTTP request itself runs to completion and is cached.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(current) => {
                debug!(load = current.id, "artisan jobs load cancelled");
                current.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether a load is in progress.
    pub fn is_loading(&self) -> bool {
        self.lock().is_some()
    }

    async fn load(&self, query: &ArtisanJobsQuery, mode: FetchMode) -> Result<Arc<Vec<JobListing>>> {
        self.client.session().require_user()?;
        let query = query.normalized();
        let key = query.cache_key();
        let params = query.to_query();
        let cache = self.caches.artisan_jobs.clone();
        let client = self.client.clone();

        let task = tokio::spawn(async move {
            cache
                .fetch(key, mode, move || async move {
                    client.get(AVAILABLE, &params).await
                })
                .await
        });

        let id = self.next_load.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = self.lock().replace(Current {
            id,
            handle: task.abort_handle(),
        }) {
            debug!(load = previous.id, superseded_by = id, "superseding artisan jobs load");
            previous.handle.abort();
        }

        let result = task.await;

        {
            let mut current = self.lock();
            if current.as_ref().is_some_and(|c| c.id == id) {
                *current = None;
            }
        }

        match result {
            Ok(jobs) => jobs,
            Err(e) if e.is_cancelled() => Err(MarketError::Cancelled),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Current>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
