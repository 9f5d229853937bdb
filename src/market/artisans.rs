//! Artisan discovery, profiles, and the signed-in artisan's availability.

use std::sync::Arc;

use tracing::debug;

use super::Caches;
use crate::cache::FetchMode;
use crate::client::{ApiClient, Query};
use crate::optimistic::{OptimisticValue, UpdateOutcome};
use crate::types::{Artisan, ArtisanQuery, ArtisanSummary, AvailabilityUpdate};
use crate::Result;

const DISCOVERY: &str = "/ArtisanDiscovery";
const BY_ID: &str = "/ArtisanDiscovery/GetArtisanById";
const TOGGLE_AVAILABILITY: &str = "/Users/toggle-availability";

/// Browse artisans and manage the signed-in artisan's availability.
#[derive(Clone)]
pub struct ArtisanService {
    client: ApiClient,
    caches: Caches,
    availability: Arc<OptimisticValue<bool>>,
}

impl ArtisanService {
    pub(crate) fn new(client: ApiClient, caches: Caches) -> Self {
        Self {
            client,
            caches,
            availability: Arc::new(OptimisticValue::new("availability", false)),
        }
    }

    /// Artisans matching `query`. Queries selecting the same artisans share
    /// a cache entry regardless of filter order.
    pub async fn discover(
        &self,
        query: &ArtisanQuery,
        mode: FetchMode,
    ) -> Result<Arc<Vec<ArtisanSummary>>> {
        let client = self.client.clone();
        let params = query.to_query();
        self.caches
            .discovery
            .fetch(query.cache_key(), mode, move || async move {
                client.get(DISCOVERY, &params).await
            })
            .await
    }

    /// Full profile of one artisan.
    ///
    /// Loading the signed-in artisan's own profile also settles
    /// [`availability`](Self::availability) to the server's value.
    pub async fn get(&self, artisan_id: &str, mode: FetchMode) -> Result<Arc<Artisan>> {
        let client = self.client.clone();
        let params: Query = vec![("artisanId", artisan_id.to_string())];
        let profile = self
            .caches
            .profiles
            .fetch(artisan_id.to_string(), mode, move || async move {
                client.get(BY_ID, &params).await
            })
            .await?;

        let own = self
            .client
            .session()
            .current()
            .is_some_and(|s| s.user.id == profile.summary.id);
        if own && self.availability.set_settled(profile.summary.is_available) {
            debug!(available = profile.summary.is_available, "availability settled from profile");
        }
        Ok(profile)
    }

    /// The signed-in artisan's availability as currently shown.
    pub fn availability(&self) -> &OptimisticValue<bool> {
        &self.availability
    }

    /// Drop the shown availability back to unavailable, detaching any
    /// toggle still waiting on the server. Called on every identity change.
    pub(crate) fn reset_availability(&self) {
        reset(&self.availability);
    }

    /// Handle for resetting availability without holding the service (and
    /// with it the client) alive.
    pub(crate) fn availability_handle(&self) -> Arc<OptimisticValue<bool>> {
        Arc::clone(&self.availability)
    }

    /// Show `available` immediately and confirm it with the server.
    ///
    /// Returns [`UpdateOutcome::Dropped`] while a previous change is still
    /// pending. On confirmation the artisan's cached profile and discovery
    /// results are invalidated.
    pub async fn set_availability(&self, available: bool) -> Result<UpdateOutcome<bool>> {
        let user = self.client.session().require_user()?;
        let body = AvailabilityUpdate {
            is_available: available,
        };
        let outcome = self
            .availability
            .apply(available, self.client.patch(TOGGLE_AVAILABILITY, &body))
            .await;

        if outcome.is_confirmed() {
            self.caches.profiles.invalidate(&user.id);
            self.caches.discovery.invalidate_all();
        }
        Ok(outcome)
    }
}

/// Shown availability for a signed-out or newly signed-in user.
pub(crate) fn reset(availability: &OptimisticValue<bool>) {
    availability.reset(false);
}
