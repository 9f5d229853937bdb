//! Job listings and the category tree.

use std::sync::Arc;

use tracing::info;

use super::Caches;
use crate::cache::FetchMode;
use crate::client::api::path_segment;
use crate::client::{ApiClient, Query};
use crate::types::{Category, JobListing, NewJobListing, Subcategory};
use crate::Result;

const LISTINGS: &str = "/JobListing";
const CATEGORIES: &str = "/JobListing/categories";
const SUBCATEGORIES: &str = "/JobListing/subcategories";

/// Post, browse, and remove job listings.
#[derive(Clone)]
pub struct JobListingService {
    client: ApiClient,
    caches: Caches,
}

impl JobListingService {
    pub(crate) fn new(client: ApiClient, caches: Caches) -> Self {
        Self { client, caches }
    }

    /// Listings visible to the signed-in user.
    pub async fn list(&self, mode: FetchMode) -> Result<Arc<Vec<JobListing>>> {
        let user = self.client.session().require_user()?;
        let client = self.client.clone();
        self.caches
            .listings
            .fetch(user.id, mode, move || async move {
                client.get(LISTINGS, &Query::new()).await
            })
            .await
    }

    pub async fn get(&self, listing_id: &str, mode: FetchMode) -> Result<Arc<JobListing>> {
        self.client.session().require_user()?;
        let client = self.client.clone();
        let path = format!("{LISTINGS}/{}", path_segment(listing_id)?);
        self.caches
            .listing
            .fetch(listing_id.to_string(), mode, move || async move {
                client.get(&path, &Query::new()).await
            })
            .await
    }

    /// Post a new listing. The listing list is refetched on next use and the
    /// created listing is served from cache.
    pub async fn create(&self, listing: &NewJobListing) -> Result<JobListing> {
        listing.validate()?;
        let user = self.client.session().require_user()?;
        let created: JobListing = self.client.post(LISTINGS, listing).await?;
        info!(listing = %created.id, "job listing created");

        self.caches.listings.invalidate(&user.id);
        self.caches.artisan_jobs.invalidate_all();
        self.caches.listing.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    pub async fn delete(&self, listing_id: &str) -> Result<()> {
        let user = self.client.session().require_user()?;
        let path = format!("{LISTINGS}/{}", path_segment(listing_id)?);
        self.client.delete(&path).await?;
        info!(listing = listing_id, "job listing deleted");

        self.caches.listings.invalidate(&user.id);
        self.caches.listing.invalidate(&listing_id.to_string());
        self.caches
            .listing_proposals
            .invalidate(&listing_id.to_string());
        self.caches.artisan_jobs.invalidate_all();
        Ok(())
    }

    pub async fn categories(&self, mode: FetchMode) -> Result<Arc<Vec<Category>>> {
        let client = self.client.clone();
        self.caches
            .categories
            .fetch((), mode, move || async move {
                client.get(CATEGORIES, &Query::new()).await
            })
            .await
    }

    /// Subcategories of the given categories. The order and repetition of
    /// `category_ids` do not affect caching.
    pub async fn subcategories(
        &self,
        category_ids: &[String],
        mode: FetchMode,
    ) -> Result<Arc<Vec<Subcategory>>> {
        let ids = canonical_ids(category_ids);
        let key = serde_json::to_string(&ids)?;
        let params: Query = ids.into_iter().map(|id| ("categoryIds", id)).collect();

        let client = self.client.clone();
        self.caches
            .subcategories
            .fetch(key, mode, move || async move {
                client.get(SUBCATEGORIES, &params).await
            })
            .await
    }
}

fn canonical_ids(ids: &[String]) -> Vec<String> {
    let mut ids: Vec<String> = ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
