//! Marketplace services.
//!
//! [`Marketplace`] is the entry point: it owns the [`ApiClient`], the
//! [`SessionHandle`], and one [`RequestCache`] per resource, and hands out
//! the four services that read and mutate server state through them.
//!
//! # Example
//!
//! ```rust,no_run
//! use atelier::{Atelier, FetchMode};
//! use atelier::types::ArtisanQuery;
//!
//! # async fn example() -> atelier::Result<()> {
//! let market = Atelier::builder()
//!     .base_url("https://market.example.com/api")
//!     .build()?;
//!
//! let artisans = market
//!     .artisans()
//!     .discover(&ArtisanQuery::new().category("plumbing"), FetchMode::PreferCache)
//!     .await?;
//! println!("{} artisans", artisans.len());
//! # Ok(())
//! # }
//! ```
//!
//! Signing out, and any 401 from the server, clears every cache so that
//! one user's data is never served to the next.

mod artisan_jobs;
mod artisans;
mod builder;
mod listings;
mod proposals;

pub use artisan_jobs::ArtisanJobsService;
pub use artisans::ArtisanService;
pub use builder::{Atelier, AtelierBuilder};
pub use listings::JobListingService;
pub use proposals::ProposalService;

use crate::Result;
use crate::cache::{FreshnessConfig, RequestCache, Resource};
use crate::client::ApiClient;
use crate::config::Config;
use crate::negotiation::NegotiationEntry;
use crate::session::{Session, SessionHandle};
use crate::types::{Artisan, ArtisanSummary, Category, JobListing, Proposal, Subcategory};

/// Every resource cache, shared by the services.
///
/// User-scoped lists (own listings, own proposals) are keyed by user id so
/// that a second account on the same client never sees the first one's.
#[derive(Clone)]
pub(crate) struct Caches {
    pub(crate) discovery: RequestCache<String, Vec<ArtisanSummary>>,
    pub(crate) profiles: RequestCache<String, Artisan>,
    pub(crate) listings: RequestCache<String, Vec<JobListing>>,
    pub(crate) listing: RequestCache<String, JobListing>,
    pub(crate) categories: RequestCache<(), Vec<Category>>,
    pub(crate) subcategories: RequestCache<String, Vec<Subcategory>>,
    pub(crate) artisan_proposals: RequestCache<String, Vec<Proposal>>,
    pub(crate) listing_proposals: RequestCache<String, Vec<Proposal>>,
    pub(crate) negotiations: RequestCache<String, Vec<NegotiationEntry>>,
    pub(crate) artisan_jobs: RequestCache<String, Vec<JobListing>>,
}

impl Caches {
    pub(crate) fn new(freshness: &FreshnessConfig, max_entries: u64) -> Self {
        let window = |r: Resource| freshness.window(r);
        Self {
            discovery: RequestCache::new(
                Resource::ArtisanDiscovery.as_str(),
                window(Resource::ArtisanDiscovery),
                max_entries,
            ),
            profiles: RequestCache::new(
                Resource::ArtisanProfile.as_str(),
                window(Resource::ArtisanProfile),
                max_entries,
            ),
            listings: RequestCache::new(
                Resource::JobListings.as_str(),
                window(Resource::JobListings),
                max_entries,
            ),
            listing: RequestCache::new(
                Resource::JobListing.as_str(),
                window(Resource::JobListing),
                max_entries,
            ),
            categories: RequestCache::new(
                Resource::Categories.as_str(),
                window(Resource::Categories),
                max_entries,
            ),
            subcategories: RequestCache::new(
                Resource::Subcategories.as_str(),
                window(Resource::Subcategories),
                max_entries,
            ),
            artisan_proposals: RequestCache::new(
                "artisan_proposals",
                window(Resource::Proposals),
                max_entries,
            ),
            listing_proposals: RequestCache::new(
                "listing_proposals",
                window(Resource::Proposals),
                max_entries,
            ),
            negotiations: RequestCache::new(
                Resource::Negotiations.as_str(),
                window(Resource::Negotiations),
                max_entries,
            ),
            artisan_jobs: RequestCache::new(
                Resource::ArtisanJobs.as_str(),
                window(Resource::ArtisanJobs),
                max_entries,
            ),
        }
    }

    pub(crate) fn clear(&self) {
        self.discovery.invalidate_all();
        self.profiles.invalidate_all();
        self.listings.invalidate_all();
        self.listing.invalidate_all();
        self.categories.invalidate_all();
        self.subcategories.invalidate_all();
        self.artisan_proposals.invalidate_all();
        self.listing_proposals.invalidate_all();
        self.negotiations.invalidate_all();
        self.artisan_jobs.invalidate_all();
    }
}

/// Client for the artisan marketplace. Built with [`Atelier::builder`] or
/// [`Marketplace::from_config`].
pub struct Marketplace {
    client: ApiClient,
    freshness: FreshnessConfig,
    caches: Caches,
    artisans: ArtisanService,
    listings: JobListingService,
    proposals: ProposalService,
    artisan_jobs: ArtisanJobsService,
}

impl Marketplace {
    pub(crate) fn new(client: ApiClient, freshness: FreshnessConfig, max_entries: u64) -> Self {
        let caches = Caches::new(&freshness, max_entries);
        let artisans = ArtisanService::new(client.clone(), caches.clone());

        let on_failure = caches.clone();
        let availability = artisans.availability_handle();
        client.session().on_auth_failure(move |user| {
            tracing::debug!(user = %user.id, "clearing caches after auth failure");
            on_failure.clear();
            artisans::reset(&availability);
        });

        Self {
            artisans,
            listings: JobListingService::new(client.clone(), caches.clone()),
            proposals: ProposalService::new(client.clone(), caches.clone()),
            artisan_jobs: ArtisanJobsService::new(client.clone(), caches.clone()),
            client,
            freshness,
            caches,
        }
    }

    /// Build from a loaded [`Config`], persisting the session at
    /// [`Config::session_path`].
    ///
    /// The stored session is not read yet; call
    /// [`SessionHandle::restore`] on [`session`](Self::session).
    pub fn from_config(config: &Config) -> Result<Self> {
        Atelier::builder()
            .base_url(config.api.base_url.clone())
            .timeout(config.api.timeout())
            .retry(config.retry.clone().into())
            .freshness(config.cache.freshness.clone())
            .max_entries(config.cache.max_entries)
            .session_store(crate::session::FileSessionStore::new(config.session_path()))
            .build()
    }

    pub fn artisans(&self) -> &ArtisanService {
        &self.artisans
    }

    pub fn listings(&self) -> &JobListingService {
        &self.listings
    }

    pub fn proposals(&self) -> &ProposalService {
        &self.proposals
    }

    pub fn artisan_jobs(&self) -> &ArtisanJobsService {
        &self.artisan_jobs
    }

    pub fn session(&self) -> &SessionHandle {
        self.client.session()
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn freshness(&self) -> &FreshnessConfig {
        &self.freshness
    }

    /// Sign in. Cached data from a previous user is dropped.
    pub async fn login(&self, session: Session) -> Result<()> {
        self.clear_caches();
        self.session().login(session).await
    }

    /// Sign out and drop every cached resource.
    pub async fn logout(&self) -> Result<()> {
        self.artisan_jobs.cancel();
        self.clear_caches();
        self.session().logout().await
    }

    /// Drop every cached resource and the shown availability. In-flight
    /// requests still answer their callers but are not stored.
    pub fn clear_caches(&self) {
        self.caches.clear();
        self.artisans.reset_availability();
    }
}
