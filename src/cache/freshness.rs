//! Per-resource freshness windows.
//!
//! Each cached resource kind has its own window. The defaults are the
//! windows the marketplace front end has always used; none of them is
//! load-bearing, so all are overridable from configuration:
//!
//! ```toml
//! [cache.freshness]
//! job_listings_secs = 30
//! categories_secs = 3600
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Kinds of server resource held in a [`RequestCache`](super::RequestCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    ArtisanDiscovery,
    ArtisanProfile,
    JobListings,
    JobListing,
    Categories,
    Subcategories,
    Proposals,
    Negotiations,
    ArtisanJobs,
}

impl Resource {
    /// All resource kinds.
    pub const ALL: [Resource; 9] = [
        Resource::ArtisanDiscovery,
        Resource::ArtisanProfile,
        Resource::JobListings,
        Resource::JobListing,
        Resource::Categories,
        Resource::Subcategories,
        Resource::Proposals,
        Resource::Negotiations,
        Resource::ArtisanJobs,
    ];

    /// Stable name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::ArtisanDiscovery => "artisan_discovery",
            Resource::ArtisanProfile => "artisan_profile",
            Resource::JobListings => "job_listings",
            Resource::JobListing => "job_listing",
            Resource::Categories => "categories",
            Resource::Subcategories => "subcategories",
            Resource::Proposals => "proposals",
            Resource::Negotiations => "negotiations",
            Resource::ArtisanJobs => "artisan_jobs",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Freshness windows, in seconds, per resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub artisan_discovery_secs: u64,
    pub artisan_profile_secs: u64,
    pub job_listings_secs: u64,
    pub job_listing_secs: u64,
    pub categories_secs: u64,
    pub subcategories_secs: u64,
    pub proposals_secs: u64,
    pub negotiations_secs: u64,
    pub artisan_jobs_secs: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            artisan_discovery_secs: 60,
            artisan_profile_secs: 300,
            job_listings_secs: 120,
            job_listing_secs: 120,
            categories_secs: 600,
            subcategories_secs: 600,
            proposals_secs: 180,
            negotiations_secs: 60,
            artisan_jobs_secs: 120,
        }
    }
}

impl FreshnessConfig {
    /// Create a config with the default windows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Same window for every resource. Mostly useful in tests.
    pub fn uniform(window: Duration) -> Self {
        let mut config = Self::default();
        for resource in Resource::ALL {
            config = config.with(resource, window);
        }
        config
    }

    /// Freshness window for a resource kind.
    pub fn window(&self, resource: Resource) -> Duration {
        Duration::from_secs(*self.slot(resource))
    }

    /// Override the window for one resource kind.
    ///
    /// Sub-second durations round down to whole seconds.
    pub fn with(mut self, resource: Resource, window: Duration) -> Self {
        *self.slot_mut(resource) = window.as_secs();
        self
    }

    fn slot(&self, resource: Resource) -> &u64 {
        match resource {
            Resource::ArtisanDiscovery => &self.artisan_discovery_secs,
            Resource::ArtisanProfile => &self.artisan_profile_secs,
            Resource::JobListings => &self.job_listings_secs,
            Resource::JobListing => &self.job_listing_secs,
            Resource::Categories => &self.categories_secs,
            Resource::Subcategories => &self.subcategories_secs,
            Resource::Proposals => &self.proposals_secs,
            Resource::Negotiations => &self.negotiations_secs,
            Resource::ArtisanJobs => &self.artisan_jobs_secs,
        }
    }

    fn slot_mut(&mut self, resource: Resource) -> &mut u64 {
        match resource {
            Resource::ArtisanDiscovery => &mut self.artisan_discovery_secs,
            Resource::ArtisanProfile => &mut self.artisan_profile_secs,
            Resource::JobListings => &mut self.job_listings_secs,
            Resource::JobListing => &mut self.job_listing_secs,
            Resource::Categories => &mut self.categories_secs,
            Resource::Subcategories => &mut self.subcategories_secs,
            Resource::Proposals => &mut self.proposals_secs,
            Resource::Negotiations => &mut self.negotiations_secs,
            Resource::ArtisanJobs => &mut self.artisan_jobs_secs,
        }
    }
}
