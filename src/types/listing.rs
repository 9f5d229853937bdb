//! Job listings posted by customers, and the category tree they are filed under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_util;
use crate::client::Query;
use crate::{MarketError, Result};

/// Top-level trade category (e.g. "Plumbing").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(deserialize_with = "serde_util::id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Subcategory within a [`Category`] (e.g. "Pipe repair").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subcategory {
    #[serde(deserialize_with = "serde_util::id")]
    pub id: String,
    #[serde(deserialize_with = "serde_util::id")]
    pub category_id: String,
    pub name: String,
}

/// Lifecycle of a job listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListingStatus {
    #[default]
    #[serde(alias = "Open")]
    Open,
    #[serde(alias = "InProgress")]
    InProgress,
    #[serde(alias = "Completed")]
    Completed,
    #[serde(alias = "Cancelled", alias = "closed", alias = "Closed")]
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// A job posted by a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListing {
    #[serde(deserialize_with = "serde_util::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_util::opt_id")]
    pub customer_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "serde_util::ids")]
    pub subcategory_ids: Vec<String>,
    #[serde(default)]
    pub status: ListingStatus,
    #[serde(default)]
    pub proposal_count: u32,
    #[serde(default, deserialize_with = "serde_util::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of `POST /JobListing`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJobListing {
    pub title: String,
    pub description: String,
    pub budget: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub subcategory_ids: Vec<String>,
}

impl NewJobListing {
    pub fn new(title: impl Into<String>, description: impl Into<String>, budget: f64) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            budget,
            location: None,
            subcategory_ids: Vec::new(),
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn subcategories(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subcategory_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Reject listings the API would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(MarketError::InvalidInput("title is required".into()));
        }
        if self.description.trim().is_empty() {
            return Err(MarketError::InvalidInput("description is required".into()));
        }
        if !self.budget.is_finite() || self.budget <= 0.0 {
            return Err(MarketError::InvalidInput(format!(
                "budget must be positive, got {}",
                self.budget
            )));
        }
        if self.subcategory_ids.is_empty() {
            return Err(MarketError::InvalidInput(
                "at least one subcategory is required".into(),
            ));
        }
        Ok(())
    }
}

/// Filters for the jobs offered to an artisan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtisanJobsQuery {
    pub subcategory_ids: Vec<String>,
    pub location: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for ArtisanJobsQuery {
    fn default() -> Self {
        Self {
            subcategory_ids: Vec::new(),
            location: None,
            page: 1,
            page_size: 20,
        }
    }
}

impl ArtisanJobsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subcategories(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subcategory_ids = ids.into_iter().map(Into::into).collect();
        self.subcategory_ids.sort();
        self.subcategory_ids.dedup();
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page.max(1);
        self.page_size = page_size.max(1);
        self
    }

    /// Same query with subcategories sorted and de-duplicated, blank
    /// entries dropped, and paging clamped to at least 1. Fields are public,
    /// so a query built by hand may not be in this form yet.
    pub fn normalized(&self) -> Self {
        let mut q = self.clone();
        q.subcategory_ids = q
            .subcategory_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        q.subcategory_ids.sort();
        q.subcategory_ids.dedup();
        q.location = q.location.filter(|s| !s.trim().is_empty());
        q.page = q.page.max(1);
        q.page_size = q.page_size.max(1);
        q
    }

    /// Cache key: the normalized query as JSON.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(&self.normalized()).unwrap_or_default()
    }

    pub(crate) fn to_query(&self) -> Query {
        let q = self.normalized();
        let mut out: Query = q
            .subcategory_ids
            .into_iter()
            .map(|id| ("subcategoryIds", id))
            .collect();
        if let Some(l) = q.location {
            out.push(("location", l));
        }
        out.push(("page", q.page.to_string()));
        out.push(("pageSize", q.page_size.to_string()));
        out
    }
}
