//! Artisan profiles and discovery queries.

use serde::{Deserialize, Serialize};

use super::serde_util;
use crate::client::Query;

/// Artisan as listed by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtisanSummary {
    #[serde(deserialize_with = "serde_util::id")]
    pub id: String,
    #[serde(alias = "fullName")]
    pub name: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub is_available: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A customer review shown on an artisan profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default)]
    pub reviewer_name: Option<String>,
    pub rating: f32,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Full artisan profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artisan {
    #[serde(flatten)]
    pub summary: ArtisanSummary,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub years_of_experience: Option<u32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// Body of `PATCH /Users/toggle-availability`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityUpdate {
    pub is_available: bool,
}

/// Filters for artisan discovery.
///
/// ```rust
/// # use atelier::types::ArtisanQuery;
/// let query = ArtisanQuery::new()
///     .category("plumbing")
///     .location("Lagos")
///     .available_only(true);
/// assert_eq!(query.page, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtisanQuery {
    pub category_id: Option<String>,
    pub subcategory_ids: Vec<String>,
    pub location: Option<String>,
    pub search: Option<String>,
    pub available_only: bool,
    pub page: u32,
    pub page_size: u32,
}

impl Default for ArtisanQuery {
    fn default() -> Self {
        Self {
            category_id: None,
            subcategory_ids: Vec::new(),
            location: None,
            search: None,
            available_only: false,
            page: 1,
            page_size: 20,
        }
    }
}

impl ArtisanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, id: impl Into<String>) -> Self {
        self.category_id = Some(id.into());
        self
    }

    pub fn subcategories(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subcategory_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn available_only(mut self, yes: bool) -> Self {
        self.available_only = yes;
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page.max(1);
        self.page_size = page_size.max(1);
        self
    }

    /// Canonical form: subcategory ids sorted and de-duplicated, blank
    /// strings dropped. Two queries selecting the same artisans share a
    /// cache entry.
    pub fn normalized(&self) -> Self {
        let mut q = self.clone();
        q.subcategory_ids.sort();
        q.subcategory_ids.dedup();
        q.location = q.location.filter(|s| !s.trim().is_empty());
        q.search = q.search.filter(|s| !s.trim().is_empty());
        q
    }

    /// Cache key: the normalized query as JSON.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(&self.normalized()).unwrap_or_default()
    }

    pub(crate) fn to_query(&self) -> Query {
        let q = self.normalized();
        let mut out: Query = Vec::new();
        if let Some(c) = q.category_id {
            out.push(("categoryId", c));
        }
        for id in q.subcategory_ids {
            out.push(("subcategoryIds", id));
        }
        if let Some(l) = q.location {
            out.push(("location", l));
        }
        if let Some(s) = q.search {
            out.push(("search", s));
        }
        if q.available_only {
            out.push(("availableOnly", "true".to_string()));
        }
        out.push(("page", q.page.to_string()));
        out.push(("pageSize", q.page_size.to_string()));
        out
    }
}
