//! Public types for the marketplace API.
//!
//! Field names follow the API's camelCase JSON. Identifiers are kept as
//! strings; the API sends some of them as numbers, which
//! [`serde_util`] accepts on the way in.

mod artisan;
mod listing;
mod proposal;
pub(crate) mod serde_util;

pub use artisan::{Artisan, ArtisanQuery, ArtisanSummary, AvailabilityUpdate, Review};
pub use listing::{
    ArtisanJobsQuery, Category, JobListing, ListingStatus, NewJobListing, Subcategory,
};
pub use proposal::{NewProposal, Proposal, ProposalStatus};
