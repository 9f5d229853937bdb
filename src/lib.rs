//! Atelier - typed client for the artisan marketplace API
//!
//! Customers post job listings; artisans discover them, send proposals, and
//! negotiate the price. This crate wraps the marketplace's REST API behind
//! one [`Marketplace`] object with a shared request cache, an explicit
//! session, and optimistic updates.
//!
//! # Example
//!
//! ```rust,no_run
//! use atelier::{Atelier, FetchMode};
//! use atelier::session::{Role, Session, SessionUser};
//!
//! #[tokio::main]
//! async fn main() -> atelier::Result<()> {
//!     let market = Atelier::builder()
//!         .base_url("https://market.example.com/api")
//!         .build()?;
//!
//!     market
//!         .login(Session::new(
//!             "bearer-token",
//!             SessionUser { id: "u-42".into(), role: Role::Artisan, name: None },
//!         ))
//!         .await?;
//!
//!     // Two calls, one request: the second is answered from cache.
//!     let first = market.proposals().artisan_proposals(FetchMode::PreferCache).await?;
//!     let again = market.proposals().artisan_proposals(FetchMode::PreferCache).await?;
//!     assert_eq!(first.len(), again.len());
//!     Ok(())
//! }
//! ```
//!
//! # Layers
//!
//! - [`client`] sends requests and normalises errors into [`MarketError`].
//! - [`cache`] de-duplicates requests and remembers results.
//! - [`market`] exposes one service per area of the marketplace.
//! - [`session`], [`optimistic`], and [`negotiation`] hold the client-side
//!   state those services share.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod market;
pub mod negotiation;
pub mod optimistic;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{CacheState, FetchMode, FreshnessConfig, RequestCache, Resource};
pub use client::{ApiClient, ClientOptions, RetryConfig};
pub use config::Config;
pub use error::{MarketError, Result};
pub use market::{
    ArtisanJobsService, ArtisanService, Atelier, AtelierBuilder, JobListingService, Marketplace,
    ProposalService,
};
pub use negotiation::{NegotiationAction, NegotiationEntry, NegotiationFlow, Party, View, can_act};
pub use optimistic::{OptimisticValue, UpdateOutcome, UpdatePhase};
pub use session::{Role, Session, SessionHandle, SessionStore, SessionUser};
pub use version::{PKG_VERSION, version_string};
