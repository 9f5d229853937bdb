//! Proposals and the price negotiations attached to them.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::Caches;
use crate::cache::FetchMode;
use crate::client::api::path_segment;
use crate::client::{ApiClient, Query};
use crate::negotiation::{NegotiationAction, NegotiationEntry, Party, can_act};
use crate::types::{NewProposal, Proposal};
use crate::{MarketError, Result};

const PROPOSALS: &str = "/Proposal";
const ARTISAN_PROPOSALS: &str = "/Proposal/Artisan";

/// Submit proposals and negotiate their price.
#[derive(Clone)]
pub struct ProposalService {
    client: ApiClient,
    caches: Caches,
}

impl ProposalService {
    pub(crate) fn new(client: ApiClient, caches: Caches) -> Self {
        Self { client, caches }
    }

    /// Proposals sent by the signed-in artisan.
    pub async fn artisan_proposals(&self, mode: FetchMode) -> Result<Arc<Vec<Proposal>>> {
        let user = self.client.session().require_user()?;
        let client = self.client.clone();
        self.caches
            .artisan_proposals
            .fetch(user.id, mode, move || async move {
                client.get(ARTISAN_PROPOSALS, &Query::new()).await
            })
            .await
    }

    /// Proposals received for one of the signed-in customer's listings.
    pub async fn for_listing(&self, listing_id: &str, mode: FetchMode) -> Result<Arc<Vec<Proposal>>> {
        self.client.session().require_user()?;
        let client = self.client.clone();
        let path = format!("{PROPOSALS}/JobListing/{}", path_segment(listing_id)?);
        self.caches
            .listing_proposals
            .fetch(listing_id.to_string(), mode, move || async move {
                client.get(&path, &Query::new()).await
            })
            .await
    }

    pub async fn submit(&self, proposal: &NewProposal) -> Result<Proposal> {
        proposal.validate()?;
        let user = self.client.session().require_user()?;
        let created: Proposal = self.client.post(PROPOSALS, proposal).await?;
        info!(proposal = %created.id, listing = %created.job_listing_id, "proposal submitted");

        self.caches.artisan_proposals.invalidate(&user.id);
        self.caches
            .listing_proposals
            .invalidate(&proposal.job_listing_id);
        self.caches.listing.invalidate(&proposal.job_listing_id);
        Ok(created)
    }

    /// Negotiation history of a proposal, oldest first.
    pub async fn negotiations(
        &self,
        proposal_id: &str,
        mode: FetchMode,
    ) -> Result<Arc<Vec<NegotiationEntry>>> {
        self.client.session().require_user()?;
        let client = self.client.clone();
        let path = format!("{PROPOSALS}/{}/negotiations", path_segment(proposal_id)?);
        self.caches
            .negotiations
            .fetch(proposal_id.to_string(), mode, move || async move {
                let mut entries: Vec<NegotiationEntry> = client.get(&path, &Query::new()).await?;
                entries.sort_by_key(|e| e.created_at);
                Ok(entries)
            })
            .await
    }

    /// Whether the signed-in user may respond, judged on the cached history.
    pub async fn can_respond(&self, proposal_id: &str) -> Result<bool> {
        let user = self.client.session().require_user()?;
        let history = self
            .negotiations(proposal_id, FetchMode::PreferCache)
            .await?;
        Ok(can_act(&history, &Party::from(&user)))
    }

    /// Accept, reject, or counter the other party's latest offer.
    ///
    /// The history is refetched first; if the signed-in user sent the latest
    /// entry this fails with [`MarketError::NotYourTurn`] and nothing is
    /// posted.
    pub async fn negotiate(&self, proposal_id: &str, action: NegotiationAction) -> Result<()> {
        action.validate()?;
        let user = self.client.session().require_user()?;

        let history = self
            .negotiations(proposal_id, FetchMode::ForceRefresh)
            .await?;
        if !can_act(&history, &Party::from(&user)) {
            debug!(proposal = proposal_id, user = %user.id, "negotiation refused: not this party's turn");
            return Err(MarketError::NotYourTurn);
        }

        let path = format!("{PROPOSALS}/{}/negotiate", path_segment(proposal_id)?);
        let _: Value = self.client.post(&path, &action).await?;
        info!(proposal = proposal_id, ?action, "negotiation response sent");

        self.caches
            .negotiations
            .invalidate(&proposal_id.to_string());
        self.caches.artisan_proposals.invalidate_all();
        self.caches.listing_proposals.invalidate_all();
        Ok(())
    }
}
