//! Proposals: an artisan's bid on a job listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_util;
use crate::{MarketError, Result};

/// Where a proposal stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProposalStatus {
    #[default]
    #[serde(alias = "Pending")]
    Pending,
    /// Price is being negotiated.
    #[serde(alias = "Negotiating")]
    Negotiating,
    #[serde(alias = "Accepted")]
    Accepted,
    #[serde(alias = "Rejected")]
    Rejected,
    #[serde(alias = "Withdrawn")]
    Withdrawn,
    #[serde(other)]
    Unknown,
}

impl ProposalStatus {
    /// Accepted, rejected, and withdrawn proposals take no further actions.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Accepted | ProposalStatus::Rejected | ProposalStatus::Withdrawn
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    #[serde(deserialize_with = "serde_util::id")]
    pub id: String,
    #[serde(deserialize_with = "serde_util::id")]
    pub job_listing_id: String,
    #[serde(deserialize_with = "serde_util::id")]
    pub artisan_id: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub artisan_name: Option<String>,
    pub amount: f64,
    #[serde(default, alias = "coverLetter")]
    pub message: Option<String>,
    #[serde(default)]
    pub status: ProposalStatus,
    #[serde(default, deserialize_with = "serde_util::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of `POST /Proposal`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProposal {
    pub job_listing_id: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NewProposal {
    pub fn new(job_listing_id: impl Into<String>, amount: f64) -> Self {
        Self {
            job_listing_id: job_listing_id.into(),
            amount,
            message: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.job_listing_id.trim().is_empty() {
            return Err(MarketError::InvalidInput("job listing id is required".into()));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(MarketError::InvalidInput(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_from_api_json() {
        let json = r#"{
            "id": 5,
            "jobListingId": 31,
            "artisanId": "a-1",
            "amount": 12000.5,
            "coverLetter": "Can start Monday",
            "status": "Negotiating"
        }"#;
        let p: Proposal = serde_json::from_str(json).unwrap();
        assert_eq!(p.job_listing_id, "31");
        assert_eq!(p.message.as_deref(), Some("Can start Monday"));
        assert_eq!(p.status, ProposalStatus::Negotiating);
        assert!(!p.status.is_closed());
    }

    #[test]
    fn closed_statuses() {
        assert!(ProposalStatus::Accepted.is_closed());
        assert!(ProposalStatus::Withdrawn.is_closed());
        assert!(!ProposalStatus::Pending.is_closed());
    }

    #[test]
    fn new_proposal_requires_positive_amount() {
        assert!(NewProposal::new("31", 100.0).validate().is_ok());
        assert!(NewProposal::new("31", -1.0).validate().is_err());
        assert!(NewProposal::new("", 1.0).validate().is_err());
    }
}
