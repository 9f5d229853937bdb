//! Price negotiation between a customer and an artisan.
//!
//! The negotiation history lives on the server; this module only decides
//! who may move next and tracks the local view while composing a
//! counter-offer.
//!
//! # Turn rule
//!
//! A party may accept, reject, or counter only when the most recent entry
//! was sent by someone else. [`can_act`] is the single implementation of
//! that rule; [`ProposalService::negotiate`](crate::market::ProposalService::negotiate)
//! enforces it before posting.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{Role, SessionUser};
use crate::types::serde_util;
use crate::{MarketError, Result};

/// One message in a negotiation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationEntry {
    #[serde(deserialize_with = "serde_util::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_util::opt_id")]
    pub proposal_id: Option<String>,
    #[serde(default, deserialize_with = "serde_util::opt_id")]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_role: Option<Role>,
    pub amount: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(deserialize_with = "serde_util::timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Who is looking at the negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub id: String,
    pub role: Role,
}

impl Party {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

impl From<&SessionUser> for Party {
    fn from(user: &SessionUser) -> Self {
        Party::new(user.id.clone(), user.role)
    }
}

/// Most recent entry by `created_at`. On equal timestamps the later one in
/// input order wins.
pub fn latest(entries: &[NegotiationEntry]) -> Option<&NegotiationEntry> {
    entries.iter().max_by_key(|e| e.created_at)
}

/// Whether `party` may respond to the negotiation.
///
/// True for an empty history. Otherwise false exactly when the latest
/// entry was sent by `party`: compared by sender id, or by role when the
/// entry carries no sender id.
pub fn can_act(entries: &[NegotiationEntry], party: &Party) -> bool {
    let Some(last) = latest(entries) else {
        return true;
    };
    match (&last.sender_id, last.sender_role) {
        (Some(sender), _) => sender != &party.id,
        (None, Some(role)) => role != party.role,
        // Anonymous entry: nobody can be excluded.
        (None, None) => true,
    }
}

/// A response to the other party's latest offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum NegotiationAction {
    Accept,
    Reject,
    Counter {
        amount: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl NegotiationAction {
    pub fn counter(amount: f64) -> Self {
        NegotiationAction::Counter {
            amount,
            message: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            NegotiationAction::Counter { amount, .. } => validate_amount(*amount),
            _ => Ok(()),
        }
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(MarketError::InvalidInput(format!(
            "offer must be a positive amount, got {amount}"
        )))
    }
}

/// What the negotiation panel is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    /// History of offers.
    #[default]
    List,
    /// Composing a counter-offer.
    Typing,
    /// Counter-offer sent; confirmation shown.
    Sent,
}

impl View {
    fn as_str(&self) -> &'static str {
        match self {
            View::List => "list",
            View::Typing => "typing",
            View::Sent => "sent",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// View state of one negotiation panel.
///
/// ```text
/// List ──start_counter_offer──▶ Typing ──submit──▶ Sent
///   ▲                             │                  │
///   └───────────cancel────────────┘                  │
///   └───────────────────reopen───────────────────────┘
/// ```
#[derive(Debug, Clone, Default)]
pub struct NegotiationFlow {
    view: View,
}

impl NegotiationFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// List → Typing, only when it is `party`'s turn.
    pub fn start_counter_offer(
        &mut self,
        entries: &[NegotiationEntry],
        party: &Party,
    ) -> Result<()> {
        self.expect(View::List, "start a counter-offer")?;
        if !can_act(entries, party) {
            return Err(MarketError::NotYourTurn);
        }
        self.view = View::Typing;
        Ok(())
    }

    /// Typing → List, discarding the draft.
    pub fn cancel(&mut self) -> Result<()> {
        self.expect(View::Typing, "cancel")?;
        self.view = View::List;
        Ok(())
    }

    /// Typing → Sent. Returns the action to post.
    pub fn submit(&mut self, amount: f64, message: Option<String>) -> Result<NegotiationAction> {
        self.expect(View::Typing, "submit")?;
        validate_amount(amount)?;
        self.view = View::Sent;
        Ok(NegotiationAction::Counter { amount, message })
    }

    /// Any → List. Called when the panel is opened again.
    pub fn reopen(&mut self) {
        self.view = View::List;
    }

    fn expect(&self, view: View, action: &'static str) -> Result<()> {
        if self.view == view {
            Ok(())
        } else {
            Err(MarketError::InvalidTransition {
                from: self.view.as_str(),
                action,
            })
        }
    }
}
