//! Optimistic updates with rollback.
//!
//! [`OptimisticValue`] shows a new value immediately, confirms it with the
//! server, and restores the previous value if the server refuses. The
//! phase is explicit:
//!
//! ```text
//! Settled ──apply──▶ Pending ──ok──▶ Settled
//!                       │
//!                       └──err / dropped──▶ RolledBack
//! ```
//!
//! Only one update is pending at a time. An `apply` issued while another
//! is pending is dropped and reported as [`UpdateOutcome::Dropped`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::MarketError;
use crate::telemetry;

/// Where the last update stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePhase {
    /// Value matches what the server last confirmed (or was seeded with).
    Settled,
    /// New value shown, server not yet answered.
    Pending,
    /// Server refused (or the update was abandoned); previous value restored.
    RolledBack { message: String },
}

/// Value plus phase, as published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub value: T,
    pub phase: UpdatePhase,
}

/// Result of [`OptimisticValue::apply`].
#[derive(Debug)]
pub enum UpdateOutcome<T> {
    /// Server accepted the new value.
    Confirmed(T),
    /// Server refused; `restored` is showing again.
    RolledBack { restored: T, error: MarketError },
    /// Another update was pending; nothing changed.
    Dropped,
}

impl<T> UpdateOutcome<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, UpdateOutcome::Confirmed(_))
    }
}

/// A value updated optimistically. See the module docs.
pub struct OptimisticValue<T> {
    name: &'static str,
    state: watch::Sender<Snapshot<T>>,
    /// Ticket of the pending update, 0 when none.
    pending: AtomicU64,
    next_ticket: AtomicU64,
}

impl<T> OptimisticValue<T>
where
    T: Clone + Send + Sync + std::fmt::Debug,
{
    /// Settled value named `name` (for logs and metrics).
    pub fn new(name: &'static str, initial: T) -> Self {
        let (state, _) = watch::channel(Snapshot {
            value: initial,
            phase: UpdatePhase::Settled,
        });
        Self {
            name,
            state,
            pending: AtomicU64::new(0),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Currently shown value.
    pub fn get(&self) -> T {
        self.state.borrow().value.clone()
    }

    pub fn phase(&self) -> UpdatePhase {
        self.state.borrow().phase.clone()
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
    }

    /// Receive every change of value or phase.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.state.subscribe()
    }

    /// Replace the value with one known to match the server (e.g. a freshly
    /// loaded profile). Ignored while an update is pending.
    pub fn set_settled(&self, value: T) -> bool {
        if self.is_pending() {
            return false;
        }
        self.state.send_replace(Snapshot {
            value,
            phase: UpdatePhase::Settled,
        });
        true
    }

    /// Forget any pending update and show `value` as settled.
    ///
    /// An update still waiting on the server when this is called finishes
    /// without touching the value again.
    pub fn reset(&self, value: T) {
        let abandoned = self.pending.swap(0, Ordering::AcqRel);
        if abandoned != 0 {
            debug!(value = self.name, ticket = abandoned, "pending update detached by reset");
        }
        self.state.send_replace(Snapshot {
            value,
            phase: UpdatePhase::Settled,
        });
    }

    /// Show `new_value` now and keep it if `confirm` succeeds.
    ///
    /// If `confirm` fails, or this future is dropped before it resolves,
    /// the previous value is restored with phase `RolledBack`.
    pub async fn apply<Fut>(&self, new_value: T, confirm: Fut) -> UpdateOutcome<T>
    where
        Fut: Future<Output = crate::Result<()>>,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        if self
            .pending
            .compare_exchange(0, ticket, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(value = self.name, "update already pending; dropping");
            return UpdateOutcome::Dropped;
        }

        let previous = self.get();
        self.state.send_replace(Snapshot {
            value: new_value.clone(),
            phase: UpdatePhase::Pending,
        });
        let mut guard = PendingGuard {
            owner: self,
            ticket,
            previous: Some(previous),
        };

        match confirm.await {
            Ok(()) => {
                guard.previous = None;
                if guard.is_current() {
                    self.state.send_replace(Snapshot {
                        value: new_value.clone(),
                        phase: UpdatePhase::Settled,
                    });
                }
                debug!(value = self.name, ?new_value, "update confirmed");
                UpdateOutcome::Confirmed(new_value)
            }
            Err(error) => {
                let restored = guard.previous.take().unwrap_or(new_value);
                metrics::counter!(telemetry::OPTIMISTIC_ROLLBACKS_TOTAL, "value" => self.name)
                    .increment(1);
                warn!(value = self.name, ?restored, error = %error, "update refused; rolling back");
                if guard.is_current() {
                    self.state.send_replace(Snapshot {
                        value: restored.clone(),
                        phase: UpdatePhase::RolledBack {
                            message: error.to_string(),
                        },
                    });
                }
                UpdateOutcome::RolledBack { restored, error }
            }
        }
    }
}

/// Clears the pending ticket when `apply` ends, and rolls back if it ended
/// without an answer. Does nothing to the value once [`OptimisticValue::reset`]
/// has detached the update.
struct PendingGuard<'a, T> {
    owner: &'a OptimisticValue<T>,
    ticket: u64,
    previous: Option<T>,
}

impl<T> PendingGuard<'_, T> {
    fn is_current(&self) -> bool {
        self.owner.pending.load(Ordering::Acquire) == self.ticket
    }
}

impl<T> Drop for PendingGuard<'_, T> {
    fn drop(&mut self) {
        if !self.is_current() {
            return;
        }
        if let Some(previous) = self.previous.take() {
            self.owner.state.send_replace(Snapshot {
                value: previous,
                phase: UpdatePhase::RolledBack {
                    message: MarketError::Cancelled.to_string(),
                },
            });
        }
        let _ = self.owner.pending.compare_exchange(
            self.ticket,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    #[test]
    fn starts_settled() {
        let v = OptimisticValue::new("flag", true);
        assert!(v.get());
        assert_eq!(v.phase(), UpdatePhase::Settled);
        assert!(!v.is_pending());
    }

    #[tokio::test]
    async fn set_settled_ignored_while_pending() {
        let v = OptimisticValue::new("flag", false);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let apply = v.apply(true, async move {
            rx.await.ok();
            Ok(())
        });
        tokio::pin!(apply);

        // Drive apply until it parks on the confirmation.
        assert!(apply.as_mut().now_or_never().is_none());
        assert!(!v.set_settled(false));

        tx.send(()).unwrap();
        assert!(apply.await.is_confirmed());
        assert!(v.set_settled(false));
        assert!(!v.get());
    }

    #[tokio::test]
    async fn reset_detaches_pending_update() {
        let v = OptimisticValue::new("flag", false);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let apply = v.apply(true, async move {
            rx.await.ok();
            Ok(())
        });
        tokio::pin!(apply);
        assert!(apply.as_mut().now_or_never().is_none());
        assert!(v.get());

        v.reset(false);
        assert!(!v.get());
        assert!(!v.is_pending());
        assert_eq!(v.phase(), UpdatePhase::Settled);

        // The detached update still reports its answer but leaves the value alone.
        tx.send(()).unwrap();
        assert!(apply.await.is_confirmed());
        assert!(!v.get());
        assert_eq!(v.phase(), UpdatePhase::Settled);

        // A fresh update is accepted after the reset.
        assert!(v.apply(true, async { Ok(()) }).await.is_confirmed());
        assert!(v.get());
    }
}
