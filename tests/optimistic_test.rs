//! Integration tests for [`OptimisticValue`]: confirm, rollback, dropped
//! concurrent updates, and abandonment.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use atelier::{MarketError, OptimisticValue, UpdateOutcome, UpdatePhase};

#[tokio::test]
async fn confirmed_update_keeps_new_value() {
    let value = OptimisticValue::new("availability", false);

    let outcome = value.apply(true, async { Ok(()) }).await;

    assert!(matches!(outcome, UpdateOutcome::Confirmed(true)));
    assert!(value.get());
    assert_eq!(value.phase(), UpdatePhase::Settled);
    assert!(!value.is_pending());
}

#[tokio::test]
async fn refused_update_restores_previous_value() {
    let value = OptimisticValue::new("availability", false);

    let outcome = value
        .apply(true, async {
            Err(MarketError::Api {
                status: 500,
                message: "toggle failed".into(),
            })
        })
        .await;

    match outcome {
        UpdateOutcome::RolledBack { restored, error } => {
            assert!(!restored);
            assert!(matches!(error, MarketError::Api { status: 500, .. }));
        }
        other => panic!("expected rollback, got {other:?}"),
    }
    assert!(!value.get());
    assert!(matches!(
        value.phase(),
        UpdatePhase::RolledBack { ref message } if message.contains("toggle failed")
    ));
}

#[tokio::test]
async fn new_value_is_visible_while_pending() {
    let value = Arc::new(OptimisticValue::new("availability", false));
    let (confirm, confirmed) = oneshot::channel::<()>();

    let task = {
        let value = Arc::clone(&value);
        tokio::spawn(async move {
            value
                .apply(true, async move {
                    confirmed.await.ok();
                    Ok(())
                })
                .await
        })
    };

    let mut rx = value.subscribe();
    rx.wait_for(|s| s.phase == UpdatePhase::Pending).await.unwrap();
    assert!(value.get());
    assert!(value.is_pending());

    confirm.send(()).unwrap();
    assert!(task.await.unwrap().is_confirmed());
    assert_eq!(value.snapshot().phase, UpdatePhase::Settled);
}

#[tokio::test]
async fn second_update_while_pending_is_dropped() {
    let value = Arc::new(OptimisticValue::new("availability", false));
    let (confirm, confirmed) = oneshot::channel::<()>();

    let first = {
        let value = Arc::clone(&value);
        tokio::spawn(async move {
            value
                .apply(true, async move {
                    confirmed.await.ok();
                    Ok(())
                })
                .await
        })
    };
    value
        .subscribe()
        .wait_for(|s| s.phase == UpdatePhase::Pending)
        .await
        .unwrap();

    let second = value.apply(false, async { Ok(()) }).await;
    assert!(matches!(second, UpdateOutcome::Dropped));
    assert!(value.get(), "dropped update must not touch the value");

    confirm.send(()).unwrap();
    assert!(first.await.unwrap().is_confirmed());
    assert!(value.get());

    // Once settled, updates are accepted again.
    assert!(value.apply(false, async { Ok(()) }).await.is_confirmed());
    assert!(!value.get());
}

#[tokio::test]
async fn abandoned_update_rolls_back() {
    let value = OptimisticValue::new("availability", true);

    let result = tokio::time::timeout(
        Duration::from_millis(10),
        value.apply(false, std::future::pending::<atelier::Result<()>>()),
    )
    .await;
    assert!(result.is_err(), "confirmation never resolves");

    assert!(value.get());
    assert!(!value.is_pending());
    assert!(matches!(value.phase(), UpdatePhase::RolledBack { .. }));
}

#[tokio::test]
async fn subscribers_see_pending_then_rollback() {
    let value = OptimisticValue::new("availability", false);
    let mut rx = value.subscribe();

    let _ = value
        .apply(true, async { Err(MarketError::Http("offline".into())) })
        .await;

    // watch keeps only the latest snapshot.
    assert!(rx.has_changed().unwrap());
    let snapshot = rx.borrow_and_update().clone();
    assert!(!snapshot.value);
    assert!(matches!(snapshot.phase, UpdatePhase::RolledBack { .. }));
}
