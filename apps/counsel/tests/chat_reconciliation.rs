mod common;

use std::time::Duration;

use counsel_client_core::records::{
    BookingCollection, EndReason, ReconciliationRecord, ReconciliationStatus, SessionKind,
    UrgencyLabel,
};
use counsel_client_core::session::ReconciliationOutcome;

use common::{booking, harness, params, USER};

// chat sessions wait for the backend's completion record before exiting
#[tokio::test(start_paused = true)]
async fn chat_exit_waits_for_a_settling_charge() {
    let h = harness();
    h.store.insert_booking(
        BookingCollection::OnDemand,
        booking("b-chat", UrgencyLabel::OnDemand, 15.0),
    );
    h.store.set_wallet_balance(USER, 500.0);

    let session = h
        .coordinator
        .start(params(SessionKind::Chat, "b-chat"))
        .await
        .unwrap();

    // the backend settles three seconds after the end is requested
    let settling = h.store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        settling.settle_reconciliation(ReconciliationRecord {
            booking_id: "b-chat".into(),
            status: ReconciliationStatus::Paid,
            failure_reason: None,
        });
    });

    session.end().await;
    let ended = session.wait_ended().await.unwrap();
    assert_eq!(ended.reason, EndReason::UserEnded);
    match ended.reconciliation {
        Some(ReconciliationOutcome::Settled(record)) => {
            assert_eq!(record.status, ReconciliationStatus::Paid);
        }
        other => panic!("expected settled reconciliation, got {other:?}"),
    }
}

// the wait is bounded: a silent backend never blocks the exit
#[tokio::test(start_paused = true)]
async fn chat_exit_times_out_softly() {
    let h = harness();
    h.store.insert_booking(
        BookingCollection::OnDemand,
        booking("b-chat", UrgencyLabel::OnDemand, 15.0),
    );
    h.store.set_wallet_balance(USER, 500.0);

    let session = h
        .coordinator
        .start(params(SessionKind::Chat, "b-chat"))
        .await
        .unwrap();
    session.end().await;

    let ended = session.wait_ended().await.unwrap();
    assert_eq!(ended.reason, EndReason::UserEnded);
    assert_eq!(ended.reconciliation, Some(ReconciliationOutcome::TimedOut));
    assert_eq!(h.channel.leave_count(), 1);
}

// a failed charge still surfaces as a settled outcome with its reason
#[tokio::test(start_paused = true)]
async fn chat_exit_reports_a_failed_charge() {
    let h = harness();
    h.store.insert_booking(
        BookingCollection::OnDemand,
        booking("b-chat", UrgencyLabel::OnDemand, 15.0),
    );
    h.store.set_wallet_balance(USER, 500.0);
    h.store.settle_reconciliation(ReconciliationRecord {
        booking_id: "b-chat".into(),
        status: ReconciliationStatus::Failed,
        failure_reason: Some("card declined".into()),
    });

    let session = h
        .coordinator
        .start(params(SessionKind::Chat, "b-chat"))
        .await
        .unwrap();
    session.end().await;

    let ended = session.wait_ended().await.unwrap();
    match ended.reconciliation {
        Some(ReconciliationOutcome::Settled(record)) => {
            assert_eq!(record.status, ReconciliationStatus::Failed);
            assert_eq!(record.failure_reason.as_deref(), Some("card declined"));
        }
        other => panic!("expected settled reconciliation, got {other:?}"),
    }
}
