#![allow(dead_code)]

use std::sync::Arc;

use counsel_client_core::config::Timings;
use counsel_client_core::records::{
    BookingCollection, BookingRecord, BookingStatus, SessionKind, SessionStatus, UrgencyLabel,
};
use counsel_client_core::session::{SessionContext, SessionCoordinator, SessionParams};
use counsel_client_core::store::memory::MemoryStore;
use counsel_client_core::transport::mock::MockChannel;

pub const USER: &str = "u-1";
pub const ADVISOR: &str = "a-1";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub channel: Arc<MockChannel>,
    pub coordinator: SessionCoordinator,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(MockChannel::new());
    let ctx = SessionContext {
        bookings: store.clone(),
        sessions: store.clone(),
        wallet: store.clone(),
        reconciliation: store.clone(),
        advisors: store.clone(),
        channel: channel.clone(),
        user_id: USER.into(),
        timings: Timings::default(),
    };
    Harness {
        store,
        channel,
        coordinator: SessionCoordinator::new(ctx),
    }
}

pub fn booking(id: &str, urgency: UrgencyLabel, amount: f64) -> BookingRecord {
    BookingRecord {
        booking_id: id.into(),
        urgency,
        session_amount: Some(amount),
        student_id: USER.into(),
        advisor_id: ADVISOR.into(),
        status: BookingStatus::Accepted,
        channel_reference: Some("room-1".into()),
    }
}

pub fn params(kind: SessionKind, booking_id: &str) -> SessionParams {
    SessionParams {
        session_id: Some("s-test".into()),
        kind,
        booking_id: booking_id.into(),
        channel_hint: "room-1".into(),
        advisor_id: ADVISOR.into(),
        urgency_hint: None,
    }
}

/// Seed an accepted on-demand booking and return ready-to-start params.
pub fn metered_setup(h: &Harness, rate: f64, balance: f64) -> SessionParams {
    h.store.insert_booking(
        BookingCollection::OnDemand,
        booking("b-1", UrgencyLabel::OnDemand, rate),
    );
    h.store.set_wallet_balance(USER, balance);
    params(SessionKind::Audio, "b-1")
}

/// Poll the store until the session record reaches `status`.
pub async fn wait_for_status(h: &Harness, kind: SessionKind, session_id: &str, status: SessionStatus) {
    for _ in 0..100 {
        if let Some(record) = h.store.session(kind, session_id) {
            if record.status == status {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("session {session_id} never reached {status:?}");
}
