use counsel_records::{BookingCollection, BookingRecord, BookingStatus};

use crate::store::BookingStore;

/// Booking statuses a live session can plausibly belong to.
const RECOVERABLE_STATUSES: [BookingStatus; 2] = [BookingStatus::Accepted, BookingStatus::Pending];

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredBooking {
    pub collection: BookingCollection,
    pub record: BookingRecord,
}

/// Locates a trustworthy booking when the identifier handed to the client is
/// unreliable (derived from the session id rather than a real booking).
/// Fixed-slot bookings are preferred; an on-demand match is adopted as
/// metered; no match means the session is orphaned and the caller falls back
/// to the advisor's profile rate.
pub struct IdentifierRecovery<'a> {
    bookings: &'a dyn BookingStore,
}

impl<'a> IdentifierRecovery<'a> {
    pub fn new(bookings: &'a dyn BookingStore) -> Self {
        Self { bookings }
    }

    pub async fn recover(&self, student_id: &str, advisor_id: &str) -> Option<RecoveredBooking> {
        for collection in [BookingCollection::FixedSlot, BookingCollection::OnDemand] {
            match self
                .bookings
                .find_for_participants(collection, student_id, advisor_id, &RECOVERABLE_STATUSES)
                .await
            {
                Ok(Some(record)) => {
                    tracing::info!(
                        booking_id = %record.booking_id,
                        collection = collection.name(),
                        "recovered booking for session"
                    );
                    return Some(RecoveredBooking { collection, record });
                }
                Ok(None) => {
                    tracing::trace!(collection = collection.name(), "no recoverable booking");
                }
                Err(err) => {
                    tracing::warn!(
                        collection = collection.name(),
                        error = %err,
                        "booking recovery lookup failed"
                    );
                }
            }
        }
        None
    }
}
