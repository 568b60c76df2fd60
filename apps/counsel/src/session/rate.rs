use counsel_records::{BillingMode, BookingCollection, BookingRecord, SessionKind, UrgencyLabel};
use thiserror::Error;

use crate::session::recovery::IdentifierRecovery;
use crate::store::{AdvisorDirectory, BookingStore};

/// One rung of the rate-resolution ladder. The order of [`RESOLUTION_CHAIN`]
/// is the order the ladder is walked; the first rung that produces a rate
/// wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateStep {
    /// An explicit urgency hint from the caller locks the billing mode to
    /// fixed before anything is read.
    UrgencyHint,
    /// The fixed-slot booking collection, by booking id.
    FixedSlotLookup,
    /// The on-demand booking collection, by the same id. Never consulted once
    /// the mode is locked to fixed.
    OnDemandLookup,
    /// The advisor profile's default per-minute rate for the session kind.
    AdvisorDefault,
}

pub const RESOLUTION_CHAIN: [RateStep; 4] = [
    RateStep::UrgencyHint,
    RateStep::FixedSlotLookup,
    RateStep::OnDemandLookup,
    RateStep::AdvisorDefault,
];

#[derive(Debug, Clone)]
pub struct RateRequest {
    pub booking_id: String,
    /// The transport channel reference. When it equals `booking_id` the id
    /// was derived from the session rather than a real booking and must be
    /// recovered before the ladder runs.
    pub channel_hint: String,
    pub urgency_hint: Option<UrgencyLabel>,
    pub advisor_id: String,
    pub user_id: String,
    pub kind: SessionKind,
}

/// The frozen billing terms for a session. Produced exactly once; nothing
/// after resolution may change the mode or the rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RateCard {
    pub billing_mode: BillingMode,
    pub rate_per_minute: f64,
    pub advisor_id: String,
    /// The booking the session settled on: the recovered id when recovery
    /// ran, otherwise the id the caller supplied.
    pub booking_id: String,
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("no rate source resolved for booking {booking_id}")]
    Unresolved { booking_id: String },
}

pub struct RateResolver<'a> {
    bookings: &'a dyn BookingStore,
    advisors: &'a dyn AdvisorDirectory,
}

impl<'a> RateResolver<'a> {
    pub fn new(bookings: &'a dyn BookingStore, advisors: &'a dyn AdvisorDirectory) -> Self {
        Self { bookings, advisors }
    }

    /// Walk the resolution ladder. Misses and I/O failures both fall through
    /// to the next rung; only a successful read stops the walk early.
    pub async fn resolve(&self, request: &RateRequest) -> Result<RateCard, RateError> {
        let mut booking_id = request.booking_id.clone();
        let mut mode: Option<BillingMode> = None;
        let mut forced_fixed = false;
        let mut rate: Option<f64> = None;

        if request.booking_id == request.channel_hint {
            let recovery = IdentifierRecovery::new(self.bookings);
            match recovery.recover(&request.user_id, &request.advisor_id).await {
                Some(found) => {
                    booking_id = found.record.booking_id.clone();
                    match found.collection {
                        BookingCollection::FixedSlot => {
                            mode = Some(BillingMode::Fixed);
                            forced_fixed = true;
                        }
                        BookingCollection::OnDemand => {
                            mode = Some(BillingMode::Metered);
                        }
                    }
                    rate = found.record.session_amount;
                }
                None => {
                    tracing::warn!(
                        booking_id = %request.booking_id,
                        "no booking recovered; session is orphaned"
                    );
                }
            }
        }

        for step in RESOLUTION_CHAIN {
            if rate.is_some() {
                break;
            }
            match step {
                RateStep::UrgencyHint => {
                    if matches!(request.urgency_hint, Some(UrgencyLabel::FixedSlot)) {
                        mode.get_or_insert(BillingMode::Fixed);
                        forced_fixed = true;
                        tracing::debug!("urgency hint locked billing mode to fixed");
                    }
                }
                RateStep::FixedSlotLookup => {
                    if let Some(hit) = self.lookup(BookingCollection::FixedSlot, &booking_id).await
                    {
                        mode.get_or_insert(hit.urgency.billing_mode());
                        rate = hit.session_amount;
                    }
                }
                RateStep::OnDemandLookup => {
                    if forced_fixed {
                        tracing::trace!("on-demand lookup skipped for fixed session");
                        continue;
                    }
                    if let Some(hit) = self.lookup(BookingCollection::OnDemand, &booking_id).await {
                        mode.get_or_insert(hit.urgency.billing_mode());
                        rate = hit.session_amount;
                    }
                }
                RateStep::AdvisorDefault => {
                    match self
                        .advisors
                        .default_rate(&request.advisor_id, request.kind)
                        .await
                    {
                        Ok(Some(default)) => {
                            mode.get_or_insert(BillingMode::Metered);
                            rate = Some(default);
                        }
                        Ok(None) => {
                            tracing::trace!(advisor_id = %request.advisor_id, "advisor profile has no default rate");
                        }
                        Err(err) => {
                            tracing::warn!(
                                advisor_id = %request.advisor_id,
                                error = %err,
                                "advisor default rate lookup failed"
                            );
                        }
                    }
                }
            }
        }

        let rate_per_minute = rate.ok_or_else(|| RateError::Unresolved {
            booking_id: booking_id.clone(),
        })?;
        let billing_mode = mode.unwrap_or(BillingMode::Metered);
        tracing::info!(
            booking_id = %booking_id,
            ?billing_mode,
            rate_per_minute,
            "rate resolved"
        );
        Ok(RateCard {
            billing_mode,
            rate_per_minute,
            advisor_id: request.advisor_id.clone(),
            booking_id,
        })
    }

    async fn lookup(
        &self,
        collection: BookingCollection,
        booking_id: &str,
    ) -> Option<BookingRecord> {
        match self.bookings.fetch(collection, booking_id).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                tracing::trace!(collection = collection.name(), booking_id, "booking miss");
                None
            }
            Err(err) => {
                tracing::warn!(
                    collection = collection.name(),
                    booking_id,
                    error = %err,
                    "booking lookup failed; falling through"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use counsel_records::BookingStatus;

    fn booking(id: &str, urgency: UrgencyLabel, amount: Option<f64>) -> BookingRecord {
        BookingRecord {
            booking_id: id.into(),
            urgency,
            session_amount: amount,
            student_id: "u-1".into(),
            advisor_id: "a-1".into(),
            status: BookingStatus::Accepted,
            channel_reference: None,
        }
    }

    fn request(booking_id: &str, channel_hint: &str, hint: Option<UrgencyLabel>) -> RateRequest {
        RateRequest {
            booking_id: booking_id.into(),
            channel_hint: channel_hint.into(),
            urgency_hint: hint,
            advisor_id: "a-1".into(),
            user_id: "u-1".into(),
            kind: SessionKind::Audio,
        }
    }

    #[tokio::test]
    async fn fixed_slot_booking_resolves_fixed() {
        let store = MemoryStore::new();
        store.insert_booking(
            BookingCollection::FixedSlot,
            booking("b-1", UrgencyLabel::FixedSlot, Some(300.0)),
        );

        let card = RateResolver::new(&store, &store)
            .resolve(&request("b-1", "room-9", None))
            .await
            .unwrap();
        assert_eq!(card.billing_mode, BillingMode::Fixed);
        assert_eq!(card.rate_per_minute, 300.0);
        assert_eq!(card.booking_id, "b-1");
    }

    #[tokio::test]
    async fn fixed_slot_collection_with_on_demand_label_falls_back_to_metered() {
        let store = MemoryStore::new();
        store.insert_booking(
            BookingCollection::FixedSlot,
            booking("b-2", UrgencyLabel::OnDemand, Some(40.0)),
        );

        let card = RateResolver::new(&store, &store)
            .resolve(&request("b-2", "room-9", None))
            .await
            .unwrap();
        assert_eq!(card.billing_mode, BillingMode::Metered);
        assert_eq!(card.rate_per_minute, 40.0);
    }

    #[tokio::test]
    async fn on_demand_booking_resolves_metered() {
        let store = MemoryStore::new();
        store.insert_booking(
            BookingCollection::OnDemand,
            booking("b-3", UrgencyLabel::OnDemand, Some(55.0)),
        );

        let card = RateResolver::new(&store, &store)
            .resolve(&request("b-3", "room-9", None))
            .await
            .unwrap();
        assert_eq!(card.billing_mode, BillingMode::Metered);
        assert_eq!(card.rate_per_minute, 55.0);
    }

    // Scenario: the id misses both collections and no hint is present, so the
    // advisor's per-kind profile rate applies, metered.
    #[tokio::test]
    async fn unknown_booking_falls_to_advisor_default() {
        let store = MemoryStore::new();
        store.set_advisor_rate("a-1", SessionKind::Audio, 18.0);

        let card = RateResolver::new(&store, &store)
            .resolve(&request("b-missing", "room-9", None))
            .await
            .unwrap();
        assert_eq!(card.billing_mode, BillingMode::Metered);
        assert_eq!(card.rate_per_minute, 18.0);
    }

    // Scenario: an explicit fixed-slot hint locks the mode immediately; the
    // on-demand collection, which would have classified the session metered,
    // is never consulted.
    #[tokio::test]
    async fn urgency_hint_locks_fixed_and_skips_on_demand() {
        let store = MemoryStore::new();
        store.insert_booking(
            BookingCollection::OnDemand,
            booking("b-4", UrgencyLabel::OnDemand, Some(99.0)),
        );
        store.set_advisor_rate("a-1", SessionKind::Audio, 20.0);

        let card = RateResolver::new(&store, &store)
            .resolve(&request("b-4", "room-9", Some(UrgencyLabel::FixedSlot)))
            .await
            .unwrap();
        assert_eq!(card.billing_mode, BillingMode::Fixed);
        // the fixed-slot collection missed, so the rate came from the
        // advisor profile while the mode stayed locked
        assert_eq!(card.rate_per_minute, 20.0);
        assert_eq!(store.booking_lookup_count(BookingCollection::OnDemand), 0);
    }

    #[tokio::test]
    async fn hint_mode_survives_rate_refinement_from_fixed_slot() {
        let store = MemoryStore::new();
        store.insert_booking(
            BookingCollection::FixedSlot,
            booking("b-5", UrgencyLabel::Unknown, Some(450.0)),
        );

        let card = RateResolver::new(&store, &store)
            .resolve(&request("b-5", "room-9", Some(UrgencyLabel::FixedSlot)))
            .await
            .unwrap();
        // the looked-up label would classify metered, but the hint fired first
        assert_eq!(card.billing_mode, BillingMode::Fixed);
        assert_eq!(card.rate_per_minute, 450.0);
    }

    // Scenario: the supplied id equals the channel reference, so it is a
    // sentinel; a matching accepted fixed-slot booking is adopted and forces
    // fixed mode instead of falling to the advisor default.
    #[tokio::test]
    async fn ambiguous_id_recovers_fixed_slot_booking() {
        let store = MemoryStore::new();
        store.insert_booking(
            BookingCollection::FixedSlot,
            booking("b-real", UrgencyLabel::FixedSlot, Some(500.0)),
        );
        store.set_advisor_rate("a-1", SessionKind::Audio, 20.0);

        let card = RateResolver::new(&store, &store)
            .resolve(&request("room-9", "room-9", None))
            .await
            .unwrap();
        assert_eq!(card.billing_mode, BillingMode::Fixed);
        assert_eq!(card.rate_per_minute, 500.0);
        assert_eq!(card.booking_id, "b-real");
    }

    #[tokio::test]
    async fn orphaned_session_uses_advisor_default() {
        let store = MemoryStore::new();
        store.set_advisor_rate("a-1", SessionKind::Audio, 32.0);

        let card = RateResolver::new(&store, &store)
            .resolve(&request("room-9", "room-9", None))
            .await
            .unwrap();
        assert_eq!(card.billing_mode, BillingMode::Metered);
        assert_eq!(card.rate_per_minute, 32.0);
        assert_eq!(card.booking_id, "room-9");
    }

    #[tokio::test]
    async fn exhausted_chain_is_an_error() {
        let store = MemoryStore::new();
        let err = RateResolver::new(&store, &store)
            .resolve(&request("b-nowhere", "room-9", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::Unresolved { .. }));
    }
}
