//! Seams over the real-time document store. One trait per concern so the
//! resolver chain and the coordinator can be exercised against fakes; the
//! production bindings live with the embedding app, and [`memory::MemoryStore`]
//! is the in-process reference implementation.

pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tokio::sync::watch;

use counsel_records::{
    BookingCollection, BookingRecord, BookingStatus, ReconciliationRecord, SessionKind,
    SessionRecord, SessionUpsert, WalletSnapshot,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("conflicting write: {0}")]
    Conflict(String),
}

/// Decode a raw store document into its typed record at the boundary, so a
/// malformed document surfaces as a [`StoreError`] instead of reaching the
/// resolvers.
pub fn decode_document<T: DeserializeOwned>(document: serde_json::Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(document)?)
}

/// Read access to the two booking collections.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Fetch a booking by id. A miss is `Ok(None)`, not an error.
    async fn fetch(
        &self,
        collection: BookingCollection,
        booking_id: &str,
    ) -> Result<Option<BookingRecord>, StoreError>;

    /// Find the most relevant booking between a student and an advisor whose
    /// status is one of `statuses`.
    async fn find_for_participants(
        &self,
        collection: BookingCollection,
        student_id: &str,
        advisor_id: &str,
        statuses: &[BookingStatus],
    ) -> Result<Option<BookingRecord>, StoreError>;
}

/// Read/write access to the per-kind call-record collections.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn fetch(
        &self,
        kind: SessionKind,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Merge-or-create write. Present fields overwrite; the implementation
    /// must keep the status transition monotonic.
    async fn upsert(&self, kind: SessionKind, patch: SessionUpsert) -> Result<(), StoreError>;

    /// Liveness write; fails with [`StoreError::NotFound`] when the record
    /// does not exist yet.
    async fn record_heartbeat(
        &self,
        kind: SessionKind,
        session_id: &str,
        at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Live view of a session record. Subscribing before the record exists is
    /// allowed; the receiver starts at `None` and observes the first write.
    async fn watch(
        &self,
        kind: SessionKind,
        session_id: &str,
    ) -> Result<watch::Receiver<Option<SessionRecord>>, StoreError>;
}

/// Read-only snapshot of a user's wallet.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn snapshot(&self, user_id: &str) -> Result<WalletSnapshot, StoreError>;
}

/// Read-only view of the backend's reconciliation outcomes.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Watch the completion record for a booking. Starts at `None` until the
    /// backend settles the charge.
    async fn watch(
        &self,
        booking_id: &str,
    ) -> Result<watch::Receiver<Option<ReconciliationRecord>>, StoreError>;
}

/// Advisor profile lookups used as the last rung of rate resolution.
#[async_trait]
pub trait AdvisorDirectory: Send + Sync {
    /// The advisor's default per-minute rate for a session kind, if their
    /// profile defines one.
    async fn default_rate(
        &self,
        advisor_id: &str,
        kind: SessionKind,
    ) -> Result<Option<f64>, StoreError>;
}
