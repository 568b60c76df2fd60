//! In-memory implementation of the store seams. Serves as the reference
//! semantics for merge-or-create session writes and record watches, and as
//! the backing store for every test in this crate. The failure-injection
//! hooks exist for tests exercising degraded-store paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::watch;

use counsel_records::{
    BookingCollection, BookingRecord, BookingStatus, ReconciliationRecord, SessionKind,
    SessionRecord, SessionStatus, SessionUpsert, WalletSnapshot, completion_key,
};

use super::{
    AdvisorDirectory, BookingStore, ReconciliationStore, SessionStore, StoreError, WalletStore,
};

type SessionKey = (SessionKind, String);

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    bookings: Mutex<HashMap<(BookingCollection, String), BookingRecord>>,
    sessions: Mutex<HashMap<SessionKey, SessionRecord>>,
    session_watches: Mutex<HashMap<SessionKey, watch::Sender<Option<SessionRecord>>>>,
    wallets: Mutex<HashMap<String, f64>>,
    reconciliations: Mutex<HashMap<String, ReconciliationRecord>>,
    reconciliation_watches: Mutex<HashMap<String, watch::Sender<Option<ReconciliationRecord>>>>,
    advisor_rates: Mutex<HashMap<(String, SessionKind), f64>>,
    booking_lookups: Mutex<HashMap<BookingCollection, usize>>,
    heartbeats: Mutex<HashMap<SessionKey, usize>>,
    ended_writes: Mutex<HashMap<SessionKey, usize>>,
    wallet_failures: AtomicUsize,
    session_write_failures: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_booking(&self, collection: BookingCollection, record: BookingRecord) {
        self.inner
            .bookings
            .lock()
            .insert((collection, record.booking_id.clone()), record);
    }

    pub fn set_wallet_balance(&self, user_id: impl Into<String>, balance: f64) {
        self.inner.wallets.lock().insert(user_id.into(), balance);
    }

    pub fn set_advisor_rate(&self, advisor_id: impl Into<String>, kind: SessionKind, rate: f64) {
        self.inner
            .advisor_rates
            .lock()
            .insert((advisor_id.into(), kind), rate);
    }

    /// Write the backend's reconciliation outcome for a booking, waking any
    /// watchers.
    pub fn settle_reconciliation(&self, record: ReconciliationRecord) {
        let key = completion_key(&record.booking_id);
        self.inner
            .reconciliations
            .lock()
            .insert(key.clone(), record.clone());
        if let Some(tx) = self.inner.reconciliation_watches.lock().get(&key) {
            tx.send_replace(Some(record));
        }
    }

    pub fn session(&self, kind: SessionKind, session_id: &str) -> Option<SessionRecord> {
        self.inner
            .sessions
            .lock()
            .get(&(kind, session_id.to_string()))
            .cloned()
    }

    /// How many times either booking collection was consulted, lookups and
    /// participant scans combined.
    pub fn booking_lookup_count(&self, collection: BookingCollection) -> usize {
        self.inner
            .booking_lookups
            .lock()
            .get(&collection)
            .copied()
            .unwrap_or(0)
    }

    pub fn heartbeat_count(&self, kind: SessionKind, session_id: &str) -> usize {
        self.inner
            .heartbeats
            .lock()
            .get(&(kind, session_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Count of merge writes that carried `status = ended`.
    pub fn ended_write_count(&self, kind: SessionKind, session_id: &str) -> usize {
        self.inner
            .ended_writes
            .lock()
            .get(&(kind, session_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_next_wallet_fetches(&self, count: usize) {
        self.inner.wallet_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_session_writes(&self, count: usize) {
        self.inner
            .session_write_failures
            .store(count, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                (remaining > 0).then(|| remaining - 1)
            })
            .is_ok()
    }

    fn bump_lookup(&self, collection: BookingCollection) {
        *self
            .inner
            .booking_lookups
            .lock()
            .entry(collection)
            .or_default() += 1;
    }

    fn notify_session(&self, key: &SessionKey, record: SessionRecord) {
        if let Some(tx) = self.inner.session_watches.lock().get(key) {
            tx.send_replace(Some(record));
        }
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn fetch(
        &self,
        collection: BookingCollection,
        booking_id: &str,
    ) -> Result<Option<BookingRecord>, StoreError> {
        self.bump_lookup(collection);
        Ok(self
            .inner
            .bookings
            .lock()
            .get(&(collection, booking_id.to_string()))
            .cloned())
    }

    async fn find_for_participants(
        &self,
        collection: BookingCollection,
        student_id: &str,
        advisor_id: &str,
        statuses: &[BookingStatus],
    ) -> Result<Option<BookingRecord>, StoreError> {
        self.bump_lookup(collection);
        let bookings = self.inner.bookings.lock();
        let mut matches: Vec<&BookingRecord> = bookings
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, record)| record)
            .filter(|record| record.involves(student_id, advisor_id))
            .filter(|record| statuses.contains(&record.status))
            .collect();
        // deterministic pick when several bookings qualify
        matches.sort_by(|a, b| a.booking_id.cmp(&b.booking_id));
        Ok(matches.first().map(|record| (*record).clone()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn fetch(
        &self,
        kind: SessionKind,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.session(kind, session_id))
    }

    async fn upsert(&self, kind: SessionKind, patch: SessionUpsert) -> Result<(), StoreError> {
        if Self::take_failure(&self.inner.session_write_failures) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        let key = (kind, patch.session_id.clone());
        let record = {
            let mut sessions = self.inner.sessions.lock();
            match sessions.get_mut(&key) {
                Some(existing) => {
                    existing.apply(&patch);
                    existing.clone()
                }
                None => {
                    let created = SessionRecord::from_upsert(kind, &patch);
                    sessions.insert(key.clone(), created.clone());
                    created
                }
            }
        };
        if patch.status == Some(SessionStatus::Ended) {
            *self.inner.ended_writes.lock().entry(key.clone()).or_default() += 1;
        }
        self.notify_session(&key, record);
        Ok(())
    }

    async fn record_heartbeat(
        &self,
        kind: SessionKind,
        session_id: &str,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let key = (kind, session_id.to_string());
        let record = {
            let mut sessions = self.inner.sessions.lock();
            let record = sessions.get_mut(&key).ok_or(StoreError::NotFound)?;
            record.last_heartbeat_at = Some(at);
            record.clone()
        };
        *self.inner.heartbeats.lock().entry(key.clone()).or_default() += 1;
        self.notify_session(&key, record);
        Ok(())
    }

    async fn watch(
        &self,
        kind: SessionKind,
        session_id: &str,
    ) -> Result<watch::Receiver<Option<SessionRecord>>, StoreError> {
        let key = (kind, session_id.to_string());
        let current = self.inner.sessions.lock().get(&key).cloned();
        let mut watches = self.inner.session_watches.lock();
        let tx = watches
            .entry(key)
            .or_insert_with(|| watch::channel(current).0);
        Ok(tx.subscribe())
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn snapshot(&self, user_id: &str) -> Result<WalletSnapshot, StoreError> {
        if Self::take_failure(&self.inner.wallet_failures) {
            return Err(StoreError::Unavailable("injected wallet failure".into()));
        }
        self.inner
            .wallets
            .lock()
            .get(user_id)
            .map(|balance| WalletSnapshot::new(user_id, *balance))
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ReconciliationStore for MemoryStore {
    async fn watch(
        &self,
        booking_id: &str,
    ) -> Result<watch::Receiver<Option<ReconciliationRecord>>, StoreError> {
        let key = completion_key(booking_id);
        let current = self.inner.reconciliations.lock().get(&key).cloned();
        let mut watches = self.inner.reconciliation_watches.lock();
        let tx = watches
            .entry(key)
            .or_insert_with(|| watch::channel(current).0);
        Ok(tx.subscribe())
    }
}

#[async_trait]
impl AdvisorDirectory for MemoryStore {
    async fn default_rate(
        &self,
        advisor_id: &str,
        kind: SessionKind,
    ) -> Result<Option<f64>, StoreError> {
        Ok(self
            .inner
            .advisor_rates
            .lock()
            .get(&(advisor_id.to_string(), kind))
            .copied())
    }
}
