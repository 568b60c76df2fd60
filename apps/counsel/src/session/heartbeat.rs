use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::interval;

use counsel_records::SessionKind;

use crate::store::SessionStore;

/// Run the liveness writer until aborted. Beats immediately on start and
/// then every `every`, so a backend watchdog can flag sessions whose client
/// died without a clean end. Individual write failures are skipped; the
/// watchdog tolerates gaps shorter than its own timeout.
pub(crate) fn spawn(
    sessions: Arc<dyn SessionStore>,
    kind: SessionKind,
    session_id: String,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            match sessions
                .record_heartbeat(kind, &session_id, OffsetDateTime::now_utc())
                .await
            {
                Ok(()) => {
                    tracing::trace!(session_id = %session_id, "heartbeat recorded");
                }
                Err(err) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %err,
                        "heartbeat write failed; skipping beat"
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use counsel_records::{SessionStatus, SessionUpsert};

    #[tokio::test(start_paused = true)]
    async fn beats_on_start_and_every_interval() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert(
                SessionKind::Audio,
                SessionUpsert {
                    status: Some(SessionStatus::Ongoing),
                    ..SessionUpsert::new("s-1")
                },
            )
            .await
            .unwrap();

        let handle = spawn(
            store.clone(),
            SessionKind::Audio,
            "s-1".into(),
            Duration::from_secs(30),
        );
        tokio::time::sleep(Duration::from_secs(95)).await;
        handle.abort();

        // beats at 0s, 30s, 60s and 90s
        assert_eq!(store.heartbeat_count(SessionKind::Audio, "s-1"), 4);
        let record = store.session(SessionKind::Audio, "s-1").unwrap();
        assert!(record.last_heartbeat_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_record_is_skipped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let handle = spawn(
            store.clone(),
            SessionKind::Chat,
            "s-ghost".into(),
            Duration::from_secs(30),
        );
        tokio::time::sleep(Duration::from_secs(65)).await;

        assert!(!handle.is_finished());
        assert_eq!(store.heartbeat_count(SessionKind::Chat, "s-ghost"), 0);
        handle.abort();
    }
}
