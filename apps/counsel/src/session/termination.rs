use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::timeout;

use counsel_records::{
    EndReason, ReconciliationRecord, SessionKind, SessionStatus, SessionUpsert,
};

use crate::session::record_watch::wait_for_field;
use crate::store::{ReconciliationStore, SessionStore};
use crate::transport::SessionChannel;

/// What asked for the session to end. Every trigger funnels into the same
/// single-fire path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTrigger {
    /// Explicit user action.
    User,
    /// The estimator projected cost past the wallet balance.
    BalanceExhausted,
    /// A fixed slot ran its full cap.
    SlotElapsed,
    /// The other participant's ended write was observed.
    RemoteEnded,
    /// The embedding screen went away without an explicit end.
    Teardown,
    TransportFailed,
}

impl EndTrigger {
    pub fn reason(self) -> EndReason {
        match self {
            EndTrigger::User | EndTrigger::Teardown => EndReason::UserEnded,
            EndTrigger::BalanceExhausted => EndReason::BalanceExhausted,
            EndTrigger::SlotElapsed => EndReason::Completed,
            EndTrigger::RemoteEnded => EndReason::RemoteEnded,
            EndTrigger::TransportFailed => EndReason::TransportFailed,
        }
    }

    /// Remote-observed ends don't claim `completed_by`; the other side
    /// already wrote it.
    fn is_local(self) -> bool {
        !matches!(self, EndTrigger::RemoteEnded)
    }
}

/// How the post-session reconciliation wait concluded. A timeout is soft:
/// the charge continues settling in the background and the user may leave.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationOutcome {
    Settled(ReconciliationRecord),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminationOutcome {
    pub reason: EndReason,
    pub reconciliation: Option<ReconciliationOutcome>,
}

pub(crate) struct TerminationConfig {
    pub session_id: String,
    pub kind: SessionKind,
    pub booking_id: String,
    pub advisor_id: String,
    pub user_id: String,
    pub reconciliation_timeout: Duration,
}

/// Drives Active → Ending → (AwaitingReconciliation) → Done. The latch makes
/// the Ending transition single-fire no matter how many triggers race; the
/// losers observe `None`.
pub(crate) struct Termination {
    sessions: Arc<dyn SessionStore>,
    reconciliation: Arc<dyn ReconciliationStore>,
    channel: Arc<dyn SessionChannel>,
    config: TerminationConfig,
    latch: AtomicBool,
}

impl Termination {
    pub(crate) fn new(
        sessions: Arc<dyn SessionStore>,
        reconciliation: Arc<dyn ReconciliationStore>,
        channel: Arc<dyn SessionChannel>,
        config: TerminationConfig,
    ) -> Self {
        Self {
            sessions,
            reconciliation,
            channel,
            config,
            latch: AtomicBool::new(false),
        }
    }

    pub(crate) async fn run(
        &self,
        trigger: EndTrigger,
        elapsed: Duration,
    ) -> Option<TerminationOutcome> {
        if self.latch.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                session_id = %self.config.session_id,
                ?trigger,
                "termination already in flight; trigger ignored"
            );
            return None;
        }
        let reason = trigger.reason();
        tracing::info!(
            session_id = %self.config.session_id,
            ?trigger,
            elapsed_secs = elapsed.as_secs(),
            "ending session"
        );

        self.write_close(reason, trigger, elapsed).await;

        if let Err(err) = self.channel.leave().await {
            tracing::warn!(
                session_id = %self.config.session_id,
                error = %err,
                "failed to leave session channel"
            );
        }

        let reconciliation = if self.config.kind == SessionKind::Chat {
            Some(self.await_reconciliation().await)
        } else {
            None
        };

        Some(TerminationOutcome {
            reason,
            reconciliation,
        })
    }

    /// Merge-or-create the ended state. One retry on failure; after that the
    /// local teardown proceeds regardless and the backend's heartbeat
    /// watchdog becomes the billing fallback.
    async fn write_close(&self, reason: EndReason, trigger: EndTrigger, elapsed: Duration) {
        let close = SessionUpsert {
            status: Some(SessionStatus::Ended),
            ended_at: Some(OffsetDateTime::now_utc()),
            end_reason: Some(reason),
            duration_seconds: Some(elapsed.as_secs()),
            completed_by: trigger.is_local().then(|| self.config.user_id.clone()),
            booking_id: Some(self.config.booking_id.clone()),
            advisor_id: Some(self.config.advisor_id.clone()),
            user_id: Some(self.config.user_id.clone()),
            ..SessionUpsert::new(self.config.session_id.clone())
        };
        if let Err(err) = self.sessions.upsert(self.config.kind, close.clone()).await {
            tracing::warn!(
                session_id = %self.config.session_id,
                error = %err,
                "ended-status write failed; retrying once"
            );
            if let Err(err) = self.sessions.upsert(self.config.kind, close).await {
                tracing::warn!(
                    session_id = %self.config.session_id,
                    error = %err,
                    "ended-status retry failed; proceeding with local teardown"
                );
            }
        }
    }

    async fn await_reconciliation(&self) -> ReconciliationOutcome {
        let rx = match self.reconciliation.watch(&self.config.booking_id).await {
            Ok(rx) => rx,
            Err(err) => {
                tracing::warn!(
                    booking_id = %self.config.booking_id,
                    error = %err,
                    "reconciliation watch unavailable; charge settles in background"
                );
                return ReconciliationOutcome::TimedOut;
            }
        };
        let settled = timeout(
            self.config.reconciliation_timeout,
            wait_for_field(rx, |record: &ReconciliationRecord| Some(record.clone())),
        )
        .await;
        match settled {
            Ok(Some(record)) => {
                tracing::info!(
                    booking_id = %self.config.booking_id,
                    status = ?record.status,
                    "reconciliation settled"
                );
                ReconciliationOutcome::Settled(record)
            }
            Ok(None) => {
                tracing::warn!(
                    booking_id = %self.config.booking_id,
                    "reconciliation watch closed before settling"
                );
                ReconciliationOutcome::TimedOut
            }
            Err(_) => {
                tracing::info!(
                    booking_id = %self.config.booking_id,
                    "reconciliation still pending; charge settles in background"
                );
                ReconciliationOutcome::TimedOut
            }
        }
    }
}
