//! The live-session coordinator: resolves the billing terms once, starts the
//! estimator, liveness writer and record watches, and funnels every trigger
//! through one single-fire termination path.
//!
//! All session state lives inside one driver task; periodic work and store
//! subscriptions deliver events onto its queue, so observed ordering is
//! serialized without any locking of the client-local record mirror.

pub mod balance;
pub mod clock;
pub mod heartbeat;
pub mod rate;
pub mod record_watch;
pub mod recovery;
pub mod termination;

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use counsel_records::{
    EndReason, SessionKind, SessionRecord, SessionStatus, SessionUpsert, UrgencyLabel,
};

use crate::config::Timings;
use crate::store::{
    AdvisorDirectory, BookingStore, ReconciliationStore, SessionStore, WalletStore,
};
use crate::transport::{ChannelEvent, SessionChannel, TransportError};

pub use balance::BalanceGuard;
pub use clock::CostEstimate;
pub use rate::{RESOLUTION_CHAIN, RateCard, RateError, RateRequest, RateResolver, RateStep};
pub use recovery::{IdentifierRecovery, RecoveredBooking};
pub use termination::{EndTrigger, ReconciliationOutcome, TerminationOutcome};

use clock::{ClockParams, ClockTrigger};
use termination::{Termination, TerminationConfig};

/// Explicit handles and identity for one session, passed into every
/// component instead of living in ambient singletons. Fakes slot in per
/// handle, which is what makes the resolver chain and the coordinator
/// testable.
#[derive(Clone)]
pub struct SessionContext {
    pub bookings: Arc<dyn BookingStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub wallet: Arc<dyn WalletStore>,
    pub reconciliation: Arc<dyn ReconciliationStore>,
    pub advisors: Arc<dyn AdvisorDirectory>,
    pub channel: Arc<dyn SessionChannel>,
    pub user_id: String,
    pub timings: Timings,
}

/// What the calling screen hands over when opening a session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Generated when absent; whichever participant acts first creates the
    /// record.
    pub session_id: Option<String>,
    pub kind: SessionKind,
    pub booking_id: String,
    /// Transport room reference. Equality with `booking_id` marks the id as
    /// derived, triggering booking recovery.
    pub channel_hint: String,
    pub advisor_id: String,
    pub urgency_hint: Option<UrgencyLabel>,
}

#[derive(Debug)]
pub(crate) enum SessionEvent {
    ClockTriggered(ClockTrigger),
    RemoteEnded,
    EndRequested(EndTrigger),
    ChannelHint(ChannelEvent),
}

/// Terminal notification for the embedding screen.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEnded {
    pub reason: EndReason,
    pub reconciliation: Option<ReconciliationOutcome>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("rate resolution failed: {0}")]
    Rate(#[from] RateError),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

pub struct SessionCoordinator {
    ctx: SessionContext,
}

impl SessionCoordinator {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// Open a live session. Billing terms are frozen before this returns;
    /// the estimator and the liveness writer only ever start after them.
    pub async fn start(&self, params: SessionParams) -> Result<RunningSession, SessionError> {
        let ctx = &self.ctx;
        let session_id = params
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let request = RateRequest {
            booking_id: params.booking_id.clone(),
            channel_hint: params.channel_hint.clone(),
            urgency_hint: params.urgency_hint,
            advisor_id: params.advisor_id.clone(),
            user_id: ctx.user_id.clone(),
            kind: params.kind,
        };
        let resolver = RateResolver::new(ctx.bookings.as_ref(), ctx.advisors.as_ref());
        let card = resolver.resolve(&request).await?;

        // optimistic claim; losing the race to the other participant just
        // turns this into a merge
        let claim = SessionUpsert {
            status: Some(SessionStatus::Initiated),
            started_at: Some(OffsetDateTime::now_utc()),
            rate_per_minute: Some(card.rate_per_minute),
            billing_mode: Some(card.billing_mode),
            booking_id: Some(card.booking_id.clone()),
            user_id: Some(ctx.user_id.clone()),
            advisor_id: Some(card.advisor_id.clone()),
            ..SessionUpsert::new(session_id.clone())
        };
        if let Err(err) = ctx.sessions.upsert(params.kind, claim).await {
            tracing::warn!(
                session_id = %session_id,
                error = %err,
                "optimistic session claim failed; continuing"
            );
        }

        let hints = match ctx.channel.join(&params.channel_hint).await {
            Ok(rx) => rx,
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %err,
                    "transport join failed; closing session"
                );
                let close = SessionUpsert {
                    status: Some(SessionStatus::Ended),
                    ended_at: Some(OffsetDateTime::now_utc()),
                    end_reason: Some(EndReason::TransportFailed),
                    completed_by: Some(ctx.user_id.clone()),
                    ..SessionUpsert::new(session_id.clone())
                };
                if let Err(err) = ctx.sessions.upsert(params.kind, close).await {
                    tracing::warn!(session_id = %session_id, error = %err, "close write failed");
                }
                return Err(SessionError::Transport(err));
            }
        };

        let ongoing = SessionUpsert {
            status: Some(SessionStatus::Ongoing),
            ..SessionUpsert::new(session_id.clone())
        };
        if let Err(err) = ctx.sessions.upsert(params.kind, ongoing).await {
            tracing::warn!(session_id = %session_id, error = %err, "ongoing write failed");
        }

        // one best-effort snapshot; on failure the guard admits the session
        let guard = BalanceGuard::fetch(ctx.wallet.as_ref(), &ctx.user_id).await;

        let (events_tx, events_rx) = mpsc::channel(32);
        let (estimates_tx, estimates_rx) = watch::channel(CostEstimate::initial(
            card.billing_mode,
            card.rate_per_minute,
            ctx.timings.fixed_slot_cap,
        ));
        let (ended_tx, ended_rx) = watch::channel(None);
        let (teardown_tx, teardown_rx) = oneshot::channel();

        let clock = clock::spawn(
            ClockParams {
                mode: card.billing_mode,
                rate_per_minute: card.rate_per_minute,
                fixed_slot_cap: ctx.timings.fixed_slot_cap,
                guard,
            },
            estimates_tx,
            events_tx.clone(),
        );
        let heartbeat = heartbeat::spawn(
            ctx.sessions.clone(),
            params.kind,
            session_id.clone(),
            ctx.timings.heartbeat_interval,
        );
        let remote = match ctx.sessions.watch(params.kind, &session_id).await {
            Ok(rx) => Some(spawn_remote_ended(rx, events_tx.clone())),
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %err,
                    "status watch unavailable; a remote end will not be observed"
                );
                None
            }
        };
        let hint_pump = spawn_hint_pump(hints, events_tx.clone());

        let termination = Termination::new(
            ctx.sessions.clone(),
            ctx.reconciliation.clone(),
            ctx.channel.clone(),
            TerminationConfig {
                session_id: session_id.clone(),
                kind: params.kind,
                booking_id: card.booking_id.clone(),
                advisor_id: card.advisor_id.clone(),
                user_id: ctx.user_id.clone(),
                reconciliation_timeout: ctx.timings.reconciliation_timeout,
            },
        );

        let started = Instant::now();
        let driver = tokio::spawn(drive(
            events_rx,
            teardown_rx,
            SessionTasks {
                clock,
                heartbeat,
                remote,
                hint_pump,
            },
            termination,
            ended_tx,
            started,
        ));

        Ok(RunningSession {
            session_id,
            rate_card: card,
            estimates: estimates_rx,
            ended: ended_rx,
            events: events_tx,
            channel: ctx.channel.clone(),
            _teardown: teardown_tx,
            _driver: driver,
        })
    }
}

/// Handle held by the embedding screen while the session runs. Dropping it
/// counts as teardown: the driver still writes the ended state and leaves
/// the channel.
pub struct RunningSession {
    session_id: String,
    rate_card: RateCard,
    estimates: watch::Receiver<CostEstimate>,
    ended: watch::Receiver<Option<SessionEnded>>,
    events: mpsc::Sender<SessionEvent>,
    channel: Arc<dyn SessionChannel>,
    _teardown: oneshot::Sender<()>,
    _driver: JoinHandle<()>,
}

impl std::fmt::Debug for RunningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningSession")
            .field("session_id", &self.session_id)
            .field("rate_card", &self.rate_card)
            .finish_non_exhaustive()
    }
}

impl RunningSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The billing terms frozen at resolution; they never change for the
    /// lifetime of the session.
    pub fn rate_card(&self) -> &RateCard {
        &self.rate_card
    }

    pub fn estimates(&self) -> watch::Receiver<CostEstimate> {
        self.estimates.clone()
    }

    pub fn ended(&self) -> watch::Receiver<Option<SessionEnded>> {
        self.ended.clone()
    }

    /// Explicit user end. Idempotent: extra calls and races with other
    /// triggers collapse into the single-fire termination path.
    pub async fn end(&self) {
        if self
            .events
            .send(SessionEvent::EndRequested(EndTrigger::User))
            .await
            .is_err()
        {
            tracing::debug!(session_id = %self.session_id, "end requested after session already closed");
        }
    }

    /// Wait for the session to finish, however it ends.
    pub async fn wait_ended(&self) -> Option<SessionEnded> {
        let mut rx = self.ended.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), TransportError> {
        self.channel.set_muted(muted).await
    }

    pub async fn set_camera_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        self.channel.set_camera_enabled(enabled).await
    }
}

struct SessionTasks {
    clock: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    remote: Option<JoinHandle<()>>,
    hint_pump: JoinHandle<()>,
}

impl SessionTasks {
    fn abort_all(&self) {
        self.clock.abort();
        self.heartbeat.abort();
        if let Some(remote) = &self.remote {
            remote.abort();
        }
        self.hint_pump.abort();
    }
}

/// The session's single sequential execution context: every callback lands
/// here, and the first termination trigger wins.
async fn drive(
    mut events: mpsc::Receiver<SessionEvent>,
    mut teardown: oneshot::Receiver<()>,
    tasks: SessionTasks,
    termination: Termination,
    ended_tx: watch::Sender<Option<SessionEnded>>,
    started: Instant,
) {
    let trigger = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::ClockTriggered(ClockTrigger::InsufficientBalance)) => {
                    break EndTrigger::BalanceExhausted;
                }
                Some(SessionEvent::ClockTriggered(ClockTrigger::SlotElapsed)) => {
                    break EndTrigger::SlotElapsed;
                }
                Some(SessionEvent::RemoteEnded) => break EndTrigger::RemoteEnded,
                Some(SessionEvent::EndRequested(trigger)) => break trigger,
                Some(SessionEvent::ChannelHint(event)) => {
                    // informative only; the record watch carries the
                    // authoritative ended signal
                    tracing::debug!(?event, "room hint");
                }
                None => break EndTrigger::Teardown,
            },
            _ = &mut teardown => break EndTrigger::Teardown,
        }
    };
    tasks.abort_all();
    if let Some(outcome) = termination.run(trigger, started.elapsed()).await {
        ended_tx.send_replace(Some(SessionEnded {
            reason: outcome.reason,
            reconciliation: outcome.reconciliation,
        }));
    }
}

fn spawn_remote_ended(
    rx: watch::Receiver<Option<SessionRecord>>,
    events: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let observed = record_watch::wait_for_field(rx, |record: &SessionRecord| {
            (record.status == SessionStatus::Ended).then_some(())
        })
        .await;
        if observed.is_some() {
            let _ = events.send(SessionEvent::RemoteEnded).await;
        }
    })
}

fn spawn_hint_pump(
    mut hints: mpsc::Receiver<ChannelEvent>,
    events: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = hints.recv().await {
            if events.send(SessionEvent::ChannelHint(event)).await.is_err() {
                break;
            }
        }
    })
}
