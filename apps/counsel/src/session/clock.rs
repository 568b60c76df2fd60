use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval};

use counsel_records::BillingMode;

use crate::session::SessionEvent;
use crate::session::balance::BalanceGuard;

/// Local estimator cadence. The estimate is advisory and never written to
/// the shared record, so each client ticks independently.
pub(crate) const CLOCK_TICK: Duration = Duration::from_secs(1);

/// What the UI renders each second: elapsed time, the locally projected cost
/// for metered sessions, and the countdown for fixed slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub billing_mode: BillingMode,
    pub rate_per_minute: f64,
    pub elapsed: Duration,
    pub projected_cost: f64,
    pub remaining: Option<Duration>,
}

impl CostEstimate {
    pub(crate) fn initial(mode: BillingMode, rate_per_minute: f64, cap: Duration) -> Self {
        Self::at(mode, rate_per_minute, cap, Duration::ZERO)
    }

    fn at(mode: BillingMode, rate_per_minute: f64, cap: Duration, elapsed: Duration) -> Self {
        match mode {
            BillingMode::Metered => Self {
                billing_mode: mode,
                rate_per_minute,
                elapsed,
                // whole seconds times the per-minute rate; exact at minute
                // fractions so the cutoff fires on the right tick
                projected_cost: rate_per_minute * elapsed.as_secs() as f64 / 60.0,
                remaining: None,
            },
            BillingMode::Fixed => Self {
                billing_mode: mode,
                rate_per_minute,
                elapsed,
                projected_cost: rate_per_minute,
                remaining: Some(cap.saturating_sub(elapsed)),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClockTrigger {
    InsufficientBalance,
    SlotElapsed,
}

pub(crate) struct ClockParams {
    pub mode: BillingMode,
    pub rate_per_minute: f64,
    pub fixed_slot_cap: Duration,
    pub guard: BalanceGuard,
}

/// Run the 1 Hz estimator until aborted. Publishes an estimate every tick
/// and fires its termination trigger at most once; it never writes session
/// record fields itself.
pub(crate) fn spawn(
    params: ClockParams,
    estimates: watch::Sender<CostEstimate>,
    events: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = interval(CLOCK_TICK);
        let mut fired = false;
        loop {
            ticker.tick().await;
            let estimate = CostEstimate::at(
                params.mode,
                params.rate_per_minute,
                params.fixed_slot_cap,
                started.elapsed(),
            );
            let trigger = if fired { None } else { evaluate(&params, &estimate) };
            estimates.send_replace(estimate);
            if let Some(trigger) = trigger {
                fired = true;
                if events.send(SessionEvent::ClockTriggered(trigger)).await.is_err() {
                    break;
                }
            }
        }
    })
}

fn evaluate(params: &ClockParams, estimate: &CostEstimate) -> Option<ClockTrigger> {
    match params.mode {
        BillingMode::Metered => (!params.guard.is_sufficient(estimate.projected_cost))
            .then_some(ClockTrigger::InsufficientBalance),
        BillingMode::Fixed => {
            (estimate.elapsed >= params.fixed_slot_cap).then_some(ClockTrigger::SlotElapsed)
        }
    }
}
