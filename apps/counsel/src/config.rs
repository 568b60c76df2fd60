use std::env;
use std::time::Duration;

/// Timing knobs for a live session. Defaults match production behavior; the
/// env overrides exist for staging and soak runs.
#[derive(Debug, Clone)]
pub struct Timings {
    /// Cadence of the liveness write into the session record.
    pub heartbeat_interval: Duration,
    /// Hard cap on a fixed-slot session.
    pub fixed_slot_cap: Duration,
    /// How long a chat session waits for the backend's reconciliation record
    /// before exiting anyway.
    pub reconciliation_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            fixed_slot_cap: Duration::from_secs(30 * 60),
            reconciliation_timeout: Duration::from_secs(8),
        }
    }
}

impl Timings {
    /// Load timings from environment variables, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            heartbeat_interval: env_secs("COUNSEL_HEARTBEAT_SECS")
                .unwrap_or(defaults.heartbeat_interval),
            fixed_slot_cap: env_secs("COUNSEL_FIXED_SLOT_SECS").unwrap_or(defaults.fixed_slot_cap),
            reconciliation_timeout: env_secs("COUNSEL_RECONCILE_TIMEOUT_SECS")
                .unwrap_or(defaults.reconciliation_timeout),
        }
    }
}

fn env_secs(var: &str) -> Option<Duration> {
    env::var(var)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
