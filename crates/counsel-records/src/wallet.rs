use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// A point-in-time read of a user's wallet. The snapshot is taken once at
/// session start and only ever compared against locally projected cost, so
/// the `fetched_at` marker lets callers surface how stale the figure is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub user_id: String,
    pub balance: f64,
    pub fetched_at: OffsetDateTime,
}

impl WalletSnapshot {
    pub fn new(user_id: impl Into<String>, balance: f64) -> Self {
        Self {
            user_id: user_id.into(),
            balance,
            fetched_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn age(&self, now: OffsetDateTime) -> Duration {
        now - self.fetched_at
    }

    pub fn is_stale(&self, max_age: Duration, now: OffsetDateTime) -> bool {
        self.age(now) > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_tracks_fetch_time() {
        let snapshot = WalletSnapshot::new("u-1", 120.0);
        let later = snapshot.fetched_at + Duration::minutes(3);
        assert!(!snapshot.is_stale(Duration::minutes(5), later));
        assert!(snapshot.is_stale(Duration::minutes(2), later));
    }
}
