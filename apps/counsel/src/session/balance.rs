use counsel_records::WalletSnapshot;

use crate::store::WalletStore;

/// Snapshot of the user's wallet taken once at session start.
///
/// The fetch is a single best-effort attempt. When it fails the guard is
/// lenient and admits any projected cost rather than blocking the session on
/// a transient wallet outage; the backend reconciliation stays authoritative
/// either way.
pub struct BalanceGuard {
    snapshot: Option<WalletSnapshot>,
}

impl BalanceGuard {
    pub async fn fetch(wallet: &dyn WalletStore, user_id: &str) -> Self {
        match wallet.snapshot(user_id).await {
            Ok(snapshot) => {
                tracing::debug!(user_id = %user_id, balance = snapshot.balance, "wallet snapshot taken");
                Self {
                    snapshot: Some(snapshot),
                }
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %err,
                    "wallet snapshot failed; session proceeds without balance enforcement"
                );
                Self { snapshot: None }
            }
        }
    }

    pub fn from_snapshot(snapshot: Option<WalletSnapshot>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> Option<&WalletSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn balance(&self) -> Option<f64> {
        self.snapshot.as_ref().map(|snapshot| snapshot.balance)
    }

    /// Whether the wallet still covers `cost`. A session must end the moment
    /// the projected cost reaches the balance, so equality counts as
    /// insufficient.
    pub fn is_sufficient(&self, cost: f64) -> bool {
        match &self.snapshot {
            Some(snapshot) => cost < snapshot.balance,
            None => true,
        }
    }
}
