use serde::{Deserialize, Serialize};

/// Outcome of the backend's authoritative charge for a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Paid,
    Failed,
}

/// Written by the backend once it has computed and committed the charge for
/// a booking. Clients only ever read or watch these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub booking_id: String,
    pub status: ReconciliationStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Reconciliation documents are keyed by the booking they settle.
pub fn completion_key(booking_id: &str) -> String {
    format!("{booking_id}_completion")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_key_is_booking_scoped() {
        assert_eq!(completion_key("b-17"), "b-17_completion");
    }
}
