use serde::{Deserialize, Serialize};

use crate::session::BillingMode;

/// Bookings live in two parallel collections depending on how the session
/// was arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingCollection {
    FixedSlot,
    OnDemand,
}

impl BookingCollection {
    pub fn name(&self) -> &'static str {
        match self {
            BookingCollection::FixedSlot => "slot_bookings",
            BookingCollection::OnDemand => "instant_bookings",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Completed,
    Cancelled,
    /// Backend statuses this client does not know about. Kept lenient so an
    /// unrecognized label never fails a lookup mid-session.
    #[serde(other)]
    Other,
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Other
    }
}

/// The urgency label on a booking drives metered-vs-fixed classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLabel {
    FixedSlot,
    OnDemand,
    #[serde(other)]
    Unknown,
}

impl Default for UrgencyLabel {
    fn default() -> Self {
        UrgencyLabel::Unknown
    }
}

impl UrgencyLabel {
    /// Fixed-slot labels bill as a fixed session; anything else falls back to
    /// metered billing.
    pub fn billing_mode(self) -> BillingMode {
        match self {
            UrgencyLabel::FixedSlot => BillingMode::Fixed,
            UrgencyLabel::OnDemand | UrgencyLabel::Unknown => BillingMode::Metered,
        }
    }
}

/// A reservation made before or at session start, carrying the negotiated
/// rate and the urgency classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub booking_id: String,
    #[serde(default)]
    pub urgency: UrgencyLabel,
    #[serde(default)]
    pub session_amount: Option<f64>,
    pub student_id: String,
    pub advisor_id: String,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default)]
    pub channel_reference: Option<String>,
}

impl BookingRecord {
    pub fn involves(&self, student_id: &str, advisor_id: &str) -> bool {
        self.student_id == student_id && self.advisor_id == advisor_id
    }
}
