//! Typed records shared between the Counsel client core and its document
//! stores. These mirror the documents the backend writes, with explicit
//! optional fields so that partially-written documents deserialize cleanly
//! instead of failing mid-session.

pub mod booking;
pub mod reconciliation;
pub mod session;
pub mod wallet;

pub use booking::{BookingCollection, BookingRecord, BookingStatus, UrgencyLabel};
pub use reconciliation::{completion_key, ReconciliationRecord, ReconciliationStatus};
pub use session::{
    BillingMode, EndReason, SessionKind, SessionRecord, SessionStatus, SessionUpsert,
};
pub use wallet::WalletSnapshot;
