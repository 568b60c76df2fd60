use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Kind of live session; each kind has its own call-record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Audio,
    Video,
    Chat,
}

impl SessionKind {
    pub fn collection(&self) -> &'static str {
        match self {
            SessionKind::Audio => "audio_calls",
            SessionKind::Video => "video_calls",
            SessionKind::Chat => "chat_sessions",
        }
    }
}

/// Session lifecycle status. Transitions are monotonic; a record never moves
/// backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initiated,
    Ongoing,
    Ended,
}

impl SessionStatus {
    fn rank(self) -> u8 {
        match self {
            SessionStatus::Initiated => 0,
            SessionStatus::Ongoing => 1,
            SessionStatus::Ended => 2,
        }
    }

    /// Whether a write moving `self` to `next` respects the monotonic
    /// lifecycle. Re-writing the current status is allowed; both participants
    /// may race the same transition.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        next.rank() >= self.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    Metered,
    Fixed,
}

/// Why a session ended, as written into the session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    UserEnded,
    BalanceExhausted,
    RemoteEnded,
    TransportFailed,
}

/// The shared live document for one in-progress call or chat. Clients write
/// status, heartbeat and end metadata; the backend alone owns the
/// authoritative charge, which is deliberately not represented here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub kind: SessionKind,
    pub status: SessionStatus,
    #[serde(default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub rate_per_minute: Option<f64>,
    #[serde(default)]
    pub billing_mode: Option<BillingMode>,
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub advisor_id: Option<String>,
    #[serde(default)]
    pub last_heartbeat_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub end_reason: Option<EndReason>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
}

impl SessionRecord {
    /// Create a record from a merge write against a missing document.
    pub fn from_upsert(kind: SessionKind, patch: &SessionUpsert) -> Self {
        let mut record = Self {
            id: patch.session_id.clone(),
            kind,
            status: SessionStatus::Initiated,
            started_at: None,
            ended_at: None,
            rate_per_minute: None,
            billing_mode: None,
            booking_id: None,
            user_id: None,
            advisor_id: None,
            last_heartbeat_at: None,
            end_reason: None,
            completed_by: None,
            duration_seconds: None,
        };
        record.apply(patch);
        record
    }

    /// Merge a partial write into an existing document. Present fields
    /// overwrite (field-level last-write-wins); a status that would move the
    /// lifecycle backwards is dropped.
    pub fn apply(&mut self, patch: &SessionUpsert) {
        if let Some(status) = patch.status {
            if self.status.can_transition_to(status) {
                self.status = status;
            }
        }
        if patch.started_at.is_some() {
            self.started_at = patch.started_at;
        }
        if patch.ended_at.is_some() {
            self.ended_at = patch.ended_at;
        }
        if patch.rate_per_minute.is_some() {
            self.rate_per_minute = patch.rate_per_minute;
        }
        if patch.billing_mode.is_some() {
            self.billing_mode = patch.billing_mode;
        }
        if patch.booking_id.is_some() {
            self.booking_id = patch.booking_id.clone();
        }
        if patch.user_id.is_some() {
            self.user_id = patch.user_id.clone();
        }
        if patch.advisor_id.is_some() {
            self.advisor_id = patch.advisor_id.clone();
        }
        if patch.last_heartbeat_at.is_some() {
            self.last_heartbeat_at = patch.last_heartbeat_at;
        }
        if patch.end_reason.is_some() {
            self.end_reason = patch.end_reason;
        }
        if patch.completed_by.is_some() {
            self.completed_by = patch.completed_by.clone();
        }
        if patch.duration_seconds.is_some() {
            self.duration_seconds = patch.duration_seconds;
        }
    }
}

/// A merge-or-create write against a session record. Only present fields are
/// written, so the two participants and the backend can keep touching
/// disjoint fields without transactional locking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpsert {
    pub session_id: String,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub rate_per_minute: Option<f64>,
    #[serde(default)]
    pub billing_mode: Option<BillingMode>,
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub advisor_id: Option<String>,
    #[serde(default)]
    pub last_heartbeat_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub end_reason: Option<EndReason>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
}

impl SessionUpsert {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_monotonic() {
        assert!(SessionStatus::Initiated.can_transition_to(SessionStatus::Ongoing));
        assert!(SessionStatus::Ongoing.can_transition_to(SessionStatus::Ended));
        assert!(SessionStatus::Initiated.can_transition_to(SessionStatus::Ended));
        assert!(!SessionStatus::Ended.can_transition_to(SessionStatus::Ongoing));
        assert!(!SessionStatus::Ongoing.can_transition_to(SessionStatus::Initiated));
        // re-writing the same status is a tolerated race, not a reversal
        assert!(SessionStatus::Ended.can_transition_to(SessionStatus::Ended));
    }

    #[test]
    fn apply_drops_backward_status_writes() {
        let mut record = SessionRecord::from_upsert(
            SessionKind::Audio,
            &SessionUpsert {
                status: Some(SessionStatus::Ended),
                ..SessionUpsert::new("s-1")
            },
        );
        record.apply(&SessionUpsert {
            status: Some(SessionStatus::Ongoing),
            duration_seconds: Some(42),
            ..SessionUpsert::new("s-1")
        });
        assert_eq!(record.status, SessionStatus::Ended);
        // non-status fields from the same write still land
        assert_eq!(record.duration_seconds, Some(42));
    }

    #[test]
    fn apply_leaves_absent_fields_untouched() {
        let mut record = SessionRecord::from_upsert(
            SessionKind::Chat,
            &SessionUpsert {
                status: Some(SessionStatus::Ongoing),
                rate_per_minute: Some(12.5),
                booking_id: Some("b-9".into()),
                ..SessionUpsert::new("s-2")
            },
        );
        record.apply(&SessionUpsert {
            completed_by: Some("u-1".into()),
            ..SessionUpsert::new("s-2")
        });
        assert_eq!(record.rate_per_minute, Some(12.5));
        assert_eq!(record.booking_id.as_deref(), Some("b-9"));
        assert_eq!(record.completed_by.as_deref(), Some("u-1"));
    }

    #[test]
    fn sparse_document_deserializes() {
        let record: SessionRecord = serde_json::from_str(
            r#"{"id":"s-3","kind":"video","status":"initiated"}"#,
        )
        .unwrap();
        assert_eq!(record.kind, SessionKind::Video);
        assert_eq!(record.status, SessionStatus::Initiated);
        assert!(record.rate_per_minute.is_none());
        assert!(record.end_reason.is_none());
    }
}
