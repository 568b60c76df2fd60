//! Seam over the real-time media SDK. The core only ever joins and leaves a
//! room and toggles local media; room events are informative hints for the
//! UI. The authoritative end-of-session signal is the session record watch,
//! never the transport.

pub mod mock;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("media permission denied: {0}")]
    PermissionDenied(String),
    #[error("engine initialization failed: {0}")]
    EngineInit(String),
    #[error("session channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Room-level hints surfaced by the media SDK.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    MembershipChanged { occupants: u32 },
    RoomState { detail: serde_json::Value },
}

#[async_trait]
pub trait SessionChannel: Send + Sync {
    /// Join the named room. Returns the stream of room hints for this
    /// session. Permission and engine-init failures are unrecoverable and
    /// end the session flow before it starts.
    async fn join(&self, channel: &str) -> Result<mpsc::Receiver<ChannelEvent>, TransportError>;

    /// Leave the room. Called exactly once per session by the termination
    /// path.
    async fn leave(&self) -> Result<(), TransportError>;

    async fn set_muted(&self, muted: bool) -> Result<(), TransportError>;

    async fn set_camera_enabled(&self, enabled: bool) -> Result<(), TransportError>;
}
