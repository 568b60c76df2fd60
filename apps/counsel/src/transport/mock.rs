use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{ChannelEvent, SessionChannel, TransportError};

/// Transport stand-in for tests: counts joins/leaves, remembers media
/// toggles, and lets the test feed room hints into the session.
#[derive(Default)]
pub struct MockChannel {
    joins: AtomicUsize,
    leaves: AtomicUsize,
    deny_permission: AtomicBool,
    muted: AtomicBool,
    camera_enabled: AtomicBool,
    events: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            camera_enabled: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Make the next join fail the way a denied microphone/camera prompt
    /// does.
    pub fn deny_permission(&self) {
        self.deny_permission.store(true, Ordering::SeqCst);
    }

    pub fn join_count(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn leave_count(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn is_camera_enabled(&self) -> bool {
        self.camera_enabled.load(Ordering::SeqCst)
    }

    /// Feed a room hint to the joined session, if any.
    pub async fn emit(&self, event: ChannelEvent) {
        let tx = self.events.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl SessionChannel for MockChannel {
    async fn join(&self, channel: &str) -> Result<mpsc::Receiver<ChannelEvent>, TransportError> {
        if self.deny_permission.swap(false, Ordering::SeqCst) {
            return Err(TransportError::PermissionDenied(format!(
                "media access denied joining {channel}"
            )));
        }
        self.joins.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(8);
        *self.events.lock() = Some(tx);
        Ok(rx)
    }

    async fn leave(&self) -> Result<(), TransportError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        *self.events.lock() = None;
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<(), TransportError> {
        self.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    async fn set_camera_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        self.camera_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}
