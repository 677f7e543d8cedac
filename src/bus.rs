//! Process-wide "user data changed" signal.
//!
//! Listeners carry no state of their own: on every event they re-read the
//! store. The engine fires once per logical update.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserDataChanged {
    pub revision: u64,
}

#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<UserDataChanged>,
    revision: Arc<AtomicU64>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserDataChanged> {
        self.sender.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn notify(&self) -> UserDataChanged {
        let event = UserDataChanged {
            revision: self.revision.fetch_add(1, Ordering::SeqCst) + 1,
        };
        // No subscribers is fine; views read the revision directly.
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!(revision = event.revision, listeners = delivered, "user data changed");
        event
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
