//! Snapshot fan-out: one scheduled task serializes the field once per tick
//! and delivers the same payload to every registered viewer.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use slotmap::{SlotMap, new_key_type};
use swirlfield_core::FieldState;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, trace};

use crate::SharedField;

new_key_type! {
    /// Handle identifying one registered viewer.
    pub struct ViewerKey;
}

/// Registry of connected viewers plus the shared broadcast cadence.
///
/// Broadcast work is done once per tick regardless of viewer count: the tick
/// takes one snapshot, serializes it once, and fans the payload out to every
/// registered channel. A failed send prunes exactly that viewer; connect,
/// disconnect, and pruning all go through the registry mutex, so mutation is
/// mutually exclusive with fan-out iteration.
pub struct Broadcaster {
    viewers: Mutex<SlotMap<ViewerKey, UnboundedSender<String>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            viewers: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Registers a new viewer, returning its handle and the channel its
    /// connection task drains.
    pub fn register(&self) -> (ViewerKey, UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let key = self.lock_viewers().insert(sender);
        (key, receiver)
    }

    /// Removes a viewer; a no-op if it was already pruned.
    pub fn unregister(&self, key: ViewerKey) {
        self.lock_viewers().remove(key);
    }

    pub fn viewer_count(&self) -> usize {
        self.lock_viewers().len()
    }

    /// Serializes `state` once and sends it to every registered viewer.
    ///
    /// Viewers whose channel is gone are removed; the remaining deliveries
    /// are unaffected. Returns the number of successful deliveries.
    pub fn broadcast(&self, state: &FieldState) -> Result<usize, serde_json::Error> {
        let payload = serde_json::to_string(state)?;
        let mut viewers = self.lock_viewers();
        let mut delivered = 0;
        viewers.retain(|key, sender| {
            if sender.send(payload.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                debug!(?key, "pruned disconnected viewer");
                false
            }
        });
        Ok(delivered)
    }

    /// Runs the broadcast loop on a fixed cadence until the process exits.
    ///
    /// The loop awaits each tick before starting the next, so broadcast ticks
    /// never overlap even when slow viewers delay a send.
    pub async fn run(self: Arc<Self>, field: SharedField, period: Duration) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.viewer_count() == 0 {
                continue;
            }
            let snapshot = field
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            match self.broadcast(&snapshot) {
                Ok(delivered) => trace!(delivered, "broadcast tick"),
                Err(err) => error!(%err, "failed to serialize field snapshot"),
            }
        }
    }

    fn lock_viewers(&self) -> std::sync::MutexGuard<'_, SlotMap<ViewerKey, UnboundedSender<String>>> {
        self.viewers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
