use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::config::VIEWER_QUEUE_DEPTH;

pub type ViewerId = u64;

/// Serialized snapshot shared by every viewer queue.
pub type Payload = Arc<str>;

/// Outcome of pushing one payload to every registered viewer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub skipped: usize,
    pub removed: usize,
}

/// Open set of viewer output channels. The transport registers a queue per
/// connected viewer and drains it; the broadcaster only ever `try_send`s.
#[derive(Clone, Default)]
pub struct ViewerRegistry {
    viewers: Arc<Mutex<HashMap<ViewerId, mpsc::Sender<Payload>>>>,
    next_id: Arc<AtomicU64>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ViewerId, mpsc::Sender<Payload>>> {
        self.viewers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self) -> (ViewerId, mpsc::Receiver<Payload>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(VIEWER_QUEUE_DEPTH);
        self.lock().insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, id: ViewerId) {
        self.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Never waits: a full queue skips that viewer for this payload, a
    /// closed queue drops the viewer from the set.
    pub fn broadcast(&self, payload: Payload) -> Delivery {
        let mut delivery = Delivery::default();
        self.lock().retain(|id, tx| match tx.try_send(Arc::clone(&payload)) {
            Ok(()) => {
                delivery.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(viewer = id, "viewer lagging, snapshot skipped");
                delivery.skipped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(viewer = id, "viewer channel closed, removing");
                delivery.removed += 1;
                false
            }
        });
        delivery
    }
}
