use std::sync::Arc;
use std::time::Instant;

use crate::broadcast::format_uptime;
use crate::stats::Aggregator;
use crate::viewers::ViewerRegistry;

/// State owned by the process and handed to the broadcaster and every
/// request handler. Built once in `main`.
#[derive(Clone)]
pub struct MonitorState {
    pub aggregator: Arc<Aggregator>,
    pub viewers: ViewerRegistry,
    pub started: Instant,
    /// Decided once at startup and never re-probed.
    pub capture_available: bool,
}

impl MonitorState {
    pub fn new(aggregator: Arc<Aggregator>, capture_available: bool) -> Self {
        MonitorState {
            aggregator,
            viewers: ViewerRegistry::new(),
            started: Instant::now(),
            capture_available,
        }
    }

    pub fn uptime(&self) -> String {
        format_uptime(self.started.elapsed().as_secs())
    }
}
