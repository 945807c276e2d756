use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::MAX_CONNECTIONS_PER_SNAPSHOT;
use crate::connections::ConnectionEnumerator;
use crate::error::MonitorError;
use crate::models::domain::InterfaceCounters;
use crate::models::dto::{ConnectionView, Envelope, PacketView, Snapshot};
use crate::state::MonitorState;
use crate::viewers::Delivery;

/// `HH:MM:SS` since start; hours keep growing past 99.
pub fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// `max_connections` is clamped to [`MAX_CONNECTIONS_PER_SNAPSHOT`].
#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    pub interval: Duration,
    pub max_connections: usize,
    pub recent_packets: usize,
}

/// Periodically combines aggregator counts with a fresh enumeration and
/// pushes the result to every viewer.
pub struct Broadcaster {
    state: MonitorState,
    enumerator: Arc<dyn ConnectionEnumerator>,
    settings: BroadcastSettings,
}

impl Broadcaster {
    pub fn new(
        state: MonitorState,
        enumerator: Arc<dyn ConnectionEnumerator>,
        mut settings: BroadcastSettings,
    ) -> Self {
        settings.max_connections = settings.max_connections.min(MAX_CONNECTIONS_PER_SNAPSHOT);
        Broadcaster { state, enumerator, settings }
    }

    /// Runs enumerator calls off the async workers; they may walk /proc.
    async fn query<T, F>(&self, call: F) -> Result<T, MonitorError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ConnectionEnumerator) -> Result<T, MonitorError> + Send + 'static,
    {
        let enumerator = Arc::clone(&self.enumerator);
        match tokio::task::spawn_blocking(move || call(enumerator.as_ref())).await {
            Ok(result) => result,
            Err(e) => Err(MonitorError::Query(format!("enumerator task failed: {e}"))),
        }
    }

    /// Assembles one snapshot. Enumerator failures degrade the affected
    /// fields to empty values.
    pub async fn build_snapshot(&self) -> Snapshot {
        let counts = self.state.aggregator.snapshot_counts(self.settings.recent_packets);

        let mut connections = self
            .query(|enumerator| enumerator.list_connections())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, kind = e.kind(), "connection enumeration failed");
                Vec::new()
            });
        let active_connections_count = connections.len();
        connections.truncate(self.settings.max_connections);

        let network_stats = self
            .query(|enumerator| enumerator.interface_counters())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, kind = e.kind(), "interface counters unavailable");
                InterfaceCounters::default()
            });

        Snapshot {
            packet_count: counts.total,
            protocol_stats: counts.protocol_names(),
            recent_packets: counts.recent.iter().map(PacketView::from).collect(),
            connections: connections.iter().map(ConnectionView::from).collect(),
            network_stats,
            uptime: self.state.uptime(),
            capture_available: self.state.capture_available,
            active_connections_count,
        }
    }

    /// One tick: snapshot, serialize once, push to every viewer.
    pub async fn tick(&self) -> Result<Delivery, MonitorError> {
        let snapshot = self.build_snapshot().await;
        let payload = serde_json::to_string(&Envelope::network_update(snapshot))?;
        Ok(self.state.viewers.broadcast(Arc::from(payload)))
    }

    /// Ticks until `running` is cleared. The flag is checked before every
    /// tick; a failed tick is logged and the loop waits for the next boundary.
    pub async fn run(self, running: Arc<AtomicBool>) {
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            max_connections = self.settings.max_connections,
            "broadcast loop started"
        );
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        while running.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(delivery) => debug!(
                    delivered = delivery.delivered,
                    skipped = delivery.skipped,
                    removed = delivery.removed,
                    "snapshot pushed"
                ),
                Err(e) => error!(error = %e, kind = e.kind(), "broadcast tick failed"),
            }
            ticker.tick().await;
        }
        info!("broadcast loop stopped");
    }
}
