// Terminal viewer for the push channel.

use futures::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

use crate::error::MonitorError;
use crate::models::dto::{Envelope, Snapshot, NETWORK_UPDATE_EVENT};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human readable size with two decimals, 1024 based.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}

/// One status line per snapshot.
pub fn render(snapshot: &Snapshot) -> String {
    let protocols = snapshot
        .protocol_stats
        .iter()
        .map(|(name, count)| format!("{name}={count}"))
        .collect::<Vec<_>>()
        .join(" ");
    let capture = if snapshot.capture_available { "on" } else { "off" };
    format!(
        "[{}] packets={} ({}) conns={} sent={} recv={} capture={}",
        snapshot.uptime,
        snapshot.packet_count,
        if protocols.is_empty() { "-" } else { protocols.as_str() },
        snapshot.active_connections_count,
        format_bytes(snapshot.network_stats.bytes_sent),
        format_bytes(snapshot.network_stats.bytes_received),
        capture,
    )
}

/// Prints snapshots from `url` until the server closes or `limit` is reached.
pub async fn watch(url: &str, limit: Option<usize>) -> Result<(), MonitorError> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| MonitorError::Transport(format!("cannot connect to {url}: {e}")))?;
    info!(url, "connected");

    let (_sink, mut read) = stream.split();
    let mut received = 0usize;
    while let Some(message) = read.next().await {
        let message = message.map_err(|e| MonitorError::Transport(e.to_string()))?;
        match message {
            Message::Text(text) => {
                let envelope: Envelope<Snapshot> = serde_json::from_str(&text)?;
                if envelope.event != NETWORK_UPDATE_EVENT {
                    debug!(event = %envelope.event, "ignoring event");
                    continue;
                }
                println!("{}", render(&envelope.data));
                received += 1;
                if limit.is_some_and(|limit| received >= limit) {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    info!(snapshots = received, "feed closed");
    Ok(())
}
