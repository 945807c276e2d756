use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use netmon::broadcast::{BroadcastSettings, Broadcaster};
use netmon::connections::ConnectionEnumerator;
use netmon::dashboard::{self, Keepalive};
use netmon::models::domain::{ConnectionRecord, InterfaceCounters, PacketSummary, Protocol};
use netmon::models::dto::{Envelope, HealthResponse, Snapshot, StatsResponse};
use netmon::state::MonitorState;
use netmon::stats::Aggregator;
use netmon::MonitorError;

struct DeniedEnumerator;

impl ConnectionEnumerator for DeniedEnumerator {
    fn list_connections(&self) -> Result<Vec<ConnectionRecord>, MonitorError> {
        Err(MonitorError::PermissionDenied("/proc/net/tcp".into()))
    }

    fn interface_counters(&self) -> Result<InterfaceCounters, MonitorError> {
        Err(MonitorError::Unsupported("interface counters"))
    }
}

struct TestServer {
    addr: SocketAddr,
    state: MonitorState,
    stop: Option<oneshot::Sender<()>>,
}

impl TestServer {
    fn start(state: MonitorState) -> Self {
        Self::start_with_keepalive(state, Keepalive::default())
    }

    fn start_with_keepalive(state: MonitorState, keepalive: Keepalive) -> Self {
        let listener = dashboard::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let app = dashboard::router_with_keepalive(state.clone(), keepalive);
        tokio::spawn(dashboard::serve_router(listener, app, async move {
            let _ = stopped.await;
        }));
        TestServer {
            addr,
            state,
            stop: Some(stop),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn wait_for_viewers(state: &MonitorState, expected: usize) {
    let mut waited = Duration::ZERO;
    while state.viewers.len() != expected && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
}

fn settings() -> BroadcastSettings {
    BroadcastSettings {
        interval: Duration::from_millis(50),
        max_connections: 30,
        recent_packets: 30,
    }
}

#[tokio::test]
async fn health_reports_healthy_without_capture() {
    let server = TestServer::start(MonitorState::new(Arc::new(Aggregator::new(50)), false));

    let health: HealthResponse = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.capture_available);
    assert_eq!(health.uptime.len(), 8);

    let stats: StatsResponse = reqwest::get(server.url("/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats.packet_count, 0);
    assert!(stats.protocol_stats.is_empty());
}

#[tokio::test]
async fn stats_reflect_recorded_packets() {
    let aggregator = Arc::new(Aggregator::new(50));
    for protocol in [Protocol::Tcp, Protocol::Tcp, Protocol::Arp] {
        aggregator.record(PacketSummary {
            protocol,
            ..PacketSummary::unknown(60)
        });
    }
    let server = TestServer::start(MonitorState::new(aggregator, true));

    let stats: StatsResponse = reqwest::get(server.url("/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats.packet_count, 3);
    assert_eq!(stats.protocol_stats.get("TCP"), Some(&2));
    assert_eq!(stats.protocol_stats.get("ARP"), Some(&1));
}

#[tokio::test]
async fn packet_count_stays_zero_while_capture_unavailable() {
    let server = TestServer::start(MonitorState::new(Arc::new(Aggregator::new(50)), false));
    let (mut socket, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();
    wait_for_viewers(&server.state, 1).await;

    let running = Arc::new(AtomicBool::new(true));
    let broadcaster = Broadcaster::new(server.state.clone(), Arc::new(DeniedEnumerator), settings());
    let handle = tokio::spawn(broadcaster.run(Arc::clone(&running)));

    let mut snapshots = 0;
    while snapshots < 3 {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("snapshot within timeout")
            .expect("stream open")
            .unwrap();
        if let Message::Text(text) = message {
            let envelope: Envelope<Snapshot> = serde_json::from_str(&text).unwrap();
            assert_eq!(envelope.data.packet_count, 0);
            assert!(envelope.data.recent_packets.is_empty());
            assert!(!envelope.data.capture_available);
            snapshots += 1;
        }
    }

    let stats: StatsResponse = reqwest::get(server.url("/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats.packet_count, 0);

    let health: HealthResponse = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.capture_available);

    running.store(false, Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop exits after flag flips")
        .unwrap();
}

#[tokio::test]
async fn query_endpoints_allow_cross_origin_requests() {
    let server = TestServer::start(MonitorState::new(Arc::new(Aggregator::new(50)), false));
    let client = reqwest::Client::new();

    for path in ["/health", "/stats"] {
        let response = client
            .get(server.url(path))
            .header(reqwest::header::ORIGIN, "http://localhost:3000")
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let allowed = response
            .headers()
            .get(reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .expect("cors header present");
        assert_eq!(allowed, "*");
    }
}

#[tokio::test]
async fn idle_viewer_is_pinged() {
    let keepalive = Keepalive {
        ping_interval: Duration::from_millis(50),
        timeout: Duration::from_secs(5),
    };
    let server = TestServer::start_with_keepalive(
        MonitorState::new(Arc::new(Aggregator::new(50)), false),
        keepalive,
    );
    let (mut socket, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("ping within timeout")
        .expect("stream open")
        .unwrap();
    assert!(matches!(message, Message::Ping(_)), "expected a ping, got {message:?}");
}

#[tokio::test]
async fn silent_viewer_is_dropped_after_keepalive_timeout() {
    let keepalive = Keepalive {
        ping_interval: Duration::from_millis(50),
        timeout: Duration::from_millis(200),
    };
    let server = TestServer::start_with_keepalive(
        MonitorState::new(Arc::new(Aggregator::new(50)), false),
        keepalive,
    );
    // never read, so pings go unanswered
    let (_socket, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();
    wait_for_viewers(&server.state, 1).await;
    assert_eq!(server.state.viewers.len(), 1);

    wait_for_viewers(&server.state, 0).await;
    assert!(server.state.viewers.is_empty());
}

#[tokio::test]
async fn index_serves_dashboard_page() {
    let server = TestServer::start(MonitorState::new(Arc::new(Aggregator::new(5)), false));
    let body = reqwest::get(server.url("/")).await.unwrap().text().await.unwrap();
    assert!(body.contains("/ws"));
}

#[tokio::test]
async fn viewer_receives_snapshots_over_websocket() {
    let server = TestServer::start(MonitorState::new(Arc::new(Aggregator::new(50)), false));
    let (mut socket, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();

    let mut waited = Duration::ZERO;
    while server.state.viewers.is_empty() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(server.state.viewers.len(), 1);

    let broadcaster = Broadcaster::new(server.state.clone(), Arc::new(DeniedEnumerator), settings());
    let delivery = broadcaster.tick().await.unwrap();
    assert_eq!(delivery.delivered, 1);

    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("snapshot within timeout")
        .expect("stream open")
        .unwrap();
    let text = match message {
        Message::Text(text) => text,
        other => panic!("expected a text frame, got {other:?}"),
    };
    let envelope: Envelope<Snapshot> = serde_json::from_str(&text).unwrap();
    assert_eq!(envelope.event, "network_update");
    assert_eq!(envelope.data.packet_count, 0);
    assert!(!envelope.data.capture_available);
    assert!(envelope.data.connections.is_empty());
    assert_eq!(envelope.data.network_stats, InterfaceCounters::default());
}

#[tokio::test]
async fn disconnected_viewer_leaves_registry() {
    let server = TestServer::start(MonitorState::new(Arc::new(Aggregator::new(50)), false));
    let (mut socket, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();

    let mut waited = Duration::ZERO;
    while server.state.viewers.is_empty() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    socket.close(None).await.unwrap();

    let mut waited = Duration::ZERO;
    while !server.state.viewers.is_empty() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert!(server.state.viewers.is_empty());
}

#[test]
fn binding_a_taken_port_is_a_startup_error() {
    let first = dashboard::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let taken = first.local_addr().unwrap();
    let err = dashboard::bind(taken).unwrap_err();
    assert_eq!(err.kind(), "Startup");
    assert!(err.is_fatal());
}
