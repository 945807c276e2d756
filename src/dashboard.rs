//! Viewer Transport: query endpoints and the WebSocket push channel.
//!
//! `GET /health` and `GET /stats` answer from the aggregator directly.
//! `GET /ws` registers the connection with the viewer registry and forwards
//! every queued snapshot until either side closes. The server pings idle
//! viewers and drops those that stay silent past the keepalive timeout.
//! Every route answers cross-origin requests.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Extension, Json, Router};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::{VIEWER_PING_INTERVAL_SECS, VIEWER_PING_TIMEOUT_SECS};
use crate::error::MonitorError;
use crate::models::dto::{HealthResponse, StatsResponse};
use crate::state::MonitorState;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Push channel liveness settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub ping_interval: Duration,
    pub timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Keepalive {
            ping_interval: Duration::from_secs(VIEWER_PING_INTERVAL_SECS),
            timeout: Duration::from_secs(VIEWER_PING_TIMEOUT_SECS),
        }
    }
}

pub fn router(state: MonitorState) -> Router {
    router_with_keepalive(state, Keepalive::default())
}

pub fn router_with_keepalive(state: MonitorState, keepalive: Keepalive) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ws", get(ws_handler))
        .layer(Extension(keepalive))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the listening socket. Failure here is fatal for the process.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, MonitorError> {
    let listener = TcpListener::bind(addr)
        .map_err(|e| MonitorError::Startup(format!("cannot bind {addr}: {e}")))?;
    listener
        .set_nonblocking(true)
        .map_err(|e| MonitorError::Startup(format!("cannot configure listener on {addr}: {e}")))?;
    Ok(listener)
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: MonitorState, shutdown: F) -> Result<(), MonitorError>
where
    F: Future<Output = ()> + Send + 'static,
{
    serve_router(listener, router(state), shutdown).await
}

pub async fn serve_router<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), MonitorError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    let server = axum::Server::from_tcp(listener)
        .map_err(|e| MonitorError::Startup(format!("cannot serve on {local_addr}: {e}")))?;

    info!(addr = %local_addr, "dashboard listening");
    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| MonitorError::Transport(e.to_string()))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<MonitorState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        uptime: state.uptime(),
        capture_available: state.capture_available,
    })
}

async fn stats(State(state): State<MonitorState>) -> Json<StatsResponse> {
    let (packet_count, counters) = state.aggregator.totals();
    Json(StatsResponse {
        packet_count,
        protocol_stats: counters
            .into_iter()
            .map(|(protocol, count)| (protocol.as_str().to_string(), count))
            .collect(),
        uptime: state.uptime(),
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<MonitorState>,
    Extension(keepalive): Extension<Keepalive>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| viewer_session(socket, state, keepalive))
}

async fn viewer_session(socket: WebSocket, state: MonitorState, keepalive: Keepalive) {
    let (id, mut queue) = state.viewers.register();
    info!(viewer = id, viewers = state.viewers.len(), "client connected");

    let (mut sink, mut stream) = socket.split();
    let mut pings = interval_at(Instant::now() + keepalive.ping_interval, keepalive.ping_interval);
    pings.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_heard = Instant::now();
    loop {
        tokio::select! {
            _ = pings.tick() => {
                if last_heard.elapsed() >= keepalive.timeout {
                    warn!(viewer = id, "viewer stopped answering pings");
                    break;
                }
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    debug!(viewer = id, error = %e, "ping failed");
                    break;
                }
            }
            outbound = queue.recv() => {
                let Some(payload) = outbound else { break };
                if let Err(e) = sink.send(Message::Text(payload.to_string())).await {
                    warn!(viewer = id, error = %e, "snapshot delivery failed");
                    break;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(viewer = id, error = %e, "viewer socket error");
                    break;
                }
                Some(Ok(_)) => last_heard = Instant::now(),
            },
        }
    }

    state.viewers.unregister(id);
    info!(viewer = id, "client disconnected");
}
