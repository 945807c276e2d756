//! Startup configuration and runtime constants.
//!
//! Values are read once from the command line (each with an environment
//! variable fallback, `.env` included) and never reloaded.

use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::MonitorError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Seconds between two snapshots pushed to viewers.
pub const DEFAULT_INTERVAL_SECS: u64 = 2;

/// Packets kept in the recent-history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Connections listed per snapshot; the untruncated count is reported separately.
pub const DEFAULT_MAX_CONNECTIONS: usize = 30;

/// Upper bound on recent packets carried by one snapshot.
pub const RECENT_PACKETS_PER_SNAPSHOT: usize = 30;

/// Upper bound on connections listed by one snapshot.
pub const MAX_CONNECTIONS_PER_SNAPSHOT: usize = 30;

/// Snapshots queued per viewer before that viewer starts skipping ticks.
pub const VIEWER_QUEUE_DEPTH: usize = 16;

/// Seconds between keepalive pings on a viewer socket.
pub const VIEWER_PING_INTERVAL_SECS: u64 = 25;

/// A viewer silent for this long is disconnected.
pub const VIEWER_PING_TIMEOUT_SECS: u64 = 60;

pub const CAPTURE_SNAPLEN: i32 = 2048;
pub const CAPTURE_TIMEOUT_MS: i32 = 500;

#[derive(Parser, Debug)]
#[command(
    name = "netmon",
    version,
    about = "Live host network monitor",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: Config,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "NETMON_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Follow the live feed of a running monitor in the terminal
    Watch {
        #[arg(long, default_value = "ws://127.0.0.1:5000/ws")]
        url: String,
        /// Stop after this many snapshots
        #[arg(long)]
        count: Option<usize>,
    },
    /// List devices available for packet capture
    Devices,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct Config {
    /// Address the dashboard listens on
    #[arg(long, env = "NETMON_HOST", default_value = DEFAULT_HOST)]
    pub host: IpAddr,

    #[arg(short, long, env = "NETMON_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds between snapshots
    #[arg(long = "interval", env = "NETMON_INTERVAL_SECS", default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval_secs: u64,

    /// Recent packets kept in memory
    #[arg(long, env = "NETMON_MAX_PACKETS", default_value_t = DEFAULT_HISTORY_CAPACITY)]
    pub max_packets: usize,

    /// Connections listed per snapshot, at most 30
    #[arg(long, env = "NETMON_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Capture device; the system default when omitted
    #[arg(short, long, env = "NETMON_INTERFACE")]
    pub interface: Option<String>,

    /// Run without packet capture
    #[arg(long)]
    pub no_capture: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_PORT,
            interval_secs: DEFAULT_INTERVAL_SECS,
            max_packets: DEFAULT_HISTORY_CAPACITY,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            interface: None,
            no_capture: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.interval_secs == 0 {
            return Err(MonitorError::Startup("broadcast interval must be at least 1 second".into()));
        }
        if self.max_packets == 0 {
            return Err(MonitorError::Startup("recent-history capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn recent_packets_per_snapshot(&self) -> usize {
        self.max_packets.min(RECENT_PACKETS_PER_SNAPSHOT)
    }

    pub fn connections_per_snapshot(&self) -> usize {
        self.max_connections.min(MAX_CONNECTIONS_PER_SNAPSHOT)
    }
}
