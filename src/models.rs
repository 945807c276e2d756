pub mod domain {
    use chrono::{DateTime, Local};
    use serde::{Deserialize, Serialize};
    use std::net::SocketAddr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum Protocol {
        Tcp,
        Udp,
        Icmp,
        Arp,
        Unknown,
    }

    impl Protocol {
        pub fn as_str(&self) -> &'static str {
            match self {
                Protocol::Tcp => "TCP",
                Protocol::Udp => "UDP",
                Protocol::Icmp => "ICMP",
                Protocol::Arp => "ARP",
                Protocol::Unknown => "Unknown",
            }
        }
    }

    /// One observed packet. Never mutated after the capture thread builds it.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PacketSummary {
        pub observed_at: DateTime<Local>,
        pub protocol: Protocol,
        pub source: Option<String>,
        pub destination: Option<String>,
        pub length: u32,
        pub info: String,
    }

    impl PacketSummary {
        /// A packet that could not be classified: counted, but without addresses.
        pub fn unknown(length: u32) -> Self {
            PacketSummary {
                observed_at: Local::now(),
                protocol: Protocol::Unknown,
                source: None,
                destination: None,
                length,
                info: String::new(),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ConnectionRecord {
        pub local: SocketAddr,
        pub remote: Option<SocketAddr>,
        pub status: String,
        pub pid: Option<u32>,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct InterfaceCounters {
        pub bytes_sent: u64,
        #[serde(rename = "bytes_recv")]
        pub bytes_received: u64,
        pub packets_sent: u64,
        #[serde(rename = "packets_recv")]
        pub packets_received: u64,
    }
}

pub mod dto {
    use super::domain::{ConnectionRecord, InterfaceCounters, PacketSummary};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    /// Placeholder rendered for absent addresses and unknown owners.
    pub const NOT_AVAILABLE: &str = "N/A";

    pub const NETWORK_UPDATE_EVENT: &str = "network_update";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PacketView {
        pub time: String,
        pub protocol: String,
        pub src: String,
        pub dst: String,
        pub length: u32,
        pub info: String,
    }

    impl From<&PacketSummary> for PacketView {
        fn from(packet: &PacketSummary) -> Self {
            PacketView {
                time: packet.observed_at.format("%H:%M:%S%.3f").to_string(),
                protocol: packet.protocol.as_str().to_string(),
                src: packet.source.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                dst: packet.destination.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                length: packet.length,
                info: packet.info.clone(),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ConnectionView {
        pub local: String,
        pub remote: String,
        pub status: String,
        pub pid: String,
    }

    impl From<&ConnectionRecord> for ConnectionView {
        fn from(record: &ConnectionRecord) -> Self {
            ConnectionView {
                local: record.local.to_string(),
                remote: record
                    .remote
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                status: record.status.clone(),
                pid: record
                    .pid
                    .map(|pid| pid.to_string())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            }
        }
    }

    /// Payload pushed to every viewer once per tick.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Snapshot {
        pub packet_count: u64,
        pub protocol_stats: BTreeMap<String, u64>,
        pub recent_packets: Vec<PacketView>,
        pub connections: Vec<ConnectionView>,
        pub network_stats: InterfaceCounters,
        pub uptime: String,
        pub capture_available: bool,
        pub active_connections_count: usize,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct HealthResponse {
        pub status: String,
        pub uptime: String,
        pub capture_available: bool,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct StatsResponse {
        pub packet_count: u64,
        pub protocol_stats: BTreeMap<String, u64>,
        pub uptime: String,
    }

    /// Named event wrapper for messages on the push channel.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Envelope<T> {
        pub event: String,
        pub data: T,
    }

    impl<T> Envelope<T> {
        pub fn network_update(data: T) -> Self {
            Envelope {
                event: NETWORK_UPDATE_EVENT.to_string(),
                data,
            }
        }
    }
}
