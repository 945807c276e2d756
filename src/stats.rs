use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::models::domain::{PacketSummary, Protocol};
use crate::ring::RingBuffer;

struct NetworkStats {
    total_packets: u64,
    protocol_counts: BTreeMap<Protocol, u64>,
    recent: RingBuffer<PacketSummary>,
}

impl NetworkStats {
    fn new(capacity: usize) -> Self {
        NetworkStats {
            total_packets: 0,
            protocol_counts: BTreeMap::new(),
            recent: RingBuffer::new(capacity),
        }
    }

    fn update(&mut self, packet: PacketSummary) {
        self.total_packets += 1;
        *self.protocol_counts.entry(packet.protocol).or_insert(0) += 1;
        self.recent.push(packet);
    }
}

/// Point-in-time copy of the aggregated counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CountsSnapshot {
    pub total: u64,
    pub protocol_stats: BTreeMap<Protocol, u64>,
    pub recent: Vec<PacketSummary>,
}

impl CountsSnapshot {
    /// Protocol counters keyed by wire name ("TCP", "Unknown", ...).
    pub fn protocol_names(&self) -> BTreeMap<String, u64> {
        self.protocol_stats
            .iter()
            .map(|(protocol, count)| (protocol.as_str().to_string(), *count))
            .collect()
    }
}

/// Packet counters and bounded history shared by the capture pipeline and
/// the broadcaster. One lock guards everything; it is held for a single
/// record or a single copy, never across I/O.
pub struct Aggregator {
    inner: Mutex<NetworkStats>,
}

impl Aggregator {
    /// # Panics
    ///
    /// Panics if `history_capacity` is zero. `Config::validate` rejects that
    /// value before the binary gets here.
    pub fn new(history_capacity: usize) -> Self {
        Aggregator {
            inner: Mutex::new(NetworkStats::new(history_capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NetworkStats> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, packet: PacketSummary) {
        self.lock().update(packet);
    }

    /// Totals, protocol counters and the newest `recent` history entries.
    pub fn snapshot_counts(&self, recent: usize) -> CountsSnapshot {
        let stats = self.lock();
        CountsSnapshot {
            total: stats.total_packets,
            protocol_stats: stats.protocol_counts.clone(),
            recent: stats.recent.latest(recent),
        }
    }

    /// Totals and protocol counters without copying history.
    pub fn totals(&self) -> (u64, BTreeMap<Protocol, u64>) {
        let stats = self.lock();
        (stats.total_packets, stats.protocol_counts.clone())
    }

    pub fn history_capacity(&self) -> usize {
        self.lock().recent.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::sync::Arc;
    use std::thread;

    fn packet(protocol: Protocol, info: &str) -> PacketSummary {
        PacketSummary {
            observed_at: Local::now(),
            protocol,
            source: Some("192.168.1.10".into()),
            destination: Some("192.168.1.1".into()),
            length: 64,
            info: info.into(),
        }
    }

    #[test]
    fn test_empty_aggregator() {
        let aggregator = Aggregator::new(5);
        let counts = aggregator.snapshot_counts(30);
        assert_eq!(counts.total, 0);
        assert!(counts.protocol_stats.is_empty());
        assert!(counts.recent.is_empty());
    }

    #[test]
    fn test_single_tcp_packet() {
        let aggregator = Aggregator::new(50);
        let tcp = packet(Protocol::Tcp, "ports: 1234→80");
        aggregator.record(tcp.clone());

        let counts = aggregator.snapshot_counts(30);
        assert_eq!(counts.total, 1);
        assert_eq!(counts.protocol_names(), BTreeMap::from([("TCP".to_string(), 1)]));
        assert_eq!(counts.recent, vec![tcp]);
        assert_eq!(counts.recent[0].protocol.as_str(), "TCP");
    }

    #[test]
    fn test_history_keeps_last_capacity_packets() {
        let aggregator = Aggregator::new(3);
        let packets: Vec<_> = (1..=5).map(|i| packet(Protocol::Udp, &format!("P{i}"))).collect();
        for p in &packets {
            aggregator.record(p.clone());
        }

        let counts = aggregator.snapshot_counts(30);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.recent, packets[2..].to_vec());
    }

    #[test]
    fn test_counters_sum_to_total_including_unknown() {
        let aggregator = Aggregator::new(8);
        let protocols = [
            Protocol::Tcp,
            Protocol::Udp,
            Protocol::Icmp,
            Protocol::Arp,
            Protocol::Unknown,
        ];
        for i in 0..103 {
            aggregator.record(packet(protocols[i % protocols.len()], ""));
        }

        let (total, counters) = aggregator.totals();
        assert_eq!(total, 103);
        assert_eq!(counters.values().sum::<u64>(), 103);
        assert_eq!(counters[&Protocol::Unknown], 20);
    }

    #[test]
    fn test_counters_never_decrease() {
        let aggregator = Aggregator::new(2);
        let mut previous = BTreeMap::new();
        for i in 0..40 {
            let protocol = if i % 3 == 0 { Protocol::Arp } else { Protocol::Tcp };
            aggregator.record(packet(protocol, ""));
            let (_, current) = aggregator.totals();
            for (protocol, count) in &previous {
                assert!(current[protocol] >= *count);
            }
            previous = current;
        }
    }

    #[test]
    fn test_snapshot_limit_smaller_than_history() {
        let aggregator = Aggregator::new(50);
        for i in 0..40 {
            aggregator.record(packet(Protocol::Tcp, &i.to_string()));
        }
        let counts = aggregator.snapshot_counts(30);
        assert_eq!(counts.recent.len(), 30);
        assert_eq!(counts.recent.first().unwrap().info, "10");
        assert_eq!(counts.recent.last().unwrap().info, "39");
    }

    #[test]
    fn test_concurrent_record_and_snapshot() {
        let aggregator = Arc::new(Aggregator::new(16));
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let aggregator = Arc::clone(&aggregator);
                thread::spawn(move || {
                    for _ in 0..500 {
                        aggregator.record(packet(Protocol::Udp, ""));
                    }
                })
            })
            .collect();

        let reader = {
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || {
                for _ in 0..200 {
                    let counts = aggregator.snapshot_counts(30);
                    assert!(counts.recent.len() <= 16);
                    assert_eq!(counts.protocol_stats.values().sum::<u64>(), counts.total);
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();

        let counts = aggregator.snapshot_counts(30);
        assert_eq!(counts.total, 2000);
        assert_eq!(counts.recent.len(), 16);
        assert_eq!(aggregator.history_capacity(), 16);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_history_capacity_panics() {
        let _ = Aggregator::new(0);
    }
}
