// Turns raw captured frames into PacketSummary values.
//
// Precedence: ARP is decided from the ethertype before any IP parsing.
// Within IP the first transport match wins (TCP, UDP, ICMP); anything else
// keeps its network-layer addresses but is tagged Unknown.

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use std::net::{IpAddr, Ipv4Addr};

use crate::models::domain::{PacketSummary, Protocol};

const ETHERNET_HEADER_LEN: usize = 14;
const ETHER_TYPE_ARP: u16 = 0x0806;

const ARP_FIXED_LEN: usize = 8;
const ARP_OPERATION_REQUEST: u16 = 1;
const ARP_OPERATION_REPLY: u16 = 2;

/// Framing of the bytes handed over by the capture handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// No link header, the frame starts at the IPv4/IPv6 header.
    RawIp,
}

pub fn summarize(data: &[u8], wire_len: u32, link: LinkLayer) -> PacketSummary {
    let mut summary = PacketSummary::unknown(wire_len);

    match link {
        LinkLayer::Ethernet => {
            if ether_type(data) == Some(ETHER_TYPE_ARP) {
                handle_arp(&data[ETHERNET_HEADER_LEN..], &mut summary);
            } else if let Ok(packet) = SlicedPacket::from_ethernet(data) {
                handle_ip(&packet, &mut summary);
            }
        }
        LinkLayer::RawIp => {
            if let Ok(packet) = SlicedPacket::from_ip(data) {
                handle_ip(&packet, &mut summary);
            }
        }
    }

    summary
}

fn ether_type(frame: &[u8]) -> Option<u16> {
    if frame.len() < ETHERNET_HEADER_LEN {
        return None;
    }
    Some(u16::from_be_bytes([frame[12], frame[13]]))
}

fn handle_ip(packet: &SlicedPacket<'_>, summary: &mut PacketSummary) {
    let (source, destination): (IpAddr, IpAddr) = match &packet.net {
        Some(NetSlice::Ipv4(ipv4)) => (
            ipv4.header().source_addr().into(),
            ipv4.header().destination_addr().into(),
        ),
        Some(NetSlice::Ipv6(ipv6)) => (
            ipv6.header().source_addr().into(),
            ipv6.header().destination_addr().into(),
        ),
        _ => return,
    };
    summary.source = Some(source.to_string());
    summary.destination = Some(destination.to_string());

    match &packet.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            summary.protocol = Protocol::Tcp;
            summary.info = format!("ports: {}→{}", tcp.source_port(), tcp.destination_port());
        }
        Some(TransportSlice::Udp(udp)) => {
            summary.protocol = Protocol::Udp;
            summary.info = format!("ports: {}→{}", udp.source_port(), udp.destination_port());
        }
        Some(TransportSlice::Icmpv4(icmp)) => {
            summary.protocol = Protocol::Icmp;
            summary.info = format!("type: {}", icmp.type_u8());
        }
        Some(TransportSlice::Icmpv6(icmp)) => {
            summary.protocol = Protocol::Icmp;
            summary.info = format!("type: {}", icmp.type_u8());
        }
        _ => {}
    }
}

fn handle_arp(payload: &[u8], summary: &mut PacketSummary) {
    if payload.len() < ARP_FIXED_LEN {
        return;
    }
    let hw_len = payload[4] as usize;
    let proto_len = payload[5] as usize;
    let operation = u16::from_be_bytes([payload[6], payload[7]]);
    if payload.len() < ARP_FIXED_LEN + 2 * (hw_len + proto_len) {
        return;
    }

    let sender_hw = &payload[ARP_FIXED_LEN..ARP_FIXED_LEN + hw_len];
    let sender_proto = &payload[ARP_FIXED_LEN + hw_len..ARP_FIXED_LEN + hw_len + proto_len];
    let target_start = ARP_FIXED_LEN + hw_len + proto_len;
    let target_hw = &payload[target_start..target_start + hw_len];
    let target_proto = &payload[target_start + hw_len..target_start + hw_len + proto_len];

    summary.protocol = Protocol::Arp;
    summary.source = Some(arp_address(sender_proto, sender_hw));
    summary.destination = Some(arp_address(target_proto, target_hw));
    summary.info = match operation {
        ARP_OPERATION_REQUEST => "arp_request".into(),
        ARP_OPERATION_REPLY => "arp_reply".into(),
        other => format!("arp op {other}"),
    };
}

/// IPv4 protocol address when present, else the hardware address.
fn arp_address(proto: &[u8], hw: &[u8]) -> String {
    match proto {
        [a, b, c, d] => Ipv4Addr::new(*a, *b, *c, *d).to_string(),
        _ => hw
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(":"),
    }
}
