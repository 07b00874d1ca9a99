//! Parses raw packet-in frames into a tagged [`PacketKind`].
//!
//! Only the fields the forwarder acts on are extracted; everything else stays
//! in the raw frame that is handed back to the switch.

use pnet::packet::arp::ArpPacket;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

use crate::error::PacketError;

const IPV4_MIN_HEADER: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpEcho {
    Request,
    Reply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketKind {
    Arp {
        sender_ip: Ipv4Addr,
        target_ip: Ipv4Addr,
        op: u16,
    },
    Ipv4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        ttl: u8,
        protocol: u8,
        icmp: Option<IcmpEcho>,
        /// TCP/UDP ports, or ICMP type and code.
        ports: Option<(u16, u16)>,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub ethertype: u16,
    pub kind: PacketKind,
}

impl Classified {
    pub fn is_arp(&self) -> bool {
        matches!(self.kind, PacketKind::Arp { .. })
    }
}

/// True for multicast and broadcast addresses (I/G bit set).
pub fn is_group_mac(mac: MacAddr) -> bool {
    mac.0 & 0x01 == 0x01
}

pub fn is_group_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_multicast() || ip.is_broadcast()
}

pub fn classify(frame: &[u8]) -> Result<Classified, PacketError> {
    let eth = EthernetPacket::new(frame).ok_or(PacketError::TruncatedEthernet(frame.len()))?;
    let ethertype = eth.get_ethertype();

    let kind = if ethertype == EtherTypes::Arp {
        let arp = ArpPacket::new(eth.payload()).ok_or(PacketError::TruncatedArp)?;
        PacketKind::Arp {
            sender_ip: arp.get_sender_proto_addr(),
            target_ip: arp.get_target_proto_addr(),
            op: arp.get_operation().0,
        }
    } else if ethertype == EtherTypes::Ipv4 {
        classify_ipv4(eth.payload())?
    } else {
        PacketKind::Other
    };

    Ok(Classified {
        src_mac: eth.get_source(),
        dst_mac: eth.get_destination(),
        ethertype: ethertype.0,
        kind,
    })
}

fn classify_ipv4(payload: &[u8]) -> Result<PacketKind, PacketError> {
    let ip = Ipv4Packet::new(payload).ok_or(PacketError::TruncatedIpv4)?;
    let header_len = ip.get_header_length() as usize * 4;
    if header_len < IPV4_MIN_HEADER || header_len > payload.len() {
        return Err(PacketError::BadIpv4HeaderLength(ip.get_header_length()));
    }
    let transport = &payload[header_len..];
    let protocol = ip.get_next_level_protocol();

    let mut icmp = None;
    let mut ports = None;
    if protocol == IpNextHeaderProtocols::Icmp {
        if let Some(packet) = IcmpPacket::new(transport) {
            let icmp_type = packet.get_icmp_type();
            icmp = if icmp_type == IcmpTypes::EchoRequest {
                Some(IcmpEcho::Request)
            } else if icmp_type == IcmpTypes::EchoReply {
                Some(IcmpEcho::Reply)
            } else {
                None
            };
            ports = Some((icmp_type.0 as u16, packet.get_icmp_code().0 as u16));
        }
    } else if protocol == IpNextHeaderProtocols::Tcp {
        ports = TcpPacket::new(transport).map(|tcp| (tcp.get_source(), tcp.get_destination()));
    } else if protocol == IpNextHeaderProtocols::Udp {
        ports = UdpPacket::new(transport).map(|udp| (udp.get_source(), udp.get_destination()));
    }

    Ok(PacketKind::Ipv4 {
        src: ip.get_source(),
        dst: ip.get_destination(),
        ttl: ip.get_ttl(),
        protocol: protocol.0,
        icmp,
        ports,
    })
}
