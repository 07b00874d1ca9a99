use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::{Dpid, PortNo};
use crate::packet::{Classified, PacketKind};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const IP_PROTO_ICMP: u8 = 1;

/// Events delivered by the OpenFlow framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    SwitchConnected {
        dpid: Dpid,
    },
    SwitchDisconnected {
        dpid: Dpid,
    },
    LinkChanged {
        src_dpid: Dpid,
        dst_dpid: Dpid,
        src_port: PortNo,
        dst_port: PortNo,
        added: bool,
    },
    PacketReceived {
        dpid: Dpid,
        in_port: PortNo,
        frame: Vec<u8>,
    },
}

/// Commands sent back to switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SwitchCommand {
    InstallFlow {
        dpid: Dpid,
        rule: FlowRule,
    },
    PacketOut {
        dpid: Dpid,
        in_port: PortNo,
        output: OutputPort,
        frame: Vec<u8>,
    },
}

impl SwitchCommand {
    pub fn dpid(&self) -> Dpid {
        match self {
            SwitchCommand::InstallFlow { dpid, .. } | SwitchCommand::PacketOut { dpid, .. } => *dpid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPort {
    Physical(PortNo),
    Flood,
    Controller,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRule {
    #[serde(rename = "match")]
    pub matcher: FlowMatch,
    pub priority: u16,
    pub output: OutputPort,
    /// Seconds; 0 means no timeout.
    pub idle_timeout: u16,
    pub hard_timeout: u16,
}

/// OpenFlow 1.0 style match; `None` fields are wildcarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_port: Option<PortNo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_dst: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_type: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nw_src: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nw_dst: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nw_proto: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_src: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_dst: Option<u16>,
}

impl FlowMatch {
    /// Exact match built from the fields of a parsed frame.
    pub fn from_packet(in_port: PortNo, packet: &Classified) -> Self {
        let mut matcher = FlowMatch {
            in_port: Some(in_port),
            dl_src: Some(packet.src_mac.to_string()),
            dl_dst: Some(packet.dst_mac.to_string()),
            dl_type: Some(packet.ethertype),
            ..Default::default()
        };

        match &packet.kind {
            PacketKind::Ipv4 { src, dst, protocol, ports, .. } => {
                matcher.nw_src = Some(*src);
                matcher.nw_dst = Some(*dst);
                matcher.nw_proto = Some(*protocol);
                if let Some((tp_src, tp_dst)) = ports {
                    matcher.tp_src = Some(*tp_src);
                    matcher.tp_dst = Some(*tp_dst);
                }
            }
            PacketKind::Arp { sender_ip, target_ip, op } => {
                matcher.nw_src = Some(*sender_ip);
                matcher.nw_dst = Some(*target_ip);
                matcher.nw_proto = u8::try_from(*op).ok();
            }
            PacketKind::Other => {}
        }

        matcher
    }

    /// Any IPv4 ICMP packet.
    pub fn icmp() -> Self {
        FlowMatch {
            dl_type: Some(ETHERTYPE_IPV4),
            nw_proto: Some(IP_PROTO_ICMP),
            ..Default::default()
        }
    }
}
