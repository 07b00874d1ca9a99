//! The reactive core: topology events, host learning and per-packet
//! forwarding decisions.
//!
//! A [`Controller`] is owned by exactly one task and processes one event at a
//! time, so none of its tables need locking. Anything that can go wrong while
//! handling a packet degrades to flooding (or dropping a malformed frame) and
//! a rate-limited log line; nothing is ever returned to the caller.

use std::net::Ipv4Addr;
use std::sync::Arc;
use log::{debug, info, warn, Level};
use pnet::util::MacAddr;
use tokio::sync::mpsc;

use crate::command_log::{CommandKind, CommandLog};
use crate::config::{ControllerConfig, FlowConfig};
use crate::messages::{ControllerEvent, FlowMatch, FlowRule, OutputPort, SwitchCommand};
use crate::network::{HostTracker, Learned, Topology};
use crate::packet::{classify, is_group_ipv4, is_group_mac, Classified, IcmpEcho, PacketKind};
use crate::rate_limit::RateLimiter;
use crate::routing::PathResolver;
use crate::telemetry::{now_ms, PathRecord, ReportKind, TelemetryReporter};
use crate::{rate_limited, Dpid, PortNo};

pub struct Controller {
    flow: FlowConfig,
    topology: Topology,
    hosts: HostTracker,
    resolver: PathResolver,
    commands: Arc<dyn CommandLog>,
    telemetry: Option<TelemetryReporter>,
    out: mpsc::UnboundedSender<SwitchCommand>,
    logs: RateLimiter,
}

/// One packet-in being processed.
struct PacketIn {
    dpid: Dpid,
    in_port: PortNo,
    frame: Vec<u8>,
}

impl Controller {
    pub fn new(
        config: &ControllerConfig,
        commands: Arc<dyn CommandLog>,
        out: mpsc::UnboundedSender<SwitchCommand>,
    ) -> Self {
        Self {
            flow: config.flow.clone(),
            topology: Topology::new(),
            hosts: HostTracker::new(config.hosts.movement_cooldown()),
            resolver: PathResolver::new(),
            commands,
            telemetry: None,
            out,
            logs: RateLimiter::new(config.log_rate_interval()),
        }
    }

    pub fn with_telemetry(mut self, reporter: TelemetryReporter) -> Self {
        self.telemetry = Some(reporter);
        self
    }

    /// Processes events until the channel closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<ControllerEvent>) {
        info!("SDN controller with path tracking started");
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        info!("Event channel closed, controller stopping");
    }

    pub fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::SwitchConnected { dpid } => self.on_switch_up(dpid),
            ControllerEvent::SwitchDisconnected { dpid } => self.on_switch_down(dpid),
            ControllerEvent::LinkChanged { src_dpid, dst_dpid, src_port, dst_port, added } => {
                if added {
                    self.on_link_up(src_dpid, dst_dpid, src_port, dst_port);
                } else {
                    self.on_link_down(src_dpid, dst_dpid);
                }
            }
            ControllerEvent::PacketReceived { dpid, in_port, frame } => {
                self.on_packet_in(dpid, in_port, frame);
            }
        }
    }

    pub fn on_switch_up(&mut self, dpid: Dpid) {
        info!("Switch {} connected", dpid);
        self.topology.switch_up(dpid);

        let rule = FlowRule {
            matcher: FlowMatch::icmp(),
            priority: self.flow.icmp_rule_priority,
            output: OutputPort::Controller,
            idle_timeout: 0,
            hard_timeout: 0,
        };
        self.send(SwitchCommand::InstallFlow { dpid, rule });
        info!("Installed ICMP flow rule on switch {}", dpid);

        self.resolver.invalidate_switch(dpid);
    }

    pub fn on_switch_down(&mut self, dpid: Dpid) {
        let neighbors = self.topology.switch_down(dpid);
        let detached = self.hosts.forget_switch(dpid);
        self.resolver.invalidate_all();
        info!(
            "Switch {} disconnected: dropped {} links and {} host attachments",
            dpid,
            neighbors.len(),
            detached.len()
        );
    }

    pub fn on_link_up(&mut self, src: Dpid, dst: Dpid, src_port: PortNo, dst_port: PortNo) {
        self.topology.link_up(src, dst, src_port, dst_port);
        info!("Link added: {} <--> {} (ports: {} <--> {})", src, dst, src_port, dst_port);
        self.resolver.invalidate_all();
        debug!("Current adjacency: {:?}", self.topology.adjacency());
    }

    pub fn on_link_down(&mut self, src: Dpid, dst: Dpid) {
        if self.topology.link_down(src, dst) {
            info!("Link removed: {} <--> {}", src, dst);
        } else {
            debug!("Link {} <--> {} was not known", src, dst);
        }
        self.resolver.invalidate_all();
        debug!("Current adjacency: {:?}", self.topology.adjacency());
    }

    pub fn on_packet_in(&mut self, dpid: Dpid, in_port: PortNo, frame: Vec<u8>) {
        let packet = match classify(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                rate_limited!(self.logs, format!("malformed_{}_{}", dpid, in_port), Level::Warn,
                    "Ignoring incomplete packet from switch {}, port {}: {}", dpid, in_port, e);
                return;
            }
        };

        if is_group_mac(packet.src_mac) {
            rate_limited!(self.logs, format!("group_src_{}", packet.src_mac), Level::Warn,
                "Ignoring packet with broadcast/multicast source MAC {}", packet.src_mac);
            return;
        }

        let pkt = PacketIn { dpid, in_port, frame };
        // Frames arriving over an inter-switch link are in transit and say
        // nothing about where their sender is attached.
        let from_host_port = !self.topology.is_link_port(dpid, in_port);
        if from_host_port {
            self.learn_sender(&pkt, packet.src_mac);
        }

        match packet.kind {
            PacketKind::Arp { sender_ip, .. } => self.handle_arp(&pkt, &packet, sender_ip),
            PacketKind::Other => self.handle_non_ip(&pkt, &packet),
            PacketKind::Ipv4 { src, dst, ttl, icmp, .. } => {
                self.handle_ipv4(&pkt, &packet, from_host_port, src, dst, ttl, icmp);
            }
        }
    }

    fn learn_sender(&mut self, pkt: &PacketIn, mac: MacAddr) {
        if let Learned::Moved { .. } = self.hosts.learn_location(mac, pkt.dpid, pkt.in_port) {
            let ip = self.hosts.host(mac).and_then(|host| host.ip);
            if let Some(ip) = ip {
                self.hosts.attach_ip(ip, pkt.dpid);
                self.resolver.invalidate_host(ip);
            }
        }
    }

    fn handle_arp(&mut self, pkt: &PacketIn, packet: &Classified, sender_ip: Ipv4Addr) {
        debug!("Processing ARP packet from {} to {}", packet.src_mac, packet.dst_mac);
        self.hosts.learn_ip(sender_ip, packet.src_mac);

        if !is_group_mac(packet.dst_mac) {
            if let Some((dst_dpid, dst_port)) = self.hosts.location(packet.dst_mac) {
                if dst_dpid == pkt.dpid {
                    debug!("Forwarding ARP directly to known host on port {}", dst_port);
                    self.packet_out(pkt, OutputPort::Physical(dst_port));
                    return;
                }
            }
        }

        self.flood(pkt, Level::Debug, "ARP");
    }

    fn handle_non_ip(&mut self, pkt: &PacketIn, packet: &Classified) {
        if is_group_mac(packet.dst_mac) {
            self.flood(pkt, Level::Debug, "multicast/broadcast frame");
            return;
        }

        match self.hosts.location(packet.dst_mac) {
            Some((dst_dpid, dst_port)) if dst_dpid == pkt.dpid => {
                self.packet_out(pkt, OutputPort::Physical(dst_port));
            }
            Some(_) => self.flood(pkt, Level::Debug, "non-IP frame for host on another switch"),
            None => self.flood(pkt, Level::Debug, "unknown destination MAC"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_ipv4(
        &mut self,
        pkt: &PacketIn,
        packet: &Classified,
        from_host_port: bool,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        ttl: u8,
        icmp: Option<IcmpEcho>,
    ) {
        debug!("Processing IP packet: {} -> {} on switch {}", src, dst, pkt.dpid);

        self.hosts.learn_ip(src, packet.src_mac);
        if from_host_port {
            if let Some(previous) = self.hosts.attach_ip(src, pkt.dpid) {
                info!("Host {} re-attached from switch {} to switch {}", src, previous, pkt.dpid);
                self.resolver.invalidate_host(src);
            }
        }

        if is_group_ipv4(dst) {
            self.flood(pkt, Level::Debug, "multicast/broadcast IP destination");
            return;
        }

        let dst_mac_known = !is_group_mac(packet.dst_mac) && self.hosts.location(packet.dst_mac).is_some();
        let dst_switch = self.hosts.switch_of(dst);
        if !dst_mac_known && dst_switch.is_none() {
            self.flood(pkt, Level::Warn, "unknown destination host");
            return;
        }

        let Some(dst_switch) = dst_switch else {
            self.flood(pkt, Level::Warn, "unknown destination IP attachment");
            return;
        };
        let Some(src_switch) = self.hosts.switch_of(src) else {
            self.flood(pkt, Level::Warn, "unknown source IP attachment");
            return;
        };

        let Some(path) = self.resolver.resolve(&self.topology, src, dst, src_switch, dst_switch) else {
            self.flood(pkt, Level::Warn, "no path between hosts");
            return;
        };

        if let Some(echo) = icmp {
            // Report once per packet, where it enters the network.
            if path.first() == Some(&pkt.dpid) {
                self.report_echo(echo, src, dst, &path, ttl);
            }
        }

        let Some(position) = path.iter().position(|hop| *hop == pkt.dpid) else {
            self.flood(pkt, Level::Warn, "switch not on computed path");
            return;
        };

        let output = if position == path.len() - 1 {
            self.host_port(pkt.dpid, packet.dst_mac, dst)
        } else {
            let next = path[position + 1];
            let port = self.topology.port_towards(pkt.dpid, next);
            if port.is_none() {
                warn!("No adjacency from switch {} to {}", pkt.dpid, next);
            }
            port
        };

        let Some(port) = output else {
            self.flood(pkt, Level::Warn, "no output port towards destination");
            return;
        };

        self.install_flow(pkt, packet, port);
        self.packet_out(pkt, OutputPort::Physical(port));
    }

    /// Port on `dpid` where the destination host is attached, if it is attached there.
    fn host_port(&self, dpid: Dpid, dst_mac: MacAddr, dst_ip: Ipv4Addr) -> Option<PortNo> {
        let mac = if is_group_mac(dst_mac) {
            self.hosts.mac_of(dst_ip)?
        } else {
            dst_mac
        };
        match self.hosts.location(mac) {
            Some((host_dpid, port)) if host_dpid == dpid => Some(port),
            _ => None,
        }
    }

    fn report_echo(&mut self, echo: IcmpEcho, src: Ipv4Addr, dst: Ipv4Addr, path: &[Dpid], ttl: u8) {
        let Some(reporter) = self.telemetry.as_mut() else {
            return;
        };

        if !self.commands.is_last_command_of_kind(&CommandKind::Ping) {
            debug!("Last command was not ping, skipping path data for {} -> {}", src, dst);
            return;
        }

        let kind = match echo {
            IcmpEcho::Request => ReportKind::Ping,
            IcmpEcho::Reply => ReportKind::Pong,
        };
        let record = PathRecord::new(
            kind,
            &self.hosts.name_of(src),
            &self.hosts.name_of(dst),
            path,
            &self.topology,
            ttl,
            now_ms(),
        );
        if let Err(e) = reporter.report(record) {
            debug!("Path record for {} -> {} not queued: {}", src, dst, e);
        }
    }

    fn install_flow(&mut self, pkt: &PacketIn, packet: &Classified, port: PortNo) {
        let rule = FlowRule {
            matcher: FlowMatch::from_packet(pkt.in_port, packet),
            priority: self.flow.priority,
            output: OutputPort::Physical(port),
            idle_timeout: self.flow.idle_timeout,
            hard_timeout: self.flow.hard_timeout,
        };
        self.send(SwitchCommand::InstallFlow { dpid: pkt.dpid, rule });
        info!(
            "Installed flow rule on switch {}: {} -> {} via port {}",
            pkt.dpid, packet.src_mac, packet.dst_mac, port
        );
    }

    fn packet_out(&mut self, pkt: &PacketIn, output: OutputPort) {
        self.send(SwitchCommand::PacketOut {
            dpid: pkt.dpid,
            in_port: pkt.in_port,
            output,
            frame: pkt.frame.clone(),
        });
    }

    fn flood(&mut self, pkt: &PacketIn, level: Level, reason: &str) {
        self.packet_out(pkt, OutputPort::Flood);
        rate_limited!(self.logs, format!("flood_{}_{}", pkt.dpid, pkt.in_port), level,
            "Flooding packet from switch {}, port {}: {}", pkt.dpid, pkt.in_port, reason);
    }

    fn send(&mut self, command: SwitchCommand) {
        if self.out.send(command).is_err() {
            rate_limited!(self.logs, "switch_channel_closed", Level::Warn,
                "Switch command channel closed, dropping command");
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn hosts(&self) -> &HostTracker {
        &self.hosts
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }
}
