use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use log::{debug, info};
use pnet::util::MacAddr;

use crate::packet::is_group_mac;
use crate::rate_limit::RateLimiter;
use crate::{Dpid, PortNo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub mac: MacAddr,
    pub dpid: Dpid,
    pub port: PortNo,
    pub ip: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Learned {
    New,
    /// Same switch, possibly a different port.
    Refreshed,
    Moved { from: Dpid },
    /// Multicast or broadcast source, never learned.
    Ignored,
}

/// Where hosts are attached, keyed by MAC and by IPv4 address.
#[derive(Debug)]
pub struct HostTracker {
    hosts: HashMap<MacAddr, Host>,
    ip_to_mac: HashMap<Ipv4Addr, MacAddr>,
    ip_to_switch: HashMap<Ipv4Addr, Dpid>,
    ip_to_name: HashMap<Ipv4Addr, String>,
    movement_log: RateLimiter,
}

impl HostTracker {
    pub fn new(movement_cooldown: Duration) -> Self {
        Self {
            hosts: HashMap::new(),
            ip_to_mac: HashMap::new(),
            ip_to_switch: HashMap::new(),
            ip_to_name: HashMap::new(),
            movement_log: RateLimiter::new(movement_cooldown),
        }
    }

    pub fn learn_location(&mut self, mac: MacAddr, dpid: Dpid, port: PortNo) -> Learned {
        if is_group_mac(mac) {
            return Learned::Ignored;
        }

        match self.hosts.get_mut(&mac) {
            Some(host) if host.dpid == dpid => {
                host.port = port;
                Learned::Refreshed
            }
            Some(host) => {
                let from = host.dpid;
                host.dpid = dpid;
                host.port = port;
                crate::rate_limited!(
                    self.movement_log,
                    format!("host_move_{}", mac),
                    log::Level::Info,
                    "Host {} moved from switch {} to switch {}, port {}",
                    mac, from, dpid, port
                );
                Learned::Moved { from }
            }
            None => {
                let ip = self
                    .ip_to_mac
                    .iter()
                    .find_map(|(ip, known)| (*known == mac).then_some(*ip));
                self.hosts.insert(mac, Host { mac, dpid, port, ip });
                debug!("Learned new MAC {} on switch {}, port {}", mac, dpid, port);
                Learned::New
            }
        }
    }

    /// Records IP -> MAC the first time `ip` is seen.
    pub fn learn_ip(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        if self.ip_to_mac.contains_key(&ip) {
            return;
        }
        self.ip_to_mac.insert(ip, mac);
        if let Some(host) = self.hosts.get_mut(&mac) {
            host.ip.get_or_insert(ip);
        }
        debug!("Mapped IP {} to MAC {}", ip, mac);
    }

    /// Records the switch `ip` is attached to and names the host on first
    /// sight. Returns the previous switch if the attachment changed.
    pub fn attach_ip(&mut self, ip: Ipv4Addr, dpid: Dpid) -> Option<Dpid> {
        if !self.ip_to_name.contains_key(&ip) {
            let name = default_host_name(ip);
            info!("Mapping {} to {}", ip, name);
            self.ip_to_name.insert(ip, name);
        }

        match self.ip_to_switch.insert(ip, dpid) {
            None => {
                info!("Detected host {} connected to switch {}", ip, dpid);
                None
            }
            Some(previous) if previous != dpid => Some(previous),
            Some(_) => None,
        }
    }

    pub fn location(&self, mac: MacAddr) -> Option<(Dpid, PortNo)> {
        self.hosts.get(&mac).map(|host| (host.dpid, host.port))
    }

    pub fn host(&self, mac: MacAddr) -> Option<&Host> {
        self.hosts.get(&mac)
    }

    pub fn mac_of(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.ip_to_mac.get(&ip).copied()
    }

    pub fn switch_of(&self, ip: Ipv4Addr) -> Option<Dpid> {
        self.ip_to_switch.get(&ip).copied()
    }

    pub fn name_of(&self, ip: Ipv4Addr) -> String {
        self.ip_to_name
            .get(&ip)
            .cloned()
            .unwrap_or_else(|| default_host_name(ip))
    }

    /// Drops every host attached to `dpid`. Returns the IPs that lost their attachment.
    pub fn forget_switch(&mut self, dpid: Dpid) -> Vec<Ipv4Addr> {
        self.hosts.retain(|_, host| host.dpid != dpid);

        let detached: Vec<Ipv4Addr> = self
            .ip_to_switch
            .iter()
            .filter(|(_, sw)| **sw == dpid)
            .map(|(ip, _)| *ip)
            .collect();
        for ip in &detached {
            self.ip_to_switch.remove(ip);
        }
        detached
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

pub fn default_host_name(ip: Ipv4Addr) -> String {
    format!("h{}", ip.octets()[3])
}
