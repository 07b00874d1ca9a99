use std::collections::HashMap;
use chrono::{DateTime, Utc};
use crate::{Dpid, PortNo};

/// Live switch adjacency. Every physical link is stored as two directed
/// edges `src -> dst` carrying the local output port on `src`; both are
/// always added and removed together.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    adjacency: HashMap<Dpid, HashMap<Dpid, PortNo>>,
    last_seen: HashMap<Dpid, DateTime<Utc>>,
    names: HashMap<Dpid, String>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switch_up(&mut self, dpid: Dpid) {
        self.last_seen.insert(dpid, Utc::now());
        self.adjacency.entry(dpid).or_default();
    }

    /// Drops liveness and every edge touching `dpid`, in both directions.
    /// Returns the neighbors that lost an edge.
    pub fn switch_down(&mut self, dpid: Dpid) -> Vec<Dpid> {
        self.last_seen.remove(&dpid);

        let neighbors: Vec<Dpid> = self
            .adjacency
            .remove(&dpid)
            .map(|edges| edges.into_keys().collect())
            .unwrap_or_default();

        for edges in self.adjacency.values_mut() {
            edges.remove(&dpid);
        }

        neighbors
    }

    pub fn link_up(&mut self, src: Dpid, dst: Dpid, src_port: PortNo, dst_port: PortNo) {
        self.adjacency.entry(src).or_default().insert(dst, src_port);
        self.adjacency.entry(dst).or_default().insert(src, dst_port);

        for dpid in [src, dst] {
            self.names.entry(dpid).or_insert_with(|| default_switch_name(dpid));
        }
    }

    /// Returns whether any edge was actually removed.
    pub fn link_down(&mut self, src: Dpid, dst: Dpid) -> bool {
        let forward = self
            .adjacency
            .get_mut(&src)
            .and_then(|edges| edges.remove(&dst))
            .is_some();
        let backward = self
            .adjacency
            .get_mut(&dst)
            .and_then(|edges| edges.remove(&src))
            .is_some();
        forward || backward
    }

    pub fn contains(&self, dpid: Dpid) -> bool {
        self.adjacency.contains_key(&dpid)
    }

    pub fn is_live(&self, dpid: Dpid) -> bool {
        self.last_seen.contains_key(&dpid)
    }

    pub fn last_seen(&self, dpid: Dpid) -> Option<DateTime<Utc>> {
        self.last_seen.get(&dpid).copied()
    }

    /// Output port on `from` towards its neighbor `to`.
    pub fn port_towards(&self, from: Dpid, to: Dpid) -> Option<PortNo> {
        self.adjacency.get(&from)?.get(&to).copied()
    }

    /// Neighbors of `dpid` in ascending dpid order.
    pub fn neighbors(&self, dpid: Dpid) -> Vec<Dpid> {
        let mut neighbors: Vec<Dpid> = self
            .adjacency
            .get(&dpid)
            .map(|edges| edges.keys().copied().collect())
            .unwrap_or_default();
        neighbors.sort_unstable();
        neighbors
    }

    /// Whether `port` on `dpid` faces another switch rather than a host.
    pub fn is_link_port(&self, dpid: Dpid, port: PortNo) -> bool {
        self.adjacency
            .get(&dpid)
            .is_some_and(|edges| edges.values().any(|p| *p == port))
    }

    pub fn name_of(&self, dpid: Dpid) -> String {
        self.names
            .get(&dpid)
            .cloned()
            .unwrap_or_else(|| default_switch_name(dpid))
    }

    pub fn adjacency(&self) -> &HashMap<Dpid, HashMap<Dpid, PortNo>> {
        &self.adjacency
    }

    pub fn switch_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of physical links (pairs of directed edges).
    pub fn link_count(&self) -> usize {
        self.adjacency.values().map(HashMap::len).sum::<usize>() / 2
    }
}

pub fn default_switch_name(dpid: Dpid) -> String {
    format!("s{}", dpid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_up_adds_both_directions_and_names() {
        let mut topo = Topology::new();
        topo.link_up(1, 2, 3, 4);

        assert_eq!(topo.port_towards(1, 2), Some(3));
        assert_eq!(topo.port_towards(2, 1), Some(4));
        assert_eq!(topo.link_count(), 1);
        assert_eq!(topo.name_of(1), "s1");
        assert_eq!(topo.name_of(2), "s2");
    }

    #[test]
    fn repeated_link_up_is_idempotent() {
        let mut once = Topology::new();
        once.link_up(1, 2, 3, 4);

        let mut twice = Topology::new();
        twice.link_up(1, 2, 3, 4);
        twice.link_up(1, 2, 3, 4);

        assert_eq!(once.adjacency(), twice.adjacency());
    }

    #[test]
    fn link_up_overwrites_ports() {
        let mut topo = Topology::new();
        topo.link_up(1, 2, 3, 4);
        topo.link_up(1, 2, 5, 6);
        assert_eq!(topo.port_towards(1, 2), Some(5));
        assert_eq!(topo.port_towards(2, 1), Some(6));
        assert_eq!(topo.link_count(), 1);
    }

    #[test]
    fn link_down_on_missing_edge_is_noop() {
        let mut topo = Topology::new();
        topo.link_up(1, 2, 3, 4);
        let before = topo.adjacency().clone();

        assert!(!topo.link_down(1, 9));
        assert!(!topo.link_down(7, 8));
        assert_eq!(topo.adjacency(), &before);

        assert!(topo.link_down(2, 1));
        assert_eq!(topo.port_towards(1, 2), None);
        assert_eq!(topo.port_towards(2, 1), None);
        assert!(!topo.link_down(1, 2));
    }

    #[test]
    fn switch_down_removes_incident_edges() {
        let mut topo = Topology::new();
        topo.switch_up(1);
        topo.switch_up(2);
        topo.switch_up(3);
        topo.link_up(1, 2, 1, 1);
        topo.link_up(2, 3, 2, 1);

        let mut lost = topo.switch_down(2);
        lost.sort_unstable();
        assert_eq!(lost, vec![1, 3]);
        assert!(!topo.contains(2));
        assert!(!topo.is_live(2));
        assert!(topo.neighbors(1).is_empty());
        assert!(topo.neighbors(3).is_empty());
        assert_eq!(topo.link_count(), 0);

        // Unknown switch is a no-op.
        assert!(topo.switch_down(42).is_empty());
    }

    #[test]
    fn name_is_stable_once_assigned() {
        let mut topo = Topology::new();
        topo.link_up(5, 6, 1, 1);
        topo.link_down(5, 6);
        topo.link_up(5, 6, 2, 2);
        assert_eq!(topo.name_of(5), "s5");
        assert_eq!(topo.name_of(99), "s99");
    }

    #[test]
    fn link_ports_are_distinguished_from_host_ports() {
        let mut topo = Topology::new();
        topo.link_up(1, 2, 3, 4);
        assert!(topo.is_link_port(1, 3));
        assert!(!topo.is_link_port(1, 1));
        assert!(topo.is_link_port(2, 4));
        assert!(!topo.is_link_port(9, 3));
    }

    #[test]
    fn switch_up_records_liveness() {
        let mut topo = Topology::new();
        topo.switch_up(4);
        assert!(topo.is_live(4));
        assert!(topo.contains(4));
        assert!(topo.last_seen(4).is_some());
        assert_eq!(topo.switch_count(), 1);
    }
}
