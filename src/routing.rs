use std::collections::HashMap;
use std::net::Ipv4Addr;
use log::{debug, info};

use crate::algorithms::find_path;
use crate::network::Topology;
use crate::Dpid;

/// Memoized switch paths keyed by the host pair that asked for them.
///
/// Unbounded; entries only go away when the topology changes.
#[derive(Debug, Clone, Default)]
pub struct PathCache {
    entries: HashMap<(Ipv4Addr, Ipv4Addr), Vec<Dpid>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<&Vec<Dpid>> {
        self.entries.get(&(src, dst))
    }

    pub fn insert(&mut self, src: Ipv4Addr, dst: Ipv4Addr, path: Vec<Dpid>) {
        self.entries.insert((src, dst), path);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn remove_switch(&mut self, dpid: Dpid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, path| !path.contains(&dpid));
        before - self.entries.len()
    }

    pub fn remove_host(&mut self, ip: Ipv4Addr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(src, dst), _| *src != ip && *dst != ip);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Answers host-pair path queries from the cache or by running Dijkstra.
#[derive(Debug, Default)]
pub struct PathResolver {
    cache: PathCache,
    computations: u64,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch path for traffic from `src_ip` (attached to `src_sw`) to
    /// `dst_ip` (attached to `dst_sw`). `None` means no path exists.
    pub fn resolve(
        &mut self,
        topology: &Topology,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_sw: Dpid,
        dst_sw: Dpid,
    ) -> Option<Vec<Dpid>> {
        if let Some(path) = self.cache.get(src_ip, dst_ip) {
            debug!("Using cached path for {}->{}: {:?}", src_ip, dst_ip, path);
            return Some(path.clone());
        }

        let path = if src_sw == dst_sw {
            debug!("Source and destination on same switch: {}", src_sw);
            vec![src_sw]
        } else {
            self.computations += 1;
            find_path(topology, src_sw, dst_sw)
        };

        if path.is_empty() {
            return None;
        }

        info!("Computed path for {}->{}: {:?}", src_ip, dst_ip, path);
        self.cache.insert(src_ip, dst_ip, path.clone());
        Some(path)
    }

    pub fn invalidate_all(&mut self) {
        if !self.cache.is_empty() {
            info!("Path cache cleared ({} entries) due to topology change", self.cache.len());
        }
        self.cache.clear();
    }

    pub fn invalidate_switch(&mut self, dpid: Dpid) {
        let removed = self.cache.remove_switch(dpid);
        if removed > 0 {
            debug!("Dropped {} cached paths through switch {}", removed, dpid);
        }
    }

    pub fn invalidate_host(&mut self, ip: Ipv4Addr) {
        let removed = self.cache.remove_host(ip);
        if removed > 0 {
            debug!("Dropped {} cached paths for host {}", removed, ip);
        }
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    /// Number of Dijkstra runs so far.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H1: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const H2: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const H3: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);

    fn line() -> Topology {
        let mut topo = Topology::new();
        topo.link_up(1, 2, 2, 1);
        topo.link_up(2, 3, 2, 1);
        topo
    }

    #[test]
    fn repeated_lookup_hits_cache() {
        let topo = line();
        let mut resolver = PathResolver::new();

        let first = resolver.resolve(&topo, H1, H3, 1, 3).unwrap();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(resolver.computations(), 1);

        let second = resolver.resolve(&topo, H1, H3, 1, 3).unwrap();
        assert_eq!(second, first);
        assert_eq!(resolver.computations(), 1);
    }

    #[test]
    fn cache_is_keyed_by_host_pair() {
        let topo = line();
        let mut resolver = PathResolver::new();

        resolver.resolve(&topo, H1, H3, 1, 3);
        resolver.resolve(&topo, H2, H3, 1, 3);
        resolver.resolve(&topo, H3, H1, 3, 1);
        assert_eq!(resolver.cache().len(), 3);
        assert_eq!(resolver.computations(), 3);
    }

    #[test]
    fn same_switch_skips_dijkstra() {
        let topo = line();
        let mut resolver = PathResolver::new();

        assert_eq!(resolver.resolve(&topo, H1, H2, 1, 1), Some(vec![1]));
        assert_eq!(resolver.computations(), 0);
        assert_eq!(resolver.cache().get(H1, H2), Some(&vec![1]));
    }

    #[test]
    fn missing_path_is_not_cached() {
        let mut topo = line();
        topo.link_down(2, 3);
        let mut resolver = PathResolver::new();

        assert_eq!(resolver.resolve(&topo, H1, H3, 1, 3), None);
        assert!(resolver.cache().is_empty());
    }

    #[test]
    fn targeted_invalidation() {
        let topo = line();
        let mut resolver = PathResolver::new();
        resolver.resolve(&topo, H1, H3, 1, 3);
        resolver.resolve(&topo, H1, H2, 1, 1);

        resolver.invalidate_switch(3);
        assert_eq!(resolver.cache().len(), 1);
        assert!(resolver.cache().get(H1, H2).is_some());

        resolver.invalidate_host(H2);
        assert!(resolver.cache().is_empty());

        resolver.resolve(&topo, H1, H3, 1, 3);
        resolver.invalidate_all();
        assert!(resolver.cache().is_empty());
    }
}
