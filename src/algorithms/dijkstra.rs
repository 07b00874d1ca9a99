use std::collections::{BinaryHeap, HashMap, HashSet};
use std::cmp::Ordering;
use log::{debug, warn};
use crate::Dpid;
use crate::network::Topology;

#[derive(Debug)]
struct State {
    cost: u32,
    /// Push order, so equal-cost entries pop first-discovered first.
    seq: u64,
    switch: Dpid,
    path: Vec<Dpid>,
}

impl Eq for State {}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.seq == other.seq
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other.cost.cmp(&self.cost).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest switch path from `src` to `dst`, counting hops.
///
/// Returns an empty path if either switch is unknown or `dst` is unreachable.
pub fn find_path(topology: &Topology, src: Dpid, dst: Dpid) -> Vec<Dpid> {
    if !topology.contains(src) || !topology.contains(dst) {
        warn!("Dijkstra: source {} or destination {} not in topology", src, dst);
        return Vec::new();
    }

    let mut distances: HashMap<Dpid, u32> = HashMap::new();
    let mut visited: HashSet<Dpid> = HashSet::new();
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    distances.insert(src, 0);
    heap.push(State {
        cost: 0,
        seq,
        switch: src,
        path: vec![src],
    });

    while let Some(State { cost, switch, path, .. }) = heap.pop() {
        if !visited.insert(switch) {
            continue;
        }

        if switch == dst {
            debug!("Dijkstra: found path from {} to {}: {:?}", src, dst, path);
            return path;
        }

        // Unit cost per hop
        let next_cost = cost + 1;
        for neighbor in topology.neighbors(switch) {
            if visited.contains(&neighbor) {
                continue;
            }
            if next_cost < *distances.get(&neighbor).unwrap_or(&u32::MAX) {
                distances.insert(neighbor, next_cost);

                let mut new_path = path.clone();
                new_path.push(neighbor);

                seq += 1;
                heap.push(State {
                    cost: next_cost,
                    seq,
                    switch: neighbor,
                    path: new_path,
                });
            }
        }
    }

    warn!("Dijkstra: no path found from {} to {}", src, dst);
    Vec::new()
}
