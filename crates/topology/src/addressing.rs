//! Deterministic IPv4 allocation: a loopback counter walking every node in
//! insertion order, then an edge counter walking every addressable edge,
//! continuing into each ground station's uplink pool.

use crate::graph::TorusGraph;
use crate::ip::{host_pair_of_30, Ipv4Iface};
use ground_stations::{IpPool, PoolEntry, DEFAULT_POOL_SIZE};

const LOOPBACK_BASE: u32 = 0x0A01_0000;
const EDGE_BASE: u32 = 0x0A0F_0000;

impl TorusGraph {
    /// Assigns every node's loopback /31, every edge's /30 (with per-
    /// endpoint interface addresses and synthesized `{node}-eth{n}` names),
    /// and every ground station's pool of `DEFAULT_POOL_SIZE` /30 subnets.
    /// Idempotent only in the sense that calling it twice on a fresh graph
    /// reproduces the same numbering — callers should call it exactly once.
    pub fn allocate_addresses(&mut self) {
        let mut loopback_count: u32 = 1;
        for name in self.nodes_in_build_order() {
            let addr = LOOPBACK_BASE + loopback_count;
            loopback_count += 2;
            if let Some(node) = self.node_mut(&name) {
                let iface = Ipv4Iface::new(addr, 31);
                match node {
                    crate::graph::Node::Satellite(s) => s.loopback = Some(iface),
                    crate::graph::Node::GroundStation(g) => g.loopback = Some(iface),
                }
            }
        }

        let mut edge_count: u32 = 1;
        for (a, b) in self.edges_in_build_order() {
            let network_base = EDGE_BASE + 4 * edge_count;
            edge_count += 1;
            let (host1, host2) = host_pair_of_30(network_base);

            let a_count = self.bump_inf_count(&a);
            let a_intf = format!("{}-eth{}", a, a_count);
            let b_count = self.bump_inf_count(&b);
            let b_intf = format!("{}-eth{}", b, b_count);

            if let Some(edge) = self.edge_mut(&a, &b) {
                edge.subnet = Some((network_base, 30));
                edge.iface_a = Some(Ipv4Iface::new(host1, 30));
                edge.iface_b = Some(Ipv4Iface::new(host2, 30));
                edge.intf_name_a = Some(a_intf);
                edge.intf_name_b = Some(b_intf);
            }
        }

        for name in self.ground_station_names() {
            let mut entries = Vec::with_capacity(DEFAULT_POOL_SIZE);
            for _ in 0..DEFAULT_POOL_SIZE {
                let network_base = EDGE_BASE + 4 * edge_count;
                edge_count += 1;
                let (host1, host2) = host_pair_of_30(network_base);
                entries.push(PoolEntry {
                    network: (network_base, 30),
                    ip1: (host1, 30),
                    ip2: (host2, 30),
                    used: false,
                });
            }
            if let Some(crate::graph::Node::GroundStation(g)) = self.node_mut(&name) {
                g.pool = IpPool::new(entries);
            }
        }
    }

    fn bump_inf_count(&mut self, name: &str) -> u32 {
        match self.node_mut(name) {
            Some(crate::graph::Node::Satellite(s)) => {
                s.inf_count += 1;
                s.inf_count
            }
            Some(crate::graph::Node::GroundStation(g)) => {
                g.inf_count += 1;
                g.inf_count
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbital_mechanics::CatalogNumbers;

    #[test]
    fn scenario_allocator_determinism() {
        let catalog = CatalogNumbers::default();
        let mut g = TorusGraph::build(4, 4, false, &catalog).unwrap();
        g.allocate_addresses();

        let r0_0 = g.node("R0_0").unwrap().loopback().unwrap();
        assert_eq!(r0_0.to_cidr(), "10.1.0.1/31");

        let edge = g.edge("R0_0", "R0_1").unwrap();
        assert_eq!(edge.subnet.unwrap().0, 0x0A0F_0004);
        assert_eq!(edge.iface_a.unwrap().to_cidr(), "10.15.0.5/30");
        assert_eq!(edge.iface_b.unwrap().to_cidr(), "10.15.0.6/30");
        assert_eq!(edge.intf_name_a.as_deref(), Some("R0_0-eth1"));
        assert_eq!(edge.intf_name_b.as_deref(), Some("R0_1-eth1"));
    }

    #[test]
    fn every_edge_endpoint_pair_differs_and_lies_in_its_subnet() {
        let catalog = CatalogNumbers::default();
        let mut g = TorusGraph::build(3, 5, false, &catalog).unwrap();
        g.allocate_addresses();
        for (a, b) in g.edges_in_build_order() {
            let edge = g.edge(&a, &b).unwrap();
            let (network, _) = edge.subnet.unwrap();
            let ia = edge.iface_a.unwrap();
            let ib = edge.iface_b.unwrap();
            assert_ne!(ia.addr, ib.addr);
            assert!(ia.addr >= network + 1 && ia.addr <= network + 2);
            assert!(ib.addr >= network + 1 && ib.addr <= network + 2);
        }
    }

    #[test]
    fn ground_station_pools_follow_the_edge_counter() {
        let catalog = CatalogNumbers::default();
        let mut g = TorusGraph::build(2, 2, true, &catalog).unwrap();
        g.allocate_addresses();
        for name in g.ground_station_names() {
            if let crate::graph::Node::GroundStation(gs) = g.node(&name).unwrap() {
                assert_eq!(gs.pool.len(), DEFAULT_POOL_SIZE);
                assert_eq!(gs.pool.used_count(), 0);
            }
        }
    }

    #[test]
    fn loopback_addresses_are_unique_across_satellites() {
        let catalog = CatalogNumbers::default();
        let mut g = TorusGraph::build(4, 4, false, &catalog).unwrap();
        g.allocate_addresses();
        let mut addrs: Vec<u32> = g
            .satellite_names()
            .iter()
            .map(|n| g.node(n).unwrap().loopback().unwrap().addr)
            .collect();
        addrs.sort_unstable();
        let before = addrs.len();
        addrs.dedup();
        assert_eq!(addrs.len(), before);
    }
}
