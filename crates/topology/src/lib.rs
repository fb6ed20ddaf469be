//! Torus topology: the builder, address allocator, and routing-config
//! renderer.

pub mod addressing;
pub mod graph;
pub mod ip;
pub mod lookangle;
pub mod render;

pub use graph::{node_name, Edge, GroundStationNode, Node, SatelliteNode, TopologyError, TorusGraph};
pub use graph::Result;
pub use ip::Ipv4Iface;
pub use lookangle::{calculate_look_angles, within_bounding_box, LookAngles};

#[cfg(test)]
mod proptests {
    use super::*;
    use orbital_mechanics::CatalogNumbers;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn builder_yields_r_times_n_nodes(r in 1usize..=10, n in 1usize..=10) {
            let catalog = CatalogNumbers::default();
            let g = TorusGraph::build(r, n, false, &catalog).unwrap();
            prop_assert_eq!(g.satellite_names().len(), r * n);
        }

        /// R·N intra-ring edges + R·N inter-ring edges, for the
        /// non-degenerate case where rings/per_ring don't collapse cycles
        /// into parallel edges (r,n >= 3).
        #[test]
        fn builder_yields_exact_edge_counts_in_general_case(r in 3usize..=10, n in 3usize..=10) {
            let catalog = CatalogNumbers::default();
            let g = TorusGraph::build(r, n, false, &catalog).unwrap();
            prop_assert_eq!(g.satellite_edge_count(), 2 * r * n);
        }

        #[test]
        fn loopbacks_unique_and_edge_endpoints_differ(r in 1usize..=8, n in 1usize..=8) {
            let catalog = CatalogNumbers::default();
            let mut g = TorusGraph::build(r, n, false, &catalog).unwrap();
            g.allocate_addresses();

            let mut addrs: Vec<u32> = g
                .satellite_names()
                .iter()
                .map(|name| g.node(name).unwrap().loopback().unwrap().addr)
                .collect();
            let before = addrs.len();
            addrs.sort_unstable();
            addrs.dedup();
            prop_assert_eq!(addrs.len(), before);

            for (a, b) in g.edges_in_build_order() {
                let edge = g.edge(&a, &b).unwrap();
                let ia = edge.iface_a.unwrap();
                let ib = edge.iface_b.unwrap();
                prop_assert_ne!(ia.addr, ib.addr);
                let (network, _) = edge.subnet.unwrap();
                prop_assert!(ia.addr >= network + 1 && ia.addr <= network + 2);
                prop_assert!(ib.addr >= network + 1 && ib.addr <= network + 2);
            }
        }
    }
}
