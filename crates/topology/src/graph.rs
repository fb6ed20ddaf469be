//! The annotated torus graph: node/edge types and the builder.
//!
//! Nodes and edges are tagged variants (`Node::Satellite` /
//! `Node::GroundStation`, `Edge` with an `inter_ring` flag) rather than
//! untyped attribute bags.

use crate::ip::Ipv4Iface;
use ground_stations::{CanonicalStation, IpPool, PoolEntry, CANONICAL_STATIONS};
use orbital_mechanics::{CatalogNumbers, OrbitData};
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("edge not found between {0} and {1}")]
    EdgeNotFound(String, String),
    #[error("invalid torus dimensions: rings and per_ring must be in [1,30]")]
    InvalidDimensions,
}

pub type Result<T> = std::result::Result<T, TopologyError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteNode {
    pub name: String,
    pub ring: usize,
    pub slot: usize,
    pub orbit: OrbitData,
    pub loopback: Option<Ipv4Iface>,
    pub inf_count: u32,
    pub ospf_config: String,
    pub vtysh_config: String,
    pub daemons_config: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundStationNode {
    pub name: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub loopback: Option<Ipv4Iface>,
    pub inf_count: u32,
    pub pool: IpPool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Satellite(SatelliteNode),
    GroundStation(GroundStationNode),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Satellite(s) => &s.name,
            Node::GroundStation(g) => &g.name,
        }
    }

    pub fn is_satellite(&self) -> bool {
        matches!(self, Node::Satellite(_))
    }

    pub fn is_ground_station(&self) -> bool {
        matches!(self, Node::GroundStation(_))
    }

    pub fn loopback(&self) -> Option<Ipv4Iface> {
        match self {
            Node::Satellite(s) => s.loopback,
            Node::GroundStation(g) => g.loopback,
        }
    }
}

/// An edge between two nodes. `pseudo` marks the ground-station cycle added
/// purely to satisfy backend expectations: it carries no IP allocation and
/// is excluded from the allocator and renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub subnet: Option<(u32, u8)>,
    pub iface_a: Option<Ipv4Iface>,
    pub iface_b: Option<Ipv4Iface>,
    pub intf_name_a: Option<String>,
    pub intf_name_b: Option<String>,
    pub inter_ring: bool,
    pub up: bool,
    pub pseudo: bool,
}

impl Edge {
    fn new(inter_ring: bool) -> Self {
        Edge {
            subnet: None,
            iface_a: None,
            iface_b: None,
            intf_name_a: None,
            intf_name_b: None,
            inter_ring,
            up: true,
            pseudo: false,
        }
    }

    fn pseudo() -> Self {
        let mut e = Edge::new(false);
        e.pseudo = true;
        e
    }
}

pub fn node_name(ring: usize, node: usize) -> String {
    format!("R{}_{}", ring, node)
}

/// The annotated graph produced by the torus builder and mutated in place by
/// the address allocator, the config renderer, and (at runtime) the geo-loop.
pub struct TorusGraph {
    pub rings: usize,
    pub per_ring: usize,
    pub inclination_deg: f64,
    graph: UnGraph<Node, Edge>,
    index: HashMap<String, NodeIndex>,
    /// Node names per ring, in slot order — a graph-level attribute.
    pub ring_members: Vec<Vec<String>>,
    /// Insertion order of addressable (non-pseudo) edges; the allocator and
    /// the determinism tests both depend on this exact order.
    edge_order: Vec<(NodeIndex, NodeIndex)>,
}

impl TorusGraph {
    /// Builds the static torus: `rings` cycles of `per_ring` satellites each,
    /// connected ring-to-ring at matching slot indices. When
    /// `include_ground` is set, the four canonical ground stations
    /// (`ground_stations::CANONICAL_STATIONS`) are added and cross-linked in
    /// a pseudo-cycle.
    pub fn build(
        rings: usize,
        per_ring: usize,
        include_ground: bool,
        catalog: &CatalogNumbers,
    ) -> Result<Self> {
        if rings == 0 || rings > 30 || per_ring == 0 || per_ring > 30 {
            return Err(TopologyError::InvalidDimensions);
        }

        let mut graph = UnGraph::new_undirected();
        let mut index = HashMap::new();
        let mut ring_members = vec![Vec::with_capacity(per_ring); rings];
        let mut edge_order = Vec::new();

        for ring in 0..rings {
            for node in 0..per_ring {
                let name = node_name(ring, node);
                let orbit =
                    OrbitData::for_torus_slot(rings, per_ring, ring, node, catalog.next());
                let idx = graph.add_node(Node::Satellite(SatelliteNode {
                    name: name.clone(),
                    ring,
                    slot: node,
                    orbit,
                    loopback: None,
                    inf_count: 0,
                    ospf_config: String::new(),
                    vtysh_config: String::new(),
                    daemons_config: String::new(),
                }));
                index.insert(name.clone(), idx);
                ring_members[ring].push(name);
            }
        }

        // Intra-ring cycles.
        for ring in 0..rings {
            for node in 0..per_ring {
                let a = index[&node_name(ring, node)];
                let b = index[&node_name(ring, (node + 1) % per_ring)];
                if per_ring == 1 {
                    continue;
                }
                if per_ring == 2 && node == 1 {
                    // avoid adding the same pair twice for a 2-node ring
                    continue;
                }
                let e = graph.add_edge(a, b, Edge::new(false));
                edge_order.push((a, b));
                let _ = e;
            }
        }

        // Inter-ring links, matching slot index, including the R-1 -> 0 wraparound.
        if rings > 1 {
            for ring in 0..rings {
                let next = (ring + 1) % rings;
                if rings == 2 && next < ring {
                    continue;
                }
                for node in 0..per_ring {
                    let a = index[&node_name(ring, node)];
                    let b = index[&node_name(next, node)];
                    graph.add_edge(a, b, Edge::new(true));
                    edge_order.push((a, b));
                }
            }
        }

        if include_ground {
            add_ground_stations(&mut graph, &mut index);
        }

        Ok(TorusGraph {
            rings,
            per_ring,
            inclination_deg: orbital_mechanics::DEFAULT_INCLINATION_DEG,
            graph,
            index,
            ring_members,
            edge_order,
        })
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|i| &self.graph[*i])
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        if let Some(i) = self.index.get(name) {
            Some(&mut self.graph[*i])
        } else {
            None
        }
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(|s| s.as_str())
    }

    pub fn satellite_names(&self) -> Vec<String> {
        self.graph
            .node_weights()
            .filter(|n| n.is_satellite())
            .map(|n| n.name().to_string())
            .collect()
    }

    pub fn ground_station_names(&self) -> Vec<String> {
        self.graph
            .node_weights()
            .filter(|n| n.is_ground_station())
            .map(|n| n.name().to_string())
            .collect()
    }

    pub fn degree(&self, name: &str) -> Option<usize> {
        let idx = *self.index.get(name)?;
        Some(self.graph.neighbors(idx).count())
    }

    pub fn neighbors(&self, name: &str) -> Vec<String> {
        match self.index.get(name) {
            Some(&idx) => self
                .graph
                .neighbors(idx)
                .map(|n| self.graph[n].name().to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<&Edge> {
        let ia = *self.index.get(a)?;
        let ib = *self.index.get(b)?;
        let ei = self.graph.find_edge(ia, ib)?;
        self.graph.edge_weight(ei)
    }

    pub fn edge_mut(&mut self, a: &str, b: &str) -> Option<&mut Edge> {
        let ia = *self.index.get(a)?;
        let ib = *self.index.get(b)?;
        let ei = self.graph.find_edge(ia, ib)?;
        self.graph.edge_weight_mut(ei)
    }

    pub fn has_edge(&self, a: &str, b: &str) -> bool {
        self.edge(a, b).is_some()
    }

    pub fn satellite_edge_count(&self) -> usize {
        self.edge_order.len()
    }

    pub fn inter_ring_edges(&self) -> Vec<(String, String)> {
        self.edge_order
            .iter()
            .filter(|(a, b)| {
                self.graph
                    .find_edge(*a, *b)
                    .map(|ei| self.graph[ei].inter_ring)
                    .unwrap_or(false)
            })
            .map(|(a, b)| (self.graph[*a].name().to_string(), self.graph[*b].name().to_string()))
            .collect()
    }

    /// Every node in insertion order: satellites ring-major then ground
    /// stations, the order the allocator and renderer walk.
    pub fn nodes_in_build_order(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ring_members
            .iter()
            .flat_map(|r| r.iter().cloned())
            .collect();
        names.extend(self.ground_station_names());
        names
    }

    /// Addressable (non-pseudo) edges in the order they were introduced —
    /// the order the allocator numbers them in.
    pub fn edges_in_build_order(&self) -> Vec<(String, String)> {
        self.edge_order
            .iter()
            .map(|(a, b)| (self.graph[*a].name().to_string(), self.graph[*b].name().to_string()))
            .collect()
    }

    pub(crate) fn graph_mut(&mut self) -> &mut UnGraph<Node, Edge> {
        &mut self.graph
    }

    pub(crate) fn index(&self) -> &HashMap<String, NodeIndex> {
        &self.index
    }
}

fn add_ground_stations(graph: &mut UnGraph<Node, Edge>, index: &mut HashMap<String, NodeIndex>) {
    let mut station_indices = Vec::with_capacity(CANONICAL_STATIONS.len());
    for CanonicalStation {
        name,
        latitude_deg,
        longitude_deg,
    } in CANONICAL_STATIONS
    {
        let idx = graph.add_node(Node::GroundStation(GroundStationNode {
            name: name.to_string(),
            latitude_deg,
            longitude_deg,
            loopback: None,
            inf_count: 0,
            pool: IpPool::new(Vec::<PoolEntry>::new()),
        }));
        index.insert(name.to_string(), idx);
        station_indices.push(idx);
    }

    let n = station_indices.len();
    for i in 0..n {
        let a = station_indices[i];
        let b = station_indices[(i + 1) % n];
        graph.add_edge(a, b, Edge::pseudo());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_4x4_without_ground() {
        let catalog = CatalogNumbers::default();
        let g = TorusGraph::build(4, 4, false, &catalog).unwrap();
        assert_eq!(g.satellite_names().len(), 16);
        assert_eq!(g.satellite_edge_count(), 32);

        let intra = g.edge("R0_0", "R0_1").unwrap();
        assert!(!intra.inter_ring);
        let inter = g.edge("R0_0", "R1_0").unwrap();
        assert!(inter.inter_ring);

        for name in g.satellite_names() {
            assert_eq!(g.degree(&name), Some(4), "node {name} should have degree 4");
        }
    }

    #[test]
    fn first_edge_is_r0_0_r0_1() {
        let catalog = CatalogNumbers::default();
        let g = TorusGraph::build(4, 4, false, &catalog).unwrap();
        let (a, b) = g.edges_in_build_order()[0].clone();
        assert_eq!(a, "R0_0");
        assert_eq!(b, "R0_1");
    }

    #[test]
    fn rejects_out_of_range_dimensions() {
        let catalog = CatalogNumbers::default();
        assert!(TorusGraph::build(0, 4, false, &catalog).is_err());
        assert!(TorusGraph::build(31, 4, false, &catalog).is_err());
    }

    #[test]
    fn include_ground_adds_four_stations() {
        let catalog = CatalogNumbers::default();
        let g = TorusGraph::build(4, 4, true, &catalog).unwrap();
        assert_eq!(g.ground_station_names().len(), 4);
        assert!(g.has_edge("G_PAO", "G_KOU"));
    }
}
