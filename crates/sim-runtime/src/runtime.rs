//! `SimRuntime`: the single writer-authority over the graph, the
//! per-station uplink sets, and the bounded stats/event rings. Every
//! operation acquires `inner`'s lock for its full duration — a plain
//! `std::sync::Mutex` suffices since no operation holds the lock across an
//! `.await`.

use crate::backend::Backend;
use crate::error::{Result, RuntimeError};
use crate::probe::{self, ProbeStore, StatSample};
use chrono::{DateTime, Utc};
use ground_stations::{StationUplinks, UplinkCommand, WantedUplink};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use topology::TorusGraph;

const STATS_RING_CAP: usize = 200;
const EVENTS_RING_CAP: usize = 1000;

#[derive(Debug, Clone, serde::Serialize)]
pub struct EventLogEntry {
    pub timestamp: i64,
    pub text: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NeighborView {
    pub name: String,
    pub local_ip: String,
    pub remote_ip: String,
    pub local_intf: String,
    pub remote_intf: String,
    pub up_local: bool,
    pub up_remote: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RouterView {
    pub name: String,
    pub loopback: String,
    pub neighbors: Vec<NeighborView>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UplinkView {
    pub satellite: String,
    pub distance_km: u32,
    pub default: bool,
    pub ip_pool_entry: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StationView {
    pub name: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub uplinks: Vec<UplinkView>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TopoSummary {
    pub rings: usize,
    pub per_ring: usize,
    pub ring_node_lists: Vec<Vec<String>>,
    pub router_count: usize,
    pub link_count: usize,
    pub up_link_count: usize,
    pub run_time_seconds: i64,
    pub stations: Vec<String>,
    pub recent_events: Vec<EventLogEntry>,
    pub stat_series: Vec<StatSample>,
}

struct Inner {
    graph: TorusGraph,
    stations: HashMap<String, StationUplinks>,
    backend: Arc<dyn Backend>,
    stats: VecDeque<StatSample>,
    events: VecDeque<EventLogEntry>,
    probe_stores: HashMap<String, Arc<RwLock<ProbeStore>>>,
    /// last observed `inter_plane_ok` per satellite, used to
    /// detect transitions between consecutive geo-loop ticks.
    inter_plane_state: HashMap<String, bool>,
    started_at: DateTime<Utc>,
}

impl Inner {
    fn push_event(&mut self, text: impl Into<String>) {
        self.events.push_back(EventLogEntry {
            timestamp: Utc::now().timestamp(),
            text: text.into(),
        });
        while self.events.len() > EVENTS_RING_CAP {
            self.events.pop_front();
        }
    }
}

/// The control plane's single piece of shared mutable state. `new` wires the
/// graph and backend together; all further access goes through the typed
/// operations below, each of which locks `inner` for its whole duration.
pub struct SimRuntime {
    inner: Mutex<Inner>,
}

impl SimRuntime {
    pub fn new(graph: TorusGraph, backend: Arc<dyn Backend>) -> Self {
        let stations = graph
            .ground_station_names()
            .into_iter()
            .filter_map(|name| match graph.node(&name) {
                Some(topology::Node::GroundStation(g)) => {
                    Some((name, StationUplinks::new(g.pool.clone())))
                }
                _ => None,
            })
            .collect();

        let probe_stores = graph
            .node_names()
            .map(|n| (n.to_string(), Arc::new(RwLock::new(ProbeStore::new()))))
            .collect();

        SimRuntime {
            inner: Mutex::new(Inner {
                graph,
                stations,
                backend,
                stats: VecDeque::new(),
                events: VecDeque::new(),
                probe_stores,
                inter_plane_state: HashMap::new(),
                started_at: Utc::now(),
            }),
        }
    }

    pub fn probe_store(&self, node: &str) -> Option<Arc<RwLock<ProbeStore>>> {
        self.inner.lock().unwrap().probe_stores.get(node).cloned()
    }

    pub fn probe_store_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().probe_stores.keys().cloned().collect()
    }

    // -- Read operations ---------------------------------------------------

    pub fn get_topo_summary(&self) -> TopoSummary {
        let inner = self.inner.lock().unwrap();
        let g = &inner.graph;
        let link_count = g.satellite_edge_count();
        let up_link_count = g
            .edges_in_build_order()
            .iter()
            .filter(|(a, b)| g.edge(a, b).map(|e| e.up).unwrap_or(false))
            .count();

        TopoSummary {
            rings: g.rings,
            per_ring: g.per_ring,
            ring_node_lists: g.ring_members.clone(),
            router_count: g.satellite_names().len(),
            link_count,
            up_link_count,
            run_time_seconds: Utc::now().signed_duration_since(inner.started_at).num_seconds(),
            stations: inner.stations.keys().cloned().collect(),
            recent_events: inner.events.iter().cloned().collect(),
            stat_series: inner.stats.iter().cloned().collect(),
        }
    }

    pub fn get_router(&self, name: &str) -> Result<RouterView> {
        let inner = self.inner.lock().unwrap();
        let g = &inner.graph;
        let node = g
            .node(name)
            .ok_or_else(|| RuntimeError::NotFound(format!("router {name}")))?;
        let loopback = node
            .loopback()
            .map(|l| l.to_cidr())
            .unwrap_or_default();

        let build_order = g.edges_in_build_order();
        let mut neighbors = Vec::new();
        for neighbor in g.neighbors(name) {
            let edge = match g.edge(name, &neighbor) {
                Some(e) if !e.pseudo => e,
                _ => continue,
            };
            let name_is_a = build_order.iter().any(|(a, b)| a == name && b == &neighbor);
            let (local_ip, remote_ip, local_intf, remote_intf) =
                if name_is_a {
                    (
                        edge.iface_a.map(|i| i.to_cidr()).unwrap_or_default(),
                        edge.iface_b.map(|i| i.to_cidr()).unwrap_or_default(),
                        edge.intf_name_a.clone().unwrap_or_default(),
                        edge.intf_name_b.clone().unwrap_or_default(),
                    )
                } else {
                    (
                        edge.iface_b.map(|i| i.to_cidr()).unwrap_or_default(),
                        edge.iface_a.map(|i| i.to_cidr()).unwrap_or_default(),
                        edge.intf_name_b.clone().unwrap_or_default(),
                        edge.intf_name_a.clone().unwrap_or_default(),
                    )
                };
            let (up_local, up_remote) = inner
                .backend
                .link_state(name, &neighbor)
                .unwrap_or((edge.up, edge.up));
            neighbors.push(NeighborView {
                name: neighbor,
                local_ip,
                remote_ip,
                local_intf,
                remote_intf,
                up_local,
                up_remote,
            });
        }

        Ok(RouterView {
            name: name.to_string(),
            loopback,
            neighbors,
        })
    }

    pub fn get_station(&self, name: &str) -> Result<StationView> {
        let inner = self.inner.lock().unwrap();
        let g = &inner.graph;
        let node = g
            .node(name)
            .ok_or_else(|| RuntimeError::NotFound(format!("station {name}")))?;
        let (lat, lon) = match node {
            topology::Node::GroundStation(gs) => (gs.latitude_deg, gs.longitude_deg),
            topology::Node::Satellite(_) => {
                return Err(RuntimeError::InvalidState(format!("{name} is not a station")))
            }
        };
        let station = inner
            .stations
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(format!("station {name}")))?;

        let uplinks = station
            .uplinks()
            .iter()
            .map(|u| UplinkView {
                satellite: u.satellite.clone(),
                distance_km: u.distance_km,
                default: u.default,
                ip_pool_entry: station
                    .pool()
                    .entry(u.pool_index)
                    .map(|e| {
                        format!(
                            "{}.{}.{}.{}/{}",
                            (e.network.0 >> 24) & 0xFF,
                            (e.network.0 >> 16) & 0xFF,
                            (e.network.0 >> 8) & 0xFF,
                            e.network.0 & 0xFF,
                            e.network.1
                        )
                    })
                    .unwrap_or_default(),
            })
            .collect();

        Ok(StationView {
            name: name.to_string(),
            latitude_deg: lat,
            longitude_deg: lon,
            uplinks,
        })
    }

    pub fn get_link_state(&self, a: &str, b: &str) -> Result<(bool, bool)> {
        let inner = self.inner.lock().unwrap();
        inner.backend.link_state(a, b)
    }

    pub fn get_node_status_list(&self, name: &str) -> Result<HashMap<String, bool>> {
        let inner = self.inner.lock().unwrap();
        let store = inner
            .probe_stores
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(format!("probe store {name}")))?;
        Ok(store.read().unwrap().status_list())
    }

    pub fn get_last_five_probes(&self) -> HashMap<String, Vec<(String, bool)>> {
        let inner = self.inner.lock().unwrap();
        inner
            .probe_stores
            .iter()
            .map(|(name, store)| (name.clone(), store.read().unwrap().last_five()))
            .collect()
    }

    pub fn get_stat_samples(&self) -> Vec<StatSample> {
        self.inner.lock().unwrap().stats.iter().cloned().collect()
    }

    // -- Mutation operations -------------------------------------------------

    pub fn set_link_state(&self, a: &str, b: &str, up: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.graph.edge(a, b).is_none() {
            return Err(RuntimeError::InvalidState(format!("no edge {a}-{b}")));
        }
        inner.push_event(format!("SetLinkState({a},{b},{up})"));
        let result = inner.backend.configure_link(a, b, up);
        if let Some(edge) = inner.graph.edge_mut(a, b) {
            edge.up = up;
        }
        result.map_err(|e| {
            inner.push_event(format!("backend failure: {e}"));
            RuntimeError::BackendFailure(e.to_string())
        })
    }

    /// Atomic diff-and-apply against `station`'s current uplink set. Holds
    /// the lock for the full reconcile-and-backend-call sequence so the
    /// remove-then-add is observable only as a whole.
    pub fn set_station_uplinks(&self, station: &str, wanted: &[WantedUplink<'_>]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.stations.contains_key(station) {
            return Err(RuntimeError::NotFound(format!("station {station}")));
        }

        let (commands, exhausted) = {
            let entry = inner.stations.get_mut(station).unwrap();
            entry.reconcile(wanted)
        };

        for name in &exhausted {
            inner.push_event(format!("PoolExhausted({station},{name})"));
        }

        for command in &commands {
            apply_uplink_command(&mut inner, station, command)?;
        }

        if exhausted.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::PoolExhausted(exhausted.join(",")))
        }
    }

    /// Sampled once per aggregator cycle: sums every per-node probe store
    /// into one `StatSample` and pushes it onto the bounded ring.
    pub fn sample_stats(&self) -> StatSample {
        let mut inner = self.inner.lock().unwrap();
        let sample = probe::aggregate(&inner.probe_stores, Utc::now());
        inner.stats.push_back(sample);
        while inner.stats.len() > STATS_RING_CAP {
            inner.stats.pop_front();
        }
        sample
    }

    /// Records the per-satellite `inter_plane_ok` transitions for one geo-loop
    /// tick: returns the set of inter-ring edges whose admin state must
    /// flip, without applying them — the caller applies each via
    /// `set_link_state` so the event log and backend calls stay consistent.
    pub fn inter_plane_transitions(&self, latest: &HashMap<String, bool>) -> Vec<(String, String, bool)> {
        let mut inner = self.inner.lock().unwrap();
        let mut flips = Vec::new();
        for (sat, &ok) in latest {
            let prior = inner.inter_plane_state.get(sat).copied();
            if prior != Some(ok) {
                for neighbor in inner.graph.neighbors(sat) {
                    if let Some(edge) = inner.graph.edge(sat, &neighbor) {
                        if edge.inter_ring {
                            flips.push((sat.clone(), neighbor, ok));
                        }
                    }
                }
            }
        }
        for (sat, &ok) in latest {
            inner.inter_plane_state.insert(sat.clone(), ok);
        }
        flips
    }

    pub fn satellite_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().graph.satellite_names()
    }

    pub fn ground_station_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().graph.ground_station_names()
    }

    pub fn satellite_orbit(&self, name: &str) -> Option<orbital_mechanics::OrbitData> {
        let inner = self.inner.lock().unwrap();
        match inner.graph.node(name) {
            Some(topology::Node::Satellite(s)) => Some(s.orbit),
            _ => None,
        }
    }

    pub fn ground_station_coords(&self, name: &str) -> Option<(f64, f64)> {
        let inner = self.inner.lock().unwrap();
        match inner.graph.node(name) {
            Some(topology::Node::GroundStation(g)) => Some((g.latitude_deg, g.longitude_deg)),
            _ => None,
        }
    }

    /// The graph-level inclination, used by the geo-loop's inter-plane
    /// threshold.
    pub fn inclination_deg(&self) -> f64 {
        self.inner.lock().unwrap().graph.inclination_deg
    }

    /// Fixed reference epoch every satellite's orbit is propagated from —
    /// the instant the simulation started.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().started_at
    }

    /// The sampler's shared targets table: every node's `(name,
    /// address, stable)` triple, in build order so different probe workers
    /// rotate over a consistent baseline list.
    pub fn target_list(&self) -> Vec<(String, String, bool)> {
        let inner = self.inner.lock().unwrap();
        let g = &inner.graph;
        let mut out = Vec::new();
        for name in g.satellite_names() {
            if let Some(loopback) = g.node(&name).and_then(|n| n.loopback()) {
                out.push((name, loopback.to_dotted(), true));
            }
        }
        for name in g.ground_station_names() {
            if let Some(loopback) = g.node(&name).and_then(|n| n.loopback()) {
                out.push((name, loopback.to_dotted(), false));
            }
        }
        out
    }
}

fn apply_uplink_command(inner: &mut Inner, station: &str, command: &UplinkCommand) -> Result<()> {
    let station_uplinks = inner.stations.get(station).unwrap();
    match command {
        UplinkCommand::Remove { satellite } => inner
            .backend
            .remove_link(station, satellite)
            .map_err(|e| RuntimeError::BackendFailure(e.to_string())),
        UplinkCommand::Add { satellite, pool_index, .. } => {
            let entry = station_uplinks.pool().entry(*pool_index).copied();
            if let Some(entry) = entry {
                let ip_a = topology::Ipv4Iface::new(entry.ip1.0, entry.ip1.1);
                let ip_b = topology::Ipv4Iface::new(entry.ip2.0, entry.ip2.1);
                let station_loopback = inner
                    .graph
                    .node(station)
                    .and_then(|n| n.loopback())
                    .ok_or_else(|| RuntimeError::NotFound(station.to_string()))?;
                let dest = format!("{}/32", station_loopback.to_dotted());
                inner
                    .backend
                    .add_link(station, satellite, ip_a, ip_b)
                    .and_then(|_| inner.backend.set_static_route(satellite, &dest, ip_a))
                    .map_err(|e| RuntimeError::BackendFailure(e.to_string()))
            } else {
                Ok(())
            }
        }
        UplinkCommand::SetDefault { satellite, pool_index } => {
            let entry = station_uplinks.pool().entry(*pool_index).copied();
            if let Some(entry) = entry {
                let via = topology::Ipv4Iface::new(entry.ip2.0, entry.ip2.1);
                let _ = satellite;
                inner
                    .backend
                    .set_default_route(station, via)
                    .map_err(|e| RuntimeError::BackendFailure(e.to_string()))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StubBackend;
    use orbital_mechanics::CatalogNumbers;
    use topology::TorusGraph;

    fn build_runtime(rings: usize, per_ring: usize) -> (SimRuntime, Arc<StubBackend>) {
        let catalog = CatalogNumbers::default();
        let mut graph = TorusGraph::build(rings, per_ring, true, &catalog).unwrap();
        graph.allocate_addresses();
        graph.render_configs();
        let backend = Arc::new(StubBackend::new());
        let runtime = SimRuntime::new(graph, backend.clone());
        (runtime, backend)
    }

    #[test]
    fn scenario_uplink_add_installs_a_32_route_to_the_station_loopback() {
        let (runtime, backend) = build_runtime(4, 4);

        runtime
            .set_station_uplinks(
                "G_PAO",
                &[WantedUplink { satellite: "R0_0", distance_km: 900 }],
            )
            .unwrap();

        let station_loopback_cidr = {
            let inner = runtime.inner.lock().unwrap();
            let loopback = inner.graph.node("G_PAO").and_then(|n| n.loopback()).unwrap();
            format!("{}/32", loopback.to_dotted())
        };

        let calls = backend.calls();
        let add_link_call = calls
            .iter()
            .find(|c| c.starts_with("AddLink(G_PAO,R0_0,"))
            .expect("expected an AddLink call for the new uplink");
        let route_call = calls
            .iter()
            .find(|c| c.starts_with("SetStaticRoute(R0_0,"))
            .expect("expected a static route installed on the satellite");

        assert!(
            route_call.contains(&station_loopback_cidr),
            "expected the route's destination to be the station's /32 loopback, got: {route_call}"
        );

        let ip_a_cidr = add_link_call
            .trim_start_matches("AddLink(G_PAO,R0_0,")
            .trim_end_matches(')')
            .split(',')
            .next()
            .unwrap();
        assert!(
            route_call.ends_with(&format!(",{ip_a_cidr})")),
            "expected the route's next hop to be the station-side interface ({ip_a_cidr}), got: {route_call}"
        );
    }
}
