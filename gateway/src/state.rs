//! Process wiring: builds the topology, allocates addresses, wraps it in a
//! `SimRuntime`, and spawns the geo-loop, aggregator, and one probe worker
//! per node. `AppState` is the axum `State` every route handler shares.

use crate::config::SimConfig;
use orbital_mechanics::CatalogNumbers;
use sim_runtime::{
    spawn_aggregator, spawn_geo_loop, spawn_probe_worker, GeoLoopConfig, Prober, SimRuntime,
    StubBackend, StubProber, TargetsTable,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use topology::TorusGraph;

const AGGREGATOR_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<SimRuntime>,
    pub shutdown: Arc<AtomicBool>,
    pub shutdown_notify: Arc<Notify>,
}

impl AppState {
    /// Builds the static torus, allocates addresses and renders configs, then
    /// stands up the runtime and its background tasks. The returned
    /// `shutdown` flag is shared with every spawned task and flipped by the
    /// `/shutdown` route.
    pub fn bootstrap(config: &SimConfig) -> anyhow::Result<Self> {
        let catalog = CatalogNumbers::default();
        let mut graph = TorusGraph::build(config.rings, config.routers, config.ground_stations, &catalog)?;
        graph.allocate_addresses();
        graph.render_configs();

        let runtime = Arc::new(SimRuntime::new(graph, Arc::new(StubBackend::new())));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_notify = Arc::new(Notify::new());

        let targets = TargetsTable::new();
        targets.refresh(&runtime);

        let geo_config = GeoLoopConfig {
            min_altitude_deg: config.min_altitude_deg,
            ..GeoLoopConfig::default()
        };
        spawn_geo_loop(runtime.clone(), geo_config, shutdown.clone());
        spawn_aggregator(runtime.clone(), AGGREGATOR_INTERVAL, shutdown.clone());

        let prober: Arc<dyn Prober> = Arc::new(StubProber::new());
        for (name, address, _stable) in runtime.target_list() {
            let store = runtime
                .probe_store(&name)
                .expect("a probe store exists for every node created in SimRuntime::new");
            spawn_probe_worker(address, targets.clone(), store, prober.clone(), shutdown.clone());
        }

        Ok(AppState {
            runtime,
            shutdown,
            shutdown_notify,
        })
    }

    /// Flips the shared shutdown flag every background task polls and wakes
    /// the HTTP server's graceful-shutdown future.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        self.shutdown_notify.notify_waiters();
    }
}
