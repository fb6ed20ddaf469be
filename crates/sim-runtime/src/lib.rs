//! Control-plane state, geo-simulation loop, and liveness sampler: a
//! single-writer `SimRuntime` guarding the topology graph and per-node probe
//! stores, the background tick driver that keeps orbits and link state
//! moving, and the sampler that turns probe results into periodic
//! `StatSample`s.

pub mod backend;
pub mod error;
pub mod geoloop;
pub mod probe;
pub mod runtime;
pub mod sampler;

pub use backend::{Backend, StubBackend};
pub use error::{Result, RuntimeError};
pub use geoloop::{run_geo_tick, spawn_geo_loop, GeoLoopConfig};
pub use probe::{ProbeStore, StatSample, Target};
pub use runtime::{EventLogEntry, RouterView, SimRuntime, StationView, TopoSummary, UplinkView};
pub use sampler::{spawn_aggregator, spawn_probe_worker, Prober, StubProber, TargetsTable};
