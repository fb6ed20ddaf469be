//! Geo-simulation loop: propagate every satellite, evaluate inter-plane
//! link visibility and ground-station uplink candidates, then apply the
//! diff back through the same `SimRuntime` operations the control API uses.

use crate::runtime::SimRuntime;
use chrono::{DateTime, Utc};
use ground_stations::WantedUplink;
use orbital_mechanics::subpoint;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use topology::{calculate_look_angles, within_bounding_box};

/// Tunables for the geo-loop, including the configured `physical.min_altitude`.
#[derive(Debug, Clone, Copy)]
pub struct GeoLoopConfig {
    pub time_slice: StdDuration,
    pub min_altitude_deg: f64,
    pub bounding_margin_deg: f64,
}

impl Default for GeoLoopConfig {
    fn default() -> Self {
        GeoLoopConfig {
            time_slice: StdDuration::from_secs(10),
            min_altitude_deg: 35.0,
            bounding_margin_deg: 20.0,
        }
    }
}

/// One geo-loop tick, factored out of the sleeping driver so tests and the
/// HTTP layer can drive it directly at an arbitrary timestamp without
/// waiting on wall-clock sleeps.
pub fn run_geo_tick(runtime: &SimRuntime, epoch: DateTime<Utc>, at: DateTime<Utc>, config: &GeoLoopConfig) {
    let inclination = runtime.inclination_deg();
    let satellite_names = runtime.satellite_names();

    // Step 1: propagate every satellite. NaN/propagation-failure results are
    // filtered out and simply skip that satellite this tick.
    let mut subpoints: HashMap<String, (f64, f64, f64)> = HashMap::with_capacity(satellite_names.len());
    for name in &satellite_names {
        let orbit = match runtime.satellite_orbit(name) {
            Some(o) => o,
            None => continue,
        };
        match subpoint(&orbit, epoch, at) {
            Ok(pos) => {
                subpoints.insert(name.clone(), (pos.latitude, pos.longitude, pos.altitude_km));
            }
            Err(e) => {
                tracing::warn!(satellite = %name, error = %e, "propagation failed, skipping this tick");
            }
        }
    }

    // Step 2: inter-plane link evaluation and transition diffing.
    let mut inter_plane_ok = HashMap::with_capacity(subpoints.len());
    for (name, (lat, _lon, _alt)) in &subpoints {
        inter_plane_ok.insert(name.clone(), lat.abs() <= inclination - 2.0);
    }
    let flips = runtime.inter_plane_transitions(&inter_plane_ok);
    for (a, b, up) in flips {
        if let Err(e) = runtime.set_link_state(&a, &b, up) {
            tracing::warn!(a = %a, b = %b, error = %e, "SetLinkState failed during geo-loop tick");
        }
    }

    // Steps 3-4: per-station uplink candidate evaluation and diff-apply.
    for station in runtime.ground_station_names() {
        let (gs_lat, gs_lon) = match runtime.ground_station_coords(&station) {
            Some(c) => c,
            None => continue,
        };

        let mut candidates: Vec<WantedUplink<'_>> = Vec::new();
        for name in &satellite_names {
            let (sat_lat, sat_lon, sat_alt) = match subpoints.get(name) {
                Some(p) => *p,
                None => continue,
            };
            if !within_bounding_box(gs_lat, gs_lon, sat_lat, sat_lon, config.bounding_margin_deg) {
                continue;
            }
            let angles = calculate_look_angles(gs_lat, gs_lon, 0.0, sat_lat, sat_lon, sat_alt);
            if angles.elevation_deg >= config.min_altitude_deg {
                candidates.push(WantedUplink {
                    satellite: name.as_str(),
                    distance_km: angles.range_km.round() as u32,
                });
            }
        }

        if let Err(e) = runtime.set_station_uplinks(&station, &candidates) {
            tracing::warn!(station = %station, error = %e, "SetStationUplinks reported an error during geo-loop tick");
        }
    }
}

/// Spawns the geo-loop as a dedicated background task: sleeps until the
/// wall-clock arrival of each tick's target timestamp, never relative to the
/// previous sleep's return. A tick that overruns `time_slice` skips the
/// sleep and proceeds immediately with no backlog — `last_tick` always
/// advances by exactly one `time_slice`.
pub fn spawn_geo_loop(
    runtime: Arc<SimRuntime>,
    config: GeoLoopConfig,
    shutdown: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let epoch = runtime.epoch();
        let slice = chrono::Duration::from_std(config.time_slice).unwrap_or(chrono::Duration::seconds(10));
        let mut last_tick = Utc::now();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!("geo-loop exiting at tick boundary");
                break;
            }

            let target = last_tick + slice;
            tracing::debug!(target = %target, "geo-loop tick");
            run_geo_tick(&runtime, epoch, target, &config);

            let now = Utc::now();
            if target > now {
                if let Ok(remaining) = (target - now).to_std() {
                    tokio::time::sleep(remaining).await;
                }
            } else {
                tracing::debug!("geo-loop tick overran time_slice, proceeding without sleep");
            }
            last_tick = target;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StubBackend;
    use orbital_mechanics::CatalogNumbers;
    use topology::TorusGraph;

    fn build_runtime(rings: usize, per_ring: usize) -> SimRuntime {
        let catalog = CatalogNumbers::default();
        let mut graph = TorusGraph::build(rings, per_ring, true, &catalog).unwrap();
        graph.allocate_addresses();
        graph.render_configs();
        SimRuntime::new(graph, Arc::new(StubBackend::new()))
    }

    #[test]
    fn scenario_inter_plane_down_above_threshold() {
        let runtime = build_runtime(4, 4);

        // First call seeds the baseline (every satellite within range);
        // the resulting flips are setup noise, not a tested transition.
        let mut ok = HashMap::new();
        for name in runtime.satellite_names() {
            ok.insert(name, true);
        }
        let _ = runtime.inter_plane_transitions(&ok);

        // R0_0 crosses the threshold: its two inter-ring edges must flip down.
        let mut ok2 = ok.clone();
        ok2.insert("R0_0".to_string(), false);
        let flips = runtime.inter_plane_transitions(&ok2);
        assert_eq!(flips.len(), 2);
        for (a, b, up) in &flips {
            assert_eq!(a, "R0_0");
            assert!(!up);
            assert!(b == "R1_0" || b == "R3_0");
        }

        // Coming back within range reverses both transitions.
        let flips_back = runtime.inter_plane_transitions(&ok);
        assert_eq!(flips_back.len(), 2);
        for (a, _b, up) in &flips_back {
            assert_eq!(a, "R0_0");
            assert!(*up);
        }
    }

    #[test]
    fn run_geo_tick_does_not_panic_on_a_fresh_graph() {
        let runtime = build_runtime(3, 3);
        let epoch = runtime.epoch();
        let config = GeoLoopConfig::default();
        run_geo_tick(&runtime, epoch, epoch + chrono::Duration::seconds(10), &config);
    }
}
