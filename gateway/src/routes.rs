//! The control API: every handler returns HTTP 200 with either the requested
//! payload or `{"error": "..."}` in the body — clients distinguish success
//! from failure by the presence of the `error` key, not by status code.

use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::Json;
use ground_stations::WantedUplink;
use serde::Deserialize;
use serde_json::{json, Value};
use sim_runtime::RuntimeError;

fn ok<T: serde::Serialize>(value: T) -> Json<Value> {
    Json(serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() })))
}

fn err(e: RuntimeError) -> Json<Value> {
    Json(json!({ "error": e.to_string() }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn index(State(state): State<AppState>) -> Json<Value> {
    ok(state.runtime.get_topo_summary())
}

pub async fn view_router(State(state): State<AppState>, Path(name): Path<String>) -> Json<Value> {
    match state.runtime.get_router(&name) {
        Ok(view) => ok(view),
        Err(e) => err(e),
    }
}

pub async fn view_station(State(state): State<AppState>, Path(name): Path<String>) -> Json<Value> {
    match state.runtime.get_station(&name) {
        Ok(view) => ok(view),
        Err(e) => err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub node1_name: String,
    pub node2_name: String,
    pub up: bool,
}

pub async fn set_link(State(state): State<AppState>, Json(req): Json<LinkRequest>) -> Json<Value> {
    match state
        .runtime
        .set_link_state(&req.node1_name, &req.node2_name, req.up)
    {
        Ok(()) => Json(json!({ "status": "OK" })),
        Err(e) => err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UplinkRequest {
    pub sat_node: String,
    pub distance: u32,
}

#[derive(Debug, Deserialize)]
pub struct UplinksRequest {
    pub ground_node: String,
    pub uplinks: Vec<UplinkRequest>,
}

pub async fn set_uplinks(State(state): State<AppState>, Json(req): Json<UplinksRequest>) -> Json<Value> {
    let wanted: Vec<WantedUplink<'_>> = req
        .uplinks
        .iter()
        .map(|w| WantedUplink {
            satellite: w.sat_node.as_str(),
            distance_km: w.distance,
        })
        .collect();
    match state.runtime.set_station_uplinks(&req.ground_node, &wanted) {
        Ok(()) => Json(json!({ "status": "OK" })),
        Err(e) => err(e),
    }
}

pub async fn stats_total(State(state): State<AppState>) -> Json<Value> {
    match state.runtime.get_stat_samples().last() {
        Some(sample) => ok(json!({
            "good_count": sample.stable_ok + sample.dynamic_ok,
            "total_count": sample.stable_total + sample.dynamic_total,
        })),
        None => ok(json!({ "good_count": 0, "total_count": 0 })),
    }
}

pub async fn shutdown(State(state): State<AppState>) -> Json<Value> {
    state.request_shutdown();
    Json(json!({ "status": "shutting down" }))
}
