//! Liveness sampler: each probe worker owns its own in-memory store; the
//! aggregator reads every store through a typed snapshot rather than a
//! shared external file.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

/// A probe target: `(name, address, stable)` from the shared targets table,
/// plus the lifecycle flags that govern a worker's state machine.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub address: String,
    pub stable: bool,
    pub can_run: bool,
}

#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub name: String,
    pub stable: bool,
    pub responded: bool,
    pub sample_time: DateTime<Utc>,
    pub total_count: u64,
    pub total_success: u64,
}

/// A single probe worker's store, keyed by target address. `last_five` is a
/// small rolling window of the most recent probe outcomes, independent of
/// per-target counters.
#[derive(Debug, Default)]
pub struct ProbeStore {
    entries: HashMap<String, ProbeRecord>,
    last_five: VecDeque<(String, bool)>,
}

const LAST_FIVE_CAP: usize = 5;

impl ProbeStore {
    pub fn new() -> Self {
        ProbeStore::default()
    }

    /// Records the outcome of probing `target`, first-class data even on
    /// failure: a transient probe failure is never propagated as an error,
    /// only recorded.
    pub fn record(&mut self, target: &Target, responded: bool, at: DateTime<Utc>) {
        let entry = self
            .entries
            .entry(target.address.clone())
            .or_insert_with(|| ProbeRecord {
                name: target.name.clone(),
                stable: target.stable,
                responded: false,
                sample_time: at,
                total_count: 0,
                total_success: 0,
            });
        entry.responded = responded;
        entry.sample_time = at;
        entry.total_count += 1;
        if responded {
            entry.total_success += 1;
        }

        self.last_five.push_front((target.name.clone(), responded));
        while self.last_five.len() > LAST_FIVE_CAP {
            self.last_five.pop_back();
        }
    }

    pub fn status_list(&self) -> HashMap<String, bool> {
        self.entries
            .values()
            .filter(|e| e.total_count > 0)
            .map(|e| (e.name.clone(), e.responded))
            .collect()
    }

    pub fn last_five(&self) -> Vec<(String, bool)> {
        self.last_five.iter().cloned().collect()
    }

    /// `(good, total)` sampled entries, optionally restricted to `stable`
    /// targets (mirrors `pmonitor.get_status_count`).
    pub fn status_count(&self, stable_only: Option<bool>) -> (u64, u64) {
        let mut good = 0;
        let mut total = 0;
        for e in self.entries.values() {
            if let Some(want_stable) = stable_only {
                if e.stable != want_stable {
                    continue;
                }
            }
            if e.total_count == 0 {
                continue;
            }
            total += 1;
            if e.responded {
                good += 1;
            }
        }
        (good, total)
    }
}

/// One aggregated sample. Produced at the aggregator's coarser cadence
/// (default 20s) by summing every currently-registered probe store.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct StatSample {
    pub timestamp: i64,
    pub stable_ok: u64,
    pub stable_total: u64,
    pub dynamic_ok: u64,
    pub dynamic_total: u64,
}

/// Sums every registered probe store, partitioned stable (satellite) vs
/// dynamic (ground-station). A node whose worker isn't currently
/// registered (e.g. stopped or never started) contributes nothing — this is
/// how an unreachable/down node drops out of both its own outbound count and
/// the `total` denominator.
pub fn aggregate(stores: &HashMap<String, Arc<RwLock<ProbeStore>>>, now: DateTime<Utc>) -> StatSample {
    let mut stable_ok = 0;
    let mut stable_total = 0;
    let mut dynamic_ok = 0;
    let mut dynamic_total = 0;

    for store in stores.values() {
        let guard = store.read().unwrap();
        let (so, st) = guard.status_count(Some(true));
        let (do_, dt) = guard.status_count(Some(false));
        stable_ok += so;
        stable_total += st;
        dynamic_ok += do_;
        dynamic_total += dt;
    }

    StatSample {
        timestamp: now.timestamp(),
        stable_ok,
        stable_total,
        dynamic_ok,
        dynamic_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, address: &str) -> Target {
        Target {
            name: name.to_string(),
            address: address.to_string(),
            stable: true,
            can_run: true,
        }
    }

    #[test]
    fn scenario_probe_aggregation() {
        let now = Utc::now();
        let mut stores: HashMap<String, Arc<RwLock<ProbeStore>>> = HashMap::new();

        let nodes = ["A", "B", "C", "D"];
        let unreachable = "E";

        for &node in &nodes {
            let mut store = ProbeStore::new();
            for &peer in nodes.iter().filter(|&&p| p != node) {
                store.record(&target(peer, peer), true, now);
            }
            store.record(&target(unreachable, unreachable), false, now);
            stores.insert(node.to_string(), Arc::new(RwLock::new(store)));
        }

        let sample = aggregate(&stores, now);
        assert_eq!(sample.stable_ok, 12);
        assert_eq!(sample.stable_total, 16);
    }

    #[test]
    fn last_five_caps_at_five_entries() {
        let mut store = ProbeStore::new();
        for i in 0..8 {
            store.record(&target("peer", "10.0.0.1"), i % 2 == 0, Utc::now());
        }
        assert_eq!(store.last_five().len(), 5);
    }
}
