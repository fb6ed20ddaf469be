//! Ground Stations Library
//!
//! Ground-station IP-address pool and uplink bookkeeping: pool allocation,
//! release, and default-route selection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StationError {
    #[error("station not found: {0}")]
    NotFound(String),
    #[error("IP pool exhausted for station {0}")]
    PoolExhausted(String),
}

pub type Result<T> = std::result::Result<T, StationError>;

/// Fixed /30 subnet reserved by the allocator for on-demand uplinks.
/// `ip1` faces the ground station, `ip2` faces the satellite side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolEntry {
    pub network: (u32, u8),
    pub ip1: (u32, u8),
    pub ip2: (u32, u8),
    pub used: bool,
}

/// A station's fixed-size pool of /30 subnets (default size 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPool {
    entries: Vec<PoolEntry>,
}

impl IpPool {
    pub fn new(entries: Vec<PoolEntry>) -> Self {
        IpPool { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn used_count(&self) -> usize {
        self.entries.iter().filter(|e| e.used).count()
    }

    /// Reserves the first free entry, marking it used. Returns its index.
    pub fn allocate(&mut self) -> Option<usize> {
        let idx = self.entries.iter().position(|e| !e.used)?;
        self.entries[idx].used = true;
        Some(idx)
    }

    /// Releases a previously-allocated entry.
    pub fn release(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.used = false;
        }
    }

    pub fn entry(&self, index: usize) -> Option<&PoolEntry> {
        self.entries.get(index)
    }
}

/// A runtime-only uplink from a ground station to an overhead satellite
/// Created and destroyed by the geo-loop via `SetStationUplinks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uplink {
    pub satellite: String,
    pub distance_km: u32,
    pub pool_index: usize,
    pub default: bool,
}

/// A desired uplink from the geo-loop's candidate evaluation, not yet
/// reconciled against the station's current uplink set.
#[derive(Debug, Clone, Copy)]
pub struct WantedUplink<'a> {
    pub satellite: &'a str,
    pub distance_km: u32,
}

/// Commands the diff-and-apply step emits for the backend; `SimRuntime`
/// translates each into a `Backend` trait call.
#[derive(Debug, Clone, PartialEq)]
pub enum UplinkCommand {
    Remove { satellite: String },
    Add { satellite: String, pool_index: usize, distance_km: u32 },
    SetDefault { satellite: String, pool_index: usize },
}

/// Per-station uplink set plus its IP pool, owned by `SimRuntime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationUplinks {
    pool: IpPool,
    uplinks: Vec<Uplink>,
}

impl StationUplinks {
    pub fn new(pool: IpPool) -> Self {
        StationUplinks {
            pool,
            uplinks: Vec::new(),
        }
    }

    pub fn uplinks(&self) -> &[Uplink] {
        &self.uplinks
    }

    pub fn pool(&self) -> &IpPool {
        &self.pool
    }

    /// Reconciles the current uplink set against `wanted`, in iteration
    /// order:
    ///   1. remove every uplink whose satellite is absent from `wanted`,
    ///      releasing its pool entry — removals always precede additions;
    ///   2. add every wanted satellite not currently linked, allocating a
    ///      pool entry; a pool exhaustion is logged and skipped, not fatal;
    ///   3. after each addition, recompute the default (strict-less-than:
    ///      a new minimum only replaces an existing default if it is
    ///      strictly closer; a tie leaves the existing default in place).
    ///
    /// Returns the ordered list of commands for the backend, and the names
    /// of satellites skipped for pool exhaustion.
    pub fn reconcile(&mut self, wanted: &[WantedUplink<'_>]) -> (Vec<UplinkCommand>, Vec<String>) {
        let mut commands = Vec::new();
        let mut exhausted = Vec::new();

        let wanted_names: Vec<&str> = wanted.iter().map(|w| w.satellite).collect();
        let mut removed_default = false;
        let to_remove: Vec<usize> = self
            .uplinks
            .iter()
            .enumerate()
            .filter(|(_, u)| !wanted_names.contains(&u.satellite.as_str()))
            .map(|(i, _)| i)
            .collect();

        for &idx in to_remove.iter().rev() {
            let removed = self.uplinks.remove(idx);
            self.pool.release(removed.pool_index);
            if removed.default {
                removed_default = true;
            }
            commands.push(UplinkCommand::Remove {
                satellite: removed.satellite,
            });
        }

        if removed_default {
            if let Some(first) = self.uplinks.first_mut() {
                first.default = false;
            }
        }

        for w in wanted {
            if self.uplinks.iter().any(|u| u.satellite == w.satellite) {
                continue;
            }
            match self.pool.allocate() {
                Some(pool_index) => {
                    self.uplinks.push(Uplink {
                        satellite: w.satellite.to_string(),
                        distance_km: w.distance_km,
                        pool_index,
                        default: false,
                    });
                    commands.push(UplinkCommand::Add {
                        satellite: w.satellite.to_string(),
                        pool_index,
                        distance_km: w.distance_km,
                    });
                    if let Some(cmd) = self.update_default() {
                        commands.push(cmd);
                    }
                }
                None => exhausted.push(w.satellite.to_string()),
            }
        }

        if removed_default {
            if let Some(cmd) = self.update_default() {
                commands.push(cmd);
            }
        }

        (commands, exhausted)
    }

    /// Picks the minimum-distance uplink (first occurrence wins ties);
    /// replaces the current default only if strictly closer, or if there
    /// was no default before. Returns a `SetDefault` command on change.
    fn update_default(&mut self) -> Option<UplinkCommand> {
        let current_default_distance = self
            .uplinks
            .iter()
            .find(|u| u.default)
            .map(|u| u.distance_km);

        let min_index = self
            .uplinks
            .iter()
            .enumerate()
            .min_by_key(|(i, u)| (u.distance_km, *i))
            .map(|(i, _)| i)?;

        let min_distance = self.uplinks[min_index].distance_km;
        let should_replace = match current_default_distance {
            None => true,
            Some(d) => min_distance < d,
        };

        if !should_replace || self.uplinks[min_index].default {
            return None;
        }

        for u in self.uplinks.iter_mut() {
            u.default = false;
        }
        self.uplinks[min_index].default = true;

        Some(UplinkCommand::SetDefault {
            satellite: self.uplinks[min_index].satellite.clone(),
            pool_index: self.uplinks[min_index].pool_index,
        })
    }
}

/// A canonical ground station, used when the builder's `include_ground`
/// option is set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CanonicalStation {
    pub name: &'static str,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

/// The four fixed stations added when `include_ground=true`.
pub const CANONICAL_STATIONS: [CanonicalStation; 4] = [
    CanonicalStation {
        name: "G_PAO",
        latitude_deg: 37.4275,
        longitude_deg: -122.1697,
    },
    CanonicalStation {
        name: "G_KOU",
        latitude_deg: 5.2378,
        longitude_deg: -52.7683,
    },
    CanonicalStation {
        name: "G_SVB",
        latitude_deg: 78.2232,
        longitude_deg: 15.3894,
    },
    CanonicalStation {
        name: "G_HNL",
        latitude_deg: 21.3069,
        longitude_deg: -157.8583,
    },
];

pub const DEFAULT_POOL_SIZE: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u32) -> PoolEntry {
        PoolEntry {
            network: (n, 30),
            ip1: (n + 1, 30),
            ip2: (n + 2, 30),
            used: false,
        }
    }

    fn pool4() -> IpPool {
        IpPool::new(vec![entry(0), entry(4), entry(8), entry(12)])
    }

    #[test]
    fn allocate_and_release_round_trip() {
        let mut pool = pool4();
        let i = pool.allocate().unwrap();
        assert_eq!(pool.used_count(), 1);
        pool.release(i);
        assert_eq!(pool.used_count(), 0);
    }

    #[test]
    fn allocate_fails_when_exhausted() {
        let mut pool = IpPool::new(vec![entry(0)]);
        assert!(pool.allocate().is_some());
        assert!(pool.allocate().is_none());
    }

    #[test]
    fn scenario_uplink_churn_and_default_route() {
        let mut station = StationUplinks::new(pool4());

        let (cmds, exhausted) = station.reconcile(&[
            WantedUplink { satellite: "S1", distance_km: 900 },
            WantedUplink { satellite: "S2", distance_km: 500 },
        ]);
        assert!(exhausted.is_empty());
        assert_eq!(station.uplinks().len(), 2);
        assert_eq!(station.pool().used_count(), 2);
        let default = station.uplinks().iter().find(|u| u.default).unwrap();
        assert_eq!(default.satellite, "S2");
        assert!(matches!(cmds[0], UplinkCommand::Add { ref satellite, .. } if satellite == "S1"));
        assert!(matches!(cmds[1], UplinkCommand::SetDefault { ref satellite, .. } if satellite == "S1"));
        assert!(matches!(cmds[2], UplinkCommand::Add { ref satellite, .. } if satellite == "S2"));
        assert!(matches!(cmds[3], UplinkCommand::SetDefault { ref satellite, .. } if satellite == "S2"));

        let (_cmds2, exhausted2) = station.reconcile(&[
            WantedUplink { satellite: "S2", distance_km: 500 },
            WantedUplink { satellite: "S3", distance_km: 300 },
        ]);
        assert!(exhausted2.is_empty());
        assert_eq!(station.uplinks().len(), 2);
        let default = station.uplinks().iter().find(|u| u.default).unwrap();
        assert_eq!(default.satellite, "S3");
        assert_eq!(station.pool().used_count(), 2);
    }

    #[test]
    fn pool_exhaustion_still_applies_removals() {
        let mut station = StationUplinks::new(IpPool::new(vec![entry(0), entry(4), entry(8), entry(12)]));
        station.reconcile(&[
            WantedUplink { satellite: "S1", distance_km: 100 },
            WantedUplink { satellite: "S2", distance_km: 200 },
            WantedUplink { satellite: "S3", distance_km: 300 },
            WantedUplink { satellite: "S4", distance_km: 400 },
        ]);
        assert_eq!(station.pool().used_count(), 4);

        let (_cmds, exhausted) = station.reconcile(&[
            WantedUplink { satellite: "S1", distance_km: 100 },
            WantedUplink { satellite: "S2", distance_km: 200 },
            WantedUplink { satellite: "S3", distance_km: 300 },
            WantedUplink { satellite: "S4", distance_km: 400 },
            WantedUplink { satellite: "S5", distance_km: 500 },
        ]);
        assert_eq!(exhausted, vec!["S5".to_string()]);
        assert_eq!(station.uplinks().len(), 4);
        assert_eq!(station.pool().used_count(), 4);
    }

    #[test]
    fn tied_distance_keeps_first_in_iteration_order() {
        let mut station = StationUplinks::new(pool4());
        station.reconcile(&[
            WantedUplink { satellite: "S1", distance_km: 500 },
            WantedUplink { satellite: "S2", distance_km: 500 },
        ]);
        let default = station.uplinks().iter().find(|u| u.default).unwrap();
        assert_eq!(default.satellite, "S1");
    }
}
