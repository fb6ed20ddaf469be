//! Configuration loading: a small TOML file with `network.*`, `monitor.*`,
//! and `physical.*` sections, deserialized with `serde` and validated
//! against the torus builder's `[1,30]` dimension range.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RawSimConfig {
    network: RawNetwork,
    #[serde(default)]
    monitor: RawMonitor,
    #[serde(default)]
    physical: RawPhysical,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNetwork {
    rings: usize,
    routers: usize,
    #[serde(default)]
    ground_stations: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMonitor {
    #[serde(default = "default_true")]
    stable_monitors: bool,
}

impl Default for RawMonitor {
    fn default() -> Self {
        RawMonitor {
            stable_monitors: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct RawPhysical {
    #[serde(default = "default_min_altitude")]
    min_altitude: f64,
}

impl Default for RawPhysical {
    fn default() -> Self {
        RawPhysical {
            min_altitude: default_min_altitude(),
        }
    }
}

fn default_min_altitude() -> f64 {
    35.0
}

/// The process's validated configuration. `rings`/`routers` feed the torus
/// builder; `ground_stations` gates `include_ground`; `stable_monitors` is
/// carried through for a monitor-mode toggle this core doesn't yet act on —
/// the sampler always partitions stable targets separately; `min_altitude`
/// feeds the geo-loop's uplink admission threshold.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    pub rings: usize,
    pub routers: usize,
    pub ground_stations: bool,
    pub stable_monitors: bool,
    pub min_altitude_deg: f64,
}

impl SimConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawSimConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSimConfig) -> Result<Self, ConfigError> {
        if !(1..=30).contains(&raw.network.rings) {
            return Err(ConfigError::Invalid(format!(
                "network.rings must be in [1,30], got {}",
                raw.network.rings
            )));
        }
        if !(1..=30).contains(&raw.network.routers) {
            return Err(ConfigError::Invalid(format!(
                "network.routers must be in [1,30], got {}",
                raw.network.routers
            )));
        }

        Ok(SimConfig {
            rings: raw.network.rings,
            routers: raw.network.routers,
            ground_stations: raw.network.ground_stations,
            stable_monitors: raw.monitor.stable_monitors,
            min_altitude_deg: raw.physical.min_altitude,
        })
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            rings: 4,
            routers: 4,
            ground_stations: true,
            stable_monitors: true,
            min_altitude_deg: 35.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let raw: RawSimConfig = toml::from_str(
            r#"
            [network]
            rings = 6
            routers = 8
            ground_stations = true
            "#,
        )
        .unwrap();
        let config = SimConfig::from_raw(raw).unwrap();
        assert_eq!(config.rings, 6);
        assert_eq!(config.routers, 8);
        assert!(config.ground_stations);
        assert_eq!(config.min_altitude_deg, 35.0);
    }

    #[test]
    fn rejects_out_of_range_rings() {
        let raw: RawSimConfig = toml::from_str(
            r#"
            [network]
            rings = 31
            routers = 4
            "#,
        )
        .unwrap();
        assert!(SimConfig::from_raw(raw).is_err());
    }
}
