//! Orbital Mechanics Library
//!
//! Orbit data for torus-constellation satellites, canonical TLE serialization,
//! and an SGP4-backed propagator adapter.

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("propagation failed: {0}")]
    PropagationFailed(String),
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// Injectable monotonic sequence source for catalog numbers.
///
/// Per-run, not a hardcoded global: each test (or each process) creates its
/// own `CatalogNumbers` so state resets between runs.
#[derive(Debug)]
pub struct CatalogNumbers {
    next: AtomicU32,
}

impl CatalogNumbers {
    pub fn starting_at(first: u32) -> Self {
        CatalogNumbers {
            next: AtomicU32::new(first),
        }
    }

    /// Returns the next catalog number and advances the counter. Unique and
    /// monotonically increasing within the lifetime of this instance.
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for CatalogNumbers {
    fn default() -> Self {
        CatalogNumbers::starting_at(1)
    }
}

/// Orbital elements for one satellite, as produced by the torus builder.
/// Eccentricity, argument of perigee, mean motion and drag are canned
/// constants shared by every satellite in a simulated constellation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrbitData {
    pub catalog_number: u32,
    pub inclination_deg: f64,
    pub right_ascension_deg: f64,
    pub mean_anomaly_deg: f64,
}

pub const DEFAULT_INCLINATION_DEG: f64 = 53.9;
const CANNED_ECCENTRICITY: f64 = 0.0001;
const CANNED_ARGUMENT_OF_PERIGEE_DEG: f64 = 0.0;
const CANNED_MEAN_MOTION_ORBITS_DAY: f64 = 15.336;
const CANNED_DRAG_TERM: f64 = 0.0;
const CANNED_MEAN_MOTION_DOT: f64 = 0.0;
const CANNED_MEAN_MOTION_DDOT: f64 = 0.0;

impl OrbitData {
    /// Orbit parameters for the satellite at slot `node` (0-indexed) of
    /// `per_ring` in ring `ring` (0-indexed) of `rings` total rings: right
    /// ascension = 360·ring/rings, mean anomaly = 360·node/per_ring plus a
    /// half-slot stagger on odd rings.
    pub fn for_torus_slot(
        rings: usize,
        per_ring: usize,
        ring: usize,
        node: usize,
        catalog_number: u32,
    ) -> Self {
        let right_ascension_deg = 360.0 * ring as f64 / rings as f64;
        let mut mean_anomaly_deg = 360.0 * node as f64 / per_ring as f64;
        if ring % 2 == 1 {
            mean_anomaly_deg += 180.0 / per_ring as f64;
        }
        OrbitData {
            catalog_number,
            inclination_deg: DEFAULT_INCLINATION_DEG,
            right_ascension_deg: right_ascension_deg % 360.0,
            mean_anomaly_deg: mean_anomaly_deg % 360.0,
        }
    }

    fn to_elements(self, epoch: DateTime<Utc>) -> sgp4::Elements {
        sgp4::Elements {
            object_name: None,
            international_designator: None,
            norad_id: self.catalog_number as u64,
            classification: sgp4::Classification::Unclassified,
            datetime: epoch.naive_utc(),
            mean_motion_dot: CANNED_MEAN_MOTION_DOT,
            mean_motion_ddot: CANNED_MEAN_MOTION_DDOT,
            drag_term: CANNED_DRAG_TERM,
            element_set_number: 1,
            inclination: self.inclination_deg,
            right_ascension: self.right_ascension_deg,
            eccentricity: CANNED_ECCENTRICITY,
            argument_of_perigee: CANNED_ARGUMENT_OF_PERIGEE_DEG,
            mean_anomaly: self.mean_anomaly_deg,
            mean_motion: CANNED_MEAN_MOTION_ORBITS_DAY,
            revolution_number: 1,
            ephemeris_type: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateVector {
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub velocity_z: f64,
    pub epoch: DateTime<Utc>,
}

impl StateVector {
    fn is_finite(&self) -> bool {
        self.position_x.is_finite()
            && self.position_y.is_finite()
            && self.position_z.is_finite()
            && self.velocity_x.is_finite()
            && self.velocity_y.is_finite()
            && self.velocity_z.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}

/// Stateless propagation: TLE inputs plus a timestamp in, position out. The
/// core depends only on this contract; callers must serialize their own
/// access since the underlying sgp4 constants are not reused across calls.
pub fn propagate(orbit: &OrbitData, epoch: DateTime<Utc>, at: DateTime<Utc>) -> Result<StateVector> {
    let elements = orbit.to_elements(epoch);
    let constants = sgp4::Constants::from_elements(&elements)
        .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

    let duration = at.signed_duration_since(epoch);
    let minutes_since_epoch = duration.num_milliseconds() as f64 / 60_000.0;

    let prediction = constants
        .propagate(minutes_since_epoch)
        .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

    let state = StateVector {
        position_x: prediction.position[0],
        position_y: prediction.position[1],
        position_z: prediction.position[2],
        velocity_x: prediction.velocity[0],
        velocity_y: prediction.velocity[1],
        velocity_z: prediction.velocity[2],
        epoch: at,
    };

    if !state.is_finite() {
        return Err(OrbitalError::PropagationFailed(
            "non-finite position components".to_string(),
        ));
    }
    Ok(state)
}

/// Propagate then reduce to a geodetic subpoint in one call, the shape the
/// geo-simulation loop needs every tick.
pub fn subpoint(orbit: &OrbitData, epoch: DateTime<Utc>, at: DateTime<Utc>) -> Result<GeodeticPosition> {
    let state = propagate(orbit, epoch, at)?;
    transforms::eci_to_geodetic(state.position_x, state.position_y, state.position_z)
}

pub mod transforms {
    use super::*;

    const EARTH_RADIUS_KM: f64 = 6378.137;
    const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;

    /// Simplified ECI -> geodetic reduction (ignores Earth rotation, adequate
    /// for the spherical-Earth subpoint approximation the geo-loop needs).
    pub fn eci_to_geodetic(x: f64, y: f64, z: f64) -> Result<GeodeticPosition> {
        let r = (x * x + y * y).sqrt();
        let longitude = y.atan2(x).to_degrees();
        let latitude = z.atan2(r).to_degrees();
        let altitude_km = (x * x + y * y + z * z).sqrt() - EARTH_RADIUS_KM;

        if !latitude.is_finite() || !longitude.is_finite() || !altitude_km.is_finite() {
            return Err(OrbitalError::InvalidCoordinates(
                "non-finite geodetic reduction".to_string(),
            ));
        }

        Ok(GeodeticPosition {
            latitude,
            longitude,
            altitude_km,
        })
    }

    pub fn geodetic_to_eci(pos: &GeodeticPosition) -> Result<(f64, f64, f64)> {
        let lat_rad = pos.latitude.to_radians();
        let lon_rad = pos.longitude.to_radians();
        let alt = pos.altitude_km;

        let n = EARTH_RADIUS_KM / (1.0 - EARTH_FLATTENING * lat_rad.sin().powi(2)).sqrt();

        let x = (n + alt) * lat_rad.cos() * lon_rad.cos();
        let y = (n + alt) * lat_rad.cos() * lon_rad.sin();
        let z = (n * (1.0 - EARTH_FLATTENING) + alt) * lat_rad.sin();

        Ok((x, y, z))
    }
}

/// Canonical two-line element serialization. Fixed column layout, modulo-10
/// checksum over decimal digits (`-` counts as 1). Two TLEs with identical
/// orbital inputs and the same epoch are byte-identical.
pub mod tle {
    use super::*;

    fn checksum(line: &str) -> u8 {
        (line
            .bytes()
            .take(68)
            .map(|b| {
                if b.is_ascii_digit() {
                    (b - b'0') as u16
                } else if b == b'-' {
                    1u16
                } else {
                    0u16
                }
            })
            .sum::<u16>()
            % 10) as u8
    }

    fn line1(catalog_number: u32, epoch: DateTime<Utc>) -> String {
        let epoch_year = (epoch.year() % 100) as u8;
        let epoch_day = epoch.ordinal() as f64
            + epoch.hour() as f64 / 24.0
            + epoch.minute() as f64 / 1440.0
            + epoch.second() as f64 / 86400.0;
        let line = format!(
            "1 {:05}U 00000A   {:02}{:012.8}  .00000000  00000-0  00000-0 0    1",
            catalog_number, epoch_year, epoch_day
        );
        format!("{}{}", line, checksum(&line))
    }

    fn line2(orbit: &OrbitData) -> String {
        let ecc_int = (CANNED_ECCENTRICITY * 10_000_000.0).round() as u64;
        let line = format!(
            "2 {:05} {:>8.4} {:>8.4} {:07} {:>8.4} {:>8.4} {:>11.8}{:05}",
            orbit.catalog_number,
            orbit.inclination_deg,
            orbit.right_ascension_deg,
            ecc_int,
            CANNED_ARGUMENT_OF_PERIGEE_DEG,
            orbit.mean_anomaly_deg,
            CANNED_MEAN_MOTION_ORBITS_DAY,
            1u32,
        );
        format!("{}{}", line, checksum(&line))
    }

    /// Produces a (line1, line2) pair, each 69 characters, for `orbit` at
    /// `epoch`. Deterministic: identical `orbit`+`epoch` always yields
    /// identical output.
    pub fn generate(orbit: &OrbitData, epoch: DateTime<Utc>) -> (String, String) {
        (line1(orbit.catalog_number, epoch), line2(orbit))
    }

    pub fn line_checksum(line: &str) -> u8 {
        checksum(line)
    }

    #[allow(dead_code)]
    fn epoch_from_naive(naive: NaiveDateTime) -> DateTime<Utc> {
        DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tle_lines_are_69_chars_and_checksum_matches_trailing_digit() {
        let orbit = OrbitData::for_torus_slot(4, 4, 1, 2, 12345);
        let epoch = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let (l1, l2) = tle::generate(&orbit, epoch);
        assert_eq!(l1.len(), 69);
        assert_eq!(l2.len(), 69);

        let expected1 = tle::line_checksum(&l1[..68]);
        let actual1 = l1.chars().last().unwrap().to_digit(10).unwrap() as u8;
        assert_eq!(expected1, actual1);

        let expected2 = tle::line_checksum(&l2[..68]);
        let actual2 = l2.chars().last().unwrap().to_digit(10).unwrap() as u8;
        assert_eq!(expected2, actual2);
    }

    #[test]
    fn identical_inputs_produce_byte_identical_tles() {
        let orbit = OrbitData::for_torus_slot(4, 4, 0, 0, 1);
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let a = tle::generate(&orbit, epoch);
        let b = tle::generate(&orbit, epoch);
        assert_eq!(a, b);
    }

    #[test]
    fn catalog_numbers_are_monotonic_and_unique() {
        let counter = CatalogNumbers::starting_at(1);
        let values: Vec<u32> = (0..10).map(|_| counter.next()).collect();
        let mut sorted = values.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), values.len());
        assert!(values.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn propagate_round_trips_to_finite_subpoint() {
        let orbit = OrbitData::for_torus_slot(4, 4, 0, 0, 1);
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let at = epoch + chrono::Duration::seconds(600);
        let pos = subpoint(&orbit, epoch, at).expect("propagation should succeed");
        assert!(pos.latitude.is_finite());
        assert!(pos.longitude.is_finite());
    }

    #[test]
    fn odd_ring_mean_anomaly_is_staggered() {
        let even = OrbitData::for_torus_slot(4, 4, 0, 0, 1);
        let odd = OrbitData::for_torus_slot(4, 4, 1, 0, 2);
        assert_eq!(even.mean_anomaly_deg, 0.0);
        assert_eq!(odd.mean_anomaly_deg, 45.0);
    }
}
