// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Aircraft tracking and state management.
//!
//! This module maintains the per-session track table: one [`Aircraft`] per ICAO
//! address, updated in place from record batches, with a bounded position trail
//! and eviction of aircraft that have dropped out of the feed.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use log::debug;

use crate::protocol::AircraftRecord;

/// Earth's radius in nautical miles.
const EARTH_RADIUS_NM: f64 = 3440.065;

/// Calculate distance in nautical miles between two lat/lon points using the
/// Haversine formula.
#[must_use]
pub fn haversine_distance_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_NM * c
}

/// A single trail sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionPoint {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aircraft data.
#[derive(Debug, Clone)]
pub struct Aircraft {
    /// ICAO 24-bit address (hex string, upper-cased).
    pub icao: String,
    /// Aircraft callsign.
    pub callsign: Option<String>,
    /// Current latitude in degrees.
    pub latitude: Option<f64>,
    /// Current longitude in degrees.
    pub longitude: Option<f64>,
    /// Current barometric altitude in feet.
    pub altitude: Option<i32>,
    /// Track angle in degrees (0-360, north = 0).
    pub track: Option<f64>,
    /// Ground speed in knots.
    pub ground_speed: Option<f64>,
    /// Vertical rate in feet per minute.
    pub vertical_rate: Option<i32>,
    pub squawk: Option<String>,
    pub registration: Option<String>,
    pub aircraft_type: Option<String>,
    pub on_ground: bool,
    /// Timestamp of the last record applied to this aircraft.
    pub last_seen: DateTime<Utc>,
    /// Position history for trail rendering, oldest first.
    pub position_history: VecDeque<PositionPoint>,
}

impl Aircraft {
    fn new(icao: String, now: DateTime<Utc>) -> Self {
        Self {
            icao,
            callsign: None,
            latitude: None,
            longitude: None,
            altitude: None,
            track: None,
            ground_speed: None,
            vertical_rate: None,
            squawk: None,
            registration: None,
            aircraft_type: None,
            on_ground: false,
            last_seen: now,
            position_history: VecDeque::new(),
        }
    }

    /// Current position, if one has been reported.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Calculate distance in nautical miles from a given point to this aircraft.
    #[must_use]
    pub fn distance_from_nm(&self, from_lat: f64, from_lon: f64) -> Option<f64> {
        self.position()
            .map(|(lat, lon)| haversine_distance_nm(from_lat, from_lon, lat, lon))
    }

    /// Merge the fields present in `record`; absent fields keep their value.
    fn merge(&mut self, record: &AircraftRecord) {
        if let Some((lat, lon)) = record.position {
            self.latitude = Some(lat);
            self.longitude = Some(lon);
        }
        if record.altitude.is_some() {
            self.altitude = record.altitude;
        }
        if record.ground_speed.is_some() {
            self.ground_speed = record.ground_speed;
        }
        if record.track.is_some() {
            self.track = record.track;
        }
        if record.vertical_rate.is_some() {
            self.vertical_rate = record.vertical_rate;
        }
        if record.callsign.is_some() {
            self.callsign.clone_from(&record.callsign);
        }
        if record.squawk.is_some() {
            self.squawk.clone_from(&record.squawk);
        }
        if record.registration.is_some() {
            self.registration.clone_from(&record.registration);
        }
        if record.aircraft_type.is_some() {
            self.aircraft_type.clone_from(&record.aircraft_type);
        }
        if let Some(on_ground) = record.on_ground {
            self.on_ground = on_ground;
        }
    }

    /// Append a trail point if it is far enough from the last one.
    fn record_trail_point(
        &mut self,
        lat: f64,
        lon: f64,
        now: DateTime<Utc>,
        min_distance_nm: f64,
        max_len: usize,
    ) {
        let (should_add, timestamp) = match self.position_history.back() {
            None => (true, now),
            Some(last) => (
                haversine_distance_nm(last.lat, last.lon, lat, lon) > min_distance_nm,
                now.max(last.timestamp),
            ),
        };

        if should_add {
            self.position_history.push_back(PositionPoint {
                lat,
                lon,
                timestamp,
            });
            while self.position_history.len() > max_len {
                self.position_history.pop_front();
            }
        }
    }
}

/// How the table treats aircraft that are not present in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Drop aircraft absent from the latest batch or silent past the timeout.
    #[default]
    Live,
    /// Keep every aircraft for the lifetime of the table.
    Fixed,
}

/// Configuration for the aircraft tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum number of trail points kept per aircraft.
    pub trail_length: usize,
    /// A new trail point must be strictly farther than this from the last one.
    pub trail_min_distance_nm: f64,
    /// Aircraft timeout in seconds.
    pub aircraft_timeout_secs: i64,
    pub retention: RetentionPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            trail_length: 15,
            trail_min_distance_nm: 0.5,
            aircraft_timeout_secs: 300,
            retention: RetentionPolicy::Live,
        }
    }
}

/// Aircraft track table keyed by ICAO address.
pub struct AircraftTracker {
    aircraft: HashMap<String, Aircraft>,
    config: TrackerConfig,
}

impl std::fmt::Debug for AircraftTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AircraftTracker")
            .field("aircraft_count", &self.aircraft.len())
            .field("retention", &self.config.retention)
            .field("trail_length", &self.config.trail_length)
            .finish()
    }
}

impl AircraftTracker {
    /// Create a new tracker with the given configuration.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            aircraft: HashMap::new(),
            config,
        }
    }

    /// Apply a batch of records and return the resulting snapshot.
    ///
    /// When `preserve_trails` is false every updated aircraft starts a fresh trail.
    pub fn apply(&mut self, batch: &[AircraftRecord], preserve_trails: bool) -> Vec<&Aircraft> {
        self.apply_at(batch, preserve_trails, Utc::now())
    }

    /// Same as [`apply`](Self::apply) with an explicit clock.
    pub fn apply_at(
        &mut self,
        batch: &[AircraftRecord],
        preserve_trails: bool,
        now: DateTime<Utc>,
    ) -> Vec<&Aircraft> {
        let mut seen = HashSet::with_capacity(batch.len());
        let min_distance = self.config.trail_min_distance_nm;
        let max_len = self.config.trail_length;

        for record in batch {
            let icao = record.icao.trim().to_uppercase();
            if icao.is_empty() {
                continue;
            }

            let aircraft = self
                .aircraft
                .entry(icao.clone())
                .or_insert_with(|| Aircraft::new(icao.clone(), now));

            aircraft.last_seen = now;
            aircraft.merge(record);

            if !preserve_trails {
                aircraft.position_history.clear();
            }
            if let Some((lat, lon)) = record.position {
                aircraft.record_trail_point(lat, lon, now, min_distance, max_len);
            }

            seen.insert(icao);
        }

        if self.config.retention == RetentionPolicy::Live {
            let timeout = self.config.aircraft_timeout_secs;
            let before = self.aircraft.len();
            self.aircraft.retain(|icao, aircraft| {
                seen.contains(icao) && (now - aircraft.last_seen).num_seconds() <= timeout
            });
            let removed = before - self.aircraft.len();
            if removed > 0 {
                debug!("Evicted {} aircraft no longer in the feed", removed);
            }
        }

        self.snapshot()
    }

    /// Remove aircraft that have been silent longer than the timeout.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) {
        let timeout = self.config.aircraft_timeout_secs;
        self.aircraft
            .retain(|_, aircraft| (now - aircraft.last_seen).num_seconds() <= timeout);
    }

    /// Drop every aircraft's trail while keeping its current state.
    pub fn clear_trails(&mut self) {
        for aircraft in self.aircraft.values_mut() {
            aircraft.position_history.clear();
        }
    }

    /// All tracked aircraft, ordered by ICAO address.
    #[must_use]
    pub fn snapshot(&self) -> Vec<&Aircraft> {
        let mut aircraft: Vec<&Aircraft> = self.aircraft.values().collect();
        aircraft.sort_by(|a, b| a.icao.cmp(&b.icao));
        aircraft
    }

    /// Get a specific aircraft by ICAO address.
    #[must_use]
    pub fn get_by_icao(&self, icao: &str) -> Option<&Aircraft> {
        self.aircraft.get(&icao.to_uppercase())
    }

    /// Get the number of tracked aircraft.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    /// Check if there are no tracked aircraft.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }
}
