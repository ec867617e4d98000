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

//! Simulated traffic for demo sessions.
//!
//! A small fixed fleet flies straight lines around the reference point and
//! bounces off the edges of the map, with the odd random course change.

use std::time::Duration;

use adsb_client::AircraftRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::airports::ReferencePoint;
use crate::render::Bounds;

const NM_PER_DEGREE: f64 = 60.0;
const TURN_PROBABILITY: f64 = 0.1;
const MAX_TURN_DEG: f64 = 10.0;

struct Seed {
    icao: &'static str,
    callsign: &'static str,
    /// Offset from the reference as a fraction of the radius, north then east.
    offset: (f64, f64),
    heading: f64,
    speed_kt: f64,
    altitude_ft: i32,
    vertical_rate: i32,
    aircraft_type: &'static str,
}

const FLEET: [Seed; 4] = [
    Seed {
        icao: "A1B2C3",
        callsign: "DAL1234",
        offset: (0.3, -0.3),
        heading: 45.0,
        speed_kt: 450.0,
        altitude_ft: 35_000,
        vertical_rate: 0,
        aircraft_type: "B738",
    },
    Seed {
        icao: "D4E5F6",
        callsign: "UAL456",
        offset: (0.5, 0.2),
        heading: 180.0,
        speed_kt: 280.0,
        altitude_ft: 18_000,
        vertical_rate: -1_200,
        aircraft_type: "A320",
    },
    Seed {
        icao: "789ABC",
        callsign: "N123AB",
        offset: (-0.2, 0.4),
        heading: 270.0,
        speed_kt: 120.0,
        altitude_ft: 4_500,
        vertical_rate: 500,
        aircraft_type: "C172",
    },
    Seed {
        icao: "DEF012",
        callsign: "AAL789",
        offset: (-0.4, -0.1),
        heading: 315.0,
        speed_kt: 380.0,
        altitude_ft: 27_000,
        vertical_rate: 1_800,
        aircraft_type: "B77W",
    },
];

#[derive(Debug, Clone)]
struct SimulatedAircraft {
    icao: &'static str,
    callsign: &'static str,
    aircraft_type: &'static str,
    lat: f64,
    lon: f64,
    heading: f64,
    speed_kt: f64,
    altitude_ft: i32,
    vertical_rate: i32,
}

impl SimulatedAircraft {
    fn record(&self) -> AircraftRecord {
        AircraftRecord {
            callsign: Some(self.callsign.to_string()),
            aircraft_type: Some(self.aircraft_type.to_string()),
            position: Some((self.lat, self.lon)),
            altitude: Some(self.altitude_ft),
            vertical_rate: Some(self.vertical_rate),
            ground_speed: Some(self.speed_kt),
            track: Some(self.heading),
            on_ground: Some(false),
            ..AircraftRecord::new(self.icao)
        }
    }

    /// Fly along the current heading for `hours`.
    fn fly(&mut self, hours: f64) {
        let distance_nm = self.speed_kt * hours;
        let heading = self.heading.to_radians();
        self.lat += distance_nm / NM_PER_DEGREE * heading.cos();
        let lon_scale = (NM_PER_DEGREE * self.lat.to_radians().cos()).max(f64::EPSILON);
        self.lon += distance_nm / lon_scale * heading.sin();
    }

    /// Reflect off the map edges and pull the position back inside.
    fn bounce(&mut self, bounds: &Bounds) {
        if self.lat > bounds.lat_max || self.lat < bounds.lat_min {
            self.heading = (180.0 - self.heading).rem_euclid(360.0);
            self.lat = self.lat.clamp(bounds.lat_min, bounds.lat_max);
        }
        if self.lon > bounds.lon_max || self.lon < bounds.lon_min {
            self.heading = (360.0 - self.heading).rem_euclid(360.0);
            self.lon = self.lon.clamp(bounds.lon_min, bounds.lon_max);
        }
    }
}

/// Per-session demo traffic generator.
#[derive(Debug)]
pub struct DemoSimulator {
    fleet: Vec<SimulatedAircraft>,
    bounds: Bounds,
    rng: StdRng,
}

impl DemoSimulator {
    /// Seed the fleet around `reference`.
    #[must_use]
    pub fn new(reference: &ReferencePoint, radius_nm: u32, seed: u64) -> Self {
        let radius = f64::from(radius_nm);
        let lon_scale = (NM_PER_DEGREE * reference.lat.to_radians().cos()).max(f64::EPSILON);
        let fleet = FLEET
            .iter()
            .map(|seed| SimulatedAircraft {
                icao: seed.icao,
                callsign: seed.callsign,
                aircraft_type: seed.aircraft_type,
                lat: reference.lat + seed.offset.0 * radius / NM_PER_DEGREE,
                lon: reference.lon + seed.offset.1 * radius / lon_scale,
                heading: seed.heading,
                speed_kt: seed.speed_kt,
                altitude_ft: seed.altitude_ft,
                vertical_rate: seed.vertical_rate,
            })
            .collect();

        Self {
            fleet,
            bounds: reference.bounds(radius_nm),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Current fleet state as a record batch.
    #[must_use]
    pub fn records(&self) -> Vec<AircraftRecord> {
        self.fleet.iter().map(SimulatedAircraft::record).collect()
    }

    /// Move every aircraft by `elapsed` wall time scaled by `speed_multiplier`.
    pub fn advance(&mut self, elapsed: Duration, speed_multiplier: f64) -> Vec<AircraftRecord> {
        let hours = elapsed.as_secs_f64() * speed_multiplier / 3600.0;
        for aircraft in &mut self.fleet {
            aircraft.fly(hours);
            aircraft.bounce(&self.bounds);
            if self.rng.random_bool(TURN_PROBABILITY) {
                let turn = self.rng.random_range(-MAX_TURN_DEG..=MAX_TURN_DEG);
                aircraft.heading = (aircraft.heading + turn).rem_euclid(360.0);
            }
        }
        self.records()
    }
}
