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

//! Session display filters.

use std::cmp::Ordering;
use std::fmt;

use adsb_client::Aircraft;

/// Altitude band boundaries in feet.
const LOW_CEILING_FT: i32 = 10_000;
const HIGH_FLOOR_FT: i32 = 30_000;

/// Which tracked aircraft a session shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    #[default]
    All,
    Closest,
    High,
    Medium,
    Low,
}

impl DisplayMode {
    /// Next mode in the all, closest, high, medium, low cycle.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::All => Self::Closest,
            Self::Closest => Self::High,
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            Self::Low => Self::All,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Closest => "CLOSEST",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    /// Apply the filter. `reference` orders the closest mode; without it the
    /// first `limit` aircraft are kept.
    #[must_use]
    pub fn filter<'a>(
        self,
        aircraft: &[&'a Aircraft],
        reference: Option<(f64, f64)>,
        limit: usize,
    ) -> Vec<&'a Aircraft> {
        match self {
            Self::All => aircraft.to_vec(),
            Self::Closest => match reference {
                Some((lat, lon)) => {
                    let mut ranked: Vec<(f64, &Aircraft)> = aircraft
                        .iter()
                        .filter_map(|a| a.distance_from_nm(lat, lon).map(|d| (d, *a)))
                        .collect();
                    ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
                    ranked.into_iter().take(limit).map(|(_, a)| a).collect()
                }
                None => aircraft.iter().take(limit).copied().collect(),
            },
            Self::High | Self::Medium | Self::Low => {
                let wanted = match self {
                    Self::High => AltitudeBand::High,
                    Self::Medium => AltitudeBand::Medium,
                    _ => AltitudeBand::Low,
                };
                aircraft
                    .iter()
                    .filter(|a| a.altitude.map(AltitudeBand::of) == Some(wanted))
                    .copied()
                    .collect()
            }
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Altitude band used for both coloring and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltitudeBand {
    Low,
    Medium,
    High,
}

impl AltitudeBand {
    #[must_use]
    pub fn of(altitude_ft: i32) -> Self {
        if altitude_ft < LOW_CEILING_FT {
            Self::Low
        } else if altitude_ft <= HIGH_FLOOR_FT {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsb_client::{AircraftRecord, AircraftTracker, TrackerConfig};

    fn tracker_with(records: &[AircraftRecord]) -> AircraftTracker {
        let mut tracker = AircraftTracker::new(TrackerConfig::default());
        tracker.apply(records, true);
        tracker
    }

    fn record(icao: &str, lat: Option<f64>, altitude: Option<i32>) -> AircraftRecord {
        AircraftRecord {
            position: lat.map(|lat| (lat, -78.0)),
            altitude,
            ..AircraftRecord::new(icao)
        }
    }

    #[test]
    fn test_five_toggles_return_to_all() {
        let mut mode = DisplayMode::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            mode = mode.next();
            seen.push(mode);
        }
        assert_eq!(mode, DisplayMode::All);
        assert_eq!(
            seen,
            vec![
                DisplayMode::Closest,
                DisplayMode::High,
                DisplayMode::Medium,
                DisplayMode::Low,
                DisplayMode::All
            ]
        );
    }

    #[test]
    fn test_closest_sorted_and_limited() {
        let tracker = tracker_with(&[
            record("AAA001", Some(35.5), None),
            record("AAA002", Some(35.1), None),
            record("AAA003", Some(35.3), None),
            record("AAA004", None, None),
        ]);
        let all = tracker.snapshot();

        let closest = DisplayMode::Closest.filter(&all, Some((35.0, -78.0)), 2);
        let order: Vec<&str> = closest.iter().map(|a| a.icao.as_str()).collect();
        assert_eq!(order, vec!["AAA002", "AAA003"]);
    }

    #[test]
    fn test_closest_ties_keep_input_order() {
        let tracker = tracker_with(&[
            record("BBB002", Some(35.2), None),
            record("BBB001", Some(35.2), None),
        ]);
        let all = tracker.snapshot();
        let closest = DisplayMode::Closest.filter(&all, Some((35.0, -78.0)), 5);
        assert_eq!(closest[0].icao, "BBB001");
        assert_eq!(closest[1].icao, "BBB002");
    }

    #[test]
    fn test_closest_without_reference_takes_first() {
        let tracker = tracker_with(&[
            record("CCC001", Some(35.9), None),
            record("CCC002", None, None),
            record("CCC003", Some(35.0), None),
        ]);
        let all = tracker.snapshot();
        let shown = DisplayMode::Closest.filter(&all, None, 2);
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0].icao, "CCC001");
    }

    #[test]
    fn test_altitude_bands() {
        let tracker = tracker_with(&[
            record("DDD001", None, Some(5_000)),
            record("DDD002", None, Some(10_000)),
            record("DDD003", None, Some(30_000)),
            record("DDD004", None, Some(30_001)),
            record("DDD005", None, None),
        ]);
        let all = tracker.snapshot();

        let icaos = |mode: DisplayMode| -> Vec<String> {
            mode.filter(&all, None, 5).iter().map(|a| a.icao.clone()).collect()
        };
        assert_eq!(icaos(DisplayMode::Low), vec!["DDD001"]);
        assert_eq!(icaos(DisplayMode::Medium), vec!["DDD002", "DDD003"]);
        assert_eq!(icaos(DisplayMode::High), vec!["DDD004"]);
        assert_eq!(icaos(DisplayMode::All).len(), 5);
    }
}
