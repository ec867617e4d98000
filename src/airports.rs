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

//! Built-in reference points.

use crate::render::Bounds;

/// (code, name, latitude, longitude)
const AIRPORTS: &[(&str, &str, f64, f64)] = &[
    ("RDU", "Raleigh-Durham International", 35.877_602, -78.787_498),
    ("CLT", "Charlotte Douglas International", 35.214, -80.943),
    ("ATL", "Hartsfield-Jackson Atlanta", 33.6407, -84.4277),
    ("DCA", "Ronald Reagan Washington National", 38.8521, -77.0402),
    ("JFK", "John F. Kennedy International", 40.6413, -73.7781),
    ("LAX", "Los Angeles International", 33.9425, -118.4081),
    ("ORD", "Chicago O'Hare International", 41.9742, -87.9073),
    ("DFW", "Dallas/Fort Worth International", 32.8998, -97.0403),
    ("DEN", "Denver International", 39.8561, -104.6737),
    ("SFO", "San Francisco International", 37.6213, -122.3790),
];

/// A named point the map is centered on.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoint {
    /// Short label drawn on the map.
    pub code: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl ReferencePoint {
    /// A reference point that is not in the airport table.
    #[must_use]
    pub fn custom(name: &str, lat: f64, lon: f64) -> Self {
        let code: String = name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(4)
            .collect::<String>()
            .to_uppercase();
        Self {
            code: if code.is_empty() { "REF".to_string() } else { code },
            name: name.to_string(),
            lat,
            lon,
        }
    }

    /// Map window covering `radius_nm` around this point.
    #[must_use]
    pub fn bounds(&self, radius_nm: u32) -> Bounds {
        Bounds::around(self.lat, self.lon, f64::from(radius_nm))
    }
}

impl Default for ReferencePoint {
    fn default() -> Self {
        let (code, name, lat, lon) = AIRPORTS[0];
        Self {
            code: code.to_string(),
            name: name.to_string(),
            lat,
            lon,
        }
    }
}

/// Look up an airport by code, ignoring case.
#[must_use]
pub fn lookup(code: &str) -> Option<ReferencePoint> {
    let code = code.trim();
    AIRPORTS
        .iter()
        .find(|(c, ..)| c.eq_ignore_ascii_case(code))
        .map(|&(code, name, lat, lon)| ReferencePoint {
            code: code.to_string(),
            name: name.to_string(),
            lat,
            lon,
        })
}

/// All known airport codes.
pub fn codes() -> impl Iterator<Item = &'static str> {
    AIRPORTS.iter().map(|(code, ..)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let rdu = lookup("rdu").unwrap();
        assert_eq!(rdu.code, "RDU");
        assert!((rdu.lat - 35.877_602).abs() < 1e-9);
        assert!(lookup(" jfk ").is_some());
        assert!(lookup("XYZ").is_none());
    }

    #[test]
    fn test_custom_code() {
        assert_eq!(ReferencePoint::custom("my house", 1.0, 2.0).code, "MYHO");
        assert_eq!(ReferencePoint::custom("--", 1.0, 2.0).code, "REF");
    }

    #[test]
    fn test_codes_listed() {
        assert_eq!(codes().count(), 10);
    }
}
