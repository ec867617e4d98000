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

//! ADSBExchange v2 JSON parser.
//!
//! This is the format served by adsb.lol, adsb.fi, and readsb's `aircraft.json`:
//!
//! ```text
//! { "now": 1700000000.0, "ac": [ { "hex": "a1b2c3", "lat": 35.9, "lon": -78.8, ... } ] }
//! ```

use log::debug;
use serde_json::Value;

use super::{AircraftRecord, ParseError, Protocol};

/// Parser for ADSBExchange v2 style payloads.
#[derive(Debug, Default)]
pub struct AdsbxParser {
    dropped: usize,
}

impl AdsbxParser {
    /// Create a new parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records dropped by the last call to `parse`.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Protocol for AdsbxParser {
    type Message = Vec<AircraftRecord>;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<Vec<AircraftRecord>>, ParseError> {
        self.dropped = 0;

        let payload: Value = serde_json::from_slice(input)
            .map_err(|e| ParseError::InvalidFormat(e.to_string()))?;

        let Some(entries) = payload.get("ac") else {
            return Ok(None);
        };
        let entries = entries.as_array().ok_or_else(|| ParseError::InvalidValue {
            field: "ac",
            value: entries.to_string(),
        })?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match parse_record(entry) {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!("Dropping aircraft record: {}", e);
                    self.dropped += 1;
                }
            }
        }

        Ok(Some(records))
    }
}

fn string_field(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn float_field(entry: &Value, key: &str) -> Option<f64> {
    entry.get(key).and_then(Value::as_f64)
}

#[allow(clippy::cast_possible_truncation, reason = "altitudes and rates fit in i32")]
fn int_field(entry: &Value, key: &str) -> Option<i32> {
    float_field(entry, key).map(|v| v.round() as i32)
}

/// Parse a single aircraft entry.
///
/// Only the `hex` field is mandatory. Optional fields with an unexpected type
/// are ignored rather than failing the record.
pub fn parse_record(entry: &Value) -> Result<AircraftRecord, ParseError> {
    if !entry.is_object() {
        return Err(ParseError::InvalidFormat(format!(
            "aircraft entry is not an object: {entry}"
        )));
    }

    let icao = string_field(entry, "hex").ok_or(ParseError::MissingField("hex"))?;
    let mut record = AircraftRecord::new(&icao);

    if let (Some(lat), Some(lon)) = (float_field(entry, "lat"), float_field(entry, "lon")) {
        record.position = Some((lat, lon));
    }

    match entry.get("alt_baro") {
        Some(Value::String(s)) if s == "ground" => {
            record.altitude = Some(0);
            record.on_ground = Some(true);
        }
        Some(v) if v.is_number() => {
            record.altitude = int_field(entry, "alt_baro");
            record.on_ground = Some(false);
        }
        _ => {}
    }

    record.ground_speed = float_field(entry, "gs");
    record.track = float_field(entry, "track").or_else(|| float_field(entry, "true_heading"));
    record.vertical_rate = int_field(entry, "baro_rate").or_else(|| int_field(entry, "geom_rate"));
    record.callsign = string_field(entry, "flight");
    record.squawk = string_field(entry, "squawk");
    record.registration = string_field(entry, "r");
    record.aircraft_type = string_field(entry, "t");

    Ok(record)
}
