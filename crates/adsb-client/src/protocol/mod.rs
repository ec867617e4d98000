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

//! Protocol layer for upstream aircraft feeds.
//!
//! Aggregators such as adsb.lol publish pre-decoded aircraft state as JSON. This
//! module turns such payloads into normalized [`AircraftRecord`] updates that the
//! tracker layer can apply without knowing where they came from.

mod adsbx;

pub use adsbx::{parse_record, AdsbxParser};

use thiserror::Error;

/// Errors that can occur during payload parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid payload: {0}")]
    InvalidFormat(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for field '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// A normalized, partial update for one aircraft.
///
/// Every field except the identity is optional: an absent field means "no new
/// information", never "clear the previous value".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AircraftRecord {
    /// ICAO 24-bit address (hex string, upper-cased).
    pub icao: String,
    /// Aircraft callsign, trimmed.
    pub callsign: Option<String>,
    /// Position as (latitude, longitude) in degrees.
    pub position: Option<(f64, f64)>,
    /// Barometric altitude in feet.
    pub altitude: Option<i32>,
    /// Ground speed in knots.
    pub ground_speed: Option<f64>,
    /// Track angle in degrees (0-360, north = 0).
    pub track: Option<f64>,
    /// Vertical rate in feet per minute.
    pub vertical_rate: Option<i32>,
    /// Transponder code.
    pub squawk: Option<String>,
    /// Registration (tail number).
    pub registration: Option<String>,
    /// ICAO type designator.
    pub aircraft_type: Option<String>,
    /// Whether the aircraft reports being on the ground.
    pub on_ground: Option<bool>,
}

impl AircraftRecord {
    /// Create an empty record for the given identity.
    #[must_use]
    pub fn new(icao: &str) -> Self {
        Self {
            icao: icao.trim().to_uppercase(),
            ..Default::default()
        }
    }
}

/// Trait for protocol parsers.
///
/// Implement this trait to add support for new upstream payload formats.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a message,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}
