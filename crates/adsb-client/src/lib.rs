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

//! ADS-B client library for consuming pre-decoded aircraft feeds.
//!
//! The library is split into layers that can be used independently:
//!
//! - **Protocol layer**: ADSBExchange v2 JSON parsing into normalized
//!   [`AircraftRecord`] updates
//! - **Tracker layer**: Track table with partial updates, bounded position trails,
//!   and eviction
//! - **HTTP layer**: An [`AircraftSource`] for adsb.lol and a TTL cache with
//!   stale-on-error fallback
//!
//! # Using Individual Layers
//!
//! ## Protocol Layer Only
//!
//! ```
//! use adsb_client::protocol::{AdsbxParser, Protocol};
//!
//! let mut parser = AdsbxParser::new();
//! let payload = br#"{"ac":[{"hex":"a1b2c3","flight":"UAL123 ","lat":35.9,"lon":-78.8}]}"#;
//! if let Ok(Some(records)) = parser.parse(payload) {
//!     println!("Got {} records, first is {}", records.len(), records[0].icao);
//! }
//! ```
//!
//! ## Tracker Layer Only
//!
//! ```
//! use adsb_client::protocol::AircraftRecord;
//! use adsb_client::tracker::{AircraftTracker, TrackerConfig};
//!
//! let mut tracker = AircraftTracker::new(TrackerConfig::default());
//!
//! let record = AircraftRecord {
//!     position: Some((34.0, -118.5)),
//!     altitude: Some(35000),
//!     ..AircraftRecord::new("a1b2c3")
//! };
//! let snapshot = tracker.apply(&[record], true);
//!
//! println!("Tracking {} aircraft", snapshot.len());
//! ```
//!
//! ## Cached Fetching
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use adsb_client::http::{AdsbLolSource, CachedFetchClient, DEFAULT_API_BASE_URL};
//!
//! # async fn example() -> Result<(), adsb_client::http::FetchError> {
//! let source = AdsbLolSource::new(DEFAULT_API_BASE_URL, Duration::from_secs(10))?;
//! let cache = CachedFetchClient::new(Arc::new(source), Duration::from_secs(5));
//! let outcome = cache.get(35.877602, -78.787498, 25).await;
//! println!("{} aircraft ({:?})", outcome.records.len(), outcome.status);
//! # Ok(())
//! # }
//! ```

pub mod http;
pub mod protocol;
pub mod tracker;

pub use http::{
    AdsbLolSource, AircraftSource, CachedFetchClient, FetchError, FetchOutcome, FetchStatus,
};
pub use protocol::{AdsbxParser, AircraftRecord, ParseError, Protocol};
pub use tracker::{
    haversine_distance_nm, Aircraft, AircraftTracker, PositionPoint, RetentionPolicy,
    TrackerConfig,
};
