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

//! HTTP feed layer.
//!
//! [`AdsbLolSource`] queries an ADSBExchange-compatible REST endpoint for the
//! aircraft around a point. [`CachedFetchClient`] sits in front of any
//! [`AircraftSource`], shares results between callers for a short TTL, and
//! degrades to the last good batch when the upstream fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::Instant;

use crate::protocol::{AdsbxParser, AircraftRecord, ParseError, Protocol};

/// Default public aggregator endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.adsb.lol/v2";

const USER_AGENT: &str = concat!("adsb-terminal-radar/", env!("CARGO_PKG_VERSION"));

/// Errors from an upstream fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("malformed upstream payload: {0}")]
    Parse(#[from] ParseError),
}

/// Something that can produce a batch of aircraft around a point.
#[async_trait]
pub trait AircraftSource: Send + Sync {
    async fn fetch(
        &self,
        lat: f64,
        lon: f64,
        radius_nm: u32,
    ) -> Result<Vec<AircraftRecord>, FetchError>;
}

/// Source backed by the adsb.lol v2 point query.
#[derive(Debug, Clone)]
pub struct AdsbLolSource {
    client: reqwest::Client,
    base_url: String,
}

impl AdsbLolSource {
    /// Create a source for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL for a point query.
    #[must_use]
    pub fn url_for(&self, lat: f64, lon: f64, radius_nm: u32) -> String {
        format!("{}/lat/{lat}/lon/{lon}/dist/{radius_nm}", self.base_url)
    }
}

#[async_trait]
impl AircraftSource for AdsbLolSource {
    async fn fetch(
        &self,
        lat: f64,
        lon: f64,
        radius_nm: u32,
    ) -> Result<Vec<AircraftRecord>, FetchError> {
        let url = self.url_for(lat, lon, radius_nm);
        debug!("Fetching {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let mut parser = AdsbxParser::new();
        let records = parser.parse(&body)?.unwrap_or_default();
        if parser.dropped() > 0 {
            debug!("Dropped {} records without an identity", parser.dropped());
        }

        Ok(records)
    }
}

/// Where the records in a [`FetchOutcome`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Fetched from upstream by this call.
    Fresh,
    /// Served from a cache entry younger than the TTL.
    Cached,
    /// Upstream failed; served from an expired cache entry.
    Stale,
    /// Upstream failed and nothing was cached.
    Unavailable,
}

impl FetchStatus {
    /// True when upstream failed on this call.
    #[must_use]
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Stale | Self::Unavailable)
    }
}

/// Result of a cached fetch. Never carries an error.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Arc<Vec<AircraftRecord>>,
    pub status: FetchStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    lat_micro: i64,
    lon_micro: i64,
    radius_nm: u32,
}

impl CacheKey {
    #[allow(clippy::cast_possible_truncation, reason = "coordinates are within +/-180 degrees")]
    fn new(lat: f64, lon: f64, radius_nm: u32) -> Self {
        Self {
            lat_micro: (lat * 1e6).round() as i64,
            lon_micro: (lon * 1e6).round() as i64,
            radius_nm,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    records: Arc<Vec<AircraftRecord>>,
    timestamp: Instant,
}

type Slot = Arc<tokio::sync::Mutex<Option<CacheEntry>>>;

/// TTL cache in front of an [`AircraftSource`], shared by all sessions.
///
/// Each key has its own async lock held across check, fetch, and store, so at
/// most one upstream call per key happens per TTL window while different keys
/// proceed independently.
pub struct CachedFetchClient {
    source: Arc<dyn AircraftSource>,
    ttl: Duration,
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl std::fmt::Debug for CachedFetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self
            .slots
            .lock()
            .map_or(0, |slots| slots.len());
        f.debug_struct("CachedFetchClient")
            .field("ttl", &self.ttl)
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

impl CachedFetchClient {
    /// Create a cache over `source` with the given TTL.
    #[must_use]
    pub fn new(source: Arc<dyn AircraftSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: CacheKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    /// Get the aircraft around a point, from cache when fresh enough.
    pub async fn get(&self, lat: f64, lon: f64, radius_nm: u32) -> FetchOutcome {
        let key = CacheKey::new(lat, lon, radius_nm);
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.timestamp.elapsed() < self.ttl {
                debug!("Cache hit for {:?}", key);
                return FetchOutcome {
                    records: Arc::clone(&cached.records),
                    status: FetchStatus::Cached,
                };
            }
        }

        match self.source.fetch(lat, lon, radius_nm).await {
            Ok(records) => {
                info!("Fetched {} aircraft from upstream", records.len());
                let records = Arc::new(records);
                *entry = Some(CacheEntry {
                    records: Arc::clone(&records),
                    timestamp: Instant::now(),
                });
                FetchOutcome {
                    records,
                    status: FetchStatus::Fresh,
                }
            }
            Err(e) => {
                warn!("Upstream fetch failed: {}", e);
                if let Some(cached) = entry.as_ref() {
                    warn!(
                        "Returning expired cache data ({} aircraft)",
                        cached.records.len()
                    );
                    FetchOutcome {
                        records: Arc::clone(&cached.records),
                        status: FetchStatus::Stale,
                    }
                } else {
                    FetchOutcome {
                        records: Arc::new(Vec::new()),
                        status: FetchStatus::Unavailable,
                    }
                }
            }
        }
    }
}
