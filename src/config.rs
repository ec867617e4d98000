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

//! Application configuration management.
//!
//! This module handles persistent configuration storage using TOML format via
//! `confy`. The loaded [`AppConfig`] is validated once at startup and turned into
//! an immutable [`SessionConfig`] that every client session receives.

use std::path::{Path, PathBuf};
use std::time::Duration;

use adsb_client::http::DEFAULT_API_BASE_URL;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::airports::{self, ReferencePoint};
use crate::render::RenderOptions;
use crate::transport::TerminalSize;

const APP_NAME: &str = "adsb-terminal-radar";
const CONFIG_NAME: &str = "config";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] confy::ConfyError),

    #[error("unknown airport code '{0}'")]
    UnknownAirport(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Explicit reference point, overriding the airport table.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReferenceConfig {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Telnet listener settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelnetConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_telnet_bind")]
    pub bind: String,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_telnet_bind(),
        }
    }
}

/// SSH listener settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SshConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ssh_bind")]
    pub bind: String,

    /// OpenSSH private key; an ephemeral key is generated when unset
    #[serde(default)]
    pub host_key_path: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_ssh_bind(),
            host_key_path: None,
        }
    }
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Serve simulated traffic instead of querying upstream
    #[serde(default = "default_true")]
    pub demo_mode: bool,

    /// Airport code used as the reference point
    #[serde(default = "default_airport")]
    pub airport: String,

    #[serde(default)]
    pub reference: Option<ReferenceConfig>,

    /// Query and display radius in nautical miles
    #[serde(default = "default_radius_nm")]
    pub radius_nm: u32,

    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,

    /// Rows in the information table and N for the closest filter
    #[serde(default = "default_display_aircraft_limit")]
    pub display_aircraft_limit: usize,

    #[serde(default = "default_trail_length")]
    pub trail_length: usize,

    #[serde(default = "default_live_trail_min_distance_nm")]
    pub live_trail_min_distance_nm: f64,

    #[serde(default = "default_demo_trail_min_distance_nm")]
    pub demo_trail_min_distance_nm: f64,

    #[serde(default = "default_eviction_timeout_secs")]
    pub eviction_timeout_secs: i64,

    /// Seconds between keepalives, 0 disables
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    #[serde(default = "default_true")]
    pub use_colors: bool,

    #[serde(default)]
    pub use_unicode_symbols: bool,

    #[serde(default = "default_true")]
    pub directional_symbols: bool,

    #[serde(default = "default_true")]
    pub show_trails: bool,

    /// Static terminal size override
    #[serde(default)]
    pub terminal_width: Option<u16>,

    #[serde(default)]
    pub terminal_height: Option<u16>,

    /// Demo animation speed-up
    #[serde(default = "default_speed_multiplier")]
    pub speed_multiplier: f64,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub telnet: TelnetConfig,

    #[serde(default)]
    pub ssh: SshConfig,
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_airport() -> String {
    "RDU".to_string()
}

fn default_radius_nm() -> u32 {
    25
}

fn default_update_interval_secs() -> u64 {
    5
}

fn default_display_aircraft_limit() -> usize {
    5
}

fn default_trail_length() -> usize {
    15
}

fn default_live_trail_min_distance_nm() -> f64 {
    0.5
}

fn default_demo_trail_min_distance_nm() -> f64 {
    0.1
}

fn default_eviction_timeout_secs() -> i64 {
    300
}

fn default_keepalive_interval_secs() -> u64 {
    30
}

fn default_speed_multiplier() -> f64 {
    10.0
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_cache_ttl_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_telnet_bind() -> String {
    "0.0.0.0:8023".to_string()
}

fn default_ssh_bind() -> String {
    "0.0.0.0:8024".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            demo_mode: true,
            airport: default_airport(),
            reference: None,
            radius_nm: default_radius_nm(),
            update_interval_secs: default_update_interval_secs(),
            display_aircraft_limit: default_display_aircraft_limit(),
            trail_length: default_trail_length(),
            live_trail_min_distance_nm: default_live_trail_min_distance_nm(),
            demo_trail_min_distance_nm: default_demo_trail_min_distance_nm(),
            eviction_timeout_secs: default_eviction_timeout_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            use_colors: true,
            use_unicode_symbols: false,
            directional_symbols: true,
            show_trails: true,
            terminal_width: None,
            terminal_height: None,
            speed_multiplier: default_speed_multiplier(),
            api_base_url: default_api_base_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            debug: false,
            telnet: TelnetConfig::default(),
            ssh: SshConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from the per-user default location.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => confy::load_path(path)?,
            None => confy::load(APP_NAME, CONFIG_NAME)?,
        };
        Ok(config)
    }

    /// Get the config file path for display to user
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?)
    }

    /// Resolve the configured reference point.
    pub fn reference_point(&self) -> Result<ReferencePoint, ConfigError> {
        if let Some(reference) = &self.reference {
            return Ok(ReferencePoint::custom(
                &reference.name,
                reference.lat,
                reference.lon,
            ));
        }
        airports::lookup(&self.airport).ok_or_else(|| ConfigError::UnknownAirport(self.airport.clone()))
    }

    /// Reject values no session could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.radius_nm == 0 {
            return Err(ConfigError::Invalid("radius_nm must be positive".to_string()));
        }
        if self.update_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_secs must be positive".to_string(),
            ));
        }
        if self.trail_length == 0 {
            return Err(ConfigError::Invalid("trail_length must be positive".to_string()));
        }
        if self.display_aircraft_limit == 0 {
            return Err(ConfigError::Invalid(
                "display_aircraft_limit must be positive".to_string(),
            ));
        }
        if !(self.speed_multiplier.is_finite() && self.speed_multiplier > 0.0) {
            return Err(ConfigError::Invalid(
                "speed_multiplier must be a positive number".to_string(),
            ));
        }
        if self.eviction_timeout_secs <= 0 {
            return Err(ConfigError::Invalid(
                "eviction_timeout_secs must be positive".to_string(),
            ));
        }

        let reference = self.reference_point()?;
        if !(-90.0..=90.0).contains(&reference.lat) || !(-180.0..=180.0).contains(&reference.lon) {
            return Err(ConfigError::Invalid(format!(
                "reference point {} is outside valid coordinates",
                reference.code
            )));
        }
        Ok(())
    }

    /// Build the immutable per-session configuration.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        self.validate()?;

        let static_size = match (self.terminal_width, self.terminal_height) {
            (Some(cols), Some(rows)) if cols > 0 && rows > 0 => Some(TerminalSize { cols, rows }),
            _ => None,
        };

        Ok(SessionConfig {
            demo_mode: self.demo_mode,
            reference: self.reference_point()?,
            radius_nm: self.radius_nm,
            update_interval: Duration::from_secs(self.update_interval_secs),
            display_limit: self.display_aircraft_limit,
            trail_length: self.trail_length,
            live_trail_min_distance_nm: self.live_trail_min_distance_nm,
            demo_trail_min_distance_nm: self.demo_trail_min_distance_nm,
            eviction_timeout_secs: self.eviction_timeout_secs,
            keepalive_interval: (self.keepalive_interval_secs > 0)
                .then(|| Duration::from_secs(self.keepalive_interval_secs)),
            use_colors: self.use_colors,
            render: RenderOptions {
                unicode_symbols: self.use_unicode_symbols,
                directional_symbols: self.directional_symbols,
                show_trails: self.show_trails,
            },
            static_size,
            speed_multiplier: self.speed_multiplier,
        })
    }
}

/// Settings a single session runs with. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub demo_mode: bool,
    pub reference: ReferencePoint,
    pub radius_nm: u32,
    pub update_interval: Duration,
    pub display_limit: usize,
    pub trail_length: usize,
    pub live_trail_min_distance_nm: f64,
    pub demo_trail_min_distance_nm: f64,
    pub eviction_timeout_secs: i64,
    pub keepalive_interval: Option<Duration>,
    pub use_colors: bool,
    pub render: RenderOptions,
    pub static_size: Option<TerminalSize>,
    pub speed_multiplier: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let config = AppConfig::default();
        Self {
            demo_mode: config.demo_mode,
            reference: ReferencePoint::default(),
            radius_nm: config.radius_nm,
            update_interval: Duration::from_secs(config.update_interval_secs),
            display_limit: config.display_aircraft_limit,
            trail_length: config.trail_length,
            live_trail_min_distance_nm: config.live_trail_min_distance_nm,
            demo_trail_min_distance_nm: config.demo_trail_min_distance_nm,
            eviction_timeout_secs: config.eviction_timeout_secs,
            keepalive_interval: Some(Duration::from_secs(config.keepalive_interval_secs)),
            use_colors: config.use_colors,
            render: RenderOptions::default(),
            static_size: None,
            speed_multiplier: config.speed_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml_from_str("");
        assert!(config.demo_mode);
        assert_eq!(config.airport, "RDU");
        assert_eq!(config.radius_nm, 25);
        assert_eq!(config.keepalive_interval_secs, 30);
        assert_eq!(config.telnet.bind, "0.0.0.0:8023");
        assert_eq!(config.ssh.bind, "0.0.0.0:8024");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: AppConfig = toml_from_str("airport = \"sfo\"\nradius_nm = 40\n[ssh]\nenabled = false\n");
        assert_eq!(config.radius_nm, 40);
        assert!(!config.ssh.enabled);
        assert_eq!(config.ssh.bind, "0.0.0.0:8024");
        assert_eq!(config.reference_point().unwrap().code, "SFO");
    }

    #[test]
    fn test_unknown_airport_rejected() {
        let config = AppConfig {
            airport: "XXX".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.session_config(),
            Err(ConfigError::UnknownAirport(code)) if code == "XXX"
        ));
    }

    #[test]
    fn test_explicit_reference_overrides_airport() {
        let config = AppConfig {
            airport: "XXX".to_string(),
            reference: Some(ReferenceConfig {
                name: "Home".to_string(),
                lat: 51.5,
                lon: -0.12,
            }),
            ..Default::default()
        };
        let session = config.session_config().unwrap();
        assert_eq!(session.reference.name, "Home");
        assert!((session.reference.lat - 51.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_radius = AppConfig {
            radius_nm: 0,
            ..Default::default()
        };
        assert!(matches!(zero_radius.validate(), Err(ConfigError::Invalid(_))));

        let zero_trail = AppConfig {
            trail_length: 0,
            ..Default::default()
        };
        assert!(zero_trail.validate().is_err());
    }

    #[test]
    fn test_keepalive_zero_disables() {
        let config = AppConfig {
            keepalive_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.session_config().unwrap().keepalive_interval.is_none());
    }

    #[test]
    fn test_static_size_requires_both_dimensions() {
        let width_only = AppConfig {
            terminal_width: Some(100),
            ..Default::default()
        };
        assert!(width_only.session_config().unwrap().static_size.is_none());

        let both = AppConfig {
            terminal_width: Some(100),
            terminal_height: Some(30),
            ..Default::default()
        };
        assert_eq!(
            both.session_config().unwrap().static_size,
            Some(TerminalSize { cols: 100, rows: 30 })
        );
    }

    fn toml_from_str(contents: &str) -> AppConfig {
        let dir = std::env::temp_dir().join(format!(
            "adsb-terminal-radar-test-{}-{}",
            std::process::id(),
            contents.len()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, contents).unwrap();
        let config = AppConfig::load(Some(path.as_path())).unwrap();
        std::fs::remove_dir_all(&dir).ok();
        config
    }
}
