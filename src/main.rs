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

//! ADS-B terminal radar server.
//!
//! Serves an ASCII radar view of nearby traffic to telnet and SSH clients,
//! either from the adsb.lol API or from a built-in simulation.

mod airports;
mod config;
mod render;
mod server;
mod session;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use adsb_client::{AdsbLolSource, CachedFetchClient};
use clap::Parser;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use config::{AppConfig, ConfigError};
use server::ServerContext;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "adsb-terminal-radar")]
#[command(version, about = "ASCII ADS-B radar served over telnet and SSH", long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults to the per-user config location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve simulated traffic
    #[arg(long, conflicts_with = "live")]
    demo: bool,

    /// Serve live traffic from the upstream API
    #[arg(long)]
    live: bool,

    /// Reference airport code
    #[arg(short, long)]
    airport: Option<String>,

    /// Radius in nautical miles
    #[arg(short, long)]
    radius: Option<u32>,

    /// Telnet listen address
    #[arg(long)]
    telnet_bind: Option<String>,

    /// SSH listen address
    #[arg(long)]
    ssh_bind: Option<String>,

    /// Disable the telnet listener
    #[arg(long)]
    no_telnet: bool,

    /// Disable the SSH listener
    #[arg(long)]
    no_ssh: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut AppConfig) {
        if self.demo {
            config.demo_mode = true;
        }
        if self.live {
            config.demo_mode = false;
        }
        if let Some(airport) = &self.airport {
            config.airport.clone_from(airport);
            config.reference = None;
        }
        if let Some(radius) = self.radius {
            config.radius_nm = radius;
        }
        if let Some(bind) = &self.telnet_bind {
            config.telnet.bind.clone_from(bind);
        }
        if let Some(bind) = &self.ssh_bind {
            config.ssh.bind.clone_from(bind);
        }
        if self.no_telnet {
            config.telnet.enabled = false;
        }
        if self.no_ssh {
            config.ssh.enabled = false;
        }
        if self.verbose {
            config.debug = true;
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    cli.apply_to(&mut config);
    init_logging(config.debug);

    if let Err(e) = run(config, cli.config.is_some()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig, explicit_path: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !explicit_path {
        if let Ok(path) = AppConfig::config_path() {
            info!("Using configuration at {}", path.display());
        }
    }

    let session_config = match config.session_config() {
        Ok(session_config) => session_config,
        Err(ConfigError::UnknownAirport(code)) => {
            let known: Vec<&str> = airports::codes().collect();
            return Err(format!("unknown airport '{}', known codes: {}", code, known.join(", ")).into());
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "Reference {} ({}), radius {} nm, {} mode",
        session_config.reference.code,
        session_config.reference.name,
        session_config.radius_nm,
        if session_config.demo_mode { "demo" } else { "live" }
    );

    let fetcher = if session_config.demo_mode {
        None
    } else {
        let source = AdsbLolSource::new(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
        .map_err(server::ServerError::from)?;
        Some(Arc::new(CachedFetchClient::new(
            Arc::new(source),
            Duration::from_secs(config.cache_ttl_secs),
        )))
    };

    let shutdown = CancellationToken::new();
    let context = Arc::new(ServerContext::new(
        Arc::new(session_config),
        fetcher,
        shutdown.clone(),
    ));

    let mut listeners = Vec::new();
    if config.telnet.enabled {
        let listener = server::bind(&config.telnet.bind).await?;
        listeners.push(tokio::spawn(server::serve_telnet(listener, Arc::clone(&context))));
    }
    if config.ssh.enabled {
        let key = server::host_key(config.ssh.host_key_path.as_deref())?;
        let ssh_config = Arc::new(server::ssh_config(key));
        let listener = server::bind(&config.ssh.bind).await?;
        listeners.push(tokio::spawn(server::serve_ssh(
            listener,
            ssh_config,
            Arc::clone(&context),
        )));
    }
    if listeners.is_empty() {
        return Err("both telnet and SSH are disabled; nothing to serve".into());
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    context.shutdown(SHUTDOWN_GRACE).await;
    for listener in listeners {
        if let Err(e) = listener.await {
            warn!("Listener task failed: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "adsb-terminal-radar",
            "--live",
            "--airport",
            "jfk",
            "--radius",
            "40",
            "--no-ssh",
            "--telnet-bind",
            "127.0.0.1:2323",
        ]);
        let mut config = AppConfig::default();
        cli.apply_to(&mut config);

        assert!(!config.demo_mode);
        assert_eq!(config.airport, "jfk");
        assert_eq!(config.radius_nm, 40);
        assert!(!config.ssh.enabled);
        assert!(config.telnet.enabled);
        assert_eq!(config.telnet.bind, "127.0.0.1:2323");
        assert_eq!(config.session_config().unwrap().reference.code, "JFK");
    }

    #[test]
    fn test_demo_and_live_conflict() {
        assert!(Cli::try_parse_from(["adsb-terminal-radar", "--demo", "--live"]).is_err());
    }

    #[test]
    fn test_no_flags_keep_config() {
        let cli = Cli::parse_from(["adsb-terminal-radar"]);
        let mut config = AppConfig::default();
        cli.apply_to(&mut config);
        assert!(config.demo_mode);
        assert!(config.telnet.enabled && config.ssh.enabled);
        assert!(!config.debug);
    }
}
