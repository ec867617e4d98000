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

//! Listener tasks and session spawning.
//!
//! One accept loop runs per enabled transport. Every accepted client gets its
//! own [`Session`] task; a failing session is logged and never takes the
//! listeners or other sessions down with it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use adsb_client::{CachedFetchClient, FetchError};
use log::{debug, error, info, warn};
use russh_keys::key::KeyPair;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::SessionConfig;
use crate::session::Session;
use crate::transport::ssh::SshHandler;
use crate::transport::telnet::TelnetTransport;
use crate::transport::Transport;

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to load SSH host key: {0}")]
    HostKey(#[from] russh_keys::Error),

    #[error("failed to generate SSH host key")]
    KeyGeneration,

    #[error("failed to build HTTP client: {0}")]
    Fetch(#[from] FetchError),
}

/// State shared by all listeners.
pub struct ServerContext {
    config: Arc<SessionConfig>,
    fetcher: Option<Arc<CachedFetchClient>>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("demo_mode", &self.config.demo_mode)
            .field("active_sessions", &self.sessions.len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ServerContext {
    #[must_use]
    pub fn new(
        config: Arc<SessionConfig>,
        fetcher: Option<Arc<CachedFetchClient>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            fetcher,
            shutdown,
            sessions: TaskTracker::new(),
        }
    }

    /// Start a session for a connected client.
    pub fn spawn_session(&self, transport: Arc<dyn Transport>) {
        let peer = transport.peer().to_string();
        let session = Session::new(
            Arc::clone(&transport),
            Arc::clone(&self.config),
            self.fetcher.clone(),
            self.shutdown.child_token(),
        );

        self.sessions.spawn(async move {
            match session {
                Ok(session) => {
                    info!("[{}] Session started", peer);
                    if let Err(e) = session.run().await {
                        debug!("[{}] Session error: {}", peer, e);
                    }
                }
                Err(e) => {
                    error!("[{}] Cannot start session: {}", peer, e);
                    transport.close().await;
                }
            }
        });
    }

    /// Stop accepting, end every session and wait up to `grace` for them to
    /// restore their terminals.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();
        self.sessions.close();
        if tokio::time::timeout(grace, self.sessions.wait()).await.is_err() {
            warn!(
                "{} sessions still running after shutdown grace period",
                self.sessions.len()
            );
        }
    }
}

/// Bind a TCP listener, naming the address on failure.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Accept telnet clients until shutdown.
pub async fn serve_telnet(listener: TcpListener, context: Arc<ServerContext>) {
    if let Ok(addr) = listener.local_addr() {
        info!("Telnet server listening on {}", addr);
    }

    loop {
        let accepted = tokio::select! {
            () = context.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Telnet accept failed: {}", e);
                continue;
            }
        };

        info!("Telnet connection from {}", addr);
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            match TelnetTransport::accept(stream).await {
                Ok(transport) => context.spawn_session(Arc::new(transport)),
                Err(e) => warn!("[{}] Telnet negotiation failed: {}", addr, e),
            }
        });
    }

    info!("Telnet server stopped");
}

/// Load the SSH host key from `path`, or generate a throwaway one.
pub fn host_key(path: Option<&Path>) -> Result<KeyPair, ServerError> {
    if let Some(path) = path {
        info!("Loading SSH host key from {}", path.display());
        return Ok(russh_keys::load_secret_key(path, None)?);
    }

    warn!("No SSH host key configured; generating an ephemeral key");
    KeyPair::generate_ed25519().ok_or(ServerError::KeyGeneration)
}

/// SSH server settings: anonymous logins, no idle timeout.
#[must_use]
pub fn ssh_config(key: KeyPair) -> russh::server::Config {
    russh::server::Config {
        keys: vec![key],
        methods: russh::MethodSet::NONE | russh::MethodSet::PASSWORD,
        inactivity_timeout: None,
        auth_rejection_time: Duration::from_secs(1),
        auth_rejection_time_initial: Some(Duration::ZERO),
        ..Default::default()
    }
}

/// Accept SSH clients until shutdown.
pub async fn serve_ssh(
    listener: TcpListener,
    config: Arc<russh::server::Config>,
    context: Arc<ServerContext>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("SSH server listening on {}", addr);
    }

    loop {
        let accepted = tokio::select! {
            () = context.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("SSH accept failed: {}", e);
                continue;
            }
        };

        info!("SSH connection from {}", addr);
        if let Err(e) = stream.set_nodelay(true) {
            debug!("[{}] Failed to set TCP_NODELAY: {}", addr, e);
        }
        let handler = SshHandler::new(addr.to_string(), Arc::clone(&context));
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            match russh::server::run_stream(config, stream, handler).await {
                Ok(running) => {
                    if let Err(e) = running.await {
                        debug!("[{}] SSH connection ended: {}", addr, e);
                    }
                }
                Err(e) => warn!("[{}] SSH handshake failed: {}", addr, e),
            }
        });
    }

    info!("SSH server stopped");
}
