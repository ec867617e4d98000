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

//! SSH transport built on `russh`.
//!
//! Every client is let in without credentials. The first session channel that
//! asks for a shell gets a radar session; PTY and window-change requests feed
//! the reported terminal size.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use russh::server::{Auth, Handle, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};

use super::{TerminalSize, Transport};
use crate::server::ServerContext;

const INPUT_QUEUE_CAPACITY: usize = 256;

/// The session side of one SSH channel.
pub struct SshTransport {
    peer: String,
    handle: Handle,
    channel: ChannelId,
    input: Mutex<mpsc::Receiver<u8>>,
    size: watch::Receiver<Option<TerminalSize>>,
    closing: Arc<AtomicBool>,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("peer", &self.peer)
            .field("channel", &self.channel)
            .field("size", &*self.size.borrow())
            .finish_non_exhaustive()
    }
}

/// Queue client bytes without waiting. The russh connection loop also
/// carries our outgoing frames, so it must never block on a full session
/// queue. Returns how many bytes were dropped.
fn forward_input(tx: &mpsc::Sender<u8>, data: &[u8]) -> usize {
    let mut dropped = 0;
    for &byte in data {
        match tx.try_send(byte) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => dropped += 1,
            Err(TrySendError::Closed(_)) => break,
        }
    }
    dropped
}

fn channel_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "ssh channel closed")
}

#[async_trait]
impl Transport for SshTransport {
    async fn read_byte(&self) -> io::Result<Option<u8>> {
        Ok(self.input.lock().await.recv().await)
    }

    async fn write(&self, text: &str) -> io::Result<()> {
        self.handle
            .data(self.channel, CryptoVec::from_slice(text.as_bytes()))
            .await
            .map_err(|_unsent| channel_closed())
    }

    async fn drain(&self) -> io::Result<()> {
        if self.is_closing() {
            return Err(channel_closed());
        }
        Ok(())
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn reported_size(&self) -> Option<TerminalSize> {
        *self.size.borrow()
    }

    async fn keepalive(&self) -> io::Result<()> {
        self.handle
            .data(self.channel, CryptoVec::new())
            .await
            .map_err(|_unsent| channel_closed())
    }

    async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        if self.handle.eof(self.channel).await.is_err() {
            debug!("[{}] EOF on closed channel", self.peer);
        }
        if self.handle.close(self.channel).await.is_err() {
            debug!("[{}] Close on closed channel", self.peer);
        }
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

/// Per-connection `russh` handler.
pub struct SshHandler {
    peer: String,
    context: Arc<ServerContext>,
    channel: Option<ChannelId>,
    input_tx: Option<mpsc::Sender<u8>>,
    input_rx: Option<mpsc::Receiver<u8>>,
    size_tx: watch::Sender<Option<TerminalSize>>,
    closing: Arc<AtomicBool>,
}

impl std::fmt::Debug for SshHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshHandler")
            .field("peer", &self.peer)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl SshHandler {
    #[must_use]
    pub fn new(peer: String, context: Arc<ServerContext>) -> Self {
        let (size_tx, _) = watch::channel(None);
        Self {
            peer,
            context,
            channel: None,
            input_tx: None,
            input_rx: None,
            size_tx,
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_ours(&self, channel: ChannelId) -> bool {
        self.channel == Some(channel)
    }

    fn hang_up(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        self.input_tx = None;
    }
}

impl Drop for SshHandler {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl russh::server::Handler for SshHandler {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        debug!("[{}] SSH login as '{}'", self.peer, user);
        Ok(Auth::Accept)
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        debug!("[{}] SSH password login as '{}'", self.peer, user);
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.channel.is_some() {
            debug!("[{}] Refusing extra session channel", self.peer);
            return Ok(false);
        }

        let (tx, rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        self.channel = Some(channel.id());
        self.input_tx = Some(tx);
        self.input_rx = Some(rx);
        Ok(true)
    }

    #[allow(clippy::too_many_arguments, reason = "signature fixed by russh")]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.is_ours(channel) {
            let size = TerminalSize::from_reported(col_width, row_height);
            debug!("[{}] PTY request ({}) {:?}", self.peer, term, size);
            self.size_tx.send_replace(size);
        }
        session.channel_success(channel);
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.is_ours(channel) {
            if let Some(size) = TerminalSize::from_reported(col_width, row_height) {
                debug!("[{}] Window changed to {}", self.peer, size);
                self.size_tx.send_replace(Some(size));
            }
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let input_rx = if self.is_ours(channel) {
            self.input_rx.take()
        } else {
            None
        };
        let Some(input_rx) = input_rx else {
            session.channel_failure(channel);
            return Ok(());
        };
        session.channel_success(channel);

        info!("[{}] SSH shell started", self.peer);
        let transport = SshTransport {
            peer: self.peer.clone(),
            handle: session.handle(),
            channel,
            input: Mutex::new(input_rx),
            size: self.size_tx.subscribe(),
            closing: Arc::clone(&self.closing),
        };
        self.context.spawn_session(Arc::new(transport));
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.is_ours(channel) {
            return Ok(());
        }
        if let Some(tx) = &self.input_tx {
            let dropped = forward_input(tx, data);
            if dropped > 0 {
                debug!("[{}] Input queue full, dropped {} bytes", self.peer, dropped);
            }
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.is_ours(channel) {
            debug!("[{}] SSH client sent EOF", self.peer);
            self.hang_up();
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.is_ours(channel) {
            info!("[{}] SSH channel closed", self.peer);
            self.hang_up();
        }
        Ok(())
    }
}
