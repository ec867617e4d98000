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

//! Telnet transport.
//!
//! The server asks the client for character-at-a-time mode (`WILL ECHO`,
//! `WILL SGA`) and for window size reports (`DO NAWS`). A background task
//! strips telnet commands from the inbound stream, tracks NAWS updates, and
//! forwards plain data bytes to the session.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::{TerminalSize, Transport};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const NOP: u8 = 241;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;
const OPT_NAWS: u8 = 31;

const CR: u8 = b'\r';
const NUL: u8 = 0;

/// Longest sub-negotiation we buffer before discarding it.
const MAX_SUBNEGOTIATION: usize = 64;
const INPUT_QUEUE_CAPACITY: usize = 256;

/// Output of the inbound decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetEvent {
    Data(u8),
    WindowSize(TerminalSize),
    /// Option negotiation from the client: (command, option).
    Negotiation(u8, u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Data,
    Iac,
    Negotiation(u8),
    Sub,
    SubIac,
}

/// Byte-at-a-time telnet command decoder.
#[derive(Debug)]
pub struct TelnetDecoder {
    state: DecodeState,
    sub: Vec<u8>,
    last_was_cr: bool,
}

impl Default for TelnetDecoder {
    fn default() -> Self {
        Self {
            state: DecodeState::Data,
            sub: Vec::with_capacity(MAX_SUBNEGOTIATION),
            last_was_cr: false,
        }
    }
}

impl TelnetDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inbound byte.
    pub fn feed(&mut self, byte: u8) -> Option<TelnetEvent> {
        match self.state {
            DecodeState::Data => {
                if byte == IAC {
                    self.state = DecodeState::Iac;
                    return None;
                }
                if self.last_was_cr && byte == NUL {
                    self.last_was_cr = false;
                    return None;
                }
                self.last_was_cr = byte == CR;
                Some(TelnetEvent::Data(byte))
            }
            DecodeState::Iac => match byte {
                IAC => {
                    self.state = DecodeState::Data;
                    self.last_was_cr = false;
                    Some(TelnetEvent::Data(IAC))
                }
                DO | DONT | WILL | WONT => {
                    self.state = DecodeState::Negotiation(byte);
                    None
                }
                SB => {
                    self.sub.clear();
                    self.state = DecodeState::Sub;
                    None
                }
                _ => {
                    self.state = DecodeState::Data;
                    None
                }
            },
            DecodeState::Negotiation(command) => {
                self.state = DecodeState::Data;
                Some(TelnetEvent::Negotiation(command, byte))
            }
            DecodeState::Sub => {
                if byte == IAC {
                    self.state = DecodeState::SubIac;
                } else if self.sub.len() < MAX_SUBNEGOTIATION {
                    self.sub.push(byte);
                }
                None
            }
            DecodeState::SubIac => match byte {
                SE => {
                    self.state = DecodeState::Data;
                    self.finish_subnegotiation()
                }
                IAC => {
                    if self.sub.len() < MAX_SUBNEGOTIATION {
                        self.sub.push(IAC);
                    }
                    self.state = DecodeState::Sub;
                    None
                }
                _ => {
                    self.state = DecodeState::Sub;
                    None
                }
            },
        }
    }

    fn finish_subnegotiation(&mut self) -> Option<TelnetEvent> {
        match self.sub.as_slice() {
            [OPT_NAWS, c1, c0, r1, r0, ..] => {
                let cols = u16::from_be_bytes([*c1, *c0]);
                let rows = u16::from_be_bytes([*r1, *r0]);
                TerminalSize::from_reported(u32::from(cols), u32::from(rows))
                    .map(TelnetEvent::WindowSize)
            }
            _ => None,
        }
    }
}

/// Reply owed for a client negotiation, if any.
fn negotiation_reply(command: u8, option: u8) -> Option<[u8; 3]> {
    match (command, option) {
        (DO, OPT_ECHO | OPT_SGA) | (WILL, OPT_NAWS) | (WONT | DONT, _) => None,
        (DO, other) => Some([IAC, WONT, other]),
        (WILL, other) => Some([IAC, DONT, other]),
        _ => None,
    }
}

/// Escape IAC bytes in outbound data.
fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        out.push(byte);
        if byte == IAC {
            out.push(IAC);
        }
    }
    out
}

type SharedWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// A connected telnet client.
pub struct TelnetTransport {
    peer: String,
    writer: SharedWriter,
    input: Mutex<mpsc::Receiver<u8>>,
    size: watch::Receiver<Option<TerminalSize>>,
    closing: Arc<AtomicBool>,
    reader_cancel: CancellationToken,
}

impl std::fmt::Debug for TelnetTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnetTransport")
            .field("peer", &self.peer)
            .field("size", &*self.size.borrow())
            .field("closing", &self.closing.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TelnetTransport {
    /// Take over an accepted connection and start negotiating.
    pub async fn accept(stream: TcpStream) -> io::Result<Self> {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_string(), |addr| addr.to_string());
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(BufWriter::new(write_half)));

        {
            let mut w = writer.lock().await;
            w.write_all(&[IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SGA, IAC, DO, OPT_NAWS])
                .await?;
            w.flush().await?;
        }

        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        let (size_tx, size_rx) = watch::channel(None);
        let closing = Arc::new(AtomicBool::new(false));
        let reader_cancel = CancellationToken::new();

        tokio::spawn(read_loop(
            peer.clone(),
            read_half,
            Arc::clone(&writer),
            input_tx,
            size_tx,
            Arc::clone(&closing),
            reader_cancel.clone(),
        ));

        Ok(Self {
            peer,
            writer,
            input: Mutex::new(input_rx),
            size: size_rx,
            closing,
            reader_cancel,
        })
    }
}

async fn read_loop(
    peer: String,
    mut read_half: OwnedReadHalf,
    writer: SharedWriter,
    input_tx: mpsc::Sender<u8>,
    size_tx: watch::Sender<Option<TerminalSize>>,
    closing: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut decoder = TelnetDecoder::new();
    let mut buf = [0u8; 512];

    'outer: loop {
        let n = tokio::select! {
            () = cancel.cancelled() => break 'outer,
            result = read_half.read(&mut buf) => match result {
                Ok(0) => {
                    info!("[{}] Telnet client closed the connection", peer);
                    break 'outer;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!("[{}] Telnet read error: {}", peer, e);
                    break 'outer;
                }
            },
        };

        for &byte in &buf[..n] {
            match decoder.feed(byte) {
                Some(TelnetEvent::Data(b)) => {
                    if input_tx.send(b).await.is_err() {
                        break 'outer;
                    }
                }
                Some(TelnetEvent::WindowSize(size)) => {
                    debug!("[{}] NAWS reported {}", peer, size);
                    size_tx.send_replace(Some(size));
                }
                Some(TelnetEvent::Negotiation(command, option)) => {
                    if let Some(reply) = negotiation_reply(command, option) {
                        let mut w = writer.lock().await;
                        if w.write_all(&reply).await.is_err() || w.flush().await.is_err() {
                            break 'outer;
                        }
                    }
                }
                None => {}
            }
        }
    }

    closing.store(true, Ordering::SeqCst);
}

#[async_trait]
impl Transport for TelnetTransport {
    async fn read_byte(&self) -> io::Result<Option<u8>> {
        Ok(self.input.lock().await.recv().await)
    }

    async fn write(&self, text: &str) -> io::Result<()> {
        let data = escape_iac(text.as_bytes());
        self.writer.lock().await.write_all(&data).await
    }

    async fn drain(&self) -> io::Result<()> {
        self.writer.lock().await.flush().await
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn reported_size(&self) -> Option<TerminalSize> {
        *self.size.borrow()
    }

    async fn keepalive(&self) -> io::Result<()> {
        let mut w = self.writer.lock().await;
        w.write_all(&[IAC, NOP]).await?;
        w.flush().await
    }

    async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.reader_cancel.cancel();
        let mut w = self.writer.lock().await;
        if let Err(e) = w.flush().await {
            debug!("[{}] Flush on close failed: {}", self.peer, e);
        }
        if let Err(e) = w.shutdown().await {
            debug!("[{}] Shutdown failed: {}", self.peer, e);
        }
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn decode(bytes: &[u8]) -> Vec<TelnetEvent> {
        let mut decoder = TelnetDecoder::new();
        bytes.iter().filter_map(|b| decoder.feed(*b)).collect()
    }

    #[test]
    fn test_plain_data_passes_through() {
        assert_eq!(
            decode(b"qt"),
            vec![TelnetEvent::Data(b'q'), TelnetEvent::Data(b't')]
        );
    }

    #[test]
    fn test_naws_subnegotiation() {
        let events = decode(&[IAC, SB, OPT_NAWS, 0, 132, 0, 43, IAC, SE, b'r']);
        assert_eq!(
            events,
            vec![
                TelnetEvent::WindowSize(TerminalSize { cols: 132, rows: 43 }),
                TelnetEvent::Data(b'r'),
            ]
        );
    }

    #[test]
    fn test_naws_with_escaped_iac_width() {
        // 255 columns is sent as IAC IAC inside the sub-negotiation.
        let events = decode(&[IAC, SB, OPT_NAWS, 0, IAC, IAC, 0, 50, IAC, SE]);
        assert_eq!(
            events,
            vec![TelnetEvent::WindowSize(TerminalSize { cols: 255, rows: 50 })]
        );
    }

    #[test]
    fn test_negotiation_and_escapes() {
        let events = decode(&[IAC, DO, OPT_ECHO, IAC, IAC, IAC, NOP, b'x']);
        assert_eq!(
            events,
            vec![
                TelnetEvent::Negotiation(DO, OPT_ECHO),
                TelnetEvent::Data(IAC),
                TelnetEvent::Data(b'x'),
            ]
        );
    }

    #[test]
    fn test_cr_nul_dropped() {
        assert_eq!(
            decode(&[b'q', CR, NUL, b't']),
            vec![
                TelnetEvent::Data(b'q'),
                TelnetEvent::Data(CR),
                TelnetEvent::Data(b't'),
            ]
        );
    }

    #[test]
    fn test_negotiation_replies() {
        assert!(negotiation_reply(DO, OPT_ECHO).is_none());
        assert!(negotiation_reply(WILL, OPT_NAWS).is_none());
        assert_eq!(negotiation_reply(DO, 24), Some([IAC, WONT, 24]));
        assert_eq!(negotiation_reply(WILL, 24), Some([IAC, DONT, 24]));
    }

    #[test]
    fn test_escape_iac() {
        assert_eq!(escape_iac(&[1, IAC, 2]), vec![1, IAC, IAC, 2]);
    }

    #[tokio::test]
    async fn test_transport_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut greeting = [0u8; 9];
            stream.read_exact(&mut greeting).await.unwrap();
            stream
                .write_all(&[IAC, WILL, OPT_NAWS, IAC, SB, OPT_NAWS, 0, 100, 0, 30, IAC, SE, b'q'])
                .await
                .unwrap();
            let mut reply = vec![0u8; 5];
            stream.read_exact(&mut reply).await.unwrap();
            (greeting, reply)
        });

        let (stream, _) = listener.accept().await.unwrap();
        let transport = TelnetTransport::accept(stream).await.unwrap();

        assert_eq!(transport.read_byte().await.unwrap(), Some(b'q'));
        assert_eq!(
            transport.reported_size(),
            Some(TerminalSize { cols: 100, rows: 30 })
        );

        transport.write("hello").await.unwrap();
        transport.drain().await.unwrap();

        let (greeting, reply) = client.await.unwrap();
        assert_eq!(greeting, [IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SGA, IAC, DO, OPT_NAWS]);
        assert_eq!(reply, b"hello");

        transport.close().await;
        assert!(transport.is_closing());
    }
}
