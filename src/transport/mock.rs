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

//! Scripted in-memory transport for session tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{TerminalSize, Transport};

const CURSOR_QUERY: &str = "\x1b[6n";

#[derive(Debug)]
pub struct MockTransport {
    input_tx: Mutex<Option<mpsc::UnboundedSender<u8>>>,
    input: tokio::sync::Mutex<mpsc::UnboundedReceiver<u8>>,
    output: Mutex<String>,
    size: Mutex<Option<TerminalSize>>,
    cursor_reply: Mutex<Option<String>>,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    keepalives: AtomicUsize,
    closed: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            input_tx: Mutex::new(Some(tx)),
            input: tokio::sync::Mutex::new(rx),
            output: Mutex::new(String::new()),
            size: Mutex::new(None),
            cursor_reply: Mutex::new(None),
            fail_writes: AtomicBool::new(false),
            stall_writes: AtomicBool::new(false),
            keepalives: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue keystrokes as if the client typed them.
    pub fn send_keys(&self, keys: &str) {
        let tx = self.input_tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            for byte in keys.bytes() {
                tx.send(byte).unwrap();
            }
        }
    }

    /// Simulate the client disconnecting.
    pub fn hang_up(&self) {
        self.input_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn set_reported_size(&self, size: Option<TerminalSize>) {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner) = size;
    }

    /// Answer cursor position queries with `ESC[rows;colsR`.
    pub fn reply_to_cursor_query(&self, cols: u16, rows: u16) {
        *self.cursor_reply.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(format!("\x1b[{rows};{cols}R"));
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Make every later write hang, like a peer that stopped reading.
    pub fn stall_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    pub fn output(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn keepalives(&self) -> usize {
        self.keepalives.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read_byte(&self) -> io::Result<Option<u8>> {
        Ok(self.input.lock().await.recv().await)
    }

    async fn write(&self, text: &str) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);

        if text.contains(CURSOR_QUERY) {
            let reply = self
                .cursor_reply
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(reply) = reply {
                self.send_keys(&reply);
            }
        }
        Ok(())
    }

    async fn drain(&self) -> io::Result<()> {
        Ok(())
    }

    fn is_closing(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn reported_size(&self) -> Option<TerminalSize> {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn keepalive(&self) -> io::Result<()> {
        self.keepalives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn peer(&self) -> &str {
        "mock"
    }
}
