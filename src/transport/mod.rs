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

//! Client transports.
//!
//! Telnet and SSH connections are both exposed to the session engine through
//! the [`Transport`] trait: a byte stream in, text out, and an optional
//! client-reported terminal size.

#[cfg(test)]
pub mod mock;
pub mod ssh;
pub mod telnet;

use std::io;

use async_trait::async_trait;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    /// Size used when every detection method fails.
    pub const DEFAULT: Self = Self {
        cols: 120,
        rows: 40,
    };

    /// Build from protocol-reported values, rejecting zero dimensions.
    #[must_use]
    pub fn from_reported(cols: u32, rows: u32) -> Option<Self> {
        let cols = u16::try_from(cols).ok().filter(|c| *c > 0)?;
        let rows = u16::try_from(rows).ok().filter(|r| *r > 0)?;
        Some(Self { cols, rows })
    }
}

impl std::fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// A duplex client stream as seen by a session.
///
/// Methods take `&self` so one transport can be shared between the session's
/// background reader and its main loop.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Next input byte, or `None` once the client has gone away.
    async fn read_byte(&self) -> io::Result<Option<u8>>;

    /// Queue text for the client.
    async fn write(&self, text: &str) -> io::Result<()>;

    /// Flush queued output.
    async fn drain(&self) -> io::Result<()>;

    fn is_closing(&self) -> bool;

    /// Terminal size announced by the client protocol, if any.
    fn reported_size(&self) -> Option<TerminalSize> {
        None
    }

    /// Send something harmless to keep idle connections alive.
    async fn keepalive(&self) -> io::Result<()> {
        self.drain().await
    }

    async fn close(&self);

    /// Remote address for logging.
    fn peer(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_size_rejects_zero_and_overflow() {
        assert_eq!(
            TerminalSize::from_reported(80, 24),
            Some(TerminalSize { cols: 80, rows: 24 })
        );
        assert!(TerminalSize::from_reported(0, 24).is_none());
        assert!(TerminalSize::from_reported(80, 70_000).is_none());
    }
}
