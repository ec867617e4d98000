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

//! Keystroke commands and cursor position reports.

use crate::transport::TerminalSize;

/// Ask the terminal where the cursor is after pushing it to the far corner.
pub const CURSOR_QUERY: &str = "\x1b[s\x1b[999;999H\x1b[6n";
pub const CURSOR_RESTORE: &str = "\x1b[u";

/// A single-key session command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Refresh,
    ToggleMode,
}

impl Command {
    /// Interpret one input byte. Only printable characters count; case is ignored.
    #[must_use]
    pub fn from_key(byte: u8) -> Option<Self> {
        if !byte.is_ascii_graphic() {
            return None;
        }
        match byte.to_ascii_lowercase() {
            b'q' => Some(Self::Quit),
            b'r' => Some(Self::Refresh),
            b't' => Some(Self::ToggleMode),
            _ => None,
        }
    }
}

/// Find a cursor position report (`ESC [ rows ; cols R`) in `buf`.
///
/// The last complete report wins.
#[must_use]
pub fn parse_cursor_report(buf: &[u8]) -> Option<TerminalSize> {
    split_cursor_reports(buf).0
}

/// Separate cursor position reports from everything else in `buf`.
///
/// Returns the last complete report and the remaining bytes in arrival
/// order, such as keys typed while a query was in flight.
#[must_use]
pub fn split_cursor_reports(buf: &[u8]) -> (Option<TerminalSize>, Vec<u8>) {
    let mut found = None;
    let mut rest = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == 0x1b && buf.get(i + 1) == Some(&b'[') {
            if let Some((size, consumed)) = parse_report_body(&buf[i + 2..]) {
                found = Some(size);
                i += 2 + consumed;
                continue;
            }
        }
        rest.push(buf[i]);
        i += 1;
    }
    (found, rest)
}

fn parse_report_body(body: &[u8]) -> Option<(TerminalSize, usize)> {
    let (rows, rest) = take_number(body)?;
    if rest.first() != Some(&b';') {
        return None;
    }
    let (cols, tail) = take_number(&rest[1..])?;
    if tail.first() != Some(&b'R') {
        return None;
    }
    let size = TerminalSize::from_reported(cols, rows)?;
    Some((size, body.len() - tail.len() + 1))
}

fn take_number(bytes: &[u8]) -> Option<(u32, &[u8])> {
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits > 5 {
        return None;
    }
    let text = std::str::from_utf8(&bytes[..digits]).ok()?;
    Some((text.parse().ok()?, &bytes[digits..]))
}
