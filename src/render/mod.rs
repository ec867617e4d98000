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

//! ASCII radar rendering.
//!
//! A [`Renderer`] is built for one terminal size and turns a track snapshot plus
//! a per-frame [`FrameContext`] into a [`Frame`]: a bordered map on top and an
//! information panel below. Nothing here holds session state; display mode,
//! bounds and data freshness all arrive with each call.

mod display_mode;
mod frame;
mod projection;

pub use display_mode::{AltitudeBand, DisplayMode};
pub use frame::{ansi, Frame};
pub use projection::{Bounds, Projector};

use std::cmp::Ordering;

use adsb_client::Aircraft;
use chrono::{DateTime, Utc};
use crossterm::style::Color;

use crate::airports::ReferencePoint;
use crate::transport::TerminalSize;

/// Rows used by the panel besides the aircraft table: rule, title, mode,
/// bounds, table header and key help.
const PANEL_FIXED_ROWS: usize = 6;
const MIN_MAP_ROWS: usize = 5;

const GROUND_COLOR: Color = Color::White;
const LOW_COLOR: Color = Color::Green;
const MEDIUM_COLOR: Color = Color::Yellow;
const HIGH_COLOR: Color = Color::Red;
const UNKNOWN_ALTITUDE_COLOR: Color = Color::Cyan;
const BORDER_COLOR: Color = Color::Blue;
const TRAIL_COLOR: Color = Color::DarkGrey;
const MARKER_COLOR: Color = Color::Magenta;
const STALE_COLOR: Color = Color::Red;

const UNICODE_ARROWS: [char; 8] = ['↑', '↗', '→', '↘', '↓', '↙', '←', '↖'];
const ASCII_ARROWS: [char; 8] = ['^', '/', '>', '\\', 'v', '/', '<', '\\'];

/// Fixed glyph alphabets by speed bucket, used when headings are not drawn.
const SLOW_GLYPHS: [char; 3] = ['o', '*', '+'];
const MEDIUM_GLYPHS: [char; 3] = ['x', '#', '%'];
const FAST_GLYPHS: [char; 3] = ['@', '&', '$'];
const SLOW_MAX_KT: f64 = 150.0;
const MEDIUM_MAX_KT: f64 = 350.0;

/// Symbol and trail settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub unicode_symbols: bool,
    pub directional_symbols: bool,
    pub show_trails: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            unicode_symbols: false,
            directional_symbols: true,
            show_trails: true,
        }
    }
}

/// Everything a frame depends on besides the tracks themselves.
#[derive(Debug, Clone)]
pub struct FrameContext<'a> {
    pub mode: DisplayMode,
    pub bounds: Bounds,
    pub reference: Option<&'a ReferencePoint>,
    pub display_limit: usize,
    /// Last refresh fell back to cached data or got nothing.
    pub stale: bool,
    pub demo: bool,
    pub now: DateTime<Utc>,
}

/// Frame builder for one terminal size.
#[derive(Debug, Clone)]
pub struct Renderer {
    size: TerminalSize,
    options: RenderOptions,
}

impl Renderer {
    #[must_use]
    pub fn new(size: TerminalSize, options: RenderOptions) -> Self {
        Self { size, options }
    }

    /// Aircraft table rows that fit beside a minimum-height map.
    #[must_use]
    pub fn table_rows(&self, display_limit: usize) -> usize {
        usize::from(self.size.rows)
            .saturating_sub(PANEL_FIXED_ROWS + MIN_MAP_ROWS + 1)
            .min(display_limit)
    }

    #[must_use]
    pub fn panel_rows(&self, display_limit: usize) -> usize {
        PANEL_FIXED_ROWS + self.table_rows(display_limit)
    }

    /// Map height including its border. One terminal row stays free so the
    /// trailing CRLF never scrolls the screen.
    #[must_use]
    pub fn map_rows(&self, display_limit: usize) -> usize {
        usize::from(self.size.rows)
            .saturating_sub(self.panel_rows(display_limit) + 1)
            .max(MIN_MAP_ROWS)
    }

    /// Render one frame. The frame never exceeds `rows - 1` lines; terminals
    /// too short for the minimum layout lose the bottom of the panel.
    #[must_use]
    pub fn render(&self, tracks: &[&Aircraft], ctx: &FrameContext<'_>) -> Frame {
        let width = usize::from(self.size.cols);
        let map_rows = self.map_rows(ctx.display_limit);
        let height = (map_rows + self.panel_rows(ctx.display_limit))
            .min(usize::from(self.size.rows).saturating_sub(1));
        let mut frame = Frame::new(width, height);

        let reference = ctx.reference.map(|r| (r.lat, r.lon));
        let shown = ctx.mode.filter(tracks, reference, ctx.display_limit);

        self.draw_map(&mut frame, &shown, ctx, map_rows);
        self.draw_panel(&mut frame, tracks.len(), &shown, ctx, map_rows);
        frame
    }

    fn draw_map(&self, frame: &mut Frame, shown: &[&Aircraft], ctx: &FrameContext<'_>, map_rows: usize) {
        let width = frame.width();
        let inner_w = width.saturating_sub(2).max(1);
        let inner_h = map_rows.saturating_sub(2).max(1);
        let projector = Projector::new(ctx.bounds, inner_w, inner_h);
        let mut reserved = vec![false; inner_w * inner_h];

        // Reserve the marker label first so nothing draws underneath it.
        let marker = ctx.reference.map(|reference| {
            let (col, row) = projector.project(reference.lat, reference.lon);
            let label: Vec<char> = reference.code.chars().take(inner_w).collect();
            let start = col
                .saturating_sub(label.len() / 2)
                .min(inner_w.saturating_sub(label.len()));
            for offset in 0..label.len() {
                reserved[row * inner_w + start + offset] = true;
            }
            (start, row, label)
        });

        let is_free = |col: usize, row: usize| !reserved[row * inner_w + col];

        if self.options.show_trails {
            let trail = if self.options.unicode_symbols { '·' } else { '.' };
            for aircraft in shown {
                for point in &aircraft.position_history {
                    let (col, row) = projector.project(point.lat, point.lon);
                    if is_free(col, row) {
                        frame.set(col + 1, row + 1, trail, Some(TRAIL_COLOR));
                    }
                }
            }
        }

        for aircraft in shown {
            let Some((lat, lon)) = aircraft.position() else {
                continue;
            };
            let (col, row) = projector.project(lat, lon);
            if is_free(col, row) {
                frame.set(col + 1, row + 1, self.glyph(aircraft), Some(aircraft_color(aircraft)));
            }
        }

        if let Some((start, row, label)) = marker {
            for (offset, ch) in label.into_iter().enumerate() {
                frame.set(start + offset + 1, row + 1, ch, Some(MARKER_COLOR));
            }
        }

        self.draw_border(frame, width, map_rows);
    }

    fn draw_border(&self, frame: &mut Frame, width: usize, height: usize) {
        let (h, v, tl, tr, bl, br) = if self.options.unicode_symbols {
            ('─', '│', '┌', '┐', '└', '┘')
        } else {
            ('-', '|', '+', '+', '+', '+')
        };
        let color = Some(BORDER_COLOR);
        let right = width.saturating_sub(1);
        let bottom = height.saturating_sub(1);

        for col in 0..width {
            frame.set(col, 0, h, color);
            frame.set(col, bottom, h, color);
        }
        for row in 0..height {
            frame.set(0, row, v, color);
            frame.set(right, row, v, color);
        }
        frame.set(0, 0, tl, color);
        frame.set(right, 0, tr, color);
        frame.set(0, bottom, bl, color);
        frame.set(right, bottom, br, color);
    }

    /// Glyph for an aircraft: a heading arrow, or a stable per-identity symbol.
    #[must_use]
    pub fn glyph(&self, aircraft: &Aircraft) -> char {
        if self.options.directional_symbols {
            if let Some(track) = aircraft.track {
                let arrows = if self.options.unicode_symbols {
                    &UNICODE_ARROWS
                } else {
                    &ASCII_ARROWS
                };
                return arrows[heading_sector(track)];
            }
        }

        let alphabet = match aircraft.ground_speed {
            Some(speed) if speed >= MEDIUM_MAX_KT => &FAST_GLYPHS,
            Some(speed) if speed >= SLOW_MAX_KT => &MEDIUM_GLYPHS,
            _ => &SLOW_GLYPHS,
        };
        #[allow(clippy::cast_possible_truncation, reason = "only the low bits index the alphabet")]
        let index = (fnv1a(aircraft.icao.as_bytes()) % alphabet.len() as u64) as usize;
        alphabet[index]
    }

    fn draw_panel(
        &self,
        frame: &mut Frame,
        total: usize,
        shown: &[&Aircraft],
        ctx: &FrameContext<'_>,
        top: usize,
    ) {
        let width = frame.width();
        let mut row = top;

        frame.put_str(0, row, &"=".repeat(width), Some(BORDER_COLOR));
        row += 1;

        let title = format!(
            " ADS-B Terminal Radar | {} UTC | {}",
            ctx.now.format("%H:%M:%S"),
            if ctx.demo { "DEMO" } else { "LIVE" }
        );
        frame.put_str(0, row, &title, None);
        if ctx.stale {
            let col = title.chars().count();
            frame.put_str(col, row, " | STALE DATA", Some(STALE_COLOR));
        }
        row += 1;

        let reference = ctx.reference.map_or_else(
            || "none".to_string(),
            |r| format!("{} {} ({:.4}, {:.4})", r.code, r.name, r.lat, r.lon),
        );
        frame.put_str(
            0,
            row,
            &format!(
                " Mode: {} | Showing {} of {} aircraft | Ref: {}",
                ctx.mode,
                shown.len(),
                total,
                reference
            ),
            None,
        );
        row += 1;

        let b = &ctx.bounds;
        frame.put_str(
            0,
            row,
            &format!(
                " Bounds: {:.2},{:.2} to {:.2},{:.2}",
                b.lat_min, b.lon_min, b.lat_max, b.lon_max
            ),
            None,
        );
        row += 1;

        frame.put_str(
            0,
            row,
            &format!(
                " {:<8} {:<9} {:>8} {:>7} {:>5} {:>8}",
                "ICAO", "Call", "Alt(ft)", "Spd(kt)", "Hdg", "Dist(nm)"
            ),
            None,
        );
        row += 1;

        let reference = ctx.reference.map(|r| (r.lat, r.lon));
        for aircraft in table_order(shown, reference)
            .into_iter()
            .take(self.table_rows(ctx.display_limit)) {
            let distance = reference.and_then(|(lat, lon)| aircraft.distance_from_nm(lat, lon));
            frame.put_str(0, row, &table_row(aircraft, distance), Some(aircraft_color(aircraft)));
            row += 1;
        }

        let help_row = top + self.panel_rows(ctx.display_limit) - 1;
        frame.put_str(0, help_row, " Keys: [q] quit  [r] refresh  [t] toggle mode", None);
    }
}

/// Octant for a heading; sectors are centered on north, north-east and so on.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is floored and non-negative after rem_euclid"
)]
pub fn heading_sector(track: f64) -> usize {
    (((track.rem_euclid(360.0) + 22.5) / 45.0).floor() as usize) % 8
}

#[must_use]
pub fn aircraft_color(aircraft: &Aircraft) -> Color {
    if aircraft.on_ground {
        return GROUND_COLOR;
    }
    match aircraft.altitude.map(AltitudeBand::of) {
        Some(AltitudeBand::Low) => LOW_COLOR,
        Some(AltitudeBand::Medium) => MEDIUM_COLOR,
        Some(AltitudeBand::High) => HIGH_COLOR,
        None => UNKNOWN_ALTITUDE_COLOR,
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

fn table_order<'a>(shown: &[&'a Aircraft], reference: Option<(f64, f64)>) -> Vec<&'a Aircraft> {
    let mut rows = shown.to_vec();
    if let Some((lat, lon)) = reference {
        rows.sort_by(|a, b| {
            match (a.distance_from_nm(lat, lon), b.distance_from_nm(lat, lon)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }
    rows
}

fn table_row(aircraft: &Aircraft, distance: Option<f64>) -> String {
    const NA: &str = "N/A";

    let callsign = aircraft.callsign.as_deref().unwrap_or(NA);
    let altitude = if aircraft.on_ground {
        "GND".to_string()
    } else {
        aircraft.altitude.map_or_else(|| NA.to_string(), thousands)
    };
    let speed = aircraft
        .ground_speed
        .map_or_else(|| NA.to_string(), |s| format!("{s:.0}"));
    let heading = aircraft
        .track
        .map_or_else(|| NA.to_string(), |t| format!("{:03.0}", t.rem_euclid(360.0)));
    let distance = distance.map_or_else(|| NA.to_string(), |d| format!("{d:.1}"));

    format!(
        " {:<8} {:<9} {:>8} {:>7} {:>5} {:>8}",
        aircraft.icao,
        callsign.chars().take(9).collect::<String>(),
        altitude,
        speed,
        heading,
        distance
    )
}

fn thousands(value: i32) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
