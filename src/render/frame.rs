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

//! Character grid with per-cell color and its ANSI serialization.

use std::fmt;

use crossterm::cursor::MoveTo;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::Command;

/// One character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub color: Option<Color>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            color: None,
        }
    }
}

/// A rendered frame: `height` rows of `width` cells.
#[derive(Debug, Clone)]
pub struct Frame {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Frame {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); width * height],
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[cfg(test)]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn get(&self, col: usize, row: usize) -> Option<Cell> {
        (col < self.width && row < self.height).then(|| self.cells[row * self.width + col])
    }

    /// Set a cell; writes outside the frame are ignored.
    pub fn set(&mut self, col: usize, row: usize, ch: char, color: Option<Color>) {
        if col < self.width && row < self.height {
            self.cells[row * self.width + col] = Cell { ch, color };
        }
    }

    /// Write `text` starting at `col`, truncated at the right edge.
    pub fn put_str(&mut self, col: usize, row: usize, text: &str, color: Option<Color>) {
        for (offset, ch) in text.chars().enumerate() {
            let x = col + offset;
            if x >= self.width {
                break;
            }
            self.set(x, row, ch, color);
        }
    }

    /// Text of one row without color.
    #[cfg(test)]
    pub fn row_text(&self, row: usize) -> String {
        if row >= self.height {
            return String::new();
        }
        self.cells[row * self.width..(row + 1) * self.width]
            .iter()
            .map(|cell| cell.ch)
            .collect()
    }

    /// Every row padded or truncated to exactly `width` visible characters.
    #[must_use]
    pub fn to_lines(&self, width: usize, use_colors: bool) -> Vec<String> {
        (0..self.height)
            .map(|row| {
                let mut line = String::with_capacity(width * 2);
                // Writing into a String cannot fail.
                let _ = self.write_line(&mut line, row, width, use_colors);
                line
            })
            .collect()
    }

    fn write_line(
        &self,
        out: &mut impl fmt::Write,
        row: usize,
        width: usize,
        use_colors: bool,
    ) -> fmt::Result {
        let mut current: Option<Color> = None;

        for col in 0..width {
            let cell = self.get(col, row).unwrap_or_default();
            let color = if use_colors { cell.color } else { None };
            if color != current {
                match color {
                    Some(c) => SetForegroundColor(c).write_ansi(out)?,
                    None => ResetColor.write_ansi(out)?,
                }
                current = color;
            }
            out.write_char(cell.ch)?;
        }

        if current.is_some() {
            ResetColor.write_ansi(out)?;
        }
        Ok(())
    }

    /// Full screen update: cursor home, then every line terminated by CRLF.
    #[must_use]
    pub fn to_ansi(&self, width: usize, use_colors: bool) -> String {
        let mut out = ansi(MoveTo(0, 0));
        for line in self.to_lines(width, use_colors) {
            out.push_str(&line);
            out.push_str("\r\n");
        }
        out
    }
}

/// ANSI text of a single terminal command.
#[must_use]
pub fn ansi(command: impl Command) -> String {
    let mut out = String::new();
    let _ = command.write_ansi(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_padded_and_truncated() {
        let mut frame = Frame::new(5, 2);
        frame.put_str(0, 0, "abcdefgh", None);
        frame.put_str(1, 1, "x", None);

        assert_eq!(frame.to_lines(3, false), vec!["abc", " x "]);
        assert_eq!(frame.to_lines(8, false), vec!["abcde   ", " x      "]);
    }

    #[test]
    fn test_colors_stripped_when_disabled() {
        let mut frame = Frame::new(4, 1);
        frame.set(1, 0, '^', Some(Color::Red));
        let plain = frame.to_lines(4, false);
        assert_eq!(plain, vec![" ^  "]);
        assert!(!plain[0].contains('\x1b'));
    }

    #[test]
    fn test_color_runs_reset_at_line_end() {
        let mut frame = Frame::new(3, 1);
        frame.set(0, 0, 'a', Some(Color::Red));
        frame.set(1, 0, 'b', Some(Color::Red));
        frame.set(2, 0, 'c', Some(Color::Blue));

        let line = &frame.to_lines(3, true)[0];
        assert_eq!(line.matches("\x1b[0m").count(), 1);
        assert!(line.starts_with(&ansi(SetForegroundColor(Color::Red))));
        assert!(line.ends_with("c\x1b[0m"));
    }

    #[test]
    fn test_to_ansi_homes_cursor_and_uses_crlf() {
        let frame = Frame::new(2, 3);
        let out = frame.to_ansi(2, false);
        assert!(out.starts_with("\x1b[1;1H"));
        assert_eq!(out.matches("\r\n").count(), 3);
    }

    #[test]
    fn test_out_of_range_writes_ignored() {
        let mut frame = Frame::new(2, 2);
        frame.set(5, 5, 'x', None);
        assert!(frame.get(5, 5).is_none());
        assert_eq!(frame.row_text(0), "  ");
    }
}
