// Copyright 2018 Ian Johnson

// This file is part of Chip-8.

// Chip-8 is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Chip-8 is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Chip-8.  If not, see <http://www.gnu.org/licenses/>.

//! Chip-8 display traits and implementations.
//!
//! The interpreter only ever talks to a display through the `Display` trait.
//! `Buffer` is the canonical 64x32 bitmap that the other implementations
//! build on; `SharedDisplay` lets a rendering thread read the bitmap while
//! the interpreter thread draws to it, and `ConsoleDisplay` renders frames as
//! text.

use std::default::Default;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use failure::{Error, Fail};

/// The width of the display.
pub const WIDTH: usize = 64;
/// The height of the display.
pub const HEIGHT: usize = 32;

/// The height of a hex digit sprite.
pub const FONT_HEIGHT: usize = 5;

/// The hex digit sprites.
pub const FONT: [[u8; FONT_HEIGHT]; 16] = [
    [0xF0, 0x90, 0x90, 0x90, 0xF0],
    [0x20, 0x60, 0x20, 0x20, 0x70],
    [0xF0, 0x10, 0xF0, 0x80, 0xF0],
    [0xF0, 0x10, 0xF0, 0x10, 0xF0],
    [0x90, 0x90, 0xF0, 0x10, 0x10],
    [0xF0, 0x80, 0xF0, 0x10, 0xF0],
    [0xF0, 0x80, 0xF0, 0x90, 0xF0],
    [0xF0, 0x10, 0x20, 0x40, 0x40],
    [0xF0, 0x90, 0xF0, 0x90, 0xF0],
    [0xF0, 0x90, 0xF0, 0x10, 0xF0],
    [0xF0, 0x90, 0xF0, 0x90, 0x90],
    [0xE0, 0x90, 0xE0, 0x90, 0xE0],
    [0xF0, 0x80, 0x80, 0x80, 0xF0],
    [0xE0, 0x90, 0x90, 0x90, 0xE0],
    [0xF0, 0x80, 0xF0, 0x80, 0xF0],
    [0xF0, 0x80, 0xF0, 0x80, 0x80],
];

/// A monochrome display, as seen by the interpreter.
pub trait Display {
    /// Unsets every pixel.
    fn clear(&mut self);

    /// XORs an 8-pixel-wide sprite onto the display, one row per byte, with
    /// its top-left corner at `(x, y)` wrapped to the display size.
    ///
    /// Returns whether any pixel went from set to unset.
    fn draw(&mut self, sprite: &[u8], x: usize, y: usize) -> bool;

    /// Called once per interpreter cycle, as a hint that a repaint may be due.
    fn check(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// A Chip-8 display buffer.
///
/// Pixels are stored row-major: `data()[y][x]`.
#[derive(Clone, PartialEq, Eq)]
pub struct Buffer {
    /// The underlying display buffer data.
    data: [[bool; WIDTH]; HEIGHT],
    /// Whether the display needs to be refreshed.
    needs_refresh: bool,
}

impl Buffer {
    /// Returns a new display buffer with all pixels clear.
    pub fn new() -> Self {
        Buffer {
            data: [[false; WIDTH]; HEIGHT],
            needs_refresh: true,
        }
    }

    /// Returns a reference to the underlying pixel data.
    pub fn data(&self) -> &[[bool; WIDTH]; HEIGHT] {
        &self.data
    }

    /// Returns whether the pixel at `(x, y)` is set.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.data[y % HEIGHT][x % WIDTH]
    }

    /// Forces a refresh on the next call to `refresh`, even if no draw
    /// operation has been performed.
    pub fn force_refresh(&mut self) {
        self.needs_refresh = true;
    }

    /// Returns whether the buffer has changed since the last refresh.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Refreshes the display using the given refresh function.
    ///
    /// If a refresh is unnecessary, nothing will be done.  The refresh
    /// function receives a "snapshot" of the display, and should draw that to
    /// whatever user-facing display buffer is currently being used.
    pub fn refresh<F, E>(&mut self, f: F) -> Result<(), E>
    where
        F: FnOnce(&Self) -> Result<(), E>,
        E: Fail,
    {
        if self.needs_refresh {
            f(self)?;
            self.needs_refresh = false;
        }
        Ok(())
    }

    /// Flips the on/off state of the given pixel, returning whether it was
    /// flipped off from the on state.
    fn toggle(&mut self, x: usize, y: usize) -> bool {
        let pixel = &mut self.data[y % HEIGHT][x % WIDTH];
        let old = *pixel;
        *pixel = !old;
        self.needs_refresh = true;

        old
    }
}

impl Display for Buffer {
    fn clear(&mut self) {
        for row in self.data.iter_mut() {
            for elem in row.iter_mut() {
                *elem = false;
            }
        }
        self.needs_refresh = true;
    }

    fn draw(&mut self, sprite: &[u8], x: usize, y: usize) -> bool {
        let mut collision = false;

        for (j, row) in sprite.iter().enumerate() {
            for i in 0..8 {
                if row & (0x80 >> i) != 0 && self.toggle(x + i, y + j) {
                    collision = true;
                }
            }
        }

        collision
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}

/// A display buffer that can be shared between the interpreter thread and a
/// rendering thread.
#[derive(Clone, Default)]
pub struct SharedDisplay {
    buffer: Arc<Mutex<Buffer>>,
}

impl SharedDisplay {
    /// Returns a new shared display with all pixels clear.
    pub fn new() -> Self {
        SharedDisplay::default()
    }

    /// Locks the buffer for reading or refreshing.
    ///
    /// A poisoned lock is recovered, since the bitmap is always left in a
    /// consistent state between pixel toggles.
    pub fn lock(&self) -> MutexGuard<Buffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Display for SharedDisplay {
    fn clear(&mut self) {
        self.lock().clear()
    }

    fn draw(&mut self, sprite: &[u8], x: usize, y: usize) -> bool {
        self.lock().draw(sprite, x, y)
    }
}

/// A display that prints each changed frame as text.
///
/// Set pixels are printed as `#` and unset ones as spaces, one line per row.
pub struct ConsoleDisplay<W> {
    buffer: Buffer,
    out: W,
}

impl<W: Write> ConsoleDisplay<W> {
    /// Returns a console display writing frames to `out`.
    pub fn new(out: W) -> Self {
        ConsoleDisplay {
            buffer: Buffer::new(),
            out,
        }
    }

    /// Returns a reference to the underlying buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Returns a reference to the writer.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Consumes the display, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Display for ConsoleDisplay<W> {
    fn clear(&mut self) {
        self.buffer.clear()
    }

    fn draw(&mut self, sprite: &[u8], x: usize, y: usize) -> bool {
        self.buffer.draw(sprite, x, y)
    }

    fn check(&mut self) -> Result<(), Error> {
        let out = &mut self.out;
        self.buffer.refresh(|buf| {
            for row in buf.data().iter() {
                let line: String = row.iter().map(|&p| if p { '#' } else { ' ' }).collect();
                writeln!(out, "{}", line)?;
            }
            out.flush()
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns the number of set pixels.
    fn lit(buffer: &Buffer) -> usize {
        buffer
            .data()
            .iter()
            .map(|row| row.iter().filter(|&&p| p).count())
            .sum()
    }

    #[test]
    fn draw_msb_first() {
        let mut buffer = Buffer::new();
        assert!(!buffer.draw(&[0x80, 0x01], 10, 5));
        assert!(buffer.pixel(10, 5));
        assert!(buffer.pixel(17, 6));
        assert_eq!(lit(&buffer), 2);
    }

    #[test]
    fn draw_twice_restores() {
        let mut buffer = Buffer::new();
        // Something already on screen, overlapping where the sprite goes.
        buffer.draw(&FONT[0x8], 1, 2);
        let before = buffer.clone();
        assert!(lit(&before) > 0);

        let sprite = &FONT[0xA];
        assert!(buffer.draw(sprite, 3, 4));
        assert!(buffer != before);

        // The second draw undoes the first, leaving the earlier image intact.
        buffer.draw(sprite, 3, 4);
        assert!(buffer == before);
    }

    #[test]
    fn collision_only_on_unset() {
        let mut buffer = Buffer::new();
        buffer.draw(&[0xF0], 0, 0);
        // Overlapping pixels 4-7 are off, so nothing goes from set to unset.
        assert!(!buffer.draw(&[0x0F], 0, 0));
        assert!(buffer.draw(&[0x01], 0, 0));
        assert!(!buffer.pixel(7, 0));
    }

    #[test]
    fn draw_wraps() {
        let mut buffer = Buffer::new();

        // Test cases, in the format (x, y, pixel x, pixel y).
        let cases = [
            (WIDTH - 1, 0, WIDTH - 1, 0),
            (WIDTH, 0, 0, 0),
            (0, HEIGHT, 0, 0),
            (WIDTH + 3, HEIGHT + 2, 3, 2),
            (255, 255, 255 % WIDTH, 255 % HEIGHT),
        ];

        for &(x, y, px, py) in cases.iter() {
            buffer.clear();
            buffer.draw(&[0x80], x, y);
            assert!(buffer.pixel(px, py), "case {:?}", (x, y));
            assert_eq!(lit(&buffer), 1, "case {:?}", (x, y));
        }

        // A sprite hanging off the right edge continues on the left.
        buffer.clear();
        buffer.draw(&[0xFF], WIDTH - 4, HEIGHT - 1);
        assert!(buffer.pixel(WIDTH - 1, HEIGHT - 1));
        assert!(buffer.pixel(3, HEIGHT - 1));
        assert!(!buffer.pixel(4, HEIGHT - 1));
    }

    #[test]
    fn shared_display_is_visible_to_clones() {
        let mut display = SharedDisplay::new();
        let reader = display.clone();
        display.draw(&[0xC0], 1, 1);
        assert!(reader.lock().pixel(2, 1));
        display.clear();
        assert!(!reader.lock().pixel(2, 1));
    }

    #[test]
    fn console_prints_changed_frames() {
        let mut display = ConsoleDisplay::new(Vec::new());
        display.draw(&[0xA0], 0, 0);
        display.check().unwrap();
        // Unchanged since the last frame, so nothing more is printed.
        display.check().unwrap();

        let out = String::from_utf8(display.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), HEIGHT);
        assert!(lines[0].starts_with("# #"));
        assert_eq!(lines[0].len(), WIDTH);
        assert_eq!(lines[1].trim(), "");
    }
}
