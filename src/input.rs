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

//! Input handling for the Chip-8 interpreter.

use std::default::Default;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use num::traits::FromPrimitive;

/// The number of keys on the Chip-8 controller.
pub const N_KEYS: usize = 16;

enum_from_primitive!{
/// The keys on the Chip-8 controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    K0 = 0,
    K1,
    K2,
    K3,
    K4,
    K5,
    K6,
    K7,
    K8,
    K9,
    KA,
    KB,
    KC,
    KD,
    KE,
    KF
}
}

impl Key {
    /// Returns the key with the given index, if it is in `0..16`.
    pub fn from_index(index: u8) -> Option<Key> {
        Key::from_u8(index)
    }

    /// Returns the key corresponding to the lowest four bits of the given
    /// byte.
    pub fn from_byte(b: u8) -> Key {
        Key::from_u8(b % N_KEYS as u8).unwrap_or(Key::K0)
    }
}

/// A Chip-8 keypad, as seen by the interpreter.
pub trait Keyboard {
    /// Returns whether the given key is currently held down.
    fn is_pressed(&self, key: Key) -> bool;

    /// Blocks until some key is held down and returns its index.
    ///
    /// The interpreter rejects indices outside of `0..16`.
    fn wait_for_any_key(&mut self) -> u8;
}

/// Represents the state of the input device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    /// The key states (`true` means "pressed").
    keys: [bool; N_KEYS],
}

impl State {
    /// Returns a new input state with all keys unpressed.
    pub fn new() -> Self {
        State::default()
    }

    /// Returns the lowest key that is pressed.
    pub fn lowest_pressed(&self) -> Option<Key> {
        self.keys
            .iter()
            .position(|&pressed| pressed)
            .and_then(|i| Key::from_usize(i))
    }

    /// Returns whether the given key is pressed.
    pub fn is_pressed(&self, key: Key) -> bool {
        self.keys[key as usize]
    }

    /// Marks the given key as pressed.
    pub fn press(&mut self, key: Key) {
        self.keys[key as usize] = true;
    }

    /// Marks the given key as released.
    pub fn release(&mut self, key: Key) {
        self.keys[key as usize] = false;
    }
}

/// A keypad shared between an input thread, which presses and releases keys,
/// and the interpreter thread, which reads them.
///
/// `wait_for_any_key` sleeps on a condition variable that is signalled on
/// every key press.  There is no timeout.
#[derive(Clone, Default)]
pub struct Keypad {
    inner: Arc<(Mutex<State>, Condvar)>,
}

impl Keypad {
    /// Returns a new keypad with all keys unpressed.
    pub fn new() -> Self {
        Keypad::default()
    }

    /// Marks the given key as pressed, waking any waiting reader.
    pub fn press(&self, key: Key) {
        self.state().press(key);
        (self.inner).1.notify_all();
    }

    /// Marks the given key as released.
    pub fn release(&self, key: Key) {
        self.state().release(key);
    }

    /// Returns a snapshot of the key states.
    pub fn snapshot(&self) -> State {
        self.state().clone()
    }

    fn state(&self) -> MutexGuard<State> {
        (self.inner).0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Keyboard for Keypad {
    fn is_pressed(&self, key: Key) -> bool {
        self.state().is_pressed(key)
    }

    fn wait_for_any_key(&mut self) -> u8 {
        let mut state = self.state();
        loop {
            if let Some(key) = state.lowest_pressed() {
                return key as u8;
            }
            state = (self.inner).1.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }
}
