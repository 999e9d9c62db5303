// Copyright 2026 The rfbcast Authors
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

//! The capability interface between the protocol engine and the host.
//!
//! Screen capture and input injection vary by host OS, so sessions depend
//! only on the [`Display`] contract. One implementation per host is
//! expected: a desktop robot-style backend in the integration layer, and
//! the bundled [`HeadlessDisplay`] double for tests and embedding without a
//! real screen.

use std::io;
use std::sync::Mutex;

/// A physical pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    /// Left button.
    Left,
    /// Middle button.
    Middle,
    /// Right button.
    Right,
}

/// Host capabilities consumed by every session: screen dimensions, pixel
/// snapshots and input injection.
///
/// # Contract
///
/// Multiple sessions call into one `Display` concurrently; thread safety is
/// **not** automatic and the implementation owns its serialization policy
/// (for example a mutex around injection). Injection calls are
/// fire-and-forget: the protocol engine neither retries them nor observes
/// their outcome.
pub trait Display: Send + Sync {
    /// Injects a key press (`down = true`) or release.
    fn key_event(&self, keysym: u32, down: bool);

    /// Moves the pointer to (`x`, `y`) without touching button state.
    fn pointer_move(&self, x: u16, y: u16);

    /// Injects a button press or release at (`x`, `y`).
    fn pointer_button(&self, button: PointerButton, down: bool, x: u16, y: u16);

    /// Scrolls the wheel one fixed step, up or down.
    ///
    /// The RFB pointer message carries direction only, no magnitude; the
    /// step size is the implementation's choice.
    fn pointer_wheel(&self, up: bool);

    /// Captures a snapshot of the given screen rectangle.
    ///
    /// Returns row-major pixels, one `u32` per pixel with red in bits 0-7,
    /// green in bits 8-15 and blue in bits 16-23. The returned buffer must
    /// hold exactly `width * height` entries.
    fn image_buffer(&self, x: u16, y: u16, width: u16, height: u16) -> io::Result<Vec<u32>>;

    /// Current screen width in pixels.
    fn width(&self) -> u16;

    /// Current screen height in pixels.
    fn height(&self) -> u16;
}

/// An injection call recorded by [`HeadlessDisplay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedEvent {
    /// A key press or release.
    Key {
        /// X keysym.
        keysym: u32,
        /// Press (`true`) or release.
        down: bool,
    },
    /// A pure pointer move.
    Move {
        /// X coordinate.
        x: u16,
        /// Y coordinate.
        y: u16,
    },
    /// A button press or release.
    Button {
        /// Which button.
        button: PointerButton,
        /// Press (`true`) or release.
        down: bool,
        /// X coordinate.
        x: u16,
        /// Y coordinate.
        y: u16,
    },
    /// A wheel step.
    Wheel {
        /// Scroll direction.
        up: bool,
    },
}

/// A screenless [`Display`] that serves a synthetic framebuffer and records
/// every injection call.
///
/// The pixel at (x, y) is `base ^ (x + y * 31)` in the `0x00BBGGRR` layout
/// described on [`Display::image_buffer`], which makes payload contents
/// position-dependent and easy to assert on.
pub struct HeadlessDisplay {
    width: u16,
    height: u16,
    base: u32,
    events: Mutex<Vec<InjectedEvent>>,
}

impl HeadlessDisplay {
    /// Creates a headless display of the given size.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            base: 0,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Sets the base pixel value the synthetic pattern is derived from.
    #[must_use]
    pub fn with_base_pixel(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    /// Drains and returns the injection calls recorded so far.
    pub fn take_events(&self) -> Vec<InjectedEvent> {
        std::mem::take(&mut *self.events.lock().expect("event lock poisoned"))
    }

    fn record(&self, event: InjectedEvent) {
        self.events.lock().expect("event lock poisoned").push(event);
    }
}

impl Display for HeadlessDisplay {
    fn key_event(&self, keysym: u32, down: bool) {
        self.record(InjectedEvent::Key { keysym, down });
    }

    fn pointer_move(&self, x: u16, y: u16) {
        self.record(InjectedEvent::Move { x, y });
    }

    fn pointer_button(&self, button: PointerButton, down: bool, x: u16, y: u16) {
        self.record(InjectedEvent::Button { button, down, x, y });
    }

    fn pointer_wheel(&self, up: bool) {
        self.record(InjectedEvent::Wheel { up });
    }

    fn image_buffer(&self, x: u16, y: u16, width: u16, height: u16) -> io::Result<Vec<u32>> {
        let mut pixels = Vec::with_capacity(usize::from(width) * usize::from(height));
        for row in 0..u32::from(height) {
            for col in 0..u32::from(width) {
                let abs_x = u32::from(x) + col;
                let abs_y = u32::from(y) + row;
                pixels.push(self.base ^ (abs_x + abs_y * 31));
            }
        }
        Ok(pixels)
    }

    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_has_requested_dimensions() {
        let display = HeadlessDisplay::new(64, 48);
        let pixels = display.image_buffer(10, 5, 16, 8).unwrap();
        assert_eq!(pixels.len(), 16 * 8);
        // Position-dependent: shifting the origin changes the content.
        let shifted = display.image_buffer(11, 5, 16, 8).unwrap();
        assert_ne!(pixels, shifted);
    }

    #[test]
    fn events_are_recorded_in_order() {
        let display = HeadlessDisplay::new(8, 8);
        display.key_event(0x61, true);
        display.pointer_move(3, 4);
        display.pointer_wheel(false);
        assert_eq!(
            display.take_events(),
            vec![
                InjectedEvent::Key {
                    keysym: 0x61,
                    down: true
                },
                InjectedEvent::Move { x: 3, y: 4 },
                InjectedEvent::Wheel { up: false },
            ]
        );
        assert!(display.take_events().is_empty());
    }
}
