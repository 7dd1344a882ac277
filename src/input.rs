use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
    Function(u8),
}

/// Non-printing keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Escape,
    Home,
    End,
    LeftShift,
}

/// Everything the frame update needs from the input devices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    /// Keys held down when the snapshot was taken.
    pub held: HashSet<KeyCode>,
    /// Keys that went down since the previous snapshot.
    pub pressed: HashSet<KeyCode>,
    /// Accumulated raw mouse motion since the previous snapshot.
    pub mouse_delta: Vec2,
}

impl FrameInput {
    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    pub fn was_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }
}

/// Thread-safe key and mouse store fed by the window event loop.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    pressed: RwLock<HashSet<KeyCode>>,
    mouse_delta: RwLock<Vec2>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        if self.keys.write().insert(key) {
            self.pressed.write().insert(key);
        }
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn add_mouse_delta(&self, delta: Vec2) {
        *self.mouse_delta.write() += delta;
    }

    /// Takes the per-frame snapshot, resetting pressed keys and mouse motion.
    pub fn take_frame(&self) -> FrameInput {
        FrameInput {
            held: self.keys.read().clone(),
            pressed: std::mem::take(&mut *self.pressed.write()),
            mouse_delta: std::mem::take(&mut *self.mouse_delta.write()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_keys_leave_the_held_set() {
        let state = InputState::new();
        let space = KeyCode::Named(NamedKey::Space);
        state.set_key_down(space);
        assert!(state.take_frame().is_held(space));
        state.set_key_up(space);
        assert!(!state.take_frame().is_held(space));
    }

    #[test]
    fn pressed_keys_are_reported_once() {
        let state = InputState::new();
        let key = KeyCode::Character('F');
        state.set_key_down(key);
        // Key repeat does not register a second press.
        state.set_key_down(key);
        let frame = state.take_frame();
        assert!(frame.was_pressed(key));
        assert!(frame.is_held(key));
        let frame = state.take_frame();
        assert!(!frame.was_pressed(key));
        assert!(frame.is_held(key));
    }

    #[test]
    fn mouse_motion_accumulates_until_taken() {
        let state = InputState::new();
        state.add_mouse_delta(Vec2::new(3.0, -1.0));
        state.add_mouse_delta(Vec2::new(2.0, 4.0));
        assert_eq!(state.take_frame().mouse_delta, Vec2::new(5.0, 3.0));
        assert_eq!(state.take_frame().mouse_delta, Vec2::ZERO);
    }
}
