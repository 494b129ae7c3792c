//! Keyboard and mouse input, and the actions keys map to.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Application-level command triggered by a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Switch the active sample to its next mode.
    CycleMode,
    Exit,
}

impl Action {
    /// Key binding: `M` or `Space` cycles the mode, `Escape` exits.
    pub fn for_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::KeyM | KeyCode::Space => Some(Action::CycleMode),
            KeyCode::Escape => Some(Action::Exit),
            _ => None,
        }
    }
}

/// Mouse buttons the samples react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// `None` for the extra buttons, which nothing binds.
    pub fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Largest per-frame drag, in pixels, on either axis.
pub const MAX_DRAG_DELTA: f32 = 100.0;

/// Pressed keys and buttons, cursor motion, and the actions triggered since
/// the last frame.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    pending_actions: Vec<Action>,

    pressed_buttons: HashSet<MouseButton>,
    /// Buttons pressed since the last `begin_frame`
    just_pressed_buttons: HashSet<MouseButton>,
    /// `None` until the first cursor event
    mouse_position: Option<(f32, f32)>,
    /// Cursor motion accumulated since the last `begin_frame`
    mouse_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles a key press. Auto-repeat of a held key triggers nothing.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key)
            && let Some(action) = Action::for_key(key)
        {
            self.pending_actions.push(action);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Returns and clears the actions triggered since the last call, in
    /// press order.
    pub fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Clears per-frame state. Call once per frame after input is consumed.
    pub fn begin_frame(&mut self) {
        self.just_pressed_buttons.clear();
        self.mouse_delta = (0.0, 0.0);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        if self.pressed_buttons.insert(button) {
            self.just_pressed_buttons.insert(button);
        }
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Handles a cursor move to `(x, y)` in window pixels.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.mouse_position {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += y - old_y;
        }
        self.mouse_position = Some((x, y));
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn is_mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.just_pressed_buttons.contains(&button)
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    /// Cursor motion this frame while `button` is held, clamped to
    /// [`MAX_DRAG_DELTA`].
    ///
    /// The frame a button goes down yields `None`, so motion from before
    /// the press does not jump the camera.
    pub fn drag_delta(&self, button: MouseButton) -> Option<(f32, f32)> {
        if !self.is_mouse_pressed(button) || self.is_mouse_just_pressed(button) {
            return None;
        }
        let (dx, dy) = self.mouse_delta;
        Some((
            dx.clamp(-MAX_DRAG_DELTA, MAX_DRAG_DELTA),
            dy.clamp(-MAX_DRAG_DELTA, MAX_DRAG_DELTA),
        ))
    }

    /// Releases every key and button, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.pending_actions.clear();
        self.pressed_buttons.clear();
        self.just_pressed_buttons.clear();
        self.mouse_delta = (0.0, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_triggers_action_once() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyM);
        // Auto-repeat.
        input.on_key_pressed(KeyCode::KeyM);
        assert_eq!(input.take_actions(), vec![Action::CycleMode]);
        assert!(input.take_actions().is_empty());

        input.on_key_released(KeyCode::KeyM);
        input.on_key_pressed(KeyCode::KeyM);
        input.on_key_pressed(KeyCode::Escape);
        assert_eq!(input.take_actions(), vec![Action::CycleMode, Action::Exit]);
    }

    #[test]
    fn test_unbound_keys_are_tracked_without_actions() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(input.take_actions().is_empty());

        input.clear();
        assert!(!input.is_key_pressed(KeyCode::KeyW));
    }

    #[test]
    fn test_drag_skips_press_frame_and_accumulates_motion() {
        let mut input = InputState::new();
        // The first cursor event only establishes the position.
        input.on_mouse_moved(400.0, 300.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));

        input.on_mouse_pressed(MouseButton::Left);
        input.on_mouse_moved(410.0, 300.0);
        assert_eq!(input.drag_delta(MouseButton::Left), None);
        input.begin_frame();

        input.on_mouse_moved(415.0, 298.0);
        input.on_mouse_moved(420.0, 296.0);
        assert_eq!(input.drag_delta(MouseButton::Left), Some((10.0, -4.0)));
        assert_eq!(input.drag_delta(MouseButton::Right), None);
        input.begin_frame();

        input.on_mouse_released(MouseButton::Left);
        input.on_mouse_moved(430.0, 296.0);
        assert_eq!(input.drag_delta(MouseButton::Left), None);
    }

    #[test]
    fn test_drag_is_clamped() {
        let mut input = InputState::new();
        input.on_mouse_moved(0.0, 0.0);
        input.on_mouse_pressed(MouseButton::Left);
        input.begin_frame();

        input.on_mouse_moved(900.0, -450.0);
        assert_eq!(
            input.drag_delta(MouseButton::Left),
            Some((MAX_DRAG_DELTA, -MAX_DRAG_DELTA))
        );

        input.clear();
        assert!(!input.is_mouse_pressed(MouseButton::Left));
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_extra_mouse_buttons_are_ignored() {
        assert_eq!(
            MouseButton::from_winit(winit::event::MouseButton::Left),
            Some(MouseButton::Left)
        );
        assert_eq!(MouseButton::from_winit(winit::event::MouseButton::Back), None);
    }
}
