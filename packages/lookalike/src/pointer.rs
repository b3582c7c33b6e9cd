//! Smoothed pointer position driving blob displacement amplitude.

use glam::Vec2;

/// Initial smoothed position (normalized viewport coordinates).
pub const INITIAL_POINTER: Vec2 = Vec2::new(0.8, 0.5);

/// Fraction of the remaining distance covered on each move event.
const EVENT_BLEND: f32 = 0.25;

/// Time constant of the continuous easing, in seconds.
const EASE_TIME_CONSTANT: f32 = 0.27;

/// Pointer position in normalized viewport space (0..1 on both axes),
/// exponentially eased toward the raw position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    target: Vec2,
    smoothed: Vec2,
}

impl Default for PointerState {
    fn default() -> Self {
        Self {
            target: INITIAL_POINTER,
            smoothed: INITIAL_POINTER,
        }
    }
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer pinned at `position` with no easing pending.
    pub fn at(position: Vec2) -> Self {
        Self {
            target: position,
            smoothed: position,
        }
    }

    /// Raw pointer move in pixels. Sets the target and takes one smoothing step.
    pub fn on_move(&mut self, x: f32, y: f32, viewport: (u32, u32)) {
        let w = viewport.0.max(1) as f32;
        let h = viewport.1.max(1) as f32;
        self.target = Vec2::new(x / w, y / h);
        self.smoothed += (self.target - self.smoothed) * EVENT_BLEND;
    }

    /// Continue easing toward the target over `dt` seconds.
    pub fn ease(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let k = 1.0 - (-dt / EASE_TIME_CONSTANT).exp();
        self.smoothed += (self.target - self.smoothed) * k;
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    pub fn smoothed(&self) -> Vec2 {
        self.smoothed
    }
}
