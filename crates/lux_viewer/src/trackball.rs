//! Mouse-driven orbit and zoom.

use std::f32::consts::FRAC_PI_2;

use lux_math::{OrbitTransform, Quat};

/// Radians per pixel of mouse drag.
const DRAG_SENSITIVITY: f32 = 0.005;

/// Pitch limit, just short of the poles.
const MAX_PITCH: f32 = FRAC_PI_2 - 0.01;

/// Zoom factor per scroll line.
const ZOOM_STEP: f32 = 1.1;

/// Yaw/pitch orbit around the scene origin plus a zoom factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trackball {
    yaw: f32,
    pitch: f32,
    zoom: f32,
}

impl Default for Trackball {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            zoom: 1.0,
        }
    }
}

impl Trackball {
    /// Rotate by a mouse drag in pixels.
    pub fn drag(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * DRAG_SENSITIVITY;
        // Never reach the poles, where the view would flip
        self.pitch = (self.pitch - dy * DRAG_SENSITIVITY).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Zoom by scroll lines; positive moves closer.
    pub fn scroll(&mut self, lines: f32) {
        self.zoom = (self.zoom * ZOOM_STEP.powf(lines)).clamp(0.05, 50.0);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn transform(&self) -> OrbitTransform {
        let rotation = Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch);
        OrbitTransform::from_quat(rotation, self.zoom)
    }
}
