use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, TAU};

use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Keeps pitch away from the poles where the look-at basis degenerates.
pub const PITCH_EPSILON: f32 = 1e-4;

/// Initial placement and tuning of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub speed: f32,
    pub sensitivity: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 9.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            speed: 20.0,
            sensitivity: 0.001,
        }
    }
}

/// Free-flying first person camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    speed: f32,
    sensitivity: f32,
    pending: Vec3,
}

impl Camera {
    pub fn new(pose: CameraPose) -> Self {
        let mut camera = Self {
            position: pose.position,
            yaw: 0.0,
            pitch: 0.0,
            speed: pose.speed,
            sensitivity: pose.sensitivity,
            pending: Vec3::ZERO,
        };
        camera.set_orientation(pose.yaw, pose.pitch);
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_orientation(&mut self, yaw: f32, pitch: f32) {
        self.yaw = wrap_angle(yaw);
        self.pitch = clamp_pitch(pitch);
    }

    /// Adds a movement direction for the next integration step.
    pub fn push_direction(&mut self, direction: Vec3) {
        self.pending += direction;
    }

    /// Moves along the accumulated direction and clears it.
    pub fn integrate(&mut self, dt: f32) {
        if self.pending != Vec3::ZERO {
            if let Some(direction) = self.pending.try_normalize() {
                self.position += direction * self.speed * dt;
            }
        }
        self.pending = Vec3::ZERO;
    }

    pub fn apply_mouse_delta(&mut self, dx: f32, dy: f32) {
        self.pitch = clamp_pitch(self.pitch - self.sensitivity * dy);
        self.yaw = wrap_angle(self.yaw - self.sensitivity * dx);
    }

    pub fn forward(&self) -> Vec3 {
        Mat3::from_rotation_y(self.yaw) * (Mat3::from_rotation_z(self.pitch) * Vec3::X)
    }

    pub fn right(&self) -> Vec3 {
        Mat3::from_rotation_y(self.yaw) * Vec3::Z
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }
}

fn clamp_pitch(pitch: f32) -> f32 {
    pitch.clamp(-FRAC_PI_2 + PITCH_EPSILON, FRAC_PI_2 - PITCH_EPSILON)
}

fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Which of the rig's cameras is currently driven by input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveCamera {
    Primary,
    Observer,
}

/// The primary camera plus a detached observer used to inspect it.
///
/// Only the primary camera feeds the shadow cascades; switching to the
/// observer leaves lighting untouched.
#[derive(Debug, Clone)]
pub struct CameraRig {
    pub primary: Camera,
    pub observer: Camera,
    active: ActiveCamera,
}

impl CameraRig {
    pub fn new(primary: CameraPose) -> Self {
        let observer = CameraPose {
            position: Vec3::new(-10.0, 10.0, -10.0),
            yaw: -FRAC_PI_4,
            pitch: -FRAC_PI_4,
            ..primary
        };
        Self {
            primary: Camera::new(primary),
            observer: Camera::new(observer),
            active: ActiveCamera::Primary,
        }
    }

    pub fn active_kind(&self) -> ActiveCamera {
        self.active
    }

    pub fn toggle(&mut self) {
        self.active = match self.active {
            ActiveCamera::Primary => ActiveCamera::Observer,
            ActiveCamera::Observer => ActiveCamera::Primary,
        };
    }

    pub fn active(&self) -> &Camera {
        match self.active {
            ActiveCamera::Primary => &self.primary,
            ActiveCamera::Observer => &self.observer,
        }
    }

    pub fn active_mut(&mut self) -> &mut Camera {
        match self.active {
            ActiveCamera::Primary => &mut self.primary,
            ActiveCamera::Observer => &mut self.observer,
        }
    }
}
