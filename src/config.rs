use glam::{Mat4, Vec2};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::shadow::{CascadeSplits, MAX_CASCADES};

/// Blend between uniform and logarithmic spacing for `auto` cascades.
pub const DEFAULT_SPLIT_LAMBDA: f32 = 0.75;

/// Maximum number of point lights the GPU buffers are sized for.
pub const MAX_POINT_LIGHTS: usize = 1024;

/// Renderer settings resolved before the first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Cascade boundaries from the near plane to the shadow distance.
    pub cascade_splits: Vec<f32>,
    pub shadow_map_resolution: u32,
    pub max_point_lights: usize,
    pub frame_rate_cap: u32,
    pub show_frustum: bool,
    pub show_depth_preview: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fov_y_degrees: 90.0,
            near: 0.1,
            far: 1000.0,
            cascade_splits: vec![0.1, 15.0, 100.0, 500.0, 1000.0],
            shadow_map_resolution: 2048,
            max_point_lights: MAX_POINT_LIGHTS,
            frame_rate_cap: 105,
            show_frustum: false,
            show_depth_preview: false,
        }
    }
}

impl RenderConfig {
    pub fn cascade_count(&self) -> usize {
        self.cascade_splits.len().saturating_sub(1)
    }

    /// Checks every setting and returns the validated cascade table.
    pub fn validate(&self) -> Result<CascadeSplits, ConfigError> {
        if !(self.near > 0.0 && self.far > self.near && self.far.is_finite()) {
            return Err(ConfigError::ClipRange {
                near: self.near,
                far: self.far,
            });
        }
        if !(self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0) {
            return Err(ConfigError::FieldOfView(self.fov_y_degrees));
        }
        if self.max_point_lights == 0 || self.max_point_lights > MAX_POINT_LIGHTS {
            return Err(ConfigError::LightCapacity {
                capacity: self.max_point_lights,
                max: MAX_POINT_LIGHTS,
            });
        }
        if self.shadow_map_resolution == 0 || !self.shadow_map_resolution.is_power_of_two() {
            return Err(ConfigError::ShadowResolution(self.shadow_map_resolution));
        }
        if self.frame_rate_cap == 0 {
            return Err(ConfigError::FrameRateCap);
        }
        let count = self.cascade_count();
        if count == 0 || count > MAX_CASCADES {
            return Err(ConfigError::CascadeCount {
                count,
                max: MAX_CASCADES,
            });
        }
        CascadeSplits::new(self.cascade_splits.clone(), count, self.near, self.far)
    }

    /// Replaces the cascade table with practical splits over the clip range.
    pub fn set_practical_splits(&mut self, count: usize, lambda: f32) -> Result<(), ConfigError> {
        let splits = CascadeSplits::practical(count, self.near, self.far, lambda)?;
        self.cascade_splits = splits.boundaries().to_vec();
        Ok(())
    }

    pub fn projection(&self) -> Projection {
        Projection::new(
            self.fov_y_degrees.to_radians(),
            aspect_ratio(self.width, self.height),
            self.near,
            self.far,
        )
    }
}

/// Perspective projection parameters shared by the camera and shadow code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y,
            aspect: aspect.max(0.01),
            near,
            far,
        }
    }

    /// Right-handed projection with wgpu's 0..1 depth range.
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = aspect_ratio(width, height);
    }

    /// Diagonal scale terms mapping view-space x/y onto NDC.
    pub fn scale(&self) -> Vec2 {
        let focal = 1.0 / (self.fov_y * 0.5).tan();
        Vec2::new(focal / self.aspect, focal)
    }

    /// Converts a 0..1 depth buffer value back to view distance.
    pub fn linearize_depth(&self, depth: f32) -> f32 {
        self.near * self.far / (self.far - depth * (self.far - self.near))
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width.max(1) as f32 / height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn default_config_is_valid() {
        let splits = RenderConfig::default().validate().unwrap();
        assert_eq!(splits.cascade_count(), 4);
    }

    #[test]
    fn rejects_inverted_clip_range() {
        let config = RenderConfig {
            near: 10.0,
            far: 1.0,
            ..RenderConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ClipRange { .. })
        ));
    }

    #[test]
    fn rejects_too_many_cascades() {
        let config = RenderConfig {
            cascade_splits: vec![0.1, 1.0, 2.0, 3.0, 4.0, 5.0],
            ..RenderConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::CascadeCount { count: 5, max: 4 })
        );
    }

    #[test]
    fn rejects_oversized_light_capacity() {
        let config = RenderConfig {
            max_point_lights: MAX_POINT_LIGHTS + 1,
            ..RenderConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LightCapacity { .. })
        ));
    }

    #[test]
    fn linearize_inverts_projection_depth() {
        let projection = Projection::new(90f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);
        for distance in [0.5, 10.0, 250.0, 900.0] {
            let clip = projection.matrix() * Vec4::new(0.0, 0.0, -distance, 1.0);
            let depth = clip.z / clip.w;
            let restored = projection.linearize_depth(depth);
            assert!((restored - distance).abs() / distance < 1e-3);
        }
    }

    #[test]
    fn scale_matches_projection_matrix() {
        let projection = Projection::new(60f32.to_radians(), 1.5, 0.1, 100.0);
        let matrix = projection.matrix();
        let scale = projection.scale();
        assert!((matrix.x_axis.x - scale.x).abs() < 1e-5);
        assert!((matrix.y_axis.y - scale.y).abs() < 1e-5);
    }
}
