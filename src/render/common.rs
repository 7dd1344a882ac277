use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::lights::DirectionalLight;
use crate::shadow::MAX_CASCADES;

/// Constant ambient term added by the color pass.
pub const AMBIENT: f32 = 0.05;

/// Camera and cascade data shared by every color-pass draw.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FrameUniform {
    pub view_proj: [[f32; 4]; 4],
    /// View of the camera the cascades are fitted to; drives cascade selection.
    pub view: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    /// Far boundary of each cascade in view distance.
    pub cascade_splits: [f32; 4],
    pub light_view_proj: [[[f32; 4]; 4]; MAX_CASCADES],
    pub tiles_x: u32,
    pub render_mode: u32,
    pub cascade_count: u32,
    pub shadow_map_size: f32,
}

/// Per-object transform and flat colour.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
    pub color: [f32; 4],
}

impl ObjectUniform {
    pub fn new(model: Mat4, color: Vec3) -> Self {
        let normal = Mat3::from_mat4(model).inverse().transpose();
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            color: color.extend(1.0).into(),
        }
    }
}

/// View-projection used by depth-only passes and the line overlay.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DepthViewUniform {
    pub view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SunUniform {
    pub color: [f32; 3],
    pub brightness: f32,
    pub direction: [f32; 3],
    pub ambient: f32,
}

impl From<DirectionalLight> for SunUniform {
    fn from(light: DirectionalLight) -> Self {
        Self {
            color: light.color.to_array(),
            brightness: light.brightness,
            direction: light.direction.to_array(),
            ambient: AMBIENT,
        }
    }
}

/// Unprojects screen positions into world-space view rays for the sky.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SkyUniform {
    pub inverse_view_proj: [[f32; 4]; 4],
}

/// Inputs of the light culling compute pass.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CullParams {
    pub view: [[f32; 4]; 4],
    pub proj_scale: [f32; 2],
    pub near: f32,
    pub far: f32,
    pub screen_size: [u32; 2],
    pub tiles_x: u32,
    pub light_count: u32,
}

/// Cascade layer shown by the depth preview.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct PreviewUniform {
    pub layer: u32,
    pub resolution: u32,
    pub _padding: [u32; 2],
}

pub fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn uniform_sizes_match_shader_layouts() {
        assert_eq!(size_of::<FrameUniform>(), 432);
        assert_eq!(size_of::<ObjectUniform>(), 128);
        assert_eq!(size_of::<DepthViewUniform>(), 64);
        assert_eq!(size_of::<SunUniform>(), 32);
        assert_eq!(size_of::<SkyUniform>(), 64);
        assert_eq!(size_of::<CullParams>(), 96);
        assert_eq!(size_of::<PreviewUniform>(), 16);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let uniform = ObjectUniform::new(model, Vec3::ONE);
        assert_eq!(uniform.normal[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(uniform.color, [1.0, 1.0, 1.0, 1.0]);
    }
}
