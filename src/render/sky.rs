use bytemuck::bytes_of;
use glam::{Mat4, Vec3};

use crate::config::Projection;

use super::common::{SkyUniform, SunUniform};
use super::pipeline::{depth_state, uniform_buffer, uniform_entry};

/// Rotation-only view projection, inverted: maps clip positions onto view
/// rays that ignore where the camera stands.
pub fn sky_ray_transform(forward: Vec3, projection: &Projection) -> Mat4 {
    let view = Mat4::look_at_rh(Vec3::ZERO, forward, Vec3::Y);
    (projection.matrix() * view).inverse()
}

/// Atmospheric sky drawn behind the scene at the start of the color pass.
pub struct SkyPass {
    pipeline: wgpu::RenderPipeline,
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl SkyPass {
    pub fn new(
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        sun: &wgpu::Buffer,
        format: wgpu::TextureFormat,
    ) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sky-bind-layout"),
            entries: &[
                uniform_entry::<SkyUniform>(0, wgpu::ShaderStages::FRAGMENT),
                uniform_entry::<SunUniform>(1, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let uniform = uniform_buffer::<SkyUniform>(device, "sky-uniform");
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sky-bind-group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sun.as_entire_binding(),
                },
            ],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sky-pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("sky-pipeline-layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            // Shares the color pass's depth attachment but never tests or writes it.
            depth_stencil: Some(depth_state(false, wgpu::CompareFunction::Always)),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(format.into())],
            }),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            uniform,
            bind_group,
        }
    }

    /// Points the sky at the direction the viewing camera faces.
    pub fn update(&self, queue: &wgpu::Queue, forward: Vec3, projection: &Projection) {
        let uniform = SkyUniform {
            inverse_view_proj: sky_ray_transform(forward, projection).to_cols_array_2d(),
        };
        queue.write_buffer(&self.uniform, 0, bytes_of(&uniform));
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn ray(transform: Mat4, x: f32, y: f32) -> Vec3 {
        let far = transform * Vec4::new(x, y, 1.0, 1.0);
        (far.truncate() / far.w).normalize()
    }

    #[test]
    fn screen_center_looks_along_forward() {
        let projection = Projection::new(90f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);
        let forward = Vec3::new(1.0, 0.3, -0.5).normalize();
        let center = ray(sky_ray_transform(forward, &projection), 0.0, 0.0);
        assert!((center - forward).length() < 1e-3, "{center}");
    }

    #[test]
    fn top_edge_is_half_the_field_of_view_up() {
        let projection = Projection::new(60f32.to_radians(), 1.0, 0.1, 1000.0);
        let top = ray(sky_ray_transform(Vec3::X, &projection), 0.0, 1.0);
        let expected = Vec3::new(30f32.to_radians().cos(), 30f32.to_radians().sin(), 0.0);
        assert!((top - expected).length() < 1e-3, "{top}");
    }
}
