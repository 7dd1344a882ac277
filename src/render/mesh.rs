use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use wgpu::util::DeviceExt;

use crate::mesh::Mesh;

use super::common::ObjectUniform;

/// Bindings shared by every color-pass draw in a frame.
pub struct LightingState<'a> {
    /// Point lights, visible tile lists and sun uniform (group 2).
    pub bind_group: &'a wgpu::BindGroup,
}

/// Geometry the frame pipeline can draw.
///
/// The pipeline binds its pipeline state and group 0 before calling into an
/// implementation; the implementation binds its own object data and issues
/// the draw. `view_projection` is the matrix of the pass being recorded and
/// may be used to skip geometry that falls outside it.
pub trait Renderable {
    fn render_depth(&self, pass: &mut wgpu::RenderPass<'_>, view_projection: Mat4);

    fn render(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        view_projection: Mat4,
        lighting: &LightingState<'_>,
    );
}

/// Vertex and index buffers uploaded from a [`Mesh`].
pub struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
    radius: f32,
}

impl MeshBuffers {
    pub fn from_mesh(device: &wgpu::Device, mesh: &Mesh, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
            radius: mesh.bounding_radius(),
        }
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex.slice(..));
        pass.set_index_buffer(self.index.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// A placed instance of shared mesh buffers with its own object uniform.
pub struct MeshRenderable {
    buffers: Arc<MeshBuffers>,
    _object_buffer: wgpu::Buffer,
    object_bind_group: wgpu::BindGroup,
    center: Vec3,
    radius: f32,
}

impl MeshRenderable {
    pub fn new(
        device: &wgpu::Device,
        object_layout: &wgpu::BindGroupLayout,
        buffers: Arc<MeshBuffers>,
        model: Mat4,
        color: Vec3,
    ) -> Self {
        let object_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("object-uniform"),
            contents: bytemuck::bytes_of(&ObjectUniform::new(model, color)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let object_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("object-bind-group"),
            layout: object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: object_buffer.as_entire_binding(),
            }],
        });
        let (center, radius) = bounding_sphere(model, buffers.radius);
        Self {
            buffers,
            _object_buffer: object_buffer,
            object_bind_group,
            center,
            radius,
        }
    }
}

impl Renderable for MeshRenderable {
    fn render_depth(&self, pass: &mut wgpu::RenderPass<'_>, view_projection: Mat4) {
        if !sphere_in_frustum(view_projection, self.center, self.radius) {
            return;
        }
        pass.set_bind_group(1, &self.object_bind_group, &[]);
        self.buffers.draw(pass);
    }

    fn render(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        view_projection: Mat4,
        lighting: &LightingState<'_>,
    ) {
        if !sphere_in_frustum(view_projection, self.center, self.radius) {
            return;
        }
        pass.set_bind_group(1, &self.object_bind_group, &[]);
        pass.set_bind_group(2, lighting.bind_group, &[]);
        self.buffers.draw(pass);
    }
}

/// World-space sphere enclosing a model-space sphere of `radius` at the origin.
pub fn bounding_sphere(model: Mat4, radius: f32) -> (Vec3, f32) {
    let center = model.transform_point3(Vec3::ZERO);
    let scale = model
        .x_axis
        .truncate()
        .length()
        .max(model.y_axis.truncate().length())
        .max(model.z_axis.truncate().length());
    (center, radius * scale)
}

/// Whether a sphere touches the clip volume of `view_projection` (0..1 depth).
pub fn sphere_in_frustum(view_projection: Mat4, center: Vec3, radius: f32) -> bool {
    let row = |i: usize| view_projection.row(i);
    let planes: [Vec4; 6] = [
        row(3) + row(0),
        row(3) - row(0),
        row(3) + row(1),
        row(3) - row(1),
        row(2),
        row(3) - row(2),
    ];
    let point = center.extend(1.0);
    planes.iter().all(|plane| {
        let length = plane.truncate().length();
        length <= f32::EPSILON || plane.dot(point) / length >= -radius
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Mat4 {
        let projection = Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.1, 100.0);
        projection * Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y)
    }

    #[test]
    fn sphere_ahead_is_visible_and_behind_is_not() {
        let vp = camera();
        assert!(sphere_in_frustum(vp, Vec3::new(0.0, 0.0, -10.0), 1.0));
        assert!(!sphere_in_frustum(vp, Vec3::new(0.0, 0.0, 10.0), 1.0));
        assert!(!sphere_in_frustum(vp, Vec3::new(0.0, 0.0, -200.0), 1.0));
    }

    #[test]
    fn sphere_straddling_a_side_plane_is_kept() {
        let vp = camera();
        // Centre just outside the right plane x = -z at depth 10.
        assert!(sphere_in_frustum(vp, Vec3::new(10.5, 0.0, -10.0), 1.0));
        assert!(!sphere_in_frustum(vp, Vec3::new(14.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn orthographic_volume_culls_by_box() {
        let vp = Mat4::orthographic_rh(-5.0, 5.0, -5.0, 5.0, 0.0, 20.0);
        assert!(sphere_in_frustum(vp, Vec3::new(4.0, 0.0, -10.0), 0.5));
        assert!(!sphere_in_frustum(vp, Vec3::new(7.0, 0.0, -10.0), 0.5));
    }

    #[test]
    fn bounding_sphere_follows_largest_scale() {
        let model = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 3.0, 2.0),
            glam::Quat::IDENTITY,
            Vec3::new(4.0, 5.0, 6.0),
        );
        let (center, radius) = bounding_sphere(model, 0.5);
        assert_eq!(center, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(radius, 1.5);
    }
}
