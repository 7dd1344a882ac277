use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Interleaved vertex shared by every mesh pipeline.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Indexed triangle list in model space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Radius of the smallest origin-centred sphere holding every vertex.
    pub fn bounding_radius(&self) -> f32 {
        self.vertices
            .iter()
            .map(|vertex| vertex.position().length())
            .fold(0.0, f32::max)
    }

    /// Unit cube centred on the origin with per-face normals.
    pub fn cube() -> Self {
        let faces = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y, Vec3::X),
        ];
        let mut mesh = Mesh::default();
        for (normal, u, v) in faces {
            push_quad(&mut mesh, normal * 0.5, u * 0.5, v * 0.5, normal);
        }
        mesh
    }

    /// Unit square in the XZ plane facing +Y.
    pub fn plane() -> Self {
        let mut mesh = Mesh::default();
        push_quad(&mut mesh, Vec3::ZERO, Vec3::Z * 0.5, Vec3::X * 0.5, Vec3::Y);
        mesh
    }
}

/// Appends a quad whose winding is counter-clockwise around `normal`.
fn push_quad(mesh: &mut Mesh, center: Vec3, u: Vec3, v: Vec3, normal: Vec3) {
    let base = mesh.vertices.len() as u32;
    let corners = [
        (center - u - v, [0.0, 1.0]),
        (center + u - v, [1.0, 1.0]),
        (center + u + v, [1.0, 0.0]),
        (center - u + v, [0.0, 0.0]),
    ];
    for (position, uv) in corners {
        mesh.vertices.push(Vertex::new(position, normal, uv));
    }
    mesh.indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward_winding(mesh: &Mesh) {
        for triangle in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.vertices[triangle[i] as usize]);
            let face = (b.position() - a.position()).cross(c.position() - a.position());
            assert!(face.dot(Vec3::from_array(a.normal)) > 0.0);
        }
    }

    #[test]
    fn vertex_layout_is_32_bytes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn cube_faces_wind_outward() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert_outward_winding(&cube);
        assert!((cube.bounding_radius() - 0.75f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn plane_faces_up() {
        let plane = Mesh::plane();
        assert_eq!(plane.triangle_count(), 2);
        assert_outward_winding(&plane);
        assert!(plane.vertices.iter().all(|v| v.position[1] == 0.0));
    }
}
