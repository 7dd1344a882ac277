use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::config::Projection;
use crate::shadow::{slice_corners, Cascade};

/// Colours assigned to cascades 0..4 in overlays and the cascade tint mode.
pub const CASCADE_COLORS: [Vec3; 4] = [
    Vec3::new(1.0, 0.2, 0.2),
    Vec3::new(0.2, 0.4, 1.0),
    Vec3::new(0.2, 1.0, 0.2),
    Vec3::new(1.0, 1.0, 0.2),
];

/// Vertex of the line-list overlay pipeline.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

/// Corner pairs forming the 12 edges of a box whose corners are ordered
/// near plane first, each plane counter-clockwise.
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Line list tracing a box given by its eight corners.
pub fn box_lines(corners: &[Vec3; 8], color: Vec3) -> Vec<LineVertex> {
    let color = color.to_array();
    BOX_EDGES
        .iter()
        .flat_map(|&(a, b)| [corners[a], corners[b]])
        .map(|point| LineVertex {
            position: point.to_array(),
            color,
        })
        .collect()
}

/// Line list tracing the volume a view-projection matrix maps onto clip space.
pub fn frustum_lines(inverse_view_projection: Mat4, color: Vec3) -> Vec<LineVertex> {
    let mut corners = [Vec3::ZERO; 8];
    for (plane, z) in [0.0, 1.0].into_iter().enumerate() {
        let ndc = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (i, (x, y)) in ndc.into_iter().enumerate() {
            let world = inverse_view_projection * Vec4::new(x, y, z, 1.0);
            corners[plane * 4 + i] = world.truncate() / world.w;
        }
    }
    box_lines(&corners, color)
}

/// Camera frustum split per cascade, followed by each cascade's light volume.
pub fn cascade_overlay(view: Mat4, projection: &Projection, cascades: &[Cascade]) -> Vec<LineVertex> {
    let inverse_view = view.inverse();
    let mut lines = Vec::with_capacity(cascades.len() * 48);
    for cascade in cascades {
        let color = CASCADE_COLORS[cascade.index % CASCADE_COLORS.len()];
        let corners = slice_corners(inverse_view, projection, cascade.near, cascade.far);
        lines.extend(box_lines(&corners, color));
        lines.extend(frustum_lines(cascade.view_projection.inverse(), color * 0.5));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_frustum_traces_ndc_box() {
        let lines = frustum_lines(Mat4::IDENTITY, Vec3::ONE);
        assert_eq!(lines.len(), 24);
        for vertex in &lines {
            let [x, y, z] = vertex.position;
            assert_eq!(x.abs(), 1.0);
            assert_eq!(y.abs(), 1.0);
            assert!(z == 0.0 || z == 1.0);
        }
    }

    #[test]
    fn every_corner_touches_three_edges() {
        let lines = frustum_lines(Mat4::IDENTITY, Vec3::ONE);
        let mut counts = std::collections::HashMap::new();
        for vertex in &lines {
            let key = vertex.position.map(f32::to_bits);
            *counts.entry(key).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), 8);
        assert!(counts.values().all(|&count| count == 3));
    }
}
