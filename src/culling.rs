use glam::{Mat4, Vec2, Vec3};

use crate::config::Projection;
use crate::lights::PointLight;

/// Tile edge length in pixels.
pub const TILE_SIZE: u32 = 16;

/// Light indices stored per tile.
pub const MAX_LIGHTS_PER_TILE: usize = 1024;

/// Terminates a tile's light list when it is shorter than [`MAX_LIGHTS_PER_TILE`].
pub const LIST_SENTINEL: i32 = -1;

/// Screen partition into `TILE_SIZE` square cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles_x: u32,
    tiles_y: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            tiles_x: width.div_ceil(TILE_SIZE),
            tiles_y: height.div_ceil(TILE_SIZE),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    pub fn total(&self) -> usize {
        (self.tiles_x * self.tiles_y) as usize
    }

    /// Tile index for a pixel, row 0 at the top of the screen.
    pub fn tile_at(&self, px: u32, py: u32) -> usize {
        let tx = (px / TILE_SIZE).min(self.tiles_x - 1);
        let ty = (py / TILE_SIZE).min(self.tiles_y - 1);
        (ty * self.tiles_x + tx) as usize
    }

    /// NDC rectangle `(min, max)` covered by a tile, clipped to the viewport.
    pub fn ndc_rect(&self, tile: usize) -> (Vec2, Vec2) {
        let (columns, rows) = self.pixel_range(tile);
        let to_x = |px: u32| 2.0 * px as f32 / self.width as f32 - 1.0;
        let to_y = |py: u32| 1.0 - 2.0 * py as f32 / self.height as f32;
        (
            Vec2::new(to_x(columns.start), to_y(rows.end)),
            Vec2::new(to_x(columns.end), to_y(rows.start)),
        )
    }

    /// Pixel columns and rows covered by a tile, clipped to the viewport.
    pub fn pixel_range(&self, tile: usize) -> (std::ops::Range<u32>, std::ops::Range<u32>) {
        let tile = tile as u32;
        let tx = tile % self.tiles_x;
        let ty = tile / self.tiles_x;
        (
            tx * TILE_SIZE..((tx + 1) * TILE_SIZE).min(self.width),
            ty * TILE_SIZE..((ty + 1) * TILE_SIZE).min(self.height),
        )
    }
}

/// Linear view-depth range of the geometry covered by one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBounds {
    pub min: f32,
    pub max: f32,
}

impl DepthBounds {
    /// Whole clip range, used when no depth prepass is available.
    pub fn full(projection: &Projection) -> Self {
        Self {
            min: projection.near,
            max: projection.far,
        }
    }
}

/// Per-tile light lists, `MAX_LIGHTS_PER_TILE` entries per tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLightLists {
    tiles: usize,
    indices: Vec<i32>,
}

impl TileLightLists {
    pub fn tile_count(&self) -> usize {
        self.tiles
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.indices
    }

    /// Entries of one tile up to the sentinel.
    pub fn lights_in_tile(&self, tile: usize) -> &[i32] {
        let start = tile * MAX_LIGHTS_PER_TILE;
        let list = &self.indices[start..start + MAX_LIGHTS_PER_TILE];
        let len = list
            .iter()
            .position(|&index| index == LIST_SENTINEL)
            .unwrap_or(MAX_LIGHTS_PER_TILE);
        &list[..len]
    }

    pub fn contains(&self, tile: usize, light: usize) -> bool {
        self.lights_in_tile(tile).contains(&(light as i32))
    }

    pub fn max_lights_in_any_tile(&self) -> usize {
        (0..self.tiles)
            .map(|tile| self.lights_in_tile(tile).len())
            .max()
            .unwrap_or(0)
    }
}

/// Sphere-vs-tile test shared by every tile of one frame.
#[derive(Debug, Clone, Copy)]
struct TileFrustum {
    planes: [Vec3; 4],
    bounds: DepthBounds,
}

impl TileFrustum {
    fn new(scale: Vec2, min: Vec2, max: Vec2, bounds: DepthBounds) -> Self {
        let planes = [
            Vec3::new(scale.x, 0.0, min.x),
            Vec3::new(-scale.x, 0.0, -max.x),
            Vec3::new(0.0, scale.y, min.y),
            Vec3::new(0.0, -scale.y, -max.y),
        ]
        .map(Vec3::normalize);
        Self { planes, bounds }
    }

    fn intersects(&self, center: Vec3, radius: f32) -> bool {
        let distance = -center.z;
        if distance + radius < self.bounds.min || distance - radius > self.bounds.max {
            return false;
        }
        self.planes
            .iter()
            .all(|plane| plane.dot(center) >= -radius)
    }
}

/// Builds every tile's light list on the CPU.
///
/// This mirrors the compute shader: lights are tested in view space and
/// listed in ascending index order.
pub fn cull_tiles(
    grid: &TileGrid,
    bounds: &[DepthBounds],
    lights: &[PointLight],
    view: Mat4,
    projection: &Projection,
) -> TileLightLists {
    let scale = projection.scale();
    let view_space: Vec<(Vec3, f32)> = lights
        .iter()
        .map(|light| (view.transform_point3(light.position()), light.radius))
        .collect();
    let mut indices = vec![LIST_SENTINEL; grid.total() * MAX_LIGHTS_PER_TILE];

    for tile in 0..grid.total() {
        let (min, max) = grid.ndc_rect(tile);
        let tile_bounds = bounds
            .get(tile)
            .copied()
            .unwrap_or_else(|| DepthBounds::full(projection));
        let frustum = TileFrustum::new(scale, min, max, tile_bounds);
        let list = &mut indices[tile * MAX_LIGHTS_PER_TILE..(tile + 1) * MAX_LIGHTS_PER_TILE];
        let hits = view_space
            .iter()
            .enumerate()
            .filter(|(_, (center, radius))| frustum.intersects(*center, *radius))
            .map(|(index, _)| index as i32)
            .take(MAX_LIGHTS_PER_TILE);
        for (slot, index) in list.iter_mut().zip(hits) {
            *slot = index;
        }
    }

    TileLightLists {
        tiles: grid.total(),
        indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_projection() -> Projection {
        Projection::new(90f32.to_radians(), 1.0, 0.1, 1000.0)
    }

    #[test]
    fn grid_rounds_partial_tiles_up() {
        let grid = TileGrid::new(1280, 720);
        assert_eq!(grid.tiles_x(), 80);
        assert_eq!(grid.tiles_y(), 45);
        let grid = TileGrid::new(1281, 721);
        assert_eq!(grid.tiles_x(), 81);
        assert_eq!(grid.tiles_y(), 46);
        assert_eq!(grid.tile_at(1280, 720), grid.total() - 1);
    }

    #[test]
    fn zero_viewport_is_clamped() {
        let grid = TileGrid::new(0, 0);
        assert_eq!(grid.total(), 1);
    }

    #[test]
    fn ndc_rect_puts_first_row_at_top() {
        let grid = TileGrid::new(64, 64);
        let (min, max) = grid.ndc_rect(0);
        assert_eq!(min, Vec2::new(-1.0, 0.5));
        assert_eq!(max, Vec2::new(-0.5, 1.0));
    }

    #[test]
    fn light_inside_tile_slab_is_listed() {
        let grid = TileGrid::new(64, 64);
        let projection = square_projection();
        // Centre of tile (1, 2): pixel (24, 40) maps to NDC (-0.25, -0.25).
        let tile = grid.tile_at(24, 40);
        let center = Vec3::new(-0.25 * 10.0, -0.25 * 10.0, -10.0);
        let lights = [PointLight::new(center, Vec3::ONE, 1.0, 0.5)];
        let bounds = vec![DepthBounds { min: 9.0, max: 11.0 }; grid.total()];
        let lists = cull_tiles(&grid, &bounds, &lights, Mat4::IDENTITY, &projection);
        assert_eq!(lists.lights_in_tile(tile), &[0]);
        for other in (0..grid.total()).filter(|&other| other != tile) {
            assert!(!lists.contains(other, 0), "light leaked into tile {other}");
        }
    }

    #[test]
    fn depth_slab_rejects_lights_outside_range() {
        let grid = TileGrid::new(16, 16);
        let projection = square_projection();
        let bounds = vec![DepthBounds { min: 9.0, max: 11.0 }];
        let lights = [
            PointLight::new(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE, 1.0, 1.0),
            PointLight::new(Vec3::new(0.0, 0.0, -8.5), Vec3::ONE, 1.0, 1.0),
            PointLight::new(Vec3::new(0.0, 0.0, -20.0), Vec3::ONE, 1.0, 1.0),
            PointLight::new(Vec3::new(0.0, 0.0, -11.9), Vec3::ONE, 1.0, 1.0),
        ];
        let lists = cull_tiles(&grid, &bounds, &lights, Mat4::IDENTITY, &projection);
        assert_eq!(lists.lights_in_tile(0), &[1, 3]);
    }

    #[test]
    fn lists_are_ascending_and_terminated() {
        let grid = TileGrid::new(32, 32);
        let projection = square_projection();
        let lights: Vec<PointLight> = (0..10)
            .map(|i| PointLight::new(Vec3::new(0.0, 0.0, -5.0 - i as f32), Vec3::ONE, 1.0, 50.0))
            .collect();
        let bounds = vec![DepthBounds::full(&projection); grid.total()];
        let lists = cull_tiles(&grid, &bounds, &lights, Mat4::IDENTITY, &projection);
        for tile in 0..grid.total() {
            let list = lists.lights_in_tile(tile);
            assert_eq!(list.len(), 10);
            assert!(list.windows(2).all(|pair| pair[0] < pair[1]));
            assert_eq!(lists.as_slice()[tile * MAX_LIGHTS_PER_TILE + 10], LIST_SENTINEL);
        }
    }

    #[test]
    fn lights_behind_the_camera_are_culled() {
        let grid = TileGrid::new(32, 32);
        let projection = square_projection();
        let lights = [PointLight::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ONE, 1.0, 2.0)];
        let bounds = vec![DepthBounds::full(&projection); grid.total()];
        let lists = cull_tiles(&grid, &bounds, &lights, Mat4::IDENTITY, &projection);
        assert_eq!(lists.max_lights_in_any_tile(), 0);
    }

    /// Reduces a row-major 0..1 depth buffer to per-tile linear depth bounds.
    fn depth_bounds(depth: &[f32], grid: &TileGrid, projection: &Projection) -> Vec<DepthBounds> {
        let width = grid.width() as usize;
        (0..grid.total())
            .map(|tile| {
                let (columns, rows) = grid.pixel_range(tile);
                let mut bounds = DepthBounds {
                    min: f32::MAX,
                    max: 0.0,
                };
                for py in rows {
                    for px in columns.clone() {
                        let Some(&sample) = depth.get(py as usize * width + px as usize) else {
                            continue;
                        };
                        let linear = projection.linearize_depth(sample);
                        bounds.min = bounds.min.min(linear);
                        bounds.max = bounds.max.max(linear);
                    }
                }
                if bounds.min > bounds.max {
                    DepthBounds::full(projection)
                } else {
                    bounds
                }
            })
            .collect()
    }

    #[test]
    fn depth_bounds_linearize_each_tile() {
        let grid = TileGrid::new(32, 16);
        let projection = square_projection();
        let near_depth = {
            let clip = projection.matrix() * glam::Vec4::new(0.0, 0.0, -2.0, 1.0);
            clip.z / clip.w
        };
        let mut depth = vec![1.0; 32 * 16];
        depth[5] = near_depth;
        let bounds = depth_bounds(&depth, &grid, &projection);
        assert_eq!(bounds.len(), 2);
        assert!((bounds[0].min - 2.0).abs() < 1e-3);
        assert!((bounds[0].max - projection.far).abs() < 1.0);
        assert!((bounds[1].min - projection.far).abs() < 1.0);
    }
}
