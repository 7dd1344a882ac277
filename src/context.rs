use std::sync::Arc;

use glam::{Mat4, Vec3};
use log::info;

use crate::camera::{ActiveCamera, Camera, CameraRig};
use crate::config::{Projection, RenderConfig};
use crate::controls::{control_events, movement_axes, ControlEvent, RenderMode};
use crate::culling::{cull_tiles, DepthBounds, TileGrid, TileLightLists};
use crate::error::ConfigError;
use crate::input::FrameInput;
use crate::lights::{DirectionalLightStore, PointLight, PointLightRegistry};
use crate::scene::Scene;
use crate::shadow::ShadowCascadeCalculator;

/// Debug switches flipped between frames and read by the overlay pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DebugToggles {
    pub show_frustum: bool,
    pub show_depth_preview: bool,
    pub preview_cascade: usize,
    pub render_mode: RenderMode,
}

/// Colours cycled through by lights spawned at the camera.
const SPAWN_COLORS: [Vec3; 6] = [
    Vec3::new(1.0, 0.3, 0.3),
    Vec3::new(0.3, 1.0, 0.3),
    Vec3::new(0.3, 0.3, 1.0),
    Vec3::new(1.0, 1.0, 0.3),
    Vec3::new(1.0, 0.3, 1.0),
    Vec3::new(0.3, 1.0, 1.0),
];

/// Application state shared by the update step and the frame pipeline.
pub struct RenderContext {
    config: RenderConfig,
    rig: CameraRig,
    projection: Projection,
    shadows: ShadowCascadeCalculator,
    lights: Arc<PointLightRegistry>,
    sun: Arc<DirectionalLightStore>,
    toggles: DebugToggles,
    spawned: usize,
    quit_requested: bool,
}

impl RenderContext {
    /// Validates the scene settings and seeds cameras and lights from it.
    pub fn new(scene: &Scene) -> Result<Self, ConfigError> {
        let config = scene.config.clone();
        let splits = config.validate()?;
        let lights = Arc::new(PointLightRegistry::with_capacity(config.max_point_lights));
        for light in &scene.point_lights {
            lights.add(*light);
        }
        let mut context = Self {
            rig: CameraRig::new(scene.camera),
            projection: config.projection(),
            shadows: ShadowCascadeCalculator::new(splits, config.shadow_map_resolution),
            lights,
            sun: Arc::new(DirectionalLightStore::new(scene.sun)),
            toggles: DebugToggles {
                show_frustum: config.show_frustum,
                show_depth_preview: config.show_depth_preview,
                ..DebugToggles::default()
            },
            spawned: 0,
            quit_requested: false,
            config,
        };
        context.update_cascades();
        Ok(context)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn cameras(&self) -> &CameraRig {
        &self.rig
    }

    /// Camera the frame is rendered from.
    pub fn view_camera(&self) -> &Camera {
        self.rig.active()
    }

    pub fn view(&self) -> Mat4 {
        self.rig.active().view()
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection.matrix() * self.view()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn shadows(&self) -> &ShadowCascadeCalculator {
        &self.shadows
    }

    pub fn lights(&self) -> &Arc<PointLightRegistry> {
        &self.lights
    }

    pub fn sun(&self) -> &Arc<DirectionalLightStore> {
        &self.sun
    }

    pub fn toggles(&self) -> DebugToggles {
        self.toggles
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn tile_grid(&self) -> TileGrid {
        TileGrid::new(self.config.width, self.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.projection.resize(self.config.width, self.config.height);
        self.update_cascades();
    }

    /// Advances one frame: control events, mouse look, movement, then cascades.
    pub fn update(&mut self, dt: f32, input: &FrameInput) {
        for event in control_events(input) {
            self.apply(event);
        }

        let camera = self.rig.active_mut();
        if input.mouse_delta != glam::Vec2::ZERO {
            camera.apply_mouse_delta(input.mouse_delta.x, input.mouse_delta.y);
        }
        let (forward, right, up) = movement_axes(input);
        let direction = camera.forward() * forward + camera.right() * right + Vec3::Y * up;
        camera.push_direction(direction);
        camera.integrate(dt);

        self.update_cascades();
    }

    pub fn apply(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::SetRenderMode(mode) => {
                self.toggles.render_mode = mode;
                info!("render mode: {}", mode.name());
            }
            ControlEvent::ToggleCamera => {
                self.rig.toggle();
                let name = match self.rig.active_kind() {
                    ActiveCamera::Primary => "primary",
                    ActiveCamera::Observer => "observer",
                };
                info!("active camera: {name}");
            }
            ControlEvent::ToggleFrustum => self.toggles.show_frustum = !self.toggles.show_frustum,
            ControlEvent::SetDepthPreview(enabled) => self.toggles.show_depth_preview = enabled,
            ControlEvent::CyclePreviewCascade => {
                let count = self.shadows.cascades().len().max(1);
                self.toggles.preview_cascade = (self.toggles.preview_cascade + 1) % count;
            }
            ControlEvent::LogCamera => {
                let camera = self.rig.active();
                let position = camera.position();
                info!(
                    "camera position ({:.3}, {:.3}, {:.3}) yaw {:.4} pitch {:.4}",
                    position.x,
                    position.y,
                    position.z,
                    camera.yaw(),
                    camera.pitch()
                );
            }
            ControlEvent::SpawnLight => {
                let color = SPAWN_COLORS[self.spawned % SPAWN_COLORS.len()];
                self.spawned += 1;
                let position = self.rig.active().position();
                self.lights.add(PointLight::new(position, color, 1.0, 20.0));
            }
            ControlEvent::RotateSun(angle) => self.sun.update(|sun| sun.rotated(angle)),
            ControlEvent::Quit => self.quit_requested = true,
        }
    }

    /// Runs the tile culler on the CPU against the current camera.
    ///
    /// There is no depth prepass on this path, so each tile spans the whole
    /// clip range.
    pub fn cull_lights(&self) -> TileLightLists {
        let grid = self.tile_grid();
        let bounds = vec![DepthBounds::full(&self.projection); grid.total()];
        cull_tiles(
            &grid,
            &bounds,
            &self.lights.snapshot(),
            self.view(),
            &self.projection,
        )
    }

    fn update_cascades(&mut self) {
        let sun = self.sun.get();
        self.shadows
            .update(self.rig.primary.view(), &self.projection, sun.direction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraPose;
    use crate::input::{KeyCode, NamedKey};
    use std::collections::HashSet;

    fn scene_with_light(light: PointLight) -> Scene {
        Scene {
            camera: CameraPose {
                position: Vec3::ZERO,
                ..CameraPose::default()
            },
            point_lights: vec![light],
            ..Scene::default()
        }
    }

    fn pressed(keys: &[KeyCode]) -> FrameInput {
        FrameInput {
            pressed: keys.iter().copied().collect(),
            ..FrameInput::default()
        }
    }

    #[test]
    fn idle_frame_keeps_camera_and_lists_light_ahead() {
        let light = PointLight::new(Vec3::new(5.0, 0.0, 0.0), Vec3::ONE, 1.0, 10.0);
        let mut context = RenderContext::new(&scene_with_light(light)).unwrap();
        context.update(0.016, &FrameInput::default());
        assert_eq!(context.view_camera().position(), Vec3::ZERO);

        let lists = context.cull_lights();
        let grid = context.tile_grid();
        let center = grid.tile_at(grid.width() / 2, grid.height() / 2);
        assert_eq!(lists.lights_in_tile(center), &[0]);
    }

    #[test]
    fn small_light_ahead_stays_in_the_central_tiles() {
        let light = PointLight::new(Vec3::new(5.0, 0.0, 0.0), Vec3::ONE, 1.0, 0.1);
        let mut context = RenderContext::new(&scene_with_light(light)).unwrap();
        context.update(0.016, &FrameInput::default());

        let lists = context.cull_lights();
        let grid = context.tile_grid();
        let center = grid.tile_at(grid.width() / 2, grid.height() / 2);
        assert_eq!(lists.lights_in_tile(center), &[0]);

        let (cx, cy) = (center as u32 % grid.tiles_x(), center as u32 / grid.tiles_x());
        for tile in 0..grid.total() {
            let (tx, ty) = (tile as u32 % grid.tiles_x(), tile as u32 / grid.tiles_x());
            if tx.abs_diff(cx) > 1 || ty.abs_diff(cy) > 1 {
                assert!(!lists.contains(tile, 0), "light leaked into tile ({tx}, {ty})");
            }
        }
    }

    #[test]
    fn held_forward_key_moves_active_camera() {
        let mut context = RenderContext::new(&scene_with_light(PointLight::new(
            Vec3::ZERO,
            Vec3::ONE,
            1.0,
            1.0,
        )))
        .unwrap();
        let input = FrameInput {
            held: HashSet::from([KeyCode::Character('W')]),
            ..FrameInput::default()
        };
        context.update(0.5, &input);
        assert!((context.view_camera().position() - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn observer_movement_leaves_cascades_alone() {
        let mut context = RenderContext::new(&Scene::demo()).unwrap();
        let before: Vec<Mat4> = context
            .shadows()
            .cascades()
            .iter()
            .map(|c| c.view_projection)
            .collect();
        context.update(0.0, &pressed(&[KeyCode::Character('C')]));
        let input = FrameInput {
            held: HashSet::from([KeyCode::Character('W')]),
            mouse_delta: glam::Vec2::new(40.0, 10.0),
            ..FrameInput::default()
        };
        context.update(0.25, &input);
        let after: Vec<Mat4> = context
            .shadows()
            .cascades()
            .iter()
            .map(|c| c.view_projection)
            .collect();
        assert_eq!(before, after);
        assert_eq!(context.cameras().active_kind(), ActiveCamera::Observer);
    }

    #[test]
    fn control_keys_update_toggles() {
        let mut context = RenderContext::new(&Scene::demo()).unwrap();
        context.update(
            0.0,
            &pressed(&[
                KeyCode::Character('F'),
                KeyCode::Named(NamedKey::Home),
                KeyCode::Named(NamedKey::Tab),
                KeyCode::Function(3),
            ]),
        );
        let toggles = context.toggles();
        assert!(toggles.show_frustum);
        assert!(toggles.show_depth_preview);
        assert_eq!(toggles.preview_cascade, 1);
        assert_eq!(toggles.render_mode, RenderMode::Normals);
        assert!(!context.quit_requested());
        context.update(0.0, &pressed(&[KeyCode::Named(NamedKey::Escape)]));
        assert!(context.quit_requested());
    }

    #[test]
    fn spawn_and_sun_controls_mutate_shared_state() {
        let mut context = RenderContext::new(&Scene::demo()).unwrap();
        let before = context.sun().get().direction;
        context.update(
            0.0,
            &pressed(&[KeyCode::Character('L'), KeyCode::Character(']')]),
        );
        assert_eq!(context.lights().count(), 5);
        assert_ne!(context.sun().get().direction, before);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut scene = Scene::demo();
        scene.config.cascade_splits = vec![0.1, 50.0, 20.0];
        assert!(matches!(
            RenderContext::new(&scene),
            Err(ConfigError::NonMonotonicSplits { .. })
        ));
    }
}
