use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Quat, Vec3};
use roxmltree::{Document, Node};

use crate::camera::CameraPose;
use crate::config::{RenderConfig, DEFAULT_SPLIT_LAMBDA};
use crate::lights::{DirectionalLight, PointLight};

/// Everything needed to start rendering: settings, camera, lights and geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub config: RenderConfig,
    pub camera: CameraPose,
    pub sun: DirectionalLight,
    pub point_lights: Vec<PointLight>,
    pub objects: Vec<SceneObject>,
}

/// Geometry source of a scene object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Cube,
    Plane,
    /// OBJ file, relative to the scene file.
    Mesh(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub scale: Vec3,
    pub color: Vec3,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            color: Vec3::ONE,
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            glam::EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

impl Scene {
    /// Parses a scene document.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        let mut scene = Scene::default();

        if let Some(node) = child(&root, "settings") {
            scene.config = parse_settings(&node, scene.config)?;
        }
        if let Some(node) = child(&root, "camera") {
            let pose = &mut scene.camera;
            pose.position = parse_vec3(optional_text(&node, "position"), pose.position)?;
            pose.yaw = parse_f32(optional_text(&node, "yaw"), pose.yaw.to_degrees())?.to_radians();
            pose.pitch =
                parse_f32(optional_text(&node, "pitch"), pose.pitch.to_degrees())?.to_radians();
            pose.speed = parse_f32(optional_text(&node, "speed"), pose.speed)?;
            pose.sensitivity = parse_f32(optional_text(&node, "sensitivity"), pose.sensitivity)?;
        }
        if let Some(node) = child(&root, "sun") {
            let sun = scene.sun;
            scene.sun = DirectionalLight::new(
                parse_color(optional_text(&node, "color"), sun.color)?,
                parse_f32(optional_text(&node, "brightness"), sun.brightness)?,
                parse_vec3(optional_text(&node, "direction"), sun.direction)?,
            );
        }

        for node in root.children().filter(|n| n.has_tag_name("pointlight")) {
            scene.point_lights.push(PointLight::new(
                parse_vec3(optional_text(&node, "position"), Vec3::ZERO)?,
                parse_color(optional_text(&node, "color"), Vec3::ONE)?,
                parse_f32(optional_text(&node, "intensity"), 1.0)?,
                parse_f32(optional_text(&node, "radius"), 10.0)?,
            ));
        }

        for node in root.children().filter(|n| n.has_tag_name("object")) {
            let name = required_text(&node, "name")?;
            let kind = match optional_text(&node, "type").as_deref() {
                None | Some("cube") => ObjectKind::Cube,
                Some("plane") => ObjectKind::Plane,
                Some("mesh") => ObjectKind::Mesh(
                    required_text(&node, "mesh")
                        .with_context(|| format!("object {name} has type mesh"))?,
                ),
                Some(other) => bail!("object {name} has unknown type {other}"),
            };
            let mut object = SceneObject::new(name, kind);
            object.position = parse_vec3(optional_text(&node, "position"), object.position)?;
            object.rotation = parse_vec3(optional_text(&node, "rotation"), object.rotation)?;
            object.scale = parse_vec3(optional_text(&node, "scale"), object.scale)?;
            object.color = parse_color(optional_text(&node, "color"), object.color)?;
            scene.objects.push(object);
        }

        Ok(scene)
    }

    /// Ground plane, a 10x10 grid of cubes and four coloured lights.
    pub fn demo() -> Self {
        let mut objects = Vec::with_capacity(101);
        let mut ground = SceneObject::new("ground", ObjectKind::Plane);
        ground.position = Vec3::new(18.0, 0.0, 18.0);
        ground.scale = Vec3::new(120.0, 1.0, 120.0);
        ground.color = Vec3::splat(0.6);
        objects.push(ground);
        for row in 0..10 {
            for column in 0..10 {
                let mut cube = SceneObject::new(format!("cube-{row}-{column}"), ObjectKind::Cube);
                cube.position = Vec3::new(column as f32 * 4.0, 1.0, row as f32 * 4.0);
                cube.scale = Vec3::splat(2.0);
                cube.rotation = Vec3::new(0.0, (row * 10 + column) as f32 * 9.0, 0.0);
                objects.push(cube);
            }
        }
        let point_lights = [
            (Vec3::new(0.0, 12.0, 0.0), Vec3::X),
            (Vec3::new(36.0, 12.0, 0.0), Vec3::Y),
            (Vec3::new(0.0, 12.0, 36.0), Vec3::Z),
            (Vec3::new(36.0, 12.0, 36.0), Vec3::new(1.0, 1.0, 0.0)),
        ]
        .into_iter()
        .map(|(position, color)| PointLight::new(position, color, 1.0, 100.0))
        .collect();

        Self {
            point_lights,
            objects,
            ..Self::default()
        }
    }
}

fn parse_settings(node: &Node<'_, '_>, defaults: RenderConfig) -> Result<RenderConfig> {
    let mut config = defaults;
    config.width = parse_u32(optional_text(node, "width"), config.width)?;
    config.height = parse_u32(optional_text(node, "height"), config.height)?;
    config.fov_y_degrees = parse_f32(optional_text(node, "fov"), config.fov_y_degrees)?;
    config.near = parse_f32(optional_text(node, "near"), config.near)?;
    config.far = parse_f32(optional_text(node, "far"), config.far)?;
    let cascades = optional_text(node, "cascades");
    if let Some(splits) = cascades.as_deref().filter(|splits| *splits != "auto") {
        config.cascade_splits = splits
            .split_whitespace()
            .map(|value| {
                value
                    .parse::<f32>()
                    .map_err(|err| anyhow!("invalid cascade boundary {value}: {err}"))
            })
            .collect::<Result<_>>()?;
    }
    config.shadow_map_resolution = parse_u32(
        optional_text(node, "shadow-resolution"),
        config.shadow_map_resolution,
    )?;
    config.max_point_lights =
        parse_u32(optional_text(node, "max-lights"), config.max_point_lights as u32)? as usize;
    config.frame_rate_cap = parse_u32(optional_text(node, "fps-cap"), config.frame_rate_cap)?;
    config.show_frustum = parse_bool(optional_text(node, "show-frustum"), config.show_frustum)?;
    config.show_depth_preview = parse_bool(
        optional_text(node, "show-depth-preview"),
        config.show_depth_preview,
    )?;
    if cascades.as_deref() == Some("auto") {
        let count = parse_u32(
            optional_text(node, "cascade-count"),
            config.cascade_count() as u32,
        )?;
        let lambda = parse_f32(optional_text(node, "cascade-lambda"), DEFAULT_SPLIT_LAMBDA)?;
        config
            .set_practical_splits(count as usize, lambda)
            .context("invalid automatic cascade settings")?;
    }
    Ok(config)
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_components(value: &str, what: &str) -> Result<Vec3> {
    let mut numbers = value.split_whitespace().map(|component| {
        component
            .parse::<f32>()
            .map_err(|err| anyhow!("invalid {what} component {component}: {err}"))
    });
    let mut next = || {
        numbers
            .next()
            .unwrap_or_else(|| Err(anyhow!("{what} is missing components")))
    };
    Ok(Vec3::new(next()?, next()?, next()?))
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => parse_components(&value, "vector"),
        None => Ok(default),
    }
}

/// Colours are written as 0-255 triples.
fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(parse_components(&value, "color")? / 255.0),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        Some("true" | "1" | "on") => Ok(true),
        Some("false" | "0" | "off") => Ok(false),
        Some(other) => Err(anyhow!("expected a boolean, got {other}")),
        None => Ok(default),
    }
}
