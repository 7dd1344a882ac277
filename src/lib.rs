//! Real-time forward+ renderer with cascaded shadow maps.
//!
//! Everything that does not touch the GPU (camera, cascade fitting, tile
//! light culling, the point light registry, scene loading) lives in plain
//! modules so it can be driven and tested headless. The `render` module owns
//! the wgpu resources and records the frame.

pub mod camera;
pub mod config;
pub mod context;
pub mod controls;
pub mod culling;
pub mod error;
pub mod input;
pub mod lights;
pub mod loader;
pub mod mesh;
pub mod obj;
pub mod overlay;
pub mod render;
pub mod scene;
pub mod shadow;
pub mod spawner;
pub mod telemetry;
pub mod timer;

pub use camera::{ActiveCamera, Camera, CameraPose, CameraRig};
pub use config::{Projection, RenderConfig, MAX_POINT_LIGHTS};
pub use context::{DebugToggles, RenderContext};
pub use controls::{ControlEvent, RenderMode};
pub use culling::{cull_tiles, DepthBounds, TileGrid, TileLightLists};
pub use error::{ConfigError, PipelineError};
pub use input::{FrameInput, InputState, KeyCode, NamedKey};
pub use lights::{DirectionalLight, DirectionalLightStore, LightMirror, PointLight, PointLightRegistry};
pub use loader::AssetLoader;
pub use mesh::{Mesh, Vertex};
pub use obj::load_obj_from_str;
pub use render::{FramePipeline, Renderable};
pub use scene::{ObjectKind, Scene, SceneObject};
pub use shadow::{Cascade, CascadeSplits, ShadowCascadeCalculator, MAX_CASCADES};
pub use spawner::LightSpawner;
pub use telemetry::{LogSink, TelemetryPublisher, TelemetrySink};
pub use timer::FrameTimer;
