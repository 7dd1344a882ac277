//! GPU side of the frame: resource setup, shaders and the five-pass recorder.

pub mod common;
pub mod light_culling;
pub mod mesh;
pub mod pipeline;
pub mod shaders;
pub mod sky;
pub mod targets;

pub use light_culling::LightCuller;
pub use mesh::{LightingState, MeshBuffers, MeshRenderable, Renderable};
pub use pipeline::{FramePipeline, GpuLightMirror};
pub use sky::SkyPass;
