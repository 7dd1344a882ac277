use std::collections::{HashMap, HashSet};
use std::mem::size_of;
use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, cast_slice};
use glam::Mat4;
use log::{debug, error, info, warn};
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::config::MAX_POINT_LIGHTS;
use crate::context::RenderContext;
use crate::culling::TileGrid;
use crate::error::PipelineError;
use crate::lights::{LightMirror, PointLight};
use crate::loader::AssetLoader;
use crate::mesh::{Mesh, Vertex};
use crate::overlay::{cascade_overlay, LineVertex};
use crate::scene::{ObjectKind, Scene};
use crate::shadow::MAX_CASCADES;

use super::common::{DepthViewUniform, FrameUniform, ObjectUniform, PreviewUniform, SunUniform};
use super::light_culling::{fit_viewport, visible_buffer_limit, LightCuller};
use super::mesh::{LightingState, MeshBuffers, MeshRenderable, Renderable};
use super::shaders::{
    COLOR_SHADER, CULL_SHADER, DEPTH_SHADER, LINE_SHADER, PREVIEW_SHADER, SKY_SHADER,
};
use super::sky::SkyPass;
use super::targets::{DepthTarget, ShadowMapArray, DEPTH_FORMAT};

/// Depth view slot used by the camera prepass and the line overlay.
const CAMERA_SLOT: usize = MAX_CASCADES;

/// Line vertices reserved for the cascade overlay.
const MAX_LINE_VERTICES: usize = MAX_CASCADES * 48;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
const LINE_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

/// Forwards registry changes into the GPU point light buffer.
pub struct GpuLightMirror {
    queue: Arc<wgpu::Queue>,
    buffer: Arc<wgpu::Buffer>,
}

impl LightMirror for GpuLightMirror {
    fn upload(&self, lights: &[PointLight]) {
        self.queue.write_buffer(&self.buffer, 0, cast_slice(lights));
    }
}

struct DepthView {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Owns every GPU resource and records the five passes of a frame.
pub struct FramePipeline {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    /// Byte cap on the tile index buffer; the surface is shrunk to respect it.
    max_visible_bytes: u64,
    depth: DepthTarget,
    shadows: ShadowMapArray,
    depth_pipeline: wgpu::RenderPipeline,
    color_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    preview_pipeline: wgpu::RenderPipeline,
    sky: SkyPass,
    depth_views: Vec<DepthView>,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    lighting_layout: wgpu::BindGroupLayout,
    lighting_bind_group: wgpu::BindGroup,
    light_buffer: Arc<wgpu::Buffer>,
    sun_buffer: wgpu::Buffer,
    culler: LightCuller,
    line_buffer: wgpu::Buffer,
    preview_buffer: wgpu::Buffer,
    preview_bind_group: wgpu::BindGroup,
    mesh_cache: HashMap<String, Arc<MeshBuffers>>,
    missing_meshes: HashSet<String>,
    cube: Arc<MeshBuffers>,
    plane: Arc<MeshBuffers>,
}

impl FramePipeline {
    /// Acquires the GPU, compiles every shader and attaches the point light
    /// mirror to the context's registry.
    pub async fn new(window: Arc<Window>, context: &RenderContext) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using adapter {}", adapter.get_info().name);

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("prism-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;
        let queue = Arc::new(queue);
        let max_visible_bytes = visible_buffer_limit(&device.limits());
        let (width, height) = surface_extent(size, max_visible_bytes);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoNoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth_shader = create_shader(&device, "depth-shader", DEPTH_SHADER).await?;
        let color_shader = create_shader(&device, "color-shader", COLOR_SHADER).await?;
        let cull_shader = create_shader(&device, "cull-shader", CULL_SHADER).await?;
        let line_shader = create_shader(&device, "line-shader", LINE_SHADER).await?;
        let preview_shader = create_shader(&device, "preview-shader", PREVIEW_SHADER).await?;
        let sky_shader = create_shader(&device, "sky-shader", SKY_SHADER).await?;

        let depth = DepthTarget::create(&device, config.width, config.height);
        let shadows = ShadowMapArray::new(
            &device,
            context.config().shadow_map_resolution,
            context.config().cascade_count() as u32,
        );

        let depth_view_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("depth-view-layout"),
                entries: &[uniform_entry::<DepthViewUniform>(0, wgpu::ShaderStages::VERTEX)],
            });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[uniform_entry::<ObjectUniform>(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
            )],
        });
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame-bind-layout"),
            entries: &[
                uniform_entry::<FrameUniform>(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                shadow_array_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });
        let lighting_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lighting-bind-layout"),
            entries: &[
                storage_entry(0),
                storage_entry(1),
                uniform_entry::<SunUniform>(2, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let preview_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("preview-bind-layout"),
            entries: &[
                uniform_entry::<PreviewUniform>(0, wgpu::ShaderStages::FRAGMENT),
                shadow_array_entry(1),
            ],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        };
        let line_layout = wgpu::VertexBufferLayout {
            array_stride: size_of::<LineVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &LINE_ATTRIBUTES,
        };

        let depth_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("depth-pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("depth-pipeline-layout"),
                bind_group_layouts: &[&depth_view_layout, &object_layout],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &depth_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout.clone()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(depth_state(true, wgpu::CompareFunction::Less)),
            multisample: wgpu::MultisampleState::default(),
            fragment: None,
            multiview: None,
            cache: None,
        });

        let color_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("color-pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("color-pipeline-layout"),
                bind_group_layouts: &[&frame_layout, &object_layout, &lighting_layout],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &color_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            // The prepass already wrote the final depth.
            depth_stencil: Some(depth_state(false, wgpu::CompareFunction::LessEqual)),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &color_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let line_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("line-pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("line-pipeline-layout"),
                bind_group_layouts: &[&depth_view_layout],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &line_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[line_layout],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &line_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(surface_format.into())],
            }),
            multiview: None,
            cache: None,
        });

        let preview_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("preview-pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("preview-pipeline-layout"),
                bind_group_layouts: &[&preview_layout],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &preview_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &preview_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(surface_format.into())],
            }),
            multiview: None,
            cache: None,
        });

        // One buffer per depth pass: queued writes all land before submit.
        let depth_views = (0..=MAX_CASCADES)
            .map(|slot| {
                let buffer = uniform_buffer::<DepthViewUniform>(&device, "depth-view-uniform");
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("depth-view-{slot}")),
                    layout: &depth_view_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                });
                DepthView { buffer, bind_group }
            })
            .collect();

        let frame_buffer = uniform_buffer::<FrameUniform>(&device, "frame-uniform");
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame-bind-group"),
            layout: &frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&shadows.array_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&shadows.sampler),
                },
            ],
        });

        let light_buffer = Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("point-lights"),
            size: (MAX_POINT_LIGHTS * size_of::<PointLight>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        let sun_buffer = uniform_buffer::<SunUniform>(&device, "sun-uniform");
        let sky = SkyPass::new(&device, &sky_shader, &sun_buffer, surface_format);

        let culler = LightCuller::new(
            &device,
            &cull_shader,
            &depth.view,
            &light_buffer,
            TileGrid::new(config.width, config.height),
        );
        let lighting_bind_group = create_lighting_bind_group(
            &device,
            &lighting_layout,
            &light_buffer,
            culler.visible(),
            &sun_buffer,
        );

        let line_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("overlay-lines"),
            size: (MAX_LINE_VERTICES * size_of::<LineVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let preview_buffer = uniform_buffer::<PreviewUniform>(&device, "preview-uniform");
        let preview_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("preview-bind-group"),
            layout: &preview_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: preview_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&shadows.array_view),
                },
            ],
        });

        let cube = Arc::new(MeshBuffers::from_mesh(&device, &Mesh::cube(), "cube"));
        let plane = Arc::new(MeshBuffers::from_mesh(&device, &Mesh::plane(), "plane"));

        context.lights().attach_mirror(Box::new(GpuLightMirror {
            queue: Arc::clone(&queue),
            buffer: Arc::clone(&light_buffer),
        }));

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            max_visible_bytes,
            depth,
            shadows,
            depth_pipeline,
            color_pipeline,
            line_pipeline,
            preview_pipeline,
            sky,
            depth_views,
            frame_buffer,
            frame_bind_group,
            object_layout,
            lighting_layout,
            lighting_bind_group,
            light_buffer,
            sun_buffer,
            culler,
            line_buffer,
            preview_buffer,
            preview_bind_group,
            mesh_cache: HashMap::new(),
            missing_meshes: HashSet::new(),
            cube,
            plane,
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.config.width, self.config.height)
    }

    /// Resizes the swap chain, the camera depth target and the tile buffers.
    /// Sizes whose tile index buffer would exceed the device's storage
    /// binding limit are scaled down; [`Self::size`] reports the result.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let (width, height) = surface_extent(new_size, self.max_visible_bytes);
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthTarget::create(&self.device, width, height);
        self.culler.resize(
            &self.device,
            &self.depth.view,
            &self.light_buffer,
            TileGrid::new(width, height),
        );
        self.lighting_bind_group = create_lighting_bind_group(
            &self.device,
            &self.lighting_layout,
            &self.light_buffer,
            self.culler.visible(),
            &self.sun_buffer,
        );
        debug!(
            "resized to {width}x{height} ({} tiles)",
            self.culler.grid().total()
        );
    }

    /// Uploads the scene's objects. Meshes that fail to load are drawn as cubes.
    pub fn create_renderables(
        &mut self,
        scene: &Scene,
        loader: &AssetLoader,
    ) -> Vec<Box<dyn Renderable>> {
        scene
            .objects
            .iter()
            .map(|object| {
                let buffers = match &object.kind {
                    ObjectKind::Cube => Arc::clone(&self.cube),
                    ObjectKind::Plane => Arc::clone(&self.plane),
                    ObjectKind::Mesh(path) => self.mesh_buffers(path, loader),
                };
                Box::new(MeshRenderable::new(
                    &self.device,
                    &self.object_layout,
                    buffers,
                    object.model_matrix(),
                    object.color,
                )) as Box<dyn Renderable>
            })
            .collect()
    }

    /// Records and submits one frame: cascades, prepass, culling, sky and color, overlays.
    pub fn render_frame(
        &mut self,
        context: &RenderContext,
        renderables: &[Box<dyn Renderable>],
    ) -> Result<(), wgpu::SurfaceError> {
        let cascades = context.shadows().cascades();
        let camera_view_projection = context.view_projection();
        let toggles = context.toggles();
        self.write_uniforms(context);

        let output = self.surface.get_current_texture()?;
        let target = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        for (cascade, layer) in cascades.iter().zip(&self.shadows.layer_views) {
            let mut pass = depth_pass(&mut encoder, "cascade-depth-pass", layer);
            pass.set_pipeline(&self.depth_pipeline);
            pass.set_bind_group(0, &self.depth_views[cascade.index].bind_group, &[]);
            for renderable in renderables {
                renderable.render_depth(&mut pass, cascade.view_projection);
            }
        }

        {
            let mut pass = depth_pass(&mut encoder, "camera-depth-prepass", &self.depth.view);
            pass.set_pipeline(&self.depth_pipeline);
            pass.set_bind_group(0, &self.depth_views[CAMERA_SLOT].bind_group, &[]);
            for renderable in renderables {
                renderable.render_depth(&mut pass, camera_view_projection);
            }
        }

        self.culler.dispatch(&mut encoder);

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("color-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.sky.draw(&mut pass);
            pass.set_pipeline(&self.color_pipeline);
            pass.set_bind_group(0, &self.frame_bind_group, &[]);
            let lighting = LightingState {
                bind_group: &self.lighting_bind_group,
            };
            for renderable in renderables {
                renderable.render(&mut pass, camera_view_projection, &lighting);
            }
        }

        if toggles.show_frustum || toggles.show_depth_preview {
            let line_count = if toggles.show_frustum {
                let lines = cascade_overlay(
                    context.cameras().primary.view(),
                    context.projection(),
                    cascades,
                );
                let lines = &lines[..lines.len().min(MAX_LINE_VERTICES)];
                self.queue.write_buffer(&self.line_buffer, 0, cast_slice(lines));
                lines.len() as u32
            } else {
                0
            };

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if line_count > 0 {
                pass.set_pipeline(&self.line_pipeline);
                pass.set_bind_group(0, &self.depth_views[CAMERA_SLOT].bind_group, &[]);
                pass.set_vertex_buffer(0, self.line_buffer.slice(..));
                pass.draw(0..line_count, 0..1);
            }
            if toggles.show_depth_preview {
                let (x, y, size) = preview_viewport(self.config.width, self.config.height);
                pass.set_viewport(x, y, size, size, 0.0, 1.0);
                pass.set_pipeline(&self.preview_pipeline);
                pass.set_bind_group(0, &self.preview_bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn write_uniforms(&self, context: &RenderContext) {
        let shadows = context.shadows();
        let cascades = shadows.cascades();
        let toggles = context.toggles();
        let grid = self.culler.grid();

        let mut light_view_proj = [Mat4::IDENTITY.to_cols_array_2d(); MAX_CASCADES];
        for cascade in cascades {
            light_view_proj[cascade.index] = cascade.view_projection.to_cols_array_2d();
            self.queue.write_buffer(
                &self.depth_views[cascade.index].buffer,
                0,
                bytes_of(&DepthViewUniform {
                    view_proj: cascade.view_projection.to_cols_array_2d(),
                }),
            );
        }
        let view_projection = context.view_projection();
        self.queue.write_buffer(
            &self.depth_views[CAMERA_SLOT].buffer,
            0,
            bytes_of(&DepthViewUniform {
                view_proj: view_projection.to_cols_array_2d(),
            }),
        );

        let frame = FrameUniform {
            view_proj: view_projection.to_cols_array_2d(),
            view: context.cameras().primary.view().to_cols_array_2d(),
            camera_position: context.view_camera().position().extend(1.0).into(),
            cascade_splits: shadows.splits().far_bounds(),
            light_view_proj,
            tiles_x: grid.tiles_x(),
            render_mode: toggles.render_mode.as_index(),
            cascade_count: cascades.len() as u32,
            shadow_map_size: shadows.resolution() as f32,
        };
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytes_of(&frame));
        self.queue.write_buffer(
            &self.sun_buffer,
            0,
            bytes_of(&SunUniform::from(context.sun().get())),
        );
        self.queue.write_buffer(
            &self.preview_buffer,
            0,
            bytes_of(&PreviewUniform {
                layer: toggles.preview_cascade.min(cascades.len().saturating_sub(1)) as u32,
                resolution: self.shadows.resolution,
                _padding: [0; 2],
            }),
        );
        self.sky.update(
            &self.queue,
            context.view_camera().forward(),
            context.projection(),
        );
        self.culler.update(
            &self.queue,
            context.view(),
            context.projection(),
            context.lights().count(),
        );
    }

    fn mesh_buffers(&mut self, path: &str, loader: &AssetLoader) -> Arc<MeshBuffers> {
        if let Some(buffers) = self.mesh_cache.get(path) {
            return Arc::clone(buffers);
        }
        if self.missing_meshes.contains(path) {
            return Arc::clone(&self.cube);
        }
        match loader.load(path) {
            Ok(mesh) => {
                let buffers = Arc::new(MeshBuffers::from_mesh(&self.device, &mesh, path));
                self.mesh_cache.insert(path.to_string(), Arc::clone(&buffers));
                buffers
            }
            Err(err) => {
                error!("failed to load mesh {path}: {err:?}");
                self.missing_meshes.insert(path.to_string());
                Arc::clone(&self.cube)
            }
        }
    }
}

/// Compiles a WGSL module, turning validation errors into [`PipelineError::Shader`].
async fn create_shader(
    device: &wgpu::Device,
    label: &'static str,
    source: &str,
) -> Result<wgpu::ShaderModule, PipelineError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match device.pop_error_scope().await {
        Some(err) => Err(PipelineError::Shader {
            label,
            message: err.to_string(),
        }),
        None => Ok(module),
    }
}

pub(super) fn uniform_entry<T>(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size_of::<T>() as u64),
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn shadow_array_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2Array,
            multisampled: false,
        },
        count: None,
    }
}

pub(super) fn uniform_buffer<T>(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size_of::<T>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

pub(super) fn depth_state(write: bool, compare: wgpu::CompareFunction) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: Default::default(),
        bias: Default::default(),
    }
}

fn depth_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    view: &wgpu::TextureView,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn create_lighting_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    lights: &wgpu::Buffer,
    visible: &wgpu::Buffer,
    sun: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("lighting-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: lights.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: visible.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: sun.as_entire_binding(),
            },
        ],
    })
}

/// Surface size for a window, shrunk when the tile index buffer would not fit.
fn surface_extent(size: PhysicalSize<u32>, max_visible_bytes: u64) -> (u32, u32) {
    let (width, height) = fit_viewport(size.width, size.height, max_visible_bytes);
    if (width, height) != (size.width, size.height) {
        warn!(
            "{}x{} needs a larger tile index buffer than the device allows; rendering at {width}x{height}",
            size.width, size.height
        );
    }
    (width, height)
}

/// Square viewport in the lower-right corner, a third of the shorter side.
fn preview_viewport(width: u32, height: u32) -> (f32, f32, f32) {
    let size = (width.min(height) / 3).max(1) as f32;
    (width as f32 - size, height as f32 - size, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_sits_in_lower_right_corner() {
        assert_eq!(preview_viewport(1280, 720), (1040.0, 480.0, 240.0));
        assert_eq!(preview_viewport(2, 2), (1.0, 1.0, 1.0));
    }

    #[test]
    fn surface_extent_caps_the_tile_index_buffer() {
        use crate::render::light_culling::visible_buffer_size;

        let limit = visible_buffer_limit(&wgpu::Limits::default());
        assert_eq!(surface_extent(PhysicalSize::new(1920, 1080), limit), (1920, 1080));
        let (width, height) = surface_extent(PhysicalSize::new(5120, 2880), limit);
        assert!(visible_buffer_size(&TileGrid::new(width, height)) <= limit);
    }

    #[test]
    fn overlay_buffer_fits_every_cascade() {
        assert_eq!(MAX_LINE_VERTICES, MAX_CASCADES * 2 * 24);
        assert_eq!(CAMERA_SLOT, MAX_CASCADES);
    }
}
