use std::mem::size_of;
use std::num::NonZeroU64;

use bytemuck::bytes_of;
use glam::Mat4;

use crate::config::{Projection, MAX_POINT_LIGHTS};
use crate::culling::{TileGrid, MAX_LIGHTS_PER_TILE};

use super::common::CullParams;

/// Bytes of the visible index buffer for a tile grid.
pub fn visible_buffer_size(grid: &TileGrid) -> u64 {
    (grid.total() * MAX_LIGHTS_PER_TILE * size_of::<i32>()) as u64
}

/// Largest visible index buffer the device can bind as one storage buffer.
pub fn visible_buffer_limit(limits: &wgpu::Limits) -> u64 {
    u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size)
}

/// Shrinks a viewport, keeping its aspect ratio, until its index buffer fits
/// in `max_bytes`. Viewports that already fit are returned unchanged.
pub fn fit_viewport(width: u32, height: u32, max_bytes: u64) -> (u32, u32) {
    let size = |w: u32, h: u32| visible_buffer_size(&TileGrid::new(w, h));
    let required = size(width, height);
    if required <= max_bytes {
        return (width, height);
    }
    let mut scale = (max_bytes as f64 / required as f64).sqrt();
    loop {
        let w = ((width as f64 * scale) as u32).max(1);
        let h = ((height as f64 * scale) as u32).max(1);
        if size(w, h) <= max_bytes || (w == 1 && h == 1) {
            return (w, h);
        }
        scale *= 0.995;
    }
}

/// GPU tile light culler: one compute workgroup per screen tile.
pub struct LightCuller {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    visible: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    grid: TileGrid,
}

impl LightCuller {
    pub fn new(
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        depth_view: &wgpu::TextureView,
        lights: &wgpu::Buffer,
        grid: TileGrid,
    ) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cull-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(size_of::<CullParams>() as u64),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cull-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cull-pipeline"),
            layout: Some(&pipeline_layout),
            module,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cull-params"),
            size: size_of::<CullParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let visible = create_visible_buffer(device, &grid);
        let bind_group = create_bind_group(device, &layout, &params, depth_view, lights, &visible);

        Self {
            pipeline,
            layout,
            params,
            visible,
            bind_group,
            grid,
        }
    }

    /// Per-tile index lists written by the last dispatch.
    pub fn visible(&self) -> &wgpu::Buffer {
        &self.visible
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    /// Reallocates the index buffer for a new viewport and rebinds the new
    /// camera depth view.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        depth_view: &wgpu::TextureView,
        lights: &wgpu::Buffer,
        grid: TileGrid,
    ) {
        self.grid = grid;
        self.visible = create_visible_buffer(device, &grid);
        self.bind_group = create_bind_group(
            device,
            &self.layout,
            &self.params,
            depth_view,
            lights,
            &self.visible,
        );
    }

    pub fn update(&self, queue: &wgpu::Queue, view: Mat4, projection: &Projection, light_count: usize) {
        let params = CullParams {
            view: view.to_cols_array_2d(),
            proj_scale: projection.scale().to_array(),
            near: projection.near,
            far: projection.far,
            screen_size: [self.grid.width(), self.grid.height()],
            tiles_x: self.grid.tiles_x(),
            light_count: light_count.min(MAX_POINT_LIGHTS) as u32,
        };
        queue.write_buffer(&self.params, 0, bytes_of(&params));
    }

    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("light-cull-pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(self.grid.tiles_x(), self.grid.tiles_y(), 1);
    }
}

fn create_visible_buffer(device: &wgpu::Device, grid: &TileGrid) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("visible-light-indices"),
        size: visible_buffer_size(grid),
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    params: &wgpu::Buffer,
    depth_view: &wgpu::TextureView,
    lights: &wgpu::Buffer,
    visible: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("cull-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(depth_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: lights.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: visible.as_entire_binding(),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::culling::TILE_SIZE;

    #[test]
    fn visible_buffer_holds_a_full_list_per_tile() {
        let grid = TileGrid::new(1280, 720);
        assert_eq!(grid.tiles_x(), 1280 / TILE_SIZE);
        assert_eq!(visible_buffer_size(&grid), 80 * 45 * 1024 * 4);
    }

    #[test]
    fn viewports_within_the_binding_limit_are_kept() {
        let limit = visible_buffer_limit(&wgpu::Limits::default());
        assert_eq!(fit_viewport(3840, 2160, limit), (3840, 2160));
    }

    #[test]
    fn oversized_viewports_shrink_to_fit_the_binding_limit() {
        let limit = visible_buffer_limit(&wgpu::Limits::default());
        assert!(visible_buffer_size(&TileGrid::new(5120, 2880)) > limit);

        let (width, height) = fit_viewport(5120, 2880, limit);
        assert!(visible_buffer_size(&TileGrid::new(width, height)) <= limit);
        assert!(width < 5120 && height < 2880);
        // Still close to the requested size and aspect.
        assert!(width >= 3800, "width {width}");
        let aspect = width as f32 / height as f32;
        assert!((aspect - 16.0 / 9.0).abs() < 0.01, "aspect {aspect}");
    }

    #[test]
    fn tiny_limits_bottom_out_at_one_pixel() {
        assert_eq!(fit_viewport(640, 480, 0), (1, 1));
    }
}
