// SPDX-License-Identifier: GPL-3.0-only

//! Offscreen render target for textured quads
//!
//! Draws into an RGBA8 colour texture that can be read back as an image. The
//! slice texture is sampled with a non-filtering sampler since RGBA32F is not
//! filterable on every adapter.

use super::{WgpuDevice, WgpuSharedTexture, wgpu};
use crate::constants::PlaneType;
use crate::data::BoundingBox;
use crate::errors::{RenderError, RenderResult};
use crate::renderer::{QuadVertex, RenderTarget, TexturedQuad};
use crate::shaders::{self, QUAD_SHADER};
use glam::{Mat4, Vec3};
use std::sync::Arc;
use tracing::debug;
use wgpu::util::DeviceExt;

/// Format of the offscreen colour target
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const BYTES_PER_TARGET_PIXEL: u32 = 4;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 12,
        shader_location: 1,
    },
];

/// Orthographic view looking down the plane axis, fitted to `bounds`
///
/// The larger in-plane half extent is used for both axes, so a square target
/// shows the slice undistorted.
pub fn slice_view_projection(bounds: &BoundingBox, plane: PlaneType) -> Mat4 {
    let centre = (bounds.min + bounds.max) * 0.5;
    let extent = bounds.extent();
    let distance = extent.length() + 1.0;

    let (direction, up, half) = match plane {
        PlaneType::X => (Vec3::X, Vec3::Z, extent.y.max(extent.z) * 0.5),
        PlaneType::Y => (Vec3::NEG_Y, Vec3::Z, extent.x.max(extent.z) * 0.5),
        PlaneType::Z => (Vec3::Z, Vec3::Y, extent.x.max(extent.y) * 0.5),
    };
    let half = half.max(f32::EPSILON);

    let view = Mat4::look_at_rh(centre + direction * distance, centre, up);
    let projection = Mat4::orthographic_rh(-half, half, -half, half, 0.0, distance * 2.0);
    projection * view
}

/// Offscreen quad renderer on a [`WgpuDevice`]
pub struct QuadTarget {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    width: u32,
    height: u32,
    view_projection: Mat4,
    clear_pending: bool,
}

impl QuadTarget {
    pub fn new(device: &WgpuDevice, width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::Gpu(format!(
                "Cannot create a {}x{} render target",
                width, height
            )));
        }

        let queue = Arc::clone(device.queue());
        let device = Arc::clone(device.device());

        debug!(width, height, "Creating quad render target");

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad_shader"),
            source: wgpu::ShaderSource::Wgsl(QUAD_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("quad_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &QUAD_ATTRIBUTES,
                }],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("quad_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad_uniforms"),
            size: std::mem::size_of::<[f32; 16]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("quad_color_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            color,
            color_view,
            width,
            height,
            view_projection: Mat4::IDENTITY,
            clear_pending: true,
        })
    }

    /// Set the view and projection applied before each model transform
    pub fn set_view_projection(&mut self, view_projection: Mat4) {
        self.view_projection = view_projection;
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    /// Clear to black on the next draw
    pub fn clear(&mut self) {
        self.clear_pending = true;
    }

    /// Read the colour target back as an RGBA8 image
    pub fn read_pixels(&self) -> RenderResult<image::RgbaImage> {
        let padded = shaders::padded_bytes_per_row(self.width, BYTES_PER_TARGET_PIXEL);
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad_staging_buffer"),
            size: u64::from(padded) * u64::from(self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("quad_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let data = shaders::read_buffer(&self.device, &staging_buffer)?;
        let pixels = shaders::unpad_rows(&data, self.width, self.height, BYTES_PER_TARGET_PIXEL);
        image::RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| RenderError::Gpu("Readback size does not match target".to_string()))
    }
}

impl RenderTarget<WgpuDevice> for QuadTarget {
    fn draw_textured_quad(
        &mut self,
        model: &Mat4,
        texture: &WgpuSharedTexture,
        quad: &TexturedQuad,
    ) -> RenderResult<()> {
        let transform = (self.view_projection * *model).to_cols_array();
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&transform));

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad_vertices"),
                contents: bytemuck::cast_slice(&quad.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad_indices"),
                contents: bytemuck::cast_slice(&TexturedQuad::INDICES),
                usage: wgpu::BufferUsages::INDEX,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(texture.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let load = if self.clear_pending {
            wgpu::LoadOp::Clear(wgpu::Color::BLACK)
        } else {
            wgpu::LoadOp::Load
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("quad_encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("quad_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..TexturedQuad::INDICES.len() as u32, 0, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.clear_pending = false;
        Ok(())
    }
}
