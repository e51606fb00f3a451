// SPDX-License-Identifier: GPL-3.0-only

//! wgpu implementation of the device collaborator
//!
//! Compute and render work share a single device, so the shared texture is one
//! `wgpu::Texture` with both storage and sampling usage. wgpu tracks the usage
//! transitions itself; acquire/release only record which domain holds the image.

use super::{
    ExecutionDevice, GpuDeviceInfo, KernelVariant, SharedImage, SliceKernelArgs,
    VolumeDescriptor, create_compute_device, wgpu,
};
use crate::config::PowerPreference;
use crate::constants::{DataType, SLICE_KERNEL_ENTRY, SLICE_WORKGROUP_SIZE};
use crate::errors::{RenderError, RenderResult};
use crate::shaders::{self, compute_dispatch_size};
use glam::UVec3;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Format of the shared slice texture
pub const SHARED_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

const BYTES_PER_SHARED_PIXEL: u32 = 16;

/// wgpu-backed execution device
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
}

impl WgpuDevice {
    /// Create a device on the preferred adapter
    pub fn new(power_preference: PowerPreference) -> RenderResult<Self> {
        let (device, queue, info) = create_compute_device("medview_device", power_preference)?;

        info!(
            adapter_name = %info.adapter_name,
            adapter_backend = ?info.backend,
            "GPU device created for slice rendering"
        );

        Ok(Self {
            device,
            queue,
            info,
        })
    }

    /// Wrap an existing device and queue
    pub fn from_parts(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        info: GpuDeviceInfo,
    ) -> Self {
        Self {
            device,
            queue,
            info,
        }
    }

    /// Get the GPU device for sharing with other GPU operations
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the GPU queue for sharing with other GPU operations
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    /// Run `create` inside validation and out-of-memory error scopes
    ///
    /// Errors raised while creating resources are returned instead of reaching
    /// the device's uncaptured error handler, which panics.
    fn scoped<T>(&self, what: &str, create: impl FnOnce() -> T) -> RenderResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = create();

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(error) => Err(RenderError::Gpu(format!("Failed to create {}: {}", what, error))),
            None => Ok(value),
        }
    }
}

/// Reject a 2D texture larger than the device allows
pub fn check_texture_2d(limits: &wgpu::Limits, width: u32, height: u32) -> RenderResult<()> {
    let max = limits.max_texture_dimension_2d;
    if width > max || height > max {
        return Err(RenderError::Gpu(format!(
            "Slice texture {}x{} exceeds the device limit of {}",
            width, height, max
        )));
    }
    Ok(())
}

/// Reject a 3D texture larger than the device allows
pub fn check_texture_3d(limits: &wgpu::Limits, size: UVec3) -> RenderResult<()> {
    let max = limits.max_texture_dimension_3d;
    if size.max_element() > max {
        return Err(RenderError::Gpu(format!(
            "Volume {}x{}x{} exceeds the device limit of {} per axis",
            size.x, size.y, size.z, max
        )));
    }
    Ok(())
}

/// Reject a buffer larger than the device allows
pub fn check_buffer_size(limits: &wgpu::Limits, size: u64) -> RenderResult<()> {
    if size > limits.max_buffer_size {
        return Err(RenderError::Gpu(format!(
            "Buffer of {} bytes exceeds the device limit of {}",
            size, limits.max_buffer_size
        )));
    }
    Ok(())
}

/// Compiled slice kernel with its bind group layout and argument buffer
pub struct WgpuKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    variant: KernelVariant,
}

impl WgpuKernel {
    pub fn variant(&self) -> KernelVariant {
        self.variant
    }
}

/// Volume uploaded as a 3D integer or float texture
pub struct WgpuVolume {
    // Keeps the texture alive while the view is bound
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    data_type: DataType,
}

impl WgpuVolume {
    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

/// Slice texture written by the kernel and sampled by the quad pass
pub struct WgpuSharedTexture {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    acquired: AtomicBool,
}

impl WgpuSharedTexture {
    /// View used for sampling in render passes
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

impl SharedImage for WgpuSharedTexture {
    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn acquire_for_compute(&self) -> RenderResult<()> {
        self.acquired.store(true, Ordering::Release);
        Ok(())
    }

    fn release_to_graphics(&self) -> RenderResult<()> {
        self.acquired.store(false, Ordering::Release);
        Ok(())
    }

    fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    fn read_back(&self) -> RenderResult<Vec<f32>> {
        let padded = shaders::padded_bytes_per_row(self.width, BYTES_PER_SHARED_PIXEL);
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("slice_staging_buffer"),
            size: u64::from(padded) * u64::from(self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("slice_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
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
        let bytes = shaders::unpad_rows(&data, self.width, self.height, BYTES_PER_SHARED_PIXEL);
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

fn volume_format(data_type: DataType) -> wgpu::TextureFormat {
    match data_type {
        DataType::Float => wgpu::TextureFormat::R32Float,
        DataType::Uint8 => wgpu::TextureFormat::R8Uint,
        DataType::Int8 => wgpu::TextureFormat::R8Sint,
        DataType::Uint16 => wgpu::TextureFormat::R16Uint,
        DataType::Int16 => wgpu::TextureFormat::R16Sint,
    }
}

fn volume_sample_type(variant: KernelVariant) -> wgpu::TextureSampleType {
    match variant {
        KernelVariant::Float => wgpu::TextureSampleType::Float { filterable: false },
        KernelVariant::SignedInt => wgpu::TextureSampleType::Sint,
        KernelVariant::UnsignedInt => wgpu::TextureSampleType::Uint,
    }
}

impl ExecutionDevice for WgpuDevice {
    type VertexBuffer = wgpu::Buffer;
    type SharedTexture = WgpuSharedTexture;
    type Kernel = WgpuKernel;
    type VolumeView = WgpuVolume;

    fn name(&self) -> &str {
        &self.info.adapter_name
    }

    fn has_current_context(&self) -> bool {
        // A wgpu device is its own context; offscreen work needs no drawable
        true
    }

    fn make_current(&self) -> RenderResult<()> {
        Ok(())
    }

    fn init_bindings(&self) -> RenderResult<()> {
        Ok(())
    }

    fn create_vertex_buffer(&self, size: u64) -> RenderResult<Self::VertexBuffer> {
        check_buffer_size(&self.device.limits(), size)?;
        debug!(size, "Allocating vertex buffer");

        self.scoped("vertex buffer", || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("surface_vertex_buffer"),
                size,
                usage: wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })
    }

    fn create_shared_texture(&self, width: u32, height: u32) -> RenderResult<Self::SharedTexture> {
        if width == 0 || height == 0 {
            return Err(RenderError::Gpu(format!(
                "Cannot create a {}x{} texture",
                width, height
            )));
        }

        check_texture_2d(&self.device.limits(), width, height)?;
        debug!(width, height, "Allocating shared slice texture");

        let (texture, view) = self.scoped("slice texture", || {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("slice_shared_texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: SHARED_TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        })?;

        Ok(WgpuSharedTexture {
            device: Arc::clone(&self.device),
            queue: Arc::clone(&self.queue),
            texture,
            view,
            width,
            height,
            acquired: AtomicBool::new(false),
        })
    }

    fn build_kernel(&self, variant: KernelVariant) -> RenderResult<Self::Kernel> {
        info!(options = variant.build_flag(), "Building slice kernel");

        let source = shaders::slice_kernel_source(variant);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("slice_kernel_shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("slice_kernel_bind_group_layout"),
                    entries: &[
                        // Input volume
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Texture {
                                sample_type: volume_sample_type(variant),
                                view_dimension: wgpu::TextureViewDimension::D3,
                                multisampled: false,
                            },
                            count: None,
                        },
                        // Output slice texture
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::StorageTexture {
                                access: wgpu::StorageTextureAccess::WriteOnly,
                                format: SHARED_TEXTURE_FORMAT,
                                view_dimension: wgpu::TextureViewDimension::D2,
                            },
                            count: None,
                        },
                        // Kernel arguments
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("slice_kernel_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("slice_kernel_pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(SLICE_KERNEL_ENTRY),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::KernelBuild(error.to_string()));
        }

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("slice_kernel_args"),
            size: std::mem::size_of::<SliceKernelArgs>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(WgpuKernel {
            pipeline,
            bind_group_layout,
            uniform_buffer,
            variant,
        })
    }

    fn upload_volume(
        &self,
        descriptor: &VolumeDescriptor,
        voxels: &[u8],
    ) -> RenderResult<Self::VolumeView> {
        let expected = descriptor.byte_len();
        if voxels.len() < expected {
            return Err(RenderError::Gpu(format!(
                "Volume data too small: {} bytes, expected {}",
                voxels.len(),
                expected
            )));
        }

        check_texture_3d(&self.device.limits(), descriptor.size)?;

        let size = wgpu::Extent3d {
            width: descriptor.size.x,
            height: descriptor.size.y,
            depth_or_array_layers: descriptor.size.z,
        };

        debug!(
            width = size.width,
            height = size.height,
            depth = size.depth_or_array_layers,
            data_type = descriptor.data_type.display_name(),
            "Uploading volume"
        );

        let bytes_per_voxel = descriptor.data_type.bytes_per_voxel() as u32;
        let (texture, view) = self.scoped("volume texture", || {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("volume_texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D3,
                format: volume_format(descriptor.data_type),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &voxels[..expected],
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(descriptor.size.x * bytes_per_voxel),
                    rows_per_image: Some(descriptor.size.y),
                },
                size,
            );

            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        })?;

        Ok(WgpuVolume {
            _texture: texture,
            view,
            data_type: descriptor.data_type,
        })
    }

    fn dispatch_slice(
        &self,
        kernel: &Self::Kernel,
        volume: &Self::VolumeView,
        target: &Self::SharedTexture,
        args: &SliceKernelArgs,
        range: (u32, u32),
    ) -> RenderResult<()> {
        if !target.is_acquired() {
            return Err(RenderError::Gpu(
                "Shared texture is not acquired for compute".to_string(),
            ));
        }
        if KernelVariant::for_data_type(volume.data_type) != kernel.variant {
            return Err(RenderError::Gpu(format!(
                "Kernel built with {} cannot read {} volumes",
                kernel.variant.build_flag(),
                volume.data_type.display_name()
            )));
        }

        self.queue
            .write_buffer(&kernel.uniform_buffer, 0, bytemuck::bytes_of(args));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("slice_kernel_bind_group"),
            layout: &kernel.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&volume.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: kernel.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("slice_kernel_encoder"),
            });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("slice_kernel_pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&kernel.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(
                compute_dispatch_size(range.0, SLICE_WORKGROUP_SIZE),
                compute_dispatch_size(range.1, SLICE_WORKGROUP_SIZE),
                1,
            );
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn finish(&self) -> RenderResult<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| RenderError::Gpu(format!("Failed to wait for queue: {:?}", e)))
    }
}
