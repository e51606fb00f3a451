// SPDX-License-Identifier: GPL-3.0-only

//! GPU device abstraction
//!
//! The renderers talk to the GPU only through [`ExecutionDevice`]. Every resource
//! it hands out is an owned value, so dropping it releases the device memory.
//!
//! Two implementations are provided:
//! - [`WgpuDevice`]: compute and render pipelines on one wgpu device
//! - [`CpuDevice`]: reference implementation on the CPU, with resource statistics

pub mod cpu;
pub mod quad_pass;
mod wgpu_device;

use crate::config::PowerPreference;
use crate::constants::DataType;
use crate::errors::{RenderError, RenderResult};
use glam::UVec3;
use std::sync::Arc;
use tracing::{debug, info};

pub use cpu::{CpuDevice, DeviceStats};
pub use quad_pass::QuadTarget;
pub use wgpu_device::{WgpuDevice, WgpuKernel, WgpuSharedTexture, WgpuVolume};

/// Re-export the wgpu version used by the compute and render pipelines
pub use wgpu_compute as wgpu;

/// Kernel build variant, selected by the voxel type of the bound volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelVariant {
    /// Floating-point volumes
    Float,
    /// 8- and 16-bit signed integer volumes
    SignedInt,
    /// Everything else
    UnsignedInt,
}

impl KernelVariant {
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Float => KernelVariant::Float,
            DataType::Int8 | DataType::Int16 => KernelVariant::SignedInt,
            _ => KernelVariant::UnsignedInt,
        }
    }

    /// Preprocessor-style build flag, used in logs
    pub fn build_flag(&self) -> &'static str {
        match self {
            KernelVariant::Float => "-DTYPE_FLOAT",
            KernelVariant::SignedInt => "-DTYPE_INT",
            KernelVariant::UnsignedInt => "-DTYPE_UINT",
        }
    }
}

/// Arguments of the slice extraction kernel (uniform buffer layout)
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SliceKernelArgs {
    pub slice_index: u32,
    pub level: f32,
    pub window: f32,
    /// 0 = x, 1 = y, 2 = z
    pub plane: u32,
}

/// Shape of a volume to upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDescriptor {
    /// Width, height, depth in voxels
    pub size: UVec3,
    pub data_type: DataType,
}

impl VolumeDescriptor {
    /// Bytes of tightly packed voxel data (x fastest, then y, then z)
    pub fn byte_len(&self) -> usize {
        self.size.x as usize
            * self.size.y as usize
            * self.size.z as usize
            * self.data_type.bytes_per_voxel()
    }
}

/// A 2D RGBA float image written by the compute side and read by the graphics side.
///
/// Creation is the graphics call site; `acquire_for_compute` / `release_to_graphics`
/// bracket the compute call site. There is one underlying resource.
pub trait SharedImage {
    /// Width and height in pixels
    fn extent(&self) -> (u32, u32);

    /// Hand the image to the compute domain
    fn acquire_for_compute(&self) -> RenderResult<()>;

    /// Hand the image back to the graphics domain
    fn release_to_graphics(&self) -> RenderResult<()>;

    /// Whether the compute domain currently holds the image
    fn is_acquired(&self) -> bool;

    /// Read the pixels back as RGBA floats, row-major
    fn read_back(&self) -> RenderResult<Vec<f32>>;
}

/// Supplies a drawable when no rendering context is current
pub trait SurfaceProvisioner: Send + Sync {
    fn provision_surface(&self) -> RenderResult<()>;
}

/// Provisioner for devices that render offscreen and never need a drawable
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessProvisioner;

impl SurfaceProvisioner for HeadlessProvisioner {
    fn provision_surface(&self) -> RenderResult<()> {
        debug!("Headless provisioner: no drawable required");
        Ok(())
    }
}

/// Compute/graphics device collaborator
pub trait ExecutionDevice {
    /// Vertex buffer object
    type VertexBuffer;
    /// Texture shared between compute and graphics
    type SharedTexture: SharedImage;
    /// Compiled slice extraction kernel
    type Kernel;
    /// Read-only compute view of a volume
    type VolumeView;

    /// Device name for logs
    fn name(&self) -> &str;

    /// Whether a rendering context is current on the calling thread
    fn has_current_context(&self) -> bool;

    /// Bind this device's graphics context to the provisioned drawable
    fn make_current(&self) -> RenderResult<()>;

    /// Initialize the GPU binding layer. Must be idempotent.
    fn init_bindings(&self) -> RenderResult<()>;

    /// Allocate an uninitialized vertex buffer of `size` bytes
    fn create_vertex_buffer(&self, size: u64) -> RenderResult<Self::VertexBuffer>;

    /// Allocate an RGBA float texture usable by both compute and graphics
    fn create_shared_texture(&self, width: u32, height: u32) -> RenderResult<Self::SharedTexture>;

    /// Build the slice extraction kernel for a voxel type variant
    fn build_kernel(&self, variant: KernelVariant) -> RenderResult<Self::Kernel>;

    /// Upload voxel data and return a read-only compute view
    fn upload_volume(
        &self,
        descriptor: &VolumeDescriptor,
        voxels: &[u8],
    ) -> RenderResult<Self::VolumeView>;

    /// Enqueue the kernel over a `range.0 x range.1` grid writing into `target`
    fn dispatch_slice(
        &self,
        kernel: &Self::Kernel,
        volume: &Self::VolumeView,
        target: &Self::SharedTexture,
        args: &SliceKernelArgs,
        range: (u32, u32),
    ) -> RenderResult<()>;

    /// Block until all submitted work has completed
    fn finish(&self) -> RenderResult<()>;
}

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
}

/// Create a wgpu device and queue for compute and render work.
///
/// Blocks on adapter and device requests.
pub fn create_compute_device(
    label: &str,
    power_preference: PowerPreference,
) -> RenderResult<(Arc<wgpu::Device>, Arc<wgpu::Queue>, GpuDeviceInfo)> {
    info!(label = label, "Creating GPU device");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });

    let power_preference = match power_preference {
        PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
    };

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .map_err(|e| RenderError::Context(format!("Failed to find suitable GPU adapter: {}", e)))?;

    let adapter_info = adapter.get_info();

    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected"
    );

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some(label),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: wgpu::MemoryHints::Performance,
        ..Default::default()
    }))
    .map_err(|e| RenderError::Context(format!("Failed to create GPU device: {}", e)))?;

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
    };

    Ok((Arc::new(device), Arc::new(queue), info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_variant_selection() {
        assert_eq!(KernelVariant::for_data_type(DataType::Float), KernelVariant::Float);
        assert_eq!(KernelVariant::for_data_type(DataType::Int8), KernelVariant::SignedInt);
        assert_eq!(KernelVariant::for_data_type(DataType::Int16), KernelVariant::SignedInt);
        assert_eq!(KernelVariant::for_data_type(DataType::Uint8), KernelVariant::UnsignedInt);
        assert_eq!(KernelVariant::for_data_type(DataType::Uint16), KernelVariant::UnsignedInt);
    }

    #[test]
    fn test_kernel_args_layout() {
        assert_eq!(std::mem::size_of::<SliceKernelArgs>(), 16);
    }

    #[test]
    fn test_volume_descriptor_byte_len() {
        let descriptor = VolumeDescriptor {
            size: UVec3::new(4, 5, 6),
            data_type: DataType::Int16,
        };
        assert_eq!(descriptor.byte_len(), 4 * 5 * 6 * 2);
    }

    #[test]
    fn test_create_compute_device() {
        // This test requires a GPU, so it may be skipped in CI
        match create_compute_device("test_device", PowerPreference::default()) {
            Ok((_device, _queue, info)) => {
                println!("Created device: {:?}", info);
            }
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
            }
        }
    }
}
