// SPDX-License-Identifier: GPL-3.0-only

//! CPU reference device
//!
//! Executes the slice kernel sequentially on the CPU. Used for platforms without
//! GPU support and for validating renderer state handling: every resource keeps a
//! handle to [`DeviceStats`], so allocations, releases and kernel builds can be
//! observed from outside.

use super::{
    ExecutionDevice, KernelVariant, SharedImage, SliceKernelArgs, VolumeDescriptor,
};
use crate::constants::DataType;
use crate::errors::{RenderError, RenderResult};
use glam::UVec3;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Resource counters of a [`CpuDevice`]
#[derive(Debug, Default)]
pub struct DeviceStats {
    buffers_created: AtomicUsize,
    buffers_released: AtomicUsize,
    textures_created: AtomicUsize,
    textures_released: AtomicUsize,
    kernels_built: AtomicUsize,
    volumes_uploaded: AtomicUsize,
    dispatches: AtomicUsize,
    context_binds: AtomicUsize,
}

impl DeviceStats {
    pub fn buffers_created(&self) -> usize {
        self.buffers_created.load(Ordering::Relaxed)
    }

    pub fn buffers_released(&self) -> usize {
        self.buffers_released.load(Ordering::Relaxed)
    }

    /// Buffers currently allocated
    pub fn live_buffers(&self) -> usize {
        self.buffers_created() - self.buffers_released()
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created.load(Ordering::Relaxed)
    }

    pub fn textures_released(&self) -> usize {
        self.textures_released.load(Ordering::Relaxed)
    }

    /// Textures currently allocated
    pub fn live_textures(&self) -> usize {
        self.textures_created() - self.textures_released()
    }

    pub fn kernels_built(&self) -> usize {
        self.kernels_built.load(Ordering::Relaxed)
    }

    pub fn volumes_uploaded(&self) -> usize {
        self.volumes_uploaded.load(Ordering::Relaxed)
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn context_binds(&self) -> usize {
        self.context_binds.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// CPU-side vertex buffer
#[derive(Debug)]
pub struct CpuBuffer {
    data: Mutex<Vec<f32>>,
    stats: Arc<DeviceStats>,
}

impl CpuBuffer {
    /// Size in bytes
    pub fn size(&self) -> u64 {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        (data.len() * std::mem::size_of::<f32>()) as u64
    }

    /// Run `f` over the buffer contents
    pub fn with_data<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut data)
    }
}

impl Drop for CpuBuffer {
    fn drop(&mut self) {
        DeviceStats::bump(&self.stats.buffers_released);
    }
}

/// CPU-side shared image
#[derive(Debug)]
pub struct CpuTexture {
    width: u32,
    height: u32,
    pixels: Mutex<Vec<[f32; 4]>>,
    acquired: AtomicBool,
    stats: Arc<DeviceStats>,
}

impl SharedImage for CpuTexture {
    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn acquire_for_compute(&self) -> RenderResult<()> {
        if self.acquired.swap(true, Ordering::AcqRel) {
            return Err(RenderError::Gpu(
                "Shared image is already acquired for compute".to_string(),
            ));
        }
        Ok(())
    }

    fn release_to_graphics(&self) -> RenderResult<()> {
        if !self.acquired.swap(false, Ordering::AcqRel) {
            return Err(RenderError::Gpu(
                "Shared image is not acquired for compute".to_string(),
            ));
        }
        Ok(())
    }

    fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    fn read_back(&self) -> RenderResult<Vec<f32>> {
        let pixels = self.pixels.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(pixels.iter().flatten().copied().collect())
    }
}

impl Drop for CpuTexture {
    fn drop(&mut self) {
        DeviceStats::bump(&self.stats.textures_released);
    }
}

/// "Compiled" kernel: the variant decides how voxel bytes are interpreted
#[derive(Debug, Clone, Copy)]
pub struct CpuKernel {
    pub variant: KernelVariant,
}

/// Volume copy held by the CPU device
#[derive(Debug, Clone)]
pub struct CpuVolume {
    size: UVec3,
    data_type: DataType,
    voxels: Arc<[u8]>,
}

impl CpuVolume {
    fn voxel(&self, variant: KernelVariant, pos: UVec3) -> RenderResult<f32> {
        let index = (pos.x as usize)
            + (pos.y as usize) * self.size.x as usize
            + (pos.z as usize) * self.size.x as usize * self.size.y as usize;
        let offset = index * self.data_type.bytes_per_voxel();
        let bytes = &self.voxels[offset..offset + self.data_type.bytes_per_voxel()];

        let value = match (variant, self.data_type) {
            (KernelVariant::Float, DataType::Float) => {
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
            (KernelVariant::SignedInt, DataType::Int8) => f32::from(bytes[0] as i8),
            (KernelVariant::SignedInt, DataType::Int16) => {
                f32::from(i16::from_le_bytes([bytes[0], bytes[1]]))
            }
            (KernelVariant::UnsignedInt, DataType::Uint8) => f32::from(bytes[0]),
            (KernelVariant::UnsignedInt, DataType::Uint16) => {
                f32::from(u16::from_le_bytes([bytes[0], bytes[1]]))
            }
            (variant, data_type) => {
                return Err(RenderError::Gpu(format!(
                    "Kernel built with {} cannot read {} volumes",
                    variant.build_flag(),
                    data_type.display_name()
                )));
            }
        };
        Ok(value)
    }
}

/// Map an intensity through a window/level into [0, 1]
pub fn apply_window_level(value: f32, level: f32, window: f32) -> f32 {
    let low = level - window * 0.5;
    ((value - low) / window).clamp(0.0, 1.0)
}

/// CPU reference execution device
#[derive(Debug)]
pub struct CpuDevice {
    stats: Arc<DeviceStats>,
    context_current: AtomicBool,
}

impl CpuDevice {
    /// Creates a device with a current context
    pub fn new() -> Self {
        Self {
            stats: Arc::new(DeviceStats::default()),
            context_current: AtomicBool::new(true),
        }
    }

    /// Creates a device with no current context; the first buffer allocation has
    /// to go through the surface provisioner
    pub fn detached() -> Self {
        Self {
            stats: Arc::new(DeviceStats::default()),
            context_current: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionDevice for CpuDevice {
    type VertexBuffer = CpuBuffer;
    type SharedTexture = CpuTexture;
    type Kernel = CpuKernel;
    type VolumeView = CpuVolume;

    fn name(&self) -> &str {
        "cpu_reference"
    }

    fn has_current_context(&self) -> bool {
        self.context_current.load(Ordering::Acquire)
    }

    fn make_current(&self) -> RenderResult<()> {
        self.context_current.store(true, Ordering::Release);
        DeviceStats::bump(&self.stats.context_binds);
        Ok(())
    }

    fn init_bindings(&self) -> RenderResult<()> {
        Ok(())
    }

    fn create_vertex_buffer(&self, size: u64) -> RenderResult<Self::VertexBuffer> {
        if !self.has_current_context() {
            return Err(RenderError::Context(
                "No current context for buffer allocation".to_string(),
            ));
        }
        let len = usize::try_from(size)
            .map_err(|_| RenderError::Gpu(format!("Buffer size {} out of range", size)))?
            / std::mem::size_of::<f32>();
        DeviceStats::bump(&self.stats.buffers_created);
        Ok(CpuBuffer {
            data: Mutex::new(vec![0.0; len]),
            stats: Arc::clone(&self.stats),
        })
    }

    fn create_shared_texture(&self, width: u32, height: u32) -> RenderResult<Self::SharedTexture> {
        if width == 0 || height == 0 {
            return Err(RenderError::Gpu(format!(
                "Cannot create a {}x{} texture",
                width, height
            )));
        }
        DeviceStats::bump(&self.stats.textures_created);
        Ok(CpuTexture {
            width,
            height,
            pixels: Mutex::new(vec![[0.0; 4]; width as usize * height as usize]),
            acquired: AtomicBool::new(false),
            stats: Arc::clone(&self.stats),
        })
    }

    fn build_kernel(&self, variant: KernelVariant) -> RenderResult<Self::Kernel> {
        DeviceStats::bump(&self.stats.kernels_built);
        Ok(CpuKernel { variant })
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
        DeviceStats::bump(&self.stats.volumes_uploaded);
        Ok(CpuVolume {
            size: descriptor.size,
            data_type: descriptor.data_type,
            voxels: Arc::from(&voxels[..expected]),
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

        let (width, height) = target.extent();
        let range = (range.0.min(width), range.1.min(height));
        let mut pixels = target.pixels.lock().unwrap_or_else(PoisonError::into_inner);

        for y in 0..range.1 {
            for x in 0..range.0 {
                let pos = match args.plane {
                    0 => UVec3::new(args.slice_index, x, y),
                    1 => UVec3::new(x, args.slice_index, y),
                    _ => UVec3::new(x, y, args.slice_index),
                };
                if pos.cmpge(volume.size).any() {
                    continue;
                }
                let value = volume.voxel(kernel.variant, pos)?;
                let v = apply_window_level(value, args.level, args.window);
                pixels[(y * width + x) as usize] = [v, v, v, 1.0];
            }
        }

        DeviceStats::bump(&self.stats.dispatches);
        Ok(())
    }

    fn finish(&self) -> RenderResult<()> {
        Ok(())
    }
}
