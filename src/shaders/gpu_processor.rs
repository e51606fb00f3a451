// SPDX-License-Identifier: GPL-3.0-only

//! Shared GPU processor helpers
//!
//! - Workgroup dispatch calculations
//! - Blocking buffer readback
//! - Row padding for texture-to-buffer copies

use crate::errors::{RenderError, RenderResult};
use crate::gpu::wgpu;

/// Helper for buffer readback (map, poll, read, unmap)
///
/// Blocks until the mapping completes. The buffer must be MAP_READ.
pub fn read_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> RenderResult<Vec<u8>> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| RenderError::Gpu(format!("Failed to poll device: {:?}", e)))?;

    pollster::block_on(receiver)
        .map_err(|_| RenderError::Gpu("Failed to receive buffer mapping".to_string()))?
        .map_err(|e| RenderError::Gpu(format!("Failed to map buffer: {:?}", e)))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}

/// Calculate compute shader dispatch size (workgroups needed)
///
/// Given a dimension and workgroup size, returns the number of workgroups
/// needed to cover the entire dimension.
#[inline]
pub fn compute_dispatch_size(dimension: u32, workgroup_size: u32) -> u32 {
    dimension.div_ceil(workgroup_size)
}

/// Bytes per row of a texture copy, padded to the copy alignment (256)
#[inline]
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strip the row padding of a texture readback
pub fn unpad_rows(data: &[u8], width: u32, height: u32, bytes_per_pixel: u32) -> Vec<u8> {
    let row = (width * bytes_per_pixel) as usize;
    let padded = padded_bytes_per_row(width, bytes_per_pixel) as usize;
    let mut out = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        out.extend_from_slice(&data[y * padded..y * padded + row]);
    }
    out
}
