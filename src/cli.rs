// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Reporting the GPU adapter
//! - Rendering a slice of a synthetic volume to PNG
//! - Allocating a surface vertex buffer

use glam::{UVec3, Vec3};
use medview::gpu::quad_pass::slice_view_projection;
use medview::gpu::{QuadTarget, SharedImage};
use medview::{
    AccessMode, Config, CpuDevice, DataType, ExecutionDevice, HostVolume, IdentitySceneGraph,
    RenderResult, SliceRenderer, Surface, WgpuDevice,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

/// Parse a volume size given as `N` or `WxHxD`
pub fn parse_size(value: &str) -> Result<UVec3, String> {
    let parts: Vec<u32> = value
        .split('x')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid size '{}': {}", value, e))?;

    let size = match parts.as_slice() {
        [n] => UVec3::splat(*n),
        [w, h, d] => UVec3::new(*w, *h, *d),
        _ => return Err(format!("invalid size '{}': expected N or WxHxD", value)),
    };
    if size.min_element() == 0 {
        return Err(format!("invalid size '{}': every axis must be non-zero", value));
    }
    Ok(size)
}

/// Options of the `slice` command
pub struct SliceOptions {
    pub size: UVec3,
    pub data_type: DataType,
    pub raw: bool,
    pub cpu: bool,
    pub output: PathBuf,
    pub config: Config,
}

/// Print the GPU adapter selected for the configured power preference
pub fn print_device_info(config: &Config) -> Result<(), Box<dyn Error>> {
    let device = WgpuDevice::new(config.power_preference)?;
    let info = device.info();

    println!("Adapter: {}", info.adapter_name);
    println!("Backend: {:?}", info.backend);
    Ok(())
}

/// Render one slice of a synthetic volume and save it as PNG
pub fn render_slice(options: &SliceOptions) -> Result<(), Box<dyn Error>> {
    let volume = Arc::new(HostVolume::synthetic(options.size, options.data_type)?);
    println!(
        "Volume: {}x{}x{} {}",
        options.size.x,
        options.size.y,
        options.size.z,
        options.data_type.display_name()
    );

    let image = if options.cpu {
        let renderer = SliceRenderer::new(Arc::new(CpuDevice::new()), Arc::new(IdentitySceneGraph));
        execute_slice(&renderer, &volume, options)?;
        slice_texture_image(&renderer)?
    } else {
        let device = Arc::new(WgpuDevice::new(options.config.power_preference)?);
        println!("Adapter: {}", device.info().adapter_name);

        let renderer = SliceRenderer::new(Arc::clone(&device), Arc::new(IdentitySceneGraph));
        execute_slice(&renderer, &volume, options)?;

        if options.raw {
            slice_texture_image(&renderer)?
        } else {
            let bounds = renderer.get_bounding_box()?;
            let size = options.config.output_size;
            let mut target = QuadTarget::new(&device, size, size)?;
            target.set_view_projection(slice_view_projection(&bounds, renderer.slice_plane()));
            renderer.draw(&mut target)?;
            target.read_pixels()?
        }
    };

    image.save(&options.output)?;
    println!("Saved: {}", options.output.display());
    Ok(())
}

fn execute_slice<D: ExecutionDevice + 'static>(
    renderer: &SliceRenderer<D>,
    volume: &Arc<HostVolume>,
    options: &SliceOptions,
) -> Result<(), Box<dyn Error>> {
    renderer.set_input_connection(volume);
    renderer.apply_config(&options.config.slice)?;
    renderer.execute()?;

    if let (Some(slice), Some((width, height))) = (renderer.resolved_slice(), renderer.output_extent())
    {
        println!(
            "Slice {} along {:?}: {}x{}",
            slice,
            renderer.slice_plane(),
            width,
            height
        );
    }
    Ok(())
}

/// Read the slice texture back as an 8-bit image
fn slice_texture_image<D: ExecutionDevice + 'static>(
    renderer: &SliceRenderer<D>,
) -> Result<image::RgbaImage, Box<dyn Error>> {
    let image = renderer
        .with_texture(texture_to_image)
        .ok_or("No slice texture was rendered")??;
    Ok(image)
}

fn texture_to_image<T: SharedImage>(texture: &T) -> RenderResult<image::RgbaImage> {
    let (width, height) = texture.extent();
    let pixels: Vec<u8> = texture
        .read_back()?
        .into_iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
        medview::RenderError::Gpu("Texture readback size does not match extent".to_string())
    })
}

/// Corners, normals and triangles of the box spanning `[0, size]`
pub fn box_mesh(size: UVec3) -> (Vec<Vec3>, Vec<Vec3>, Vec<UVec3>) {
    let max = size.as_vec3();
    let centre = max * 0.5;
    let positions: Vec<Vec3> = (0..8)
        .map(|i| {
            Vec3::new(
                if i & 1 != 0 { max.x } else { 0.0 },
                if i & 2 != 0 { max.y } else { 0.0 },
                if i & 4 != 0 { max.z } else { 0.0 },
            )
        })
        .collect();
    let normals = positions
        .iter()
        .map(|p| (*p - centre).normalize_or_zero())
        .collect();

    // Two triangles per face
    let triangles = [
        [0, 2, 1], [1, 2, 3], // z = 0
        [4, 5, 6], [5, 7, 6], // z = max
        [0, 1, 4], [1, 5, 4], // y = 0
        [2, 6, 3], [3, 6, 7], // y = max
        [0, 4, 2], [2, 4, 6], // x = 0
        [1, 3, 5], [3, 7, 5], // x = max
    ]
    .into_iter()
    .map(UVec3::from_array)
    .collect();

    (positions, normals, triangles)
}

/// Build the bounding-box surface of a volume and request its vertex buffer
pub fn build_mesh(size: UVec3, cpu: bool, config: &Config) -> Result<(), Box<dyn Error>> {
    let (positions, normals, triangles) = box_mesh(size);

    if cpu {
        let device = CpuDevice::new();
        let mut surface = Surface::<CpuDevice>::new();
        surface.create(&positions, &normals, &triangles)?;
        let access = surface.get_vertex_buffer_access(AccessMode::ReadWrite, &device)?;
        report_mesh(device.name(), access.triangle_count(), access.buffer().size());
    } else {
        let device = WgpuDevice::new(config.power_preference)?;
        let mut surface = Surface::<WgpuDevice>::new();
        surface.create(&positions, &normals, &triangles)?;
        let access = surface.get_vertex_buffer_access(AccessMode::ReadWrite, &device)?;
        report_mesh(device.name(), access.triangle_count(), access.buffer().size());
    }
    Ok(())
}

fn report_mesh(device: &str, triangles: u32, bytes: u64) {
    println!("Device: {}", device);
    println!("Triangles: {}", triangles);
    println!("Vertex buffer: {} bytes", bytes);
}
