// SPDX-License-Identifier: GPL-3.0-only
//! Shader sources and compute helpers
//!
//! The slice extraction kernel is one WGSL body shared by all voxel types. Each
//! [`KernelVariant`] contributes a short prelude declaring the volume binding with
//! the matching texel type, the WGSL counterpart of a `-DTYPE_*` build flag.

mod gpu_processor;

use crate::gpu::KernelVariant;

pub use gpu_processor::{compute_dispatch_size, padded_bytes_per_row, read_buffer, unpad_rows};

/// Slice extraction kernel body
pub const SLICE_KERNEL_BODY: &str = include_str!("slice_extract.wgsl");

/// Textured quad render shader
pub const QUAD_SHADER: &str = include_str!("quad.wgsl");

const FLOAT_PRELUDE: &str = "
@group(0) @binding(0) var volume: texture_3d<f32>;
fn load_voxel(p: vec3<i32>) -> f32 { return textureLoad(volume, p, 0).x; }
";

const SIGNED_PRELUDE: &str = "
@group(0) @binding(0) var volume: texture_3d<i32>;
fn load_voxel(p: vec3<i32>) -> f32 { return f32(textureLoad(volume, p, 0).x); }
";

const UNSIGNED_PRELUDE: &str = "
@group(0) @binding(0) var volume: texture_3d<u32>;
fn load_voxel(p: vec3<i32>) -> f32 { return f32(textureLoad(volume, p, 0).x); }
";

/// Complete kernel source for a variant
pub fn slice_kernel_source(variant: KernelVariant) -> String {
    let prelude = match variant {
        KernelVariant::Float => FLOAT_PRELUDE,
        KernelVariant::SignedInt => SIGNED_PRELUDE,
        KernelVariant::UnsignedInt => UNSIGNED_PRELUDE,
    };
    format!("{}\n{}", prelude, SLICE_KERNEL_BODY)
}
