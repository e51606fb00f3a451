// SPDX-License-Identifier: GPL-3.0-only

//! medview - GPU surface meshes and volume slice rendering
//!
//! This library provides the GPU-resident parts of a medical image viewer:
//! triangulated surfaces with an access protocol guarding their vertex buffers,
//! and a slice renderer that extracts an axis-aligned slice from a volume with a
//! compute kernel and presents it as a textured quad.
//!
//! # Architecture
//!
//! - [`data`]: surface meshes, access tokens, input volumes, bounding boxes
//! - [`renderer`]: the slice renderer and the drawing interface it uses
//! - [`gpu`]: execution device abstraction with wgpu and CPU implementations
//! - [`shaders`]: WGSL sources and compute helpers
//! - [`scene`]: per-object spatial transforms
//! - [`config`]: renderer settings

pub mod config;
pub mod constants;
pub mod data;
pub mod errors;
pub mod gpu;
pub mod renderer;
pub mod scene;
pub mod shaders;

// Re-export commonly used types
pub use config::{Config, SliceConfig, SliceSelection};
pub use constants::{DataType, PlaneType};
pub use data::{AccessMode, BoundingBox, HostVolume, Image, Surface};
pub use errors::{RenderError, RenderResult};
pub use gpu::{CpuDevice, ExecutionDevice, WgpuDevice};
pub use renderer::{RenderTarget, SliceRenderer, TexturedQuad};
pub use scene::{IdentitySceneGraph, SceneGraph};
