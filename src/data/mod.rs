// SPDX-License-Identifier: GPL-3.0-only

//! Data objects: surface meshes, input volumes and their access protocol

pub mod access;
pub mod bounding_box;
pub mod image;
pub mod surface;

pub use access::{AccessMode, SurfacePointerAccess, VertexBufferAccess};
pub use bounding_box::BoundingBox;
pub use image::{DataObjectId, HostVolume, Image};
pub use surface::{Surface, SurfaceVertex};
