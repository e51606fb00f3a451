// SPDX-License-Identifier: GPL-3.0-only

//! Renderers and the drawing interface they emit geometry through

pub mod slice;

use crate::errors::RenderResult;
use crate::gpu::ExecutionDevice;
use glam::{Mat4, Vec2, Vec3};

pub use slice::SliceRenderer;

/// Vertex of a textured quad
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl QuadVertex {
    pub fn new(position: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position: position.to_array(),
            tex_coord: tex_coord.to_array(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn tex_coord(&self) -> Vec2 {
        Vec2::from_array(self.tex_coord)
    }
}

/// Four corners in fan order: two triangles (0, 1, 2) and (0, 2, 3)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturedQuad {
    pub vertices: [QuadVertex; 4],
}

impl TexturedQuad {
    /// Triangle indices into `vertices`
    pub const INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];
}

/// Drawing surface of the rendering pipeline
pub trait RenderTarget<D: ExecutionDevice> {
    /// Draw `quad` sampling `texture`, with `model` applied on top of the
    /// target's current view and projection transform
    fn draw_textured_quad(
        &mut self,
        model: &Mat4,
        texture: &D::SharedTexture,
        quad: &TexturedQuad,
    ) -> RenderResult<()>;
}
