// SPDX-License-Identifier: GPL-3.0-only

//! Axis-aligned slice rendering of a 3D volume
//!
//! `execute` runs the slice extraction kernel on the execution device, writing
//! windowed intensities into a texture shared with the graphics side. `draw`
//! emits one textured quad placed at the slice position in the volume's local
//! frame. Both run under the same lock, so a draw never sees a half-updated
//! texture or kernel.

use super::{QuadVertex, RenderTarget, TexturedQuad};
use crate::config::{validate_window, SliceConfig, SliceSelection};
use crate::constants::{DataType, PlaneType};
use crate::data::{BoundingBox, Image};
use crate::errors::{RenderError, RenderResult};
use crate::gpu::{ExecutionDevice, KernelVariant, SharedImage, SliceKernelArgs};
use crate::scene::SceneGraph;
use glam::{Affine3A, Mat4, UVec3, Vec2, Vec3};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info};

/// Slice index along the plane axis.
///
/// Auto picks the middle of the volume. Explicit indices are clamped to the last
/// slice; negative ones are rejected.
pub fn resolve_slice_index(
    selection: SliceSelection,
    plane: PlaneType,
    size: UVec3,
) -> RenderResult<u32> {
    let extent = size[plane.axis()];
    match selection {
        SliceSelection::Auto => Ok(extent / 2),
        SliceSelection::Index(index) if index < 0 => Err(RenderError::InvalidSliceIndex(index)),
        SliceSelection::Index(index) => {
            let last = i64::from(extent.saturating_sub(1));
            Ok(index.min(last) as u32)
        }
    }
}

/// Output width, height and kernel plane id for a plane
pub fn resolve_extents(plane: PlaneType, size: UVec3) -> (u32, u32, u32) {
    let (width, height) = match plane {
        PlaneType::X => (size.y, size.z),
        PlaneType::Y => (size.x, size.z),
        PlaneType::Z => (size.x, size.y),
    };
    (width, height, plane.kernel_id())
}

/// Quad covering a `width x height` slice at `slice` along the plane axis
///
/// Texture row 0 sits at in-plane height 0, so the image is not flipped.
pub fn slice_quad(plane: PlaneType, width: u32, height: u32, slice: u32) -> TexturedQuad {
    let (w, h, s) = (width as f32, height as f32, slice as f32);
    let place = |u: f32, v: f32| match plane {
        PlaneType::X => Vec3::new(s, u, v),
        PlaneType::Y => Vec3::new(u, s, v),
        PlaneType::Z => Vec3::new(u, v, s),
    };
    TexturedQuad {
        vertices: [
            QuadVertex::new(place(0.0, h), Vec2::new(0.0, 1.0)),
            QuadVertex::new(place(w, h), Vec2::new(1.0, 1.0)),
            QuadVertex::new(place(w, 0.0), Vec2::new(1.0, 0.0)),
            QuadVertex::new(place(0.0, 0.0), Vec2::new(0.0, 0.0)),
        ],
    }
}

/// Scene-graph transform composed with a scale by the voxel spacing
pub fn slice_transform(scene_transform: Affine3A, spacing: Vec3) -> Affine3A {
    scene_transform * Affine3A::from_scale(spacing)
}

struct CompiledKernel<K> {
    kernel: K,
    data_type: DataType,
}

/// Volume and parameters the current texture was rendered with
struct RenderedSlice<D: ExecutionDevice + 'static> {
    image: Weak<dyn Image<D>>,
    plane: PlaneType,
    slice: u32,
    width: u32,
    height: u32,
}

impl<D: ExecutionDevice + 'static> RenderedSlice<D> {
    fn image(&self) -> RenderResult<Arc<dyn Image<D>>> {
        self.image.upgrade().ok_or(RenderError::NoInput)
    }
}

struct SliceState<D: ExecutionDevice + 'static> {
    input: Option<Weak<dyn Image<D>>>,
    plane: PlaneType,
    selection: SliceSelection,
    window: Option<f32>,
    level: Option<f32>,
    texture: Option<D::SharedTexture>,
    texture_created: bool,
    kernel: Option<CompiledKernel<D::Kernel>>,
    rendered: Option<RenderedSlice<D>>,
    modified: bool,
}

impl<D: ExecutionDevice + 'static> SliceState<D> {
    fn input(&self) -> RenderResult<Arc<dyn Image<D>>> {
        self.input
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(RenderError::NoInput)
    }

    fn needs_kernel(&self, data_type: DataType) -> bool {
        match &self.kernel {
            Some(compiled) => !self.texture_created || compiled.data_type != data_type,
            None => true,
        }
    }
}

/// Renders one axis-aligned slice of a volume
pub struct SliceRenderer<D: ExecutionDevice + 'static> {
    device: Arc<D>,
    scene: Arc<dyn SceneGraph>,
    state: Mutex<SliceState<D>>,
}

impl<D: ExecutionDevice + 'static> SliceRenderer<D> {
    pub fn new(device: Arc<D>, scene: Arc<dyn SceneGraph>) -> Self {
        Self {
            device,
            scene,
            state: Mutex::new(SliceState {
                input: None,
                plane: PlaneType::default(),
                selection: SliceSelection::Auto,
                window: None,
                level: None,
                texture: None,
                texture_created: false,
                kernel: None,
                rendered: None,
                modified: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SliceState<D>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Bind the input volume. The renderer keeps only a weak reference.
    pub fn set_input_connection<I: Image<D> + 'static>(&self, image: &Arc<I>) {
        let weak: Weak<I> = Arc::downgrade(image);
        let weak: Weak<dyn Image<D>> = weak;
        let mut state = self.lock();
        state.input = Some(weak);
        state.modified = true;
    }

    pub fn set_slice_to_render(&self, selection: impl Into<SliceSelection>) {
        let mut state = self.lock();
        state.selection = selection.into();
        state.modified = true;
    }

    pub fn set_slice_plane(&self, plane: PlaneType) {
        let mut state = self.lock();
        state.plane = plane;
        state.modified = true;
    }

    /// Set the intensity window; `None` uses the default for the voxel type
    pub fn set_intensity_window(&self, window: Option<f32>) -> RenderResult<()> {
        validate_window(window)?;
        let mut state = self.lock();
        state.window = window;
        state.modified = true;
        Ok(())
    }

    /// Set the intensity level; `None` uses the default for the voxel type
    pub fn set_intensity_level(&self, level: Option<f32>) {
        let mut state = self.lock();
        state.level = level;
        state.modified = true;
    }

    pub fn apply_config(&self, config: &SliceConfig) -> RenderResult<()> {
        config.validate()?;
        let mut state = self.lock();
        state.plane = config.plane;
        state.selection = config.slice;
        state.window = config.window;
        state.level = config.level;
        state.modified = true;
        Ok(())
    }

    pub fn slice_plane(&self) -> PlaneType {
        self.lock().plane
    }

    /// Slice selection as set by the caller
    pub fn slice_selection(&self) -> SliceSelection {
        self.lock().selection
    }

    /// Slice index the current texture was rendered at
    pub fn resolved_slice(&self) -> Option<u32> {
        self.lock().rendered.as_ref().map(|r| r.slice)
    }

    /// Width and height of the current texture
    pub fn output_extent(&self) -> Option<(u32, u32)> {
        self.lock().rendered.as_ref().map(|r| (r.width, r.height))
    }

    /// Whether settings changed since the last successful execute
    pub fn is_modified(&self) -> bool {
        self.lock().modified
    }

    /// Voxel type the compiled kernel targets
    pub fn compiled_for(&self) -> Option<DataType> {
        self.lock().kernel.as_ref().map(|k| k.data_type)
    }

    /// Run `f` on the shared texture, if one has been rendered
    pub fn with_texture<R>(&self, f: impl FnOnce(&D::SharedTexture) -> R) -> Option<R> {
        self.lock().texture.as_ref().map(f)
    }

    /// Extract the configured slice into the shared texture
    pub fn execute(&self) -> RenderResult<()> {
        let mut state = self.lock();
        let input = state.input()?;

        if input.dimensions() != 3 {
            return Err(RenderError::UnsupportedDimensionality(input.dimensions()));
        }

        let data_type = input.data_type();
        let size = input.size();
        let window = state
            .window
            .unwrap_or_else(|| data_type.default_intensity_window());
        let level = state
            .level
            .unwrap_or_else(|| data_type.default_intensity_level());
        let plane = state.plane;
        let slice = resolve_slice_index(state.selection, plane, size)?;
        let (width, height, plane_id) = resolve_extents(plane, size);

        debug!(
            ?plane,
            slice,
            width,
            height,
            window,
            level,
            data_type = data_type.display_name(),
            "Resolved slice parameters"
        );

        let volume = input.compute_access(&self.device)?;

        // Release the previous texture before allocating its replacement
        state.texture = None;
        state.rendered = None;
        let texture = self.device.create_shared_texture(width, height)?;

        if state.needs_kernel(data_type) {
            let variant = KernelVariant::for_data_type(data_type);
            info!(
                device = self.device.name(),
                flag = variant.build_flag(),
                data_type = data_type.display_name(),
                "Compiling slice kernel"
            );
            let kernel = self.device.build_kernel(variant)?;
            state.kernel = Some(CompiledKernel { kernel, data_type });
        }
        let compiled = state
            .kernel
            .as_ref()
            .ok_or_else(|| RenderError::KernelBuild("no kernel available".to_string()))?;

        let args = SliceKernelArgs {
            slice_index: slice,
            level,
            window,
            plane: plane_id,
        };

        texture.acquire_for_compute()?;
        let dispatched =
            self.device
                .dispatch_slice(&compiled.kernel, &volume, &texture, &args, (width, height));
        let released = texture.release_to_graphics();
        dispatched?;
        released?;
        self.device.finish()?;

        state.rendered = Some(RenderedSlice {
            image: Arc::downgrade(&input),
            plane,
            slice,
            width,
            height,
        });
        state.texture = Some(texture);
        state.texture_created = true;
        state.modified = false;
        Ok(())
    }

    /// Draw the slice quad. Does nothing before the first successful execute.
    ///
    /// The quad describes the volume, plane and slice of the last execute;
    /// setter changes take effect on the next one.
    pub fn draw(&self, target: &mut dyn RenderTarget<D>) -> RenderResult<()> {
        let state = self.lock();
        let (Some(texture), Some(rendered)) = (state.texture.as_ref(), state.rendered.as_ref())
        else {
            debug!("No slice texture yet, skipping draw");
            return Ok(());
        };

        let image = rendered.image()?;
        let transform = self.transform_of(image.as_ref());
        let quad = slice_quad(rendered.plane, rendered.width, rendered.height, rendered.slice);
        target.draw_textured_quad(&Mat4::from(transform), texture, &quad)
    }

    /// Bounding box of the rendered slice in world coordinates
    pub fn get_bounding_box(&self) -> RenderResult<BoundingBox> {
        let state = self.lock();
        let rendered = state.rendered.as_ref().ok_or(RenderError::NoInput)?;
        let image = rendered.image()?;

        let axis = rendered.plane.axis();
        let corners = image.bounding_box().corners().map(|mut corner| {
            corner[axis] = rendered.slice as f32;
            corner
        });
        let collapsed = BoundingBox::from_corners(&corners);
        Ok(collapsed.transformed(&self.transform_of(image.as_ref())))
    }

    fn transform_of(&self, input: &dyn Image<D>) -> Affine3A {
        slice_transform(self.scene.transform_for(input.id()), input.spacing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extents_per_plane() {
        let size = UVec3::new(4, 5, 6);
        assert_eq!(resolve_extents(PlaneType::X, size), (5, 6, 0));
        assert_eq!(resolve_extents(PlaneType::Y, size), (4, 6, 1));
        assert_eq!(resolve_extents(PlaneType::Z, size), (4, 5, 2));
    }

    #[test]
    fn test_slice_index_resolution() {
        let size = UVec3::new(4, 4, 10);
        let z = PlaneType::Z;
        assert_eq!(resolve_slice_index(SliceSelection::Index(9), z, size), Ok(9));
        assert_eq!(resolve_slice_index(SliceSelection::Index(15), z, size), Ok(9));
        assert_eq!(resolve_slice_index(SliceSelection::Auto, z, size), Ok(5));
        assert_eq!(
            resolve_slice_index(SliceSelection::Index(-1), z, size),
            Err(RenderError::InvalidSliceIndex(-1))
        );
        assert_eq!(resolve_slice_index(SliceSelection::Auto, PlaneType::X, size), Ok(2));
    }

    #[test]
    fn test_quad_corners_at_slice() {
        for plane in PlaneType::ALL {
            let quad = slice_quad(plane, 4, 5, 3);
            for vertex in quad.vertices {
                assert_eq!(vertex.position()[plane.axis()], 3.0);
            }
        }
    }

    #[test]
    fn test_quad_texture_not_flipped() {
        let quad = slice_quad(PlaneType::Z, 4, 5, 0);
        for vertex in quad.vertices {
            let p = vertex.position();
            assert_eq!(vertex.tex_coord(), Vec2::new(p.x / 4.0, p.y / 5.0));
        }

        let quad = slice_quad(PlaneType::X, 4, 5, 2);
        assert_eq!(quad.vertices[1].position(), Vec3::new(2.0, 4.0, 5.0));
        assert_eq!(quad.vertices[1].tex_coord(), Vec2::ONE);
    }

    #[test]
    fn test_transform_applies_spacing_first() {
        let transform = slice_transform(
            Affine3A::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            Vec3::new(2.0, 2.0, 0.5),
        );
        assert_eq!(
            transform.transform_point3(Vec3::new(1.0, 1.0, 4.0)),
            Vec3::new(3.0, 2.0, 2.0)
        );
    }
}
