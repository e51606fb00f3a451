// SPDX-License-Identifier: GPL-3.0-only

//! Triangulated surface mesh with host and GPU representations
//!
//! The host side stores per-vertex position, normal and the triangles that
//! reference the vertex. The GPU side is a vertex buffer object laid out
//! unindexed, [`FLOATS_PER_TRIANGLE`] floats per triangle. It is allocated lazily
//! on the first access request and released on re-creation or drop.

use super::access::{
    AccessMode, SharedAccessFlags, SurfacePointerAccess, VertexBufferAccess,
};
use crate::constants::FLOATS_PER_TRIANGLE;
use crate::errors::{RenderError, RenderResult};
use crate::gpu::{ExecutionDevice, HeadlessProvisioner, SurfaceProvisioner};
use glam::{UVec3, Vec3};
use std::sync::Arc;
use tracing::{debug, info};

/// A mesh vertex and its triangle adjacency
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceVertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// Indices of the triangles that reference this vertex
    pub triangles: Vec<u32>,
}

/// GPU-side state of the mesh
struct VertexBufferState<B> {
    buffer: Arc<B>,
    up_to_date: bool,
}

/// Triangulated surface mesh
pub struct Surface<D: ExecutionDevice> {
    vertices: Vec<SurfaceVertex>,
    triangle_count: u32,
    initialized: bool,
    vertex_buffer: Option<VertexBufferState<D::VertexBuffer>>,
    flags: SharedAccessFlags,
    provisioner: Arc<dyn SurfaceProvisioner>,
}

impl<D: ExecutionDevice> Surface<D> {
    /// Creates an empty, uninitialized surface
    pub fn new() -> Self {
        Self::with_provisioner(Arc::new(HeadlessProvisioner))
    }

    /// Creates an empty surface that uses `provisioner` when a buffer has to be
    /// allocated without a current rendering context
    pub fn with_provisioner(provisioner: Arc<dyn SurfaceProvisioner>) -> Self {
        Self {
            vertices: Vec::new(),
            triangle_count: 0,
            initialized: false,
            vertex_buffer: None,
            flags: SharedAccessFlags::default(),
            provisioner,
        }
    }

    /// Replace the mesh with explicit geometry.
    ///
    /// `positions` and `normals` must have the same length, and every triangle
    /// index must refer to an existing vertex.
    pub fn create(
        &mut self,
        positions: &[Vec3],
        normals: &[Vec3],
        triangles: &[UVec3],
    ) -> RenderResult<()> {
        if positions.len() != normals.len() {
            return Err(RenderError::InvalidGeometry(format!(
                "{} positions but {} normals",
                positions.len(),
                normals.len()
            )));
        }
        if let Some((i, triangle)) = triangles
            .iter()
            .enumerate()
            .find(|(_, t)| t.max_element() as usize >= positions.len())
        {
            return Err(RenderError::InvalidGeometry(format!(
                "triangle {} references vertex {} of {}",
                i,
                triangle.max_element(),
                positions.len()
            )));
        }
        let triangle_count = u32::try_from(triangles.len()).map_err(|_| {
            RenderError::InvalidGeometry(format!("{} triangles", triangles.len()))
        })?;
        self.prepare_recreate()?;

        let mut vertices: Vec<SurfaceVertex> = positions
            .iter()
            .zip(normals)
            .map(|(&position, &normal)| SurfaceVertex {
                position,
                normal,
                triangles: Vec::new(),
            })
            .collect();

        for (i, triangle) in triangles.iter().enumerate() {
            for vertex in triangle.to_array() {
                vertices[vertex as usize].triangles.push(i as u32);
            }
        }

        debug!(
            vertices = vertices.len(),
            triangles = triangle_count,
            "Surface created"
        );

        self.vertices = vertices;
        self.triangle_count = triangle_count;
        self.initialized = true;
        Ok(())
    }

    /// Initialize with only a triangle count. Geometry is produced later on the
    /// GPU, so no host arrays exist.
    pub fn create_placeholder(&mut self, triangle_count: u32) -> RenderResult<()> {
        self.prepare_recreate()?;
        debug!(triangles = triangle_count, "Placeholder surface created");
        self.triangle_count = triangle_count;
        self.initialized = true;
        Ok(())
    }

    /// Replace vertex positions and normals, keeping the topology.
    ///
    /// The GPU copy becomes stale.
    pub fn update_vertices(&mut self, positions: &[Vec3], normals: &[Vec3]) -> RenderResult<()> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        if positions.len() != self.vertices.len() || normals.len() != self.vertices.len() {
            return Err(RenderError::InvalidGeometry(format!(
                "expected {} vertices, got {} positions and {} normals",
                self.vertices.len(),
                positions.len(),
                normals.len()
            )));
        }
        if self.flags.lock().is_any_data_being_accessed() {
            return Err(RenderError::AlreadyAccessed);
        }

        for ((vertex, &position), &normal) in self.vertices.iter_mut().zip(positions).zip(normals)
        {
            vertex.position = position;
            vertex.normal = normal;
        }
        if let Some(state) = self.vertex_buffer.as_mut() {
            state.up_to_date = false;
        }
        Ok(())
    }

    /// Request access to the vertex buffer object, allocating it on first use
    pub fn get_vertex_buffer_access(
        &mut self,
        mode: AccessMode,
        device: &D,
    ) -> RenderResult<VertexBufferAccess<D::VertexBuffer>> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        self.flags.lock().check(mode)?;

        let buffer = self.ensure_vertex_buffer(device)?;

        // Re-check under the same lock that records the grant
        let mut flags = self.flags.lock();
        flags.check(mode)?;
        flags.grant_gpu(mode);
        drop(flags);

        Ok(VertexBufferAccess::new(
            buffer,
            mode,
            self.triangle_count,
            self.flags.clone(),
        ))
    }

    /// Request access to host-side vertex data. Not implemented.
    pub fn get_surface_pointer_access(
        &mut self,
        _mode: AccessMode,
    ) -> RenderResult<SurfacePointerAccess> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        Err(RenderError::Unsupported("host pointer access".to_string()))
    }

    /// Release resources held on a specific device. Not implemented.
    pub fn free(&mut self, _device: &D) -> RenderResult<()> {
        Err(RenderError::Unsupported("per-device release".to_string()))
    }

    fn ensure_vertex_buffer(&mut self, device: &D) -> RenderResult<Arc<D::VertexBuffer>> {
        if let Some(state) = &self.vertex_buffer {
            if !state.up_to_date {
                return Err(RenderError::Unsupported(
                    "vertex buffer resync from host data".to_string(),
                ));
            }
            return Ok(Arc::clone(&state.buffer));
        }

        if !device.has_current_context() {
            self.provisioner.provision_surface()?;
            device
                .make_current()
                .map_err(|e| RenderError::Context(e.to_string()))?;
        }
        device.init_bindings()?;

        let size = u64::from(self.triangle_count)
            * FLOATS_PER_TRIANGLE
            * std::mem::size_of::<f32>() as u64;
        let buffer = Arc::new(device.create_vertex_buffer(size)?);

        info!(
            device = device.name(),
            triangles = self.triangle_count,
            size,
            "Vertex buffer allocated"
        );

        self.vertex_buffer = Some(VertexBufferState {
            buffer: Arc::clone(&buffer),
            up_to_date: true,
        });
        Ok(buffer)
    }

    fn prepare_recreate(&mut self) -> RenderResult<()> {
        if self.flags.lock().is_any_data_being_accessed() {
            return Err(RenderError::AlreadyAccessed);
        }
        if self.initialized {
            self.free_all();
        }
        Ok(())
    }

    /// Drop host data and the vertex buffer
    fn free_all(&mut self) {
        if self.vertex_buffer.take().is_some() {
            debug!("Vertex buffer released");
        }
        self.vertices.clear();
        self.triangle_count = 0;
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }

    /// Host vertices; empty for placeholder surfaces
    pub fn vertices(&self) -> &[SurfaceVertex] {
        &self.vertices
    }

    /// Whether a vertex buffer object is allocated
    pub fn has_vertex_buffer(&self) -> bool {
        self.vertex_buffer.is_some()
    }

    /// Whether the vertex buffer matches host data
    pub fn is_vertex_buffer_up_to_date(&self) -> bool {
        self.vertex_buffer
            .as_ref()
            .is_some_and(|state| state.up_to_date)
    }

    /// Whether any token is outstanding
    pub fn is_any_data_being_accessed(&self) -> bool {
        self.flags.lock().is_any_data_being_accessed()
    }

    /// Whether a read-write token is outstanding
    pub fn is_being_written(&self) -> bool {
        self.flags.lock().is_being_written()
    }
}

impl<D: ExecutionDevice> Default for Surface<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: ExecutionDevice> Drop for Surface<D> {
    fn drop(&mut self) {
        self.free_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::CpuDevice;

    fn quad() -> (Vec<Vec3>, Vec<Vec3>, Vec<UVec3>) {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let normals = vec![Vec3::Z; 4];
        let triangles = vec![UVec3::new(0, 1, 2), UVec3::new(0, 2, 3)];
        (positions, normals, triangles)
    }

    #[test]
    fn test_adjacency_built() {
        let (positions, normals, triangles) = quad();
        let mut surface = Surface::<CpuDevice>::new();
        surface.create(&positions, &normals, &triangles).unwrap();

        assert_eq!(surface.triangle_count(), 2);
        assert_eq!(surface.vertices()[0].triangles, vec![0, 1]);
        assert_eq!(surface.vertices()[1].triangles, vec![0]);
        assert_eq!(surface.vertices()[2].triangles, vec![0, 1]);
        assert_eq!(surface.vertices()[3].triangles, vec![1]);
    }

    #[test]
    fn test_mismatched_normals_rejected() {
        let (positions, _, triangles) = quad();
        let mut surface = Surface::<CpuDevice>::new();
        let result = surface.create(&positions, &[Vec3::Z], &triangles);
        assert!(matches!(result, Err(RenderError::InvalidGeometry(_))));
        assert!(!surface.is_initialized());
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let (positions, normals, _) = quad();
        let mut surface = Surface::<CpuDevice>::new();
        let result = surface.create(&positions, &normals, &[UVec3::new(0, 1, 4)]);
        assert!(matches!(result, Err(RenderError::InvalidGeometry(_))));
    }

    #[test]
    fn test_buffer_size_per_triangle() {
        let device = CpuDevice::new();
        let mut surface = Surface::<CpuDevice>::new();
        surface.create_placeholder(3).unwrap();
        let access = surface
            .get_vertex_buffer_access(AccessMode::Read, &device)
            .unwrap();
        assert_eq!(access.buffer().size(), 3 * 18 * 4);
        assert_eq!(access.triangle_count(), 3);
        assert!(surface.vertices().is_empty());
    }

    #[test]
    fn test_failed_allocation_sets_no_flags() {
        struct Refusing;
        impl SurfaceProvisioner for Refusing {
            fn provision_surface(&self) -> RenderResult<()> {
                Err(RenderError::Context("no display".to_string()))
            }
        }

        let device = CpuDevice::detached();
        let mut surface = Surface::<CpuDevice>::with_provisioner(Arc::new(Refusing));
        surface.create_placeholder(1).unwrap();

        let result = surface.get_vertex_buffer_access(AccessMode::ReadWrite, &device);
        assert!(matches!(result, Err(RenderError::Context(_))));
        assert!(!surface.is_being_written());
        assert!(!surface.is_any_data_being_accessed());
        assert!(!surface.has_vertex_buffer());
    }
}
