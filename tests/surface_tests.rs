// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for surface meshes and their access protocol

use glam::{UVec3, Vec3};
use medview::gpu::SurfaceProvisioner;
use medview::{AccessMode, CpuDevice, RenderError, RenderResult, Surface};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Triangulated `n x n` grid of quads
fn grid_mesh(n: u32) -> (Vec<Vec3>, Vec<Vec3>, Vec<UVec3>) {
    let side = n + 1;
    let mut positions = Vec::new();
    for y in 0..side {
        for x in 0..side {
            positions.push(Vec3::new(x as f32, y as f32, 0.0));
        }
    }
    let normals = vec![Vec3::Z; positions.len()];

    let mut triangles = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let i = y * side + x;
            triangles.push(UVec3::new(i, i + 1, i + side));
            triangles.push(UVec3::new(i + 1, i + side + 1, i + side));
        }
    }
    (positions, normals, triangles)
}

fn created_surface(n: u32) -> Surface<CpuDevice> {
    let (positions, normals, triangles) = grid_mesh(n);
    let mut surface = Surface::new();
    surface.create(&positions, &normals, &triangles).unwrap();
    surface
}

#[test]
fn test_adjacency_matches_triangle_references() {
    let (positions, normals, triangles) = grid_mesh(4);
    let mut surface = Surface::<CpuDevice>::new();
    surface.create(&positions, &normals, &triangles).unwrap();

    assert_eq!(surface.triangle_count() as usize, triangles.len());

    let mut total = 0;
    for (index, vertex) in surface.vertices().iter().enumerate() {
        let expected: Vec<u32> = triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.to_array().contains(&(index as u32)))
            .map(|(i, _)| i as u32)
            .collect();
        assert_eq!(vertex.triangles, expected, "vertex {}", index);
        assert_eq!(vertex.position, positions[index]);
        total += vertex.triangles.len();
    }
    assert_eq!(total, 3 * triangles.len());
}

#[test]
fn test_access_before_create_fails() {
    let device = CpuDevice::new();
    let mut surface = Surface::<CpuDevice>::new();

    let result = surface.get_vertex_buffer_access(AccessMode::Read, &device);
    assert!(matches!(result, Err(RenderError::NotInitialized)));

    let result = surface.get_surface_pointer_access(AccessMode::Read);
    assert!(matches!(result, Err(RenderError::NotInitialized)));
    assert_eq!(device.stats().buffers_created(), 0);
}

#[test]
fn test_host_pointer_access_unsupported() {
    let mut surface = created_surface(1);
    let result = surface.get_surface_pointer_access(AccessMode::ReadWrite);
    assert!(matches!(result, Err(RenderError::Unsupported(_))));
    assert!(!surface.is_any_data_being_accessed());
}

#[test]
fn test_buffer_allocated_once() {
    let device = CpuDevice::new();
    let mut surface = created_surface(2);

    let access = surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();
    assert_eq!(access.buffer().size(), 8 * 18 * 4);
    drop(access);

    let access = surface
        .get_vertex_buffer_access(AccessMode::ReadWrite, &device)
        .unwrap();
    assert_eq!(access.mode(), AccessMode::ReadWrite);
    assert_eq!(device.stats().buffers_created(), 1);
    assert!(surface.is_vertex_buffer_up_to_date());
}

#[test]
fn test_write_excludes_other_access() {
    let device = CpuDevice::new();
    let mut surface = created_surface(1);

    let writer = surface
        .get_vertex_buffer_access(AccessMode::ReadWrite, &device)
        .unwrap();
    assert!(surface.is_being_written());

    let result = surface.get_vertex_buffer_access(AccessMode::Read, &device);
    assert!(matches!(result, Err(RenderError::WriteInProgress)));
    let result = surface.get_vertex_buffer_access(AccessMode::ReadWrite, &device);
    assert!(matches!(result, Err(RenderError::WriteInProgress)));

    writer.release();
    assert!(!surface.is_being_written());
    assert!(surface
        .get_vertex_buffer_access(AccessMode::ReadWrite, &device)
        .is_ok());
}

#[test]
fn test_readers_block_writer_until_all_released() {
    let device = CpuDevice::new();
    let mut surface = created_surface(1);

    let first = surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();
    let second = surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();

    let result = surface.get_vertex_buffer_access(AccessMode::ReadWrite, &device);
    assert!(matches!(result, Err(RenderError::AlreadyAccessed)));

    drop(first);
    let result = surface.get_vertex_buffer_access(AccessMode::ReadWrite, &device);
    assert!(matches!(result, Err(RenderError::AlreadyAccessed)));

    drop(second);
    assert!(surface
        .get_vertex_buffer_access(AccessMode::ReadWrite, &device)
        .is_ok());
}

#[test]
fn test_recreate_releases_previous_buffer() {
    let device = CpuDevice::new();
    let mut surface = created_surface(2);
    surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();
    assert_eq!(device.stats().live_buffers(), 1);

    let (positions, normals, triangles) = grid_mesh(3);
    surface.create(&positions, &normals, &triangles).unwrap();
    assert_eq!(device.stats().buffers_released(), 1);
    assert_eq!(device.stats().live_buffers(), 0);
    assert!(!surface.has_vertex_buffer());

    let access = surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();
    assert_eq!(access.triangle_count(), 18);
    assert_eq!(access.buffer().size(), 18 * 18 * 4);
    assert_eq!(device.stats().live_buffers(), 1);
}

#[test]
fn test_placeholder_recreate_releases_buffer() {
    let device = CpuDevice::new();
    let mut surface = created_surface(1);
    surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();

    surface.create_placeholder(100).unwrap();
    assert_eq!(device.stats().live_buffers(), 0);
    assert!(surface.vertices().is_empty());
    assert_eq!(surface.triangle_count(), 100);
}

#[test]
fn test_create_while_accessed_fails() {
    let device = CpuDevice::new();
    let mut surface = created_surface(1);
    let reader = surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();

    let result = surface.create_placeholder(4);
    assert!(matches!(result, Err(RenderError::AlreadyAccessed)));
    assert_eq!(surface.triangle_count(), 2);
    assert_eq!(device.stats().live_buffers(), 1);

    drop(reader);
    surface.create_placeholder(4).unwrap();
}

#[test]
fn test_drop_releases_buffer() {
    let device = CpuDevice::new();
    let mut surface = created_surface(1);
    let access = surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();
    drop(access);

    drop(surface);
    assert_eq!(device.stats().live_buffers(), 0);
}

#[test]
fn test_stale_buffer_resync_unsupported() {
    let device = CpuDevice::new();
    let (positions, normals, triangles) = grid_mesh(1);
    let mut surface = Surface::<CpuDevice>::new();
    surface.create(&positions, &normals, &triangles).unwrap();
    surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();

    let moved: Vec<Vec3> = positions.iter().map(|p| *p + Vec3::Z).collect();
    surface.update_vertices(&moved, &normals).unwrap();
    assert_eq!(surface.vertices()[0].position, Vec3::Z);
    assert!(!surface.is_vertex_buffer_up_to_date());

    let result = surface.get_vertex_buffer_access(AccessMode::Read, &device);
    assert!(matches!(result, Err(RenderError::Unsupported(_))));
    assert!(!surface.is_any_data_being_accessed());
}

#[test]
fn test_update_vertices_requires_matching_count() {
    let mut surface = created_surface(1);
    let result = surface.update_vertices(&[Vec3::ZERO], &[Vec3::Z]);
    assert!(matches!(result, Err(RenderError::InvalidGeometry(_))));
}

#[test]
fn test_per_device_free_unsupported() {
    let device = CpuDevice::new();
    let mut surface = created_surface(1);
    assert!(matches!(
        surface.free(&device),
        Err(RenderError::Unsupported(_))
    ));
}

struct CountingProvisioner {
    calls: AtomicUsize,
}

impl SurfaceProvisioner for CountingProvisioner {
    fn provision_surface(&self) -> RenderResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_missing_context_goes_through_provisioner() {
    let provisioner = Arc::new(CountingProvisioner {
        calls: AtomicUsize::new(0),
    });
    let device = CpuDevice::detached();
    let mut surface = Surface::<CpuDevice>::with_provisioner(provisioner.clone());
    surface.create_placeholder(2).unwrap();

    let access = surface
        .get_vertex_buffer_access(AccessMode::ReadWrite, &device)
        .unwrap();
    drop(access);
    surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();

    assert_eq!(provisioner.calls.load(Ordering::Relaxed), 1);
    assert_eq!(device.stats().context_binds(), 1);
    assert_eq!(device.stats().buffers_created(), 1);
}

#[test]
fn test_current_context_skips_provisioner() {
    let provisioner = Arc::new(CountingProvisioner {
        calls: AtomicUsize::new(0),
    });
    let device = CpuDevice::new();
    let mut surface = Surface::<CpuDevice>::with_provisioner(provisioner.clone());
    surface.create_placeholder(1).unwrap();
    surface
        .get_vertex_buffer_access(AccessMode::Read, &device)
        .unwrap();

    assert_eq!(provisioner.calls.load(Ordering::Relaxed), 0);
    assert_eq!(device.stats().context_binds(), 0);
}
