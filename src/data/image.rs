// SPDX-License-Identifier: GPL-3.0-only

//! Input volume contract and an in-memory implementation

use super::bounding_box::BoundingBox;
use crate::constants::DataType;
use crate::errors::{RenderError, RenderResult};
use crate::gpu::{ExecutionDevice, VolumeDescriptor};
use glam::{UVec3, Vec3};
use std::fmt;
use uuid::Uuid;

/// Identity of a data object, used to look up its scene-graph transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataObjectId(Uuid);

impl DataObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DataObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DataObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Image data source consumed by the renderers
pub trait Image<D: ExecutionDevice>: Send + Sync {
    fn id(&self) -> DataObjectId;

    /// Number of dimensions (2 or 3)
    fn dimensions(&self) -> usize;

    /// Width, height, depth in voxels. Depth is 1 for 2D images.
    fn size(&self) -> UVec3;

    fn data_type(&self) -> DataType;

    /// Voxel spacing
    fn spacing(&self) -> Vec3;

    /// Bounding box in voxel coordinates
    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(Vec3::ZERO, self.size().as_vec3())
    }

    /// Read-only compute view of the voxels on `device`
    fn compute_access(&self, device: &D) -> RenderResult<D::VolumeView>;
}

/// Voxel data held in host memory
///
/// Voxels are tightly packed little-endian values, x fastest, then y, then z.
#[derive(Debug, Clone)]
pub struct HostVolume {
    id: DataObjectId,
    dimensions: usize,
    size: UVec3,
    data_type: DataType,
    spacing: Vec3,
    voxels: Vec<u8>,
}

impl HostVolume {
    /// Creates a 3D volume from raw voxel bytes
    pub fn new(size: UVec3, data_type: DataType, voxels: Vec<u8>) -> RenderResult<Self> {
        if size.cmpeq(UVec3::ZERO).any() {
            return Err(RenderError::InvalidGeometry(format!(
                "volume size {}x{}x{} has an empty axis",
                size.x, size.y, size.z
            )));
        }
        let expected = VolumeDescriptor { size, data_type }.byte_len();
        if voxels.len() != expected {
            return Err(RenderError::InvalidGeometry(format!(
                "{} volume of {}x{}x{} needs {} bytes, got {}",
                data_type.display_name(),
                size.x,
                size.y,
                size.z,
                expected,
                voxels.len()
            )));
        }
        Ok(Self {
            id: DataObjectId::new(),
            dimensions: 3,
            size,
            data_type,
            spacing: Vec3::ONE,
            voxels,
        })
    }

    /// Creates a 2D image; depth is 1
    pub fn new_2d(width: u32, height: u32, data_type: DataType, voxels: Vec<u8>) -> RenderResult<Self> {
        let mut image = Self::new(UVec3::new(width, height, 1), data_type, voxels)?;
        image.dimensions = 2;
        Ok(image)
    }

    pub fn from_u8(size: UVec3, voxels: &[u8]) -> RenderResult<Self> {
        Self::new(size, DataType::Uint8, voxels.to_vec())
    }

    pub fn from_i8(size: UVec3, voxels: &[i8]) -> RenderResult<Self> {
        Self::new(size, DataType::Int8, voxels.iter().map(|&v| v as u8).collect())
    }

    pub fn from_u16(size: UVec3, voxels: &[u16]) -> RenderResult<Self> {
        Self::new(
            size,
            DataType::Uint16,
            voxels.iter().flat_map(|v| v.to_le_bytes()).collect(),
        )
    }

    pub fn from_i16(size: UVec3, voxels: &[i16]) -> RenderResult<Self> {
        Self::new(
            size,
            DataType::Int16,
            voxels.iter().flat_map(|v| v.to_le_bytes()).collect(),
        )
    }

    pub fn from_f32(size: UVec3, voxels: &[f32]) -> RenderResult<Self> {
        Self::new(
            size,
            DataType::Float,
            voxels.iter().flat_map(|v| v.to_le_bytes()).collect(),
        )
    }

    /// Radial test pattern spanning the value range of `data_type`
    ///
    /// Intensity falls off with distance from the volume centre, so every axis
    /// shows a disc in its middle slice.
    pub fn synthetic(size: UVec3, data_type: DataType) -> RenderResult<Self> {
        let centre = size.as_vec3() * 0.5;
        let radius = centre.max_element().max(1.0);
        let mut voxels = Vec::with_capacity(VolumeDescriptor { size, data_type }.byte_len());

        for z in 0..size.z {
            for y in 0..size.y {
                for x in 0..size.x {
                    let p = UVec3::new(x, y, z).as_vec3() + 0.5;
                    let t = (1.0 - p.distance(centre) / radius).clamp(0.0, 1.0);
                    match data_type {
                        DataType::Float => voxels.extend_from_slice(&t.to_le_bytes()),
                        DataType::Uint8 => voxels.push((t * 255.0) as u8),
                        DataType::Int8 => voxels.push(((t * 255.0 - 128.0) as i8) as u8),
                        DataType::Uint16 => {
                            voxels.extend_from_slice(&((t * 255.0) as u16).to_le_bytes())
                        }
                        DataType::Int16 => {
                            voxels.extend_from_slice(&((t * 255.0 - 128.0) as i16).to_le_bytes())
                        }
                    }
                }
            }
        }

        Self::new(size, data_type, voxels)
    }

    pub fn with_spacing(mut self, spacing: Vec3) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn voxels(&self) -> &[u8] {
        &self.voxels
    }

    fn descriptor(&self) -> VolumeDescriptor {
        VolumeDescriptor {
            size: self.size,
            data_type: self.data_type,
        }
    }
}

impl<D: ExecutionDevice> Image<D> for HostVolume {
    fn id(&self) -> DataObjectId {
        self.id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn size(&self) -> UVec3 {
        self.size
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn spacing(&self) -> Vec3 {
        self.spacing
    }

    fn compute_access(&self, device: &D) -> RenderResult<D::VolumeView> {
        device.upload_volume(&self.descriptor(), &self.voxels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::CpuDevice;

    #[test]
    fn test_size_mismatch_rejected() {
        let result = HostVolume::from_u8(UVec3::new(2, 2, 2), &[0; 7]);
        assert!(matches!(result, Err(RenderError::InvalidGeometry(_))));
    }

    #[test]
    fn test_empty_axis_rejected() {
        assert!(HostVolume::from_u8(UVec3::new(2, 0, 2), &[]).is_err());
    }

    #[test]
    fn test_typed_constructors() {
        let volume = HostVolume::from_i16(UVec3::new(2, 1, 1), &[-1, 2]).unwrap();
        assert_eq!(volume.voxels(), &[0xff, 0xff, 2, 0]);
        assert_eq!(Image::<CpuDevice>::data_type(&volume), DataType::Int16);
    }

    #[test]
    fn test_default_bounding_box_is_voxel_extent() {
        let volume = HostVolume::synthetic(UVec3::new(4, 5, 6), DataType::Uint8).unwrap();
        let bb = Image::<CpuDevice>::bounding_box(&volume);
        assert_eq!(bb.min, Vec3::ZERO);
        assert_eq!(bb.max, Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_synthetic_byte_len() {
        for data_type in DataType::ALL {
            let volume = HostVolume::synthetic(UVec3::new(3, 4, 5), data_type).unwrap();
            assert_eq!(volume.voxels().len(), 60 * data_type.bytes_per_voxel());
        }
    }

    #[test]
    fn test_two_dimensional_image() {
        let image = HostVolume::new_2d(3, 2, DataType::Uint8, vec![0; 6]).unwrap();
        assert_eq!(Image::<CpuDevice>::dimensions(&image), 2);
        assert_eq!(Image::<CpuDevice>::size(&image), UVec3::new(3, 2, 1));
    }

    #[test]
    fn test_compute_access_uploads() {
        let device = CpuDevice::new();
        let volume = HostVolume::synthetic(UVec3::new(2, 2, 2), DataType::Float).unwrap();
        volume.compute_access(&device).unwrap();
        assert_eq!(device.stats().volumes_uploaded(), 1);
    }
}
