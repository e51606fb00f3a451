// SPDX-License-Identifier: GPL-3.0-only

//! Shared constants and small value types

use serde::{Deserialize, Serialize};

/// Scalar elements stored per triangle in the vertex buffer:
/// 3 vertices x (3 position floats + 3 normal floats), unindexed
pub const FLOATS_PER_TRIANGLE: u64 = 18;

/// Workgroup edge length of the slice extraction kernel (16x16 threads)
pub const SLICE_WORKGROUP_SIZE: u32 = 16;

/// Entry point of the slice extraction kernel
pub const SLICE_KERNEL_ENTRY: &str = "render_to_texture";

/// Voxel data type of a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit float
    Float,
    /// Unsigned 8-bit integer
    #[default]
    Uint8,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 16-bit integer
    Uint16,
    /// Signed 16-bit integer
    Int16,
}

impl DataType {
    /// All supported voxel types
    pub const ALL: [DataType; 5] = [
        DataType::Float,
        DataType::Uint8,
        DataType::Int8,
        DataType::Uint16,
        DataType::Int16,
    ];

    /// Bytes occupied by one voxel
    pub fn bytes_per_voxel(&self) -> usize {
        match self {
            DataType::Float => 4,
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
        }
    }

    /// Display name
    pub fn display_name(&self) -> &'static str {
        match self {
            DataType::Float => "float",
            DataType::Uint8 => "uint8",
            DataType::Int8 => "int8",
            DataType::Uint16 => "uint16",
            DataType::Int16 => "int16",
        }
    }

    /// Default intensity window when none is configured
    pub fn default_intensity_window(&self) -> f32 {
        match self {
            DataType::Float => 1.0,
            DataType::Uint8 | DataType::Uint16 => 255.0,
            DataType::Int8 | DataType::Int16 => 255.0,
        }
    }

    /// Default intensity level when none is configured
    pub fn default_intensity_level(&self) -> f32 {
        match self {
            DataType::Float => 0.5,
            DataType::Uint8 | DataType::Uint16 => 128.0,
            DataType::Int8 | DataType::Int16 => 0.0,
        }
    }
}

/// Axis perpendicular to the rendered slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaneType {
    /// Slice at a fixed x; spans y (width) and z (height)
    X,
    /// Slice at a fixed y; spans x (width) and z (height)
    Y,
    /// Slice at a fixed z; spans x (width) and y (height)
    #[default]
    Z,
}

impl PlaneType {
    pub const ALL: [PlaneType; 3] = [PlaneType::X, PlaneType::Y, PlaneType::Z];

    /// Plane identifier passed to the kernel
    pub fn kernel_id(&self) -> u32 {
        match self {
            PlaneType::X => 0,
            PlaneType::Y => 1,
            PlaneType::Z => 2,
        }
    }

    /// Index of the fixed coordinate (0 = x, 1 = y, 2 = z)
    pub fn axis(&self) -> usize {
        self.kernel_id() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_voxel() {
        assert_eq!(DataType::Float.bytes_per_voxel(), 4);
        assert_eq!(DataType::Int16.bytes_per_voxel(), 2);
        assert_eq!(DataType::Uint8.bytes_per_voxel(), 1);
    }

    #[test]
    fn test_default_window_level_per_category() {
        assert_eq!(DataType::Float.default_intensity_window(), 1.0);
        assert_eq!(DataType::Float.default_intensity_level(), 0.5);
        assert_eq!(DataType::Uint16.default_intensity_level(), 128.0);
        assert_eq!(DataType::Int8.default_intensity_level(), 0.0);
        for data_type in DataType::ALL {
            assert!(data_type.default_intensity_window() > 0.0);
        }
    }

    #[test]
    fn test_plane_kernel_ids() {
        let ids: Vec<u32> = PlaneType::ALL.iter().map(|p| p.kernel_id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(PlaneType::default(), PlaneType::Z);
    }
}
