// SPDX-License-Identifier: GPL-3.0-only

//! Renderer settings
//!
//! `SliceConfig` mirrors the setters of the slice renderer so a whole view can be
//! stored and restored. `Config` wraps it with the options used by the binary.

use crate::constants::PlaneType;
use crate::errors::{RenderError, RenderResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which slice along the plane axis to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SliceSelection {
    /// Middle of the volume along the plane axis
    #[default]
    Auto,
    /// Explicit index, clamped to the volume extent. Negative values are rejected
    /// when the renderer executes.
    Index(i64),
}

impl From<u32> for SliceSelection {
    fn from(index: u32) -> Self {
        SliceSelection::Index(i64::from(index))
    }
}

/// Slice view settings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    /// Axis perpendicular to the slice
    pub plane: PlaneType,
    /// Slice index or auto
    pub slice: SliceSelection,
    /// Intensity window (None = default for the voxel type)
    pub window: Option<f32>,
    /// Intensity level (None = default for the voxel type)
    pub level: Option<f32>,
}

impl SliceConfig {
    /// Check value ranges
    pub fn validate(&self) -> RenderResult<()> {
        validate_window(self.window)
    }
}

/// Window must be positive when given
pub fn validate_window(window: Option<f32>) -> RenderResult<()> {
    match window {
        Some(w) if !(w > 0.0) => Err(RenderError::InvalidConfig(format!(
            "intensity window must be positive, got {}",
            w
        ))),
        _ => Ok(()),
    }
}

/// Adapter selection preference
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum PowerPreference {
    /// Prefer a discrete GPU
    #[default]
    HighPerformance,
    /// Prefer an integrated GPU
    LowPower,
}

/// Binary configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Slice view settings
    pub slice: SliceConfig,
    /// Edge length of the rendered PNG in pixels
    pub output_size: u32,
    /// Adapter preference for the wgpu device
    pub power_preference: PowerPreference,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slice: SliceConfig::default(),
            output_size: 512,
            power_preference: PowerPreference::default(),
        }
    }
}

impl Config {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty-printed JSON
    pub fn save(&self, path: &Path) -> RenderResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.output_size == 0 {
            return Err(RenderError::InvalidConfig(
                "output size must be non-zero".to_string(),
            ));
        }
        self.slice.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: Config = serde_json::from_str(r#"{ "slice": { "plane": "X" } }"#).unwrap();
        assert_eq!(config.slice.plane, PlaneType::X);
        assert_eq!(config.slice.slice, SliceSelection::Auto);
        assert_eq!(config.slice.window, None);
        assert_eq!(config.output_size, 512);
    }

    #[test]
    fn test_slice_index_json() {
        let config: SliceConfig =
            serde_json::from_str(r#"{ "slice": { "Index": 7 }, "window": 400.0 }"#).unwrap();
        assert_eq!(config.slice, SliceSelection::Index(7));
        assert_eq!(config.window, Some(400.0));
    }

    #[test]
    fn test_non_positive_window_rejected() {
        assert!(validate_window(Some(0.0)).is_err());
        assert!(validate_window(Some(-3.0)).is_err());
        assert!(validate_window(Some(f32::NAN)).is_err());
        assert!(validate_window(Some(1.0)).is_ok());
        assert!(validate_window(None).is_ok());
    }
}
