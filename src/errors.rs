// SPDX-License-Identifier: GPL-3.0-only

//! Error types for surface and slice rendering
//!
//! Every failure is reported synchronously to the caller. Nothing is retried
//! internally; the pipeline layer decides whether to skip a frame or abort.

use std::fmt;

/// Result type alias using RenderError
pub type RenderResult<T> = Result<T, RenderError>;

/// Rendering subsystem error type
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The data object was never created
    NotInitialized,
    /// Volume is not three-dimensional
    UnsupportedDimensionality(usize),
    /// Explicit slice index below zero
    InvalidSliceIndex(i64),
    /// Geometry arrays are inconsistent
    InvalidGeometry(String),
    /// A write access is outstanding
    WriteInProgress,
    /// Exclusive access requested while other accesses are outstanding
    AlreadyAccessed,
    /// Declared but unimplemented code path
    Unsupported(String),
    /// GPU binding layer failed to initialize
    BindingInit(String),
    /// Kernel failed to build
    KernelBuild(String),
    /// No rendering context could be made current
    Context(String),
    /// Device-side failure (allocation, dispatch, readback)
    Gpu(String),
    /// No input volume is bound, or it has been dropped
    NoInput,
    /// Configuration value is invalid
    InvalidConfig(String),
    /// Filesystem or serialization failure
    Io(String),
}

impl RenderError {
    /// True for the two access-conflict conditions
    pub fn is_access_conflict(&self) -> bool {
        matches!(self, RenderError::WriteInProgress | RenderError::AlreadyAccessed)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NotInitialized => write!(f, "Surface has not been initialized"),
            RenderError::UnsupportedDimensionality(dims) => {
                write!(f, "Only 3D images are supported, got {}D", dims)
            }
            RenderError::InvalidSliceIndex(index) => {
                write!(f, "Slice to render was below 0: {}", index)
            }
            RenderError::InvalidGeometry(msg) => write!(f, "Invalid geometry: {}", msg),
            RenderError::WriteInProgress => write!(
                f,
                "Requesting access to an object that is already being written to"
            ),
            RenderError::AlreadyAccessed => write!(
                f,
                "Trying to get write access to an object that is already being accessed"
            ),
            RenderError::Unsupported(what) => write!(f, "Not implemented: {}", what),
            RenderError::BindingInit(msg) => write!(f, "GPU binding init error: {}", msg),
            RenderError::KernelBuild(msg) => write!(f, "Kernel build failed: {}", msg),
            RenderError::Context(msg) => write!(f, "Error setting GPU context: {}", msg),
            RenderError::Gpu(msg) => write!(f, "GPU error: {}", msg),
            RenderError::NoInput => write!(f, "No input volume is bound"),
            RenderError::InvalidConfig(msg) => write!(f, "Configuration error: {}", msg),
            RenderError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::Io(err.to_string())
    }
}

impl From<image::ImageError> for RenderError {
    fn from(err: image::ImageError) -> Self {
        RenderError::Io(err.to_string())
    }
}
