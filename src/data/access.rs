// SPDX-License-Identifier: GPL-3.0-only

//! Access arbitration for data objects
//!
//! Access is a cooperative protocol, not a lock: callers request a token before
//! touching a buffer and drop it afterwards. Any number of read-only tokens may be
//! outstanding at once. A read-write token excludes every other access, host or GPU.

use crate::errors::{RenderError, RenderResult};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Requested access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    ReadWrite,
}

/// Arbitration state shared between a data object and its tokens
#[derive(Debug, Default)]
pub(crate) struct AccessFlags {
    gpu_accesses: usize,
    /// Outstanding host pointer tokens. Host access is not granted yet
    /// (`get_surface_pointer_access` returns `Unsupported`), so this stays zero.
    host_accesses: usize,
    writing: bool,
}

impl AccessFlags {
    pub(crate) fn is_any_data_being_accessed(&self) -> bool {
        self.gpu_accesses > 0 || self.host_accesses > 0
    }

    pub(crate) fn is_being_written(&self) -> bool {
        self.writing
    }

    /// Check whether a request in `mode` may be granted
    pub(crate) fn check(&self, mode: AccessMode) -> RenderResult<()> {
        if self.writing {
            return Err(RenderError::WriteInProgress);
        }
        if mode == AccessMode::ReadWrite && self.is_any_data_being_accessed() {
            return Err(RenderError::AlreadyAccessed);
        }
        Ok(())
    }

    /// Record a granted GPU access. Call only after `check` succeeded.
    pub(crate) fn grant_gpu(&mut self, mode: AccessMode) {
        self.gpu_accesses += 1;
        if mode == AccessMode::ReadWrite {
            self.writing = true;
        }
    }

    fn release_gpu(&mut self, mode: AccessMode) {
        self.gpu_accesses = self.gpu_accesses.saturating_sub(1);
        if mode == AccessMode::ReadWrite {
            self.writing = false;
        }
    }
}

/// Shared handle to the arbitration state
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedAccessFlags(Arc<Mutex<AccessFlags>>);

impl SharedAccessFlags {
    pub(crate) fn lock(&self) -> MutexGuard<'_, AccessFlags> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Granted access to a vertex buffer object
///
/// Dropping the token releases its share of the arbitration state.
pub struct VertexBufferAccess<B> {
    buffer: Arc<B>,
    mode: AccessMode,
    triangle_count: u32,
    flags: SharedAccessFlags,
}

impl<B> VertexBufferAccess<B> {
    pub(crate) fn new(
        buffer: Arc<B>,
        mode: AccessMode,
        triangle_count: u32,
        flags: SharedAccessFlags,
    ) -> Self {
        Self {
            buffer,
            mode,
            triangle_count,
            flags,
        }
    }

    /// The vertex buffer object
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Number of triangles the buffer is laid out for
    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }

    /// Release explicitly; equivalent to dropping the token
    pub fn release(self) {}
}

impl<B> Drop for VertexBufferAccess<B> {
    fn drop(&mut self) {
        self.flags.lock().release_gpu(self.mode);
    }
}

impl<B> fmt::Debug for VertexBufferAccess<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexBufferAccess")
            .field("mode", &self.mode)
            .field("triangle_count", &self.triangle_count)
            .finish_non_exhaustive()
    }
}

/// Granted access to host-side vertex data
///
/// Host access is not implemented yet; no token of this type is ever issued.
#[derive(Debug)]
pub struct SurfacePointerAccess {
    pub mode: AccessMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readers_do_not_exclude_each_other() {
        let mut flags = AccessFlags::default();
        flags.check(AccessMode::Read).unwrap();
        flags.grant_gpu(AccessMode::Read);
        flags.check(AccessMode::Read).unwrap();
        flags.grant_gpu(AccessMode::Read);
        assert_eq!(flags.check(AccessMode::ReadWrite), Err(RenderError::AlreadyAccessed));
    }

    #[test]
    fn test_writer_excludes_everything() {
        let mut flags = AccessFlags::default();
        flags.grant_gpu(AccessMode::ReadWrite);
        assert_eq!(flags.check(AccessMode::Read), Err(RenderError::WriteInProgress));
        assert_eq!(flags.check(AccessMode::ReadWrite), Err(RenderError::WriteInProgress));
        flags.release_gpu(AccessMode::ReadWrite);
        assert!(flags.check(AccessMode::ReadWrite).is_ok());
    }

    #[test]
    fn test_reader_release_order_is_independent() {
        let flags = SharedAccessFlags::default();
        flags.lock().grant_gpu(AccessMode::Read);
        flags.lock().grant_gpu(AccessMode::Read);
        let first = VertexBufferAccess::new(Arc::new(()), AccessMode::Read, 0, flags.clone());
        let second = VertexBufferAccess::new(Arc::new(()), AccessMode::Read, 0, flags.clone());

        drop(first);
        // The second reader is still active
        assert!(flags.lock().is_any_data_being_accessed());
        assert_eq!(flags.lock().check(AccessMode::ReadWrite), Err(RenderError::AlreadyAccessed));

        drop(second);
        assert!(!flags.lock().is_any_data_being_accessed());
    }
}
