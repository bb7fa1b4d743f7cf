//! # MAGMA Core Traits
//!
//! Capability traits a backend implements to provide real buffer memory.
//!
//! The buffer layer owns the mapping state machine and all validation; a
//! backend only supplies the primitives underneath it.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! DeviceBackend
//!    │
//!    ├── create_buffer ──► BufferBackend
//!    │                        ├── map_at_creation
//!    │                        ├── map_async
//!    │                        ├── mapped_pointer
//!    │                        ├── unmap / destroy
//!    │                        └── write_from_staging
//!    │
//!    └── poll_completed_serial
//! ```

use alloc::boxed::Box;
use core::ptr::NonNull;

use crate::error::Result;
use crate::memory::{BufferDescriptor, MapMode};
use crate::types::*;

// =============================================================================
// DEVICE BACKEND TRAIT
// =============================================================================

/// Device-level backend
///
/// Creates per-buffer backends and reports how far the GPU timeline has
/// progressed.
pub trait DeviceBackend: Send + Sync {
    /// Allocate backing memory for a validated descriptor
    ///
    /// `desc.usage` already carries any implied internal usage.
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Box<dyn BufferBackend>>;

    /// Latest serial the GPU has finished, never beyond `last_submitted`
    fn poll_completed_serial(&self, last_submitted: Serial) -> Serial;
}

// =============================================================================
// BUFFER BACKEND TRAIT
// =============================================================================

/// Per-buffer backend primitives
///
/// Called with the owning buffer's lock held and only after validation.
pub trait BufferBackend: Send {
    /// Physical size chosen by the allocator, at least the nominal size
    fn allocated_size(&self) -> u64;

    /// Whether memory can be written directly by the CPU right after creation
    fn is_cpu_writable_at_creation(&self) -> bool;

    /// Map the whole allocation for writing at creation
    ///
    /// Only called when [`is_cpu_writable_at_creation`](Self::is_cpu_writable_at_creation)
    /// returns true.
    fn map_at_creation(&mut self) -> Result<()>;

    /// Start an asynchronous map of `[offset, offset + size)`
    fn map_async(&mut self, mode: MapMode, offset: u64, size: u64) -> Result<()>;

    /// Base pointer of the mapped allocation
    ///
    /// Offsets are added by the caller; `None` when nothing is mapped. A
    /// returned pointer is valid for `allocated_size()` bytes until `unmap`.
    fn mapped_pointer(&mut self) -> Option<NonNull<u8>>;

    /// Release the CPU mapping
    fn unmap(&mut self);

    /// Release all backing memory
    fn destroy(&mut self);

    /// Copy staged bytes into the allocation at `dst_offset`
    fn write_from_staging(&mut self, src: &[u8], dst_offset: u64) -> Result<()>;
}

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

static_assertions::assert_impl_all!(Serial: Send, Sync, Copy);
static_assertions::assert_impl_all!(MapRequestId: Send, Sync, Copy);
static_assertions::assert_impl_all!(BufferId: Send, Sync, Copy);
static_assertions::assert_impl_all!(ByteSize: Send, Sync, Copy);
static_assertions::assert_obj_safe!(DeviceBackend, BufferBackend);
