//! # Buffer Memory Descriptions
//!
//! Usage flags, map modes, creation descriptors and map request status.

use alloc::string::String;

// =============================================================================
// BUFFER USAGE
// =============================================================================

bitflags::bitflags! {
    /// How a buffer will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// CPU read access through MapAsync(READ)
        const MAP_READ = 1 << 0;
        /// CPU write access through MapAsync(WRITE)
        const MAP_WRITE = 1 << 1;
        /// Copy source
        const COPY_SRC = 1 << 2;
        /// Copy destination
        const COPY_DST = 1 << 3;
        /// Index data
        const INDEX = 1 << 4;
        /// Vertex data
        const VERTEX = 1 << 5;
        /// Uniform buffer
        const UNIFORM = 1 << 6;
        /// Storage buffer
        const STORAGE = 1 << 7;
        /// Indirect commands
        const INDIRECT = 1 << 8;
        /// Query resolve destination
        const QUERY_RESOLVE = 1 << 9;

        /// Internal: read-only storage binding, implied by STORAGE
        const READ_ONLY_STORAGE = 1 << 31;
        /// Internal: storage binding for internal compute passes
        const INTERNAL_STORAGE = 1 << 30;
    }
}

impl BufferUsage {
    /// Usages an application may request
    pub const PUBLIC: Self = Self::MAP_READ
        .union(Self::MAP_WRITE)
        .union(Self::COPY_SRC)
        .union(Self::COPY_DST)
        .union(Self::INDEX)
        .union(Self::VERTEX)
        .union(Self::UNIFORM)
        .union(Self::STORAGE)
        .union(Self::INDIRECT)
        .union(Self::QUERY_RESOLVE);

    /// Usages only ever added by the implementation
    pub const INTERNAL: Self = Self::READ_ONLY_STORAGE.union(Self::INTERNAL_STORAGE);

    /// Usages allowed alongside MAP_WRITE
    pub const MAP_WRITE_ALLOWED: Self = Self::MAP_WRITE.union(Self::COPY_SRC);

    /// Usages allowed alongside MAP_READ
    pub const MAP_READ_ALLOWED: Self = Self::MAP_READ.union(Self::COPY_DST);

    /// Check if any mappable usage is present
    #[inline]
    pub const fn is_mappable(self) -> bool {
        self.intersects(Self::MAP_READ.union(Self::MAP_WRITE))
    }
}

// =============================================================================
// MAP MODE
// =============================================================================

bitflags::bitflags! {
    /// Requested CPU access for a map request
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapMode: u32 {
        /// Read access
        const READ = 1 << 0;
        /// Write access
        const WRITE = 1 << 1;
    }
}

impl MapMode {
    /// Check that exactly one of READ or WRITE is set
    #[inline]
    pub const fn is_single_access(self) -> bool {
        self.contains(Self::READ) != self.contains(Self::WRITE)
    }

    /// Buffer usage required to map with this mode
    ///
    /// Only meaningful for single-access modes.
    #[inline]
    pub const fn required_usage(self) -> BufferUsage {
        if self.contains(Self::READ) {
            BufferUsage::MAP_READ
        } else {
            BufferUsage::MAP_WRITE
        }
    }
}

/// Size sentinel meaning "from the offset to the end of the buffer"
pub const WHOLE_MAP_SIZE: u64 = u64::MAX;

// =============================================================================
// MAP STATUS
// =============================================================================

/// Outcome delivered to a map callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MapAsyncStatus {
    /// The range is mapped and the pointer may be queried
    Success = 0,
    /// The request failed validation
    Error = 1,
    /// The device was lost before the request resolved
    DeviceLost = 2,
    /// The buffer was destroyed before the request resolved
    DestroyedBeforeCallback = 3,
    /// The buffer was unmapped before the request resolved
    UnmappedBeforeCallback = 4,
}

impl MapAsyncStatus {
    /// Status reported for a request rejected with `error`
    #[inline]
    pub const fn from_validation_error(error: &crate::Error) -> Self {
        if error.is_device_lost() {
            Self::DeviceLost
        } else {
            Self::Error
        }
    }
}

// =============================================================================
// BUFFER DESCRIPTOR
// =============================================================================

/// Chained extension struct header
///
/// No extension is currently understood; any chained struct fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainedStruct {
    /// Structure type
    pub s_type: u32,
}

/// Buffer creation descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Extension chain
    pub next_in_chain: Option<ChainedStruct>,
    /// Debug label
    pub label: Option<String>,
    /// Size in bytes
    pub size: u64,
    /// Usage flags
    pub usage: BufferUsage,
    /// Start in the mapped state with a writable window over the whole buffer
    pub mapped_at_creation: bool,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            next_in_chain: None,
            label: None,
            size,
            usage,
            mapped_at_creation: false,
        }
    }

    /// Set mapped at creation
    pub fn mapped_at_creation(mut self, mapped: bool) -> Self {
        self.mapped_at_creation = mapped;
        self
    }

    /// Set debug label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Upload buffer: CPU writes, GPU copies out
    pub fn upload(size: u64) -> Self {
        Self::new(size, BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC)
    }

    /// Readback buffer: GPU copies in, CPU reads
    pub fn readback(size: u64) -> Self {
        Self::new(size, BufferUsage::MAP_READ | BufferUsage::COPY_DST)
    }
}
