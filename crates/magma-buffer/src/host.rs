//! # Host Backend
//!
//! Reference backend that keeps buffer memory in host allocations.
//!
//! Every submitted serial completes immediately, which makes the whole
//! mapping lifecycle (direct mapping, staging bridge, copy-back) executable
//! without a GPU.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

use magma_core::{
    checked_align_up, BufferBackend, BufferDescriptor, ByteSize, DeviceBackend, Error, MapMode,
    Result, Serial,
};
use magma_mem::try_alloc_zeroed;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Which buffers the CPU may write directly at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectMapping {
    /// Only buffers with MAP_READ or MAP_WRITE usage
    MappableUsageOnly,
    /// Every buffer
    Always,
    /// No buffer; creation-time mapping always goes through staging
    Never,
}

/// Host backend configuration
#[derive(Debug, Clone)]
pub struct HostBackendConfig {
    /// Direct mapping policy
    pub direct_mapping: DirectMapping,
    /// Allocation granularity (power of two)
    pub alignment: u64,
}

impl HostBackendConfig {
    /// Configuration with the given mapping policy and 4-byte granularity
    pub const fn new(direct_mapping: DirectMapping) -> Self {
        Self {
            direct_mapping,
            alignment: 4,
        }
    }

    /// Replace the allocation granularity
    pub const fn alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }
}

impl Default for HostBackendConfig {
    fn default() -> Self {
        Self::new(DirectMapping::MappableUsageOnly)
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

#[derive(Debug, Default)]
struct HostCounters {
    created: AtomicU64,
    destroyed: AtomicU64,
    maps: AtomicU64,
    unmaps: AtomicU64,
    staging_writes: AtomicU64,
}

impl HostCounters {
    fn snapshot(&self) -> HostStats {
        HostStats {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            maps: self.maps.load(Ordering::Relaxed),
            unmaps: self.unmaps.load(Ordering::Relaxed),
            staging_writes: self.staging_writes.load(Ordering::Relaxed),
        }
    }
}

/// Host backend statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Buffers allocated
    pub created: u64,
    /// Buffers released
    pub destroyed: u64,
    /// Creation-time and asynchronous maps
    pub maps: u64,
    /// Unmaps
    pub unmaps: u64,
    /// Staging copies written into buffers
    pub staging_writes: u64,
}

// =============================================================================
// HOST BACKEND
// =============================================================================

/// Device backend over host memory
#[derive(Debug)]
pub struct HostBackend {
    config: HostBackendConfig,
    counters: Arc<HostCounters>,
}

impl HostBackend {
    /// Create a new host backend
    pub fn new(config: HostBackendConfig) -> Self {
        assert!(
            config.alignment.is_power_of_two(),
            "allocation granularity must be a power of two"
        );
        Self {
            config,
            counters: Arc::new(HostCounters::default()),
        }
    }

    /// Get a statistics snapshot
    pub fn stats(&self) -> HostStats {
        self.counters.snapshot()
    }

    /// Handle to the statistics that stays valid after the backend is moved
    /// into a device
    pub fn stats_handle(&self) -> HostStatsHandle {
        HostStatsHandle {
            counters: self.counters.clone(),
        }
    }

    fn allocated_size_for(&self, size: u64) -> Result<u64> {
        let alignment = self.config.alignment;
        checked_align_up(size, alignment)
            .map(|aligned| aligned.max(alignment))
            .ok_or(Error::OutOfMemory)
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new(HostBackendConfig::default())
    }
}

/// Shared view of a [`HostBackend`]'s statistics
#[derive(Debug, Clone)]
pub struct HostStatsHandle {
    counters: Arc<HostCounters>,
}

impl HostStatsHandle {
    /// Get a statistics snapshot
    pub fn get(&self) -> HostStats {
        self.counters.snapshot()
    }
}

impl DeviceBackend for HostBackend {
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Box<dyn BufferBackend>> {
        let allocated_size = self.allocated_size_for(desc.size)?;
        let data = try_alloc_zeroed(allocated_size)?;

        let cpu_writable = match self.config.direct_mapping {
            DirectMapping::MappableUsageOnly => desc.usage.is_mappable(),
            DirectMapping::Always => true,
            DirectMapping::Never => false,
        };

        self.counters.created.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "host: allocated {} for {:?}",
            ByteSize::from_bytes(allocated_size),
            desc.label
        );

        Ok(Box::new(HostBuffer {
            data: Some(data),
            cpu_writable,
            mapped: false,
            counters: self.counters.clone(),
        }))
    }

    fn poll_completed_serial(&self, last_submitted: Serial) -> Serial {
        last_submitted
    }
}

// =============================================================================
// HOST BUFFER
// =============================================================================

/// Buffer backend over a host allocation
#[derive(Debug)]
struct HostBuffer {
    /// `None` once destroyed
    data: Option<Box<[u8]>>,
    cpu_writable: bool,
    mapped: bool,
    counters: Arc<HostCounters>,
}

impl HostBuffer {
    fn len(&self) -> u64 {
        self.data.as_ref().map_or(0, |d| d.len() as u64)
    }
}

impl BufferBackend for HostBuffer {
    fn allocated_size(&self) -> u64 {
        self.len()
    }

    fn is_cpu_writable_at_creation(&self) -> bool {
        self.cpu_writable
    }

    fn map_at_creation(&mut self) -> Result<()> {
        if self.data.is_none() {
            return Err(Error::MappingFailed);
        }
        self.mapped = true;
        self.counters.maps.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn map_async(&mut self, _mode: MapMode, offset: u64, size: u64) -> Result<()> {
        let end = offset.checked_add(size).ok_or(Error::MappingFailed)?;
        if self.data.is_none() || end > self.len() {
            return Err(Error::MappingFailed);
        }
        self.mapped = true;
        self.counters.maps.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn mapped_pointer(&mut self) -> Option<NonNull<u8>> {
        if !self.mapped {
            return None;
        }
        self.data
            .as_deref_mut()
            .map(|data| NonNull::from(data).cast())
    }

    fn unmap(&mut self) {
        if self.mapped {
            self.mapped = false;
            self.counters.unmaps.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn destroy(&mut self) {
        self.mapped = false;
        if self.data.take().is_some() {
            self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn write_from_staging(&mut self, src: &[u8], dst_offset: u64) -> Result<()> {
        let size = src.len() as u64;
        let out_of_bounds = Error::CopyOutOfBounds {
            offset: dst_offset,
            size,
        };
        let data = self.data.as_deref_mut().ok_or(out_of_bounds)?;
        let start = usize::try_from(dst_offset).map_err(|_| out_of_bounds)?;
        let dst = start
            .checked_add(src.len())
            .and_then(|end| data.get_mut(start..end))
            .ok_or(out_of_bounds)?;

        dst.copy_from_slice(src);
        self.counters.staging_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

static_assertions::assert_impl_all!(HostBackend: Send, Sync);
